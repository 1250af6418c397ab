pub mod admin;
pub mod common;
pub mod complaints;
pub mod coupons;
pub mod health;
pub mod orders;
pub mod products;
pub mod reviews;
pub mod shipping;
pub mod shops;
pub mod verification;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::events::EventSender;
use crate::services::{
    admin::AdminService, complaints::ComplaintService, coupons::CouponService, orders::OrderService,
    products::ProductService, promotions::PromotionService, reviews::ReviewService,
    shipping::ShippingService, shops::ShopService, verification::VerificationService,
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub promotions: Arc<PromotionService>,
    pub coupons: Arc<CouponService>,
    pub orders: Arc<OrderService>,
    pub complaints: Arc<ComplaintService>,
    pub verification: Arc<VerificationService>,
    pub shops: Arc<ShopService>,
    pub products: Arc<ProductService>,
    pub reviews: Arc<ReviewService>,
    pub shipping: Arc<ShippingService>,
    pub admin: Arc<AdminService>,
}

impl AppServices {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self {
            promotions: Arc::new(PromotionService::new(db.clone())),
            coupons: Arc::new(CouponService::new(db.clone())),
            orders: Arc::new(OrderService::new(db.clone(), event_sender.clone())),
            complaints: Arc::new(ComplaintService::new(db.clone(), event_sender.clone())),
            verification: Arc::new(VerificationService::new(
                db.clone(),
                event_sender.clone(),
            )),
            shops: Arc::new(ShopService::new(db.clone(), event_sender.clone())),
            products: Arc::new(ProductService::new(db.clone(), event_sender.clone())),
            reviews: Arc::new(ReviewService::new(db.clone(), event_sender)),
            shipping: Arc::new(ShippingService::new(db.clone())),
            admin: Arc::new(AdminService::new(db)),
        }
    }
}
