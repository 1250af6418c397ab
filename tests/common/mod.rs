#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use marketplace_api::{
    auth::{AuthUser, AuthorizationContext, ROLE_ADMIN, ROLE_BUYER, ROLE_SELLER},
    config::AppConfig,
    db,
    entities::{
        coupon::{self, DiscountType},
        order::OrderStatus,
        product, seller_verification, shop,
        seller_verification::BusinessType,
    },
    events::{self, EventSender},
    handlers::AppServices,
    services::{
        coupons::CreateCouponRequest,
        orders::{CreateOrderRequest, OrderDetails, OrderItemInput},
        products::CreateProductRequest,
        shops::CreateShopRequest,
        verification::{
            ApproveVerificationRequest, IdentityDocument, IdentityDocumentType,
            SubmitVerificationRequest,
        },
        Address,
    },
    AppState,
};
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseConnection};
use tempfile::TempDir;
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "integration_test_secret_that_is_long_enough";

/// A caller with a bearer token.
#[derive(Debug, Clone)]
pub struct Actor {
    pub id: Uuid,
    pub roles: Vec<String>,
    pub token: String,
}

/// A seller together with the shop they own.
#[derive(Debug, Clone)]
pub struct Seller {
    pub actor: Actor,
    pub shop: shop::Model,
}

/// Helper harness for spinning up an application state backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        let mut cfg = test_config("sqlite::memory:".to_string());
        // one connection keeps every query on the same in-memory database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        Self::with_config(cfg).await
    }

    /// Application backed by a SQLite file inside `dir` with a pool of
    /// `max_connections`, so concurrent requests really overlap in the store.
    pub async fn file_backed(dir: &TempDir, max_connections: u32) -> Self {
        let url = format!(
            "sqlite://{}?mode=rwc",
            dir.path().join("marketplace.db").display()
        );

        // journal mode is stored in the file, so one connection sets it for the pool
        let mut setup = test_config(url.clone());
        setup.db_max_connections = 1;
        setup.db_min_connections = 1;
        let pool = db::establish_connection_from_app_config(&setup)
            .await
            .expect("failed to create test database file");
        pool.execute_unprepared("PRAGMA journal_mode=WAL")
            .await
            .expect("enable WAL journal");
        pool.close().await.expect("close setup connection");

        let mut cfg = test_config(url);
        cfg.db_max_connections = max_connections;
        cfg.db_min_connections = 1;
        Self::with_config(cfg).await
    }

    async fn with_config(cfg: AppConfig) -> Self {
        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_tx, event_rx) = mpsc::channel(cfg.event_channel_capacity);
        let event_task = tokio::spawn(events::process_events(event_rx));
        let state = AppState::new(Arc::new(pool), cfg, Arc::new(EventSender::new(event_tx)));
        let router = marketplace_api::build_router(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        self.state.db.as_ref()
    }

    pub fn services(&self) -> &AppServices {
        &self.state.services
    }

    pub fn actor(&self, roles: &[&str]) -> Actor {
        let id = Uuid::new_v4();
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        let token = self
            .state
            .auth
            .issue_token(id, Some(format!("user-{}", &id.simple().to_string()[..6])), roles.clone())
            .expect("issue test token");
        Actor { id, roles, token }
    }

    /// Fresh capability context; reloads the user row so verification changes are visible.
    pub async fn ctx(&self, actor: &Actor) -> AuthorizationContext {
        let auth = AuthUser {
            user_id: actor.id,
            name: None,
            email: None,
            roles: actor.roles.clone(),
            token_id: Uuid::new_v4().to_string(),
        };
        AuthorizationContext::load(self.db(), &auth)
            .await
            .expect("load authorization context")
    }

    pub async fn buyer(&self) -> Actor {
        let actor = self.actor(&[ROLE_BUYER]);
        self.ctx(&actor).await;
        actor
    }

    pub async fn admin(&self) -> Actor {
        let actor = self.actor(&[ROLE_ADMIN]);
        self.ctx(&actor).await;
        actor
    }

    /// A seller owning a freshly created, not yet verified shop.
    pub async fn seller(&self, shop_name: &str) -> Seller {
        let actor = self.actor(&[ROLE_SELLER]);
        let ctx = self.ctx(&actor).await;
        let shop = self
            .services()
            .shops
            .create_shop(
                &ctx,
                CreateShopRequest {
                    shop_name: shop_name.to_string(),
                    description: Some("Test shop".to_string()),
                    logo: None,
                    banner: None,
                    location: Some("Lisbon".to_string()),
                },
            )
            .await
            .expect("create shop");
        Seller { actor, shop }
    }

    /// Submits verification documents for the seller and has an admin approve them.
    pub async fn verify(&self, seller: &Seller) -> seller_verification::Model {
        let ctx = self.ctx(&seller.actor).await;
        let submitted = self
            .services()
            .verification
            .submit(&ctx, verification_request(&seller.shop.shop_name))
            .await
            .expect("submit verification");
        let admin = self.admin().await;
        let admin_ctx = self.ctx(&admin).await;
        self.services()
            .verification
            .approve(&admin_ctx, submitted.id, ApproveVerificationRequest::default())
            .await
            .expect("approve verification")
    }

    pub async fn verified_seller(&self, shop_name: &str) -> Seller {
        let seller = self.seller(shop_name).await;
        self.verify(&seller).await;
        seller
    }

    pub async fn product(&self, seller: &Seller, price: Decimal, stock: i32) -> product::Model {
        let ctx = self.ctx(&seller.actor).await;
        self.services()
            .products
            .create_product(&ctx, product_request("Test product", price, stock))
            .await
            .expect("create product")
    }

    pub async fn coupon(&self, seller: &Seller, request: CreateCouponRequest) -> coupon::Model {
        let ctx = self.ctx(&seller.actor).await;
        self.services()
            .coupons
            .create_coupon(&ctx, request)
            .await
            .expect("create coupon")
    }

    pub async fn order(
        &self,
        buyer: &Actor,
        shop_id: Uuid,
        items: &[(Uuid, i32)],
        coupon_code: Option<&str>,
    ) -> OrderDetails {
        let ctx = self.ctx(buyer).await;
        self.services()
            .orders
            .create_order(&ctx, order_request(shop_id, items, coupon_code))
            .await
            .expect("create order")
    }

    /// Walks an order from pending to delivered as its seller.
    pub async fn deliver(&self, seller: &Seller, order_id: Uuid) -> OrderDetails {
        let ctx = self.ctx(&seller.actor).await;
        let mut details = None;
        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            details = Some(
                self.services()
                    .orders
                    .update_status(&ctx, order_id, status)
                    .await
                    .expect("advance order status"),
            );
        }
        details.expect("order delivered")
    }

    /// Sends a request through the full router.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router response")
    }
}

fn test_config(database_url: String) -> AppConfig {
    AppConfig::new(database_url, TEST_JWT_SECRET.to_string(), "test".to_string())
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Reads a decimal that was serialized as a JSON string.
pub fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .expect("decimal encoded as string")
        .parse()
        .expect("valid decimal")
}

pub fn address() -> Address {
    Address {
        street: "1 Rua Augusta".to_string(),
        city: "Lisbon".to_string(),
        state: String::new(),
        zip_code: "1100-048".to_string(),
        country: "Portugal".to_string(),
    }
}

pub fn product_request(title: &str, price: Decimal, stock: i32) -> CreateProductRequest {
    CreateProductRequest {
        title: title.to_string(),
        description: "A product used in tests".to_string(),
        price,
        original_price: None,
        discount: 0,
        category: Some("testing".to_string()),
        images: vec![],
        stock,
    }
}

/// Active coupon valid from yesterday for thirty days, shop-wide, unlimited.
pub fn coupon_request(code: &str, discount_type: DiscountType, value: Decimal) -> CreateCouponRequest {
    let now = Utc::now();
    CreateCouponRequest {
        code: code.to_string(),
        description: None,
        discount_type,
        discount_value: value,
        min_purchase: None,
        max_discount: None,
        start_date: now - Duration::days(1),
        end_date: now + Duration::days(30),
        usage_limit: None,
        applicable_products: vec![],
    }
}

pub fn order_request(
    shop_id: Uuid,
    items: &[(Uuid, i32)],
    coupon_code: Option<&str>,
) -> CreateOrderRequest {
    CreateOrderRequest {
        shop_id,
        items: items
            .iter()
            .map(|(product_id, quantity)| OrderItemInput {
                product_id: *product_id,
                quantity: *quantity,
            })
            .collect(),
        coupon_code: coupon_code.map(str::to_string),
        shipping_address: address(),
        notes: None,
    }
}

pub fn verification_request(business_name: &str) -> SubmitVerificationRequest {
    SubmitVerificationRequest {
        business_name: business_name.to_string(),
        business_type: BusinessType::Company,
        business_registration_number: Some("REG-001".to_string()),
        tax_id: Some("PT123456789".to_string()),
        business_address: address(),
        owner_full_name: "Ana Pereira".to_string(),
        owner_email: "owner@example.com".to_string(),
        owner_phone: "+351210000000".to_string(),
        identity_document: IdentityDocument {
            document_type: IdentityDocumentType::NationalId,
            number: "12345678".to_string(),
            front_image: "https://files.example.com/id-front.png".to_string(),
            back_image: None,
        },
        business_documents: vec![],
        bank_account: None,
        notes: None,
    }
}
