use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Publishes after a committed write; a closed channel is logged, never surfaced.
    pub async fn publish(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!(error = %e, "domain event dropped");
        }
    }
}

/// Domain events emitted once the corresponding write has committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    ShopCreated {
        shop_id: Uuid,
        owner_id: Uuid,
    },
    ProductCreated {
        product_id: Uuid,
        shop_id: Uuid,
    },
    ProductDeleted {
        product_id: Uuid,
        shop_id: Uuid,
    },
    StockAdjusted {
        product_id: Uuid,
        stock: i32,
        is_active: bool,
    },
    CouponRedeemed {
        coupon_id: Uuid,
        order_id: Uuid,
        discount: Decimal,
    },
    OrderCreated {
        order_id: Uuid,
        shop_id: Uuid,
        buyer_id: Uuid,
        total_price: Decimal,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled {
        order_id: Uuid,
        cancelled_by: Uuid,
    },
    ComplaintFiled {
        complaint_id: Uuid,
        order_id: Uuid,
        shop_id: Uuid,
    },
    ComplaintDecided {
        complaint_id: Uuid,
        action: String,
        status: String,
    },
    VerificationSubmitted {
        verification_id: Uuid,
        seller_id: Uuid,
        resubmission: bool,
    },
    VerificationApproved {
        verification_id: Uuid,
        seller_id: Uuid,
        level: String,
    },
    VerificationRejected {
        verification_id: Uuid,
        seller_id: Uuid,
        resubmit_required: bool,
    },
    ReviewChanged {
        product_id: Uuid,
        shop_id: Uuid,
        product_rating: f64,
        shop_rating: f64,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ShopCreated { .. } => "shop_created",
            Event::ProductCreated { .. } => "product_created",
            Event::ProductDeleted { .. } => "product_deleted",
            Event::StockAdjusted { .. } => "stock_adjusted",
            Event::CouponRedeemed { .. } => "coupon_redeemed",
            Event::OrderCreated { .. } => "order_created",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::OrderCancelled { .. } => "order_cancelled",
            Event::ComplaintFiled { .. } => "complaint_filed",
            Event::ComplaintDecided { .. } => "complaint_decided",
            Event::VerificationSubmitted { .. } => "verification_submitted",
            Event::VerificationApproved { .. } => "verification_approved",
            Event::VerificationRejected { .. } => "verification_rejected",
            Event::ReviewChanged { .. } => "review_changed",
        }
    }
}

/// Drains the event channel. Delivery to users (push, email) lives outside this
/// service; here every event is recorded in the structured log.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(payload) => info!(event = event.name(), %payload, "domain event"),
            Err(e) => warn!(event = event.name(), error = %e, "unserializable domain event"),
        }
    }

    info!("Event channel closed; stopping event processing loop");
}
