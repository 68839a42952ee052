use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

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

    /// Sends an event, logging instead of failing when the receiver is gone.
    /// Event delivery is best-effort; state changes never roll back over it.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event.clone()).await {
            warn!(?event, error = %e, "Failed to publish event");
        }
    }
}

// Define the various events that can occur in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Order events
    OrderCreated(Uuid),
    OrderCancelled(Uuid),
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },

    // Refund events
    RefundRequested {
        order_id: Uuid,
        requested_units: i32,
    },
    RefundResolved {
        order_item_id: Uuid,
        quantity: i32,
        approved: bool,
    },
    RefundCycleClosed {
        order_id: Uuid,
        accepted: bool,
    },

    // Cart events
    CartCreated(Uuid),
    CartItemAdded {
        cart_id: Uuid,
        product_id: Uuid,
    },
    CartItemUpdated {
        cart_id: Uuid,
        item_id: Uuid,
    },
    CartItemRemoved {
        cart_id: Uuid,
        item_id: Uuid,
    },
    CartCleared(Uuid),
    CartMerged {
        guest_cart_id: Uuid,
        account_cart_id: Uuid,
        unmerged_products: usize,
    },

    // Checkout events
    CheckoutCompleted {
        cart_id: Uuid,
        order_id: Uuid,
    },
}

/// Creates an event channel with the given buffer size.
pub fn event_channel(buffer: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(buffer);
    (EventSender::new(tx), rx)
}

// Function to process incoming events. Downstream consumers (notifications,
// analytics) hang off this loop; the core only logs them.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "Order status changed");
            }
            Event::CartMerged {
                guest_cart_id,
                account_cart_id,
                unmerged_products,
            } => {
                if *unmerged_products > 0 {
                    warn!(
                        %guest_cart_id,
                        %account_cart_id,
                        unmerged_products,
                        "Cart merge completed with unmerged lines"
                    );
                } else {
                    info!(%guest_cart_id, %account_cart_id, "Cart merge completed");
                }
            }
            Event::RefundCycleClosed { order_id, accepted } => {
                info!(%order_id, accepted, "Refund cycle closed");
            }
            other => {
                info!(event = ?other, "Received event");
            }
        }
    }

    info!("Event processing loop stopped");
}
