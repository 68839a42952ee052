/*!
 * # Payment Collaborator
 *
 * Opaque boundary to the payment gateway. The core only gates order creation
 * on the authorization verdict; no payment logic lives here.
 */

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use uuid::Uuid;

use crate::errors::ServiceError;

/// Payment collaborator errors
#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),
}

impl From<PaymentError> for ServiceError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Unavailable(msg) => ServiceError::ServiceUnavailable(msg),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub amount: Decimal,
    pub currency: String,
    pub method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAuthorization {
    pub approved: bool,
    pub reference: Uuid,
}

/// Payment processor trait for different implementations
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn authorize(&self, request: PaymentRequest)
        -> Result<PaymentAuthorization, PaymentError>;
}

/// In-memory payment processor. Approves everything by default; can be
/// switched to decline for exercising the payment-failure path.
#[derive(Debug, Default)]
pub struct InMemoryPaymentProcessor {
    decline_all: AtomicBool,
}

impl InMemoryPaymentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declining() -> Self {
        let processor = Self::new();
        processor.decline_all.store(true, Ordering::SeqCst);
        processor
    }

    pub fn set_declining(&self, decline: bool) {
        self.decline_all.store(decline, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentProcessor for InMemoryPaymentProcessor {
    async fn authorize(
        &self,
        _request: PaymentRequest,
    ) -> Result<PaymentAuthorization, PaymentError> {
        Ok(PaymentAuthorization {
            approved: !self.decline_all.load(Ordering::SeqCst),
            reference: Uuid::new_v4(),
        })
    }
}
