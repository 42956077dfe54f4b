//! Routes payment methods to the one handler that claims them, and fans
//! bus events out to subscribed handlers.
use crate::events::ReconciliationEvent;
use crate::handler::PayoutHandler;
use crate::payout::PaymentMethodId;
use std::sync::Arc;
use tracing::{info, warn};

/// Ordered set of registered rail handlers.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn PayoutHandler>>,
}

impl HandlerRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Registration order breaks ties when more than one
    /// handler would claim a payment method.
    pub fn register(&mut self, handler: Arc<dyn PayoutHandler>) {
        info!(handlers = self.handlers.len() + 1, "registering payout handler");
        self.handlers.push(handler);
    }

    /// The handler owning `payment_method`, if any claims it.
    pub fn find(&self, payment_method: &PaymentMethodId) -> Option<Arc<dyn PayoutHandler>> {
        self.handlers
            .iter()
            .find(|h| h.can_handle(payment_method))
            .cloned()
    }

    /// Deliver one bus event to every handler subscribed to its kind.
    ///
    /// A failing handler is logged and skipped; one rail's outage never
    /// blocks reconciliation on the others.
    pub async fn dispatch(&self, event: &ReconciliationEvent) {
        let kind = event.kind();
        for handler in &self.handlers {
            if !handler.subscribed_events().contains(&kind) {
                continue;
            }
            if let Err(e) = handler.background_check(event).await {
                warn!(event = ?kind, error = %e, "payout background check failed");
            }
        }
    }
}
