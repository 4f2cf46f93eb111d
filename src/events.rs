// Typed storefront event registry
//
// Integration points are a closed set of typed events dispatched to
// subscribers registered with an explicit integer priority. Dispatch order is
// deterministic: ascending priority, then registration order. Subscribers
// cannot veto or mutate the event; they observe it.

use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::discounts::CartTotals;

/// Events the service emits at its integration points
#[derive(Debug, Clone)]
pub enum StorefrontEvent {
    /// A cart quote was recomputed
    CartRecomputed {
        subtotal: Decimal,
        total: Decimal,
        line_count: usize,
        fee_count: usize,
    },

    /// An order's consumed discounts were recorded
    CheckoutCompleted {
        order_id: Uuid,
        rule_ids: Vec<Uuid>,
    },

    /// A discount rule was created, updated, or deactivated
    RulesChanged { rule_id: Uuid },

    /// A stored list definition was created or replaced
    ListSaved { list_id: Uuid },
}

/// A registered event subscriber
pub type EventHandler = Arc<dyn Fn(&StorefrontEvent) + Send + Sync>;

struct Subscription {
    name: &'static str,
    priority: i32,
    handler: EventHandler,
}

/// Event registry
///
/// Built once at startup; immutable afterwards, so dispatch needs no locking.
pub struct EventRegistry {
    subscriptions: Vec<Subscription>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self {
            subscriptions: Vec::new(),
        }
    }

    /// Register a subscriber under a name and priority
    ///
    /// Lower priorities run first. Equal priorities run in registration
    /// order (the sort is stable).
    pub fn subscribe<F>(&mut self, name: &'static str, priority: i32, handler: F)
    where
        F: Fn(&StorefrontEvent) + Send + Sync + 'static,
    {
        self.subscriptions.push(Subscription {
            name,
            priority,
            handler: Arc::new(handler),
        });
        self.subscriptions.sort_by_key(|s| s.priority);
    }

    /// Dispatch an event to every subscriber in order
    pub fn dispatch(&self, event: &StorefrontEvent) {
        for subscription in &self.subscriptions {
            tracing::trace!(
                "Dispatching {:?} to subscriber '{}'",
                std::mem::discriminant(event),
                subscription.name
            );
            (subscription.handler)(event);
        }
    }

    /// Emit a cart-recomputed event from a quote result
    pub fn cart_recomputed(&self, totals: &CartTotals) {
        self.dispatch(&StorefrontEvent::CartRecomputed {
            subtotal: totals.subtotal,
            total: totals.total,
            line_count: totals.lines.len(),
            fee_count: totals.fees.len(),
        });
    }

    /// Emit a checkout-completed event
    pub fn checkout_completed(&self, order_id: Uuid, rule_ids: &[Uuid]) {
        self.dispatch(&StorefrontEvent::CheckoutCompleted {
            order_id,
            rule_ids: rule_ids.to_vec(),
        });
    }

    /// Emit a rules-changed event
    pub fn rules_changed(&self, rule_id: Uuid) {
        self.dispatch(&StorefrontEvent::RulesChanged { rule_id });
    }

    /// Emit a list-saved event
    pub fn list_saved(&self, list_id: Uuid) {
        self.dispatch(&StorefrontEvent::ListSaved { list_id });
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
