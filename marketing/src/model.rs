use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::models::{Cart, CartItem};

/// Persistent record of one detected cart abandonment.
///
/// Lifecycle: fresh → detected → email_queued → sms_queued →
/// recovered | aged_out. The channel flags make follow-up dispatch
/// idempotent; SMS is only ever dispatched after the email went out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbandonedCart {
    pub cart_id: String,
    pub user_id: String,
    pub total_value: f64,
    pub items: Vec<CartItem>,
    pub abandoned_at: DateTime<Utc>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub email_sent: bool,
    pub sms_sent: bool,
    pub follow_up_count: u32,
    pub recovered: bool,
}

impl AbandonedCart {
    pub fn from_cart(cart: &Cart) -> Self {
        Self {
            cart_id: cart.cart_id.clone(),
            user_id: cart.user_id.clone(),
            total_value: cart.total_value,
            items: cart.items.clone(),
            abandoned_at: Utc::now(),
            customer_email: cart.customer_email.clone(),
            customer_phone: cart.customer_phone.clone(),
            email_sent: false,
            sms_sent: false,
            follow_up_count: 0,
            recovered: false,
        }
    }

    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.abandoned_at).num_days()
    }
}
