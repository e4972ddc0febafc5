use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: u64,
    pub name: String,
    pub quantity: u32,
    pub unit_price: f64,
}

/// Live webshop cart snapshot used by abandonment detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub cart_id: String,
    pub user_id: String,
    pub items: Vec<CartItem>,
    pub total_value: f64,
    pub last_activity: DateTime<Utc>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
}
