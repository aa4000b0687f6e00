use serde::{Deserialize, Serialize};

use crate::model::{OrderItem, round_money};

/// Campus-specific delivery fee policy.
pub trait PricingPolicy: Send + Sync {
    fn delivery_fee(&self, canteen_name: &str, drop_location: &str, subtotal: f64) -> f64;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    #[serde(default)]
    pub canteen_name: String,
    pub drop_location: String,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub total_amount: f64,
}

pub fn quote(policy: &dyn PricingPolicy, request: &QuoteRequest) -> Quote {
    let subtotal = round_money(request.items.iter().map(OrderItem::line_total).sum());
    let delivery_fee = policy.delivery_fee(&request.canteen_name, &request.drop_location, subtotal);
    Quote {
        subtotal,
        delivery_fee,
        total_amount: round_money(subtotal + delivery_fee),
    }
}
