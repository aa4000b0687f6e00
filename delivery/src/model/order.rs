use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use strum_macros::Display as EnumDisplay;

use super::{OrderId, UserId};

/// Lifecycle of an order.
///
/// ```text
/// PLACED -> ACCEPTED -> PICKED_UP -> OUT_FOR_DELIVERY -> DELIVERED
///    \________\______________________________________ -> CANCELLED (before pickup only)
/// ```
///
/// `PICKED_UP` is entered through start-pickup (which issues the handover code)
/// and `DELIVERED` only through a successful code verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumDisplay)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Placed,
    Accepted,
    PickedUp,
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Placed,
        OrderStatus::Accepted,
        OrderStatus::PickedUp,
        OrderStatus::OutForDelivery,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        matches!(
            (self, next),
            (Placed, Accepted)
                | (Placed, Cancelled)
                | (Accepted, PickedUp)
                | (Accepted, Cancelled)
                | (PickedUp, OutForDelivery)
                | (PickedUp, Delivered)
                | (OutForDelivery, Delivered)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// An OTP handover is pending while the buddy holds the food.
    pub fn awaits_handover(self) -> bool {
        matches!(self, OrderStatus::PickedUp | OrderStatus::OutForDelivery)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStatus(pub String);

impl std::fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown order status: {}", self.0)
    }
}

impl std::error::Error for UnknownStatus {}

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['-', ' '], "_");
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.to_string() == normalized)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

fn default_qty() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
    pub name: String,
    pub price: f64,
    #[serde(default = "default_qty")]
    pub qty: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub veg: Option<bool>,
}

impl OrderItem {
    pub fn line_total(&self) -> f64 {
        self.price * self.qty as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub canteen_name: String,
    pub pickup_point: String,
    pub drop_location: String,
    pub items: Vec<OrderItem>,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub total_amount: f64,
    #[serde(rename = "placedby")]
    pub placed_by: UserId,
    #[serde(rename = "pickedby")]
    pub picked_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_email: Option<String>,
    pub status: OrderStatus,
    /// Handover code; only ever delivered by email.
    #[serde(default, skip_serializing)]
    pub otp: Option<String>,
    #[serde(default)]
    pub otp_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn from_new(id: OrderId, new_order: NewOrder, now: DateTime<Utc>) -> Self {
        Self {
            id,
            canteen_name: new_order.canteen_name,
            pickup_point: new_order.pickup_point,
            drop_location: new_order.drop_location,
            items: new_order.items,
            subtotal: new_order.subtotal,
            delivery_fee: new_order.delivery_fee,
            total_amount: new_order.total_amount,
            placed_by: new_order.placed_by,
            picked_by: new_order.picked_by,
            student_email: new_order.student_email,
            status: OrderStatus::Placed,
            otp: None,
            otp_expires_at: None,
            created_at: new_order.created_at.unwrap_or(now),
            updated_at: now,
            delivered_at: None,
        }
    }

    pub fn has_pending_otp(&self) -> bool {
        self.otp.is_some()
    }

    pub fn clear_otp(&mut self) {
        self.otp = None;
        self.otp_expires_at = None;
    }
}

/// Validated order payload, produced by [`super::validation::validate_order_payload`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub canteen_name: String,
    pub pickup_point: String,
    pub drop_location: String,
    pub items: Vec<OrderItem>,
    pub subtotal: f64,
    pub delivery_fee: f64,
    pub total_amount: f64,
    pub placed_by: UserId,
    pub picked_by: Option<UserId>,
    pub student_email: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Query filter for listing orders. Empty fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub placed_by: Option<UserId>,
    pub picked_by: Option<UserId>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.status.is_none_or(|status| order.status == status)
            && self
                .placed_by
                .as_ref()
                .is_none_or(|user| order.placed_by.eq_ignore_ascii_case(user))
            && self.picked_by.as_ref().is_none_or(|user| {
                order
                    .picked_by
                    .as_ref()
                    .is_some_and(|picked| picked.eq_ignore_ascii_case(user))
            })
    }
}
