use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::DeliveryError;
use crate::model::{
    Canteen, DeliveryUser, NewCanteen, Order, OrderFilter, OrderId, OrderStatus, UserId, Wallet,
};

/// Values used when a wallet or delivery ledger is created lazily.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccountDefaults {
    pub wallet_balance: f64,
    pub rating: f64,
}

impl Default for AccountDefaults {
    fn default() -> Self {
        Self {
            wallet_balance: 500.0,
            rating: 4.9,
        }
    }
}

/// Everything the final handover moves, applied as one unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Settlement {
    pub order_id: OrderId,
    /// The order must still hold this code when the unit runs.
    pub expected_otp: String,
    pub student_id: UserId,
    pub buddy_id: UserId,
    pub amount: f64,
    pub fee: f64,
    pub at: DateTime<Utc>,
}

impl Settlement {
    /// Both amounts move money in one direction only.
    pub fn check_amounts(&self) -> Result<(), DeliveryError> {
        for (name, value) in [("amount", self.amount), ("fee", self.fee)] {
            if !value.is_finite() || value < 0.0 {
                return Err(DeliveryError::Validation(format!(
                    "Settlement {name} must be a non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementOutcome {
    pub order: Order,
    pub wallet: Wallet,
    pub delivery_user: DeliveryUser,
}

pub(crate) fn settlement_conflict(order_id: &str) -> DeliveryError {
    DeliveryError::Conflict(format!("Order {order_id} was already settled or changed"))
}

#[async_trait]
pub trait DeliveryStorage: Send + Sync {
    async fn insert_order(&self, order: Order) -> Result<Order, DeliveryError>;

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, DeliveryError>;

    /// Sorted by creation time, oldest first.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, DeliveryError>;

    /// Overwrites the order only if its stored status is still `expected_status`.
    async fn replace_order(
        &self,
        order: Order,
        expected_status: OrderStatus,
    ) -> Result<Order, DeliveryError>;

    async fn get_or_create_wallet(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<Wallet, DeliveryError>;

    async fn top_up_wallet(
        &self,
        user_id: &str,
        amount: f64,
        at: DateTime<Utc>,
    ) -> Result<Wallet, DeliveryError>;

    async fn get_or_create_delivery_user(
        &self,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Result<DeliveryUser, DeliveryError>;

    async fn record_earning(
        &self,
        user_id: &str,
        amount: f64,
        order_id: Option<OrderId>,
        at: DateTime<Utc>,
    ) -> Result<DeliveryUser, DeliveryError>;

    /// Returns the stored canteen and whether it was newly created.
    async fn upsert_canteen(
        &self,
        canteen: NewCanteen,
        at: DateTime<Utc>,
    ) -> Result<(Canteen, bool), DeliveryError>;

    async fn list_canteens(&self) -> Result<Vec<Canteen>, DeliveryError>;

    /// All-or-nothing: marks the order delivered, debits the student and
    /// credits the buddy, or changes nothing.
    async fn settle_delivery(
        &self,
        settlement: &Settlement,
    ) -> Result<SettlementOutcome, DeliveryError>;
}
