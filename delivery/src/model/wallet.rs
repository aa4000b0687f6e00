use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::Display as EnumDisplay;

use super::{round_money, OrderId, UserId};
use crate::error::DeliveryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumDisplay)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum WalletEntryKind {
    Order,
    Topup,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletEntry {
    #[serde(rename = "type")]
    pub kind: WalletEntryKind,
    pub amount: f64,
    pub date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub user_id: UserId,
    pub balance: f64,
    #[serde(default)]
    pub history: Vec<WalletEntry>,
}

impl Wallet {
    pub fn new(user_id: impl Into<UserId>, opening_balance: f64) -> Self {
        Self {
            user_id: user_id.into(),
            balance: round_money(opening_balance),
            history: Vec::new(),
        }
    }

    /// Debits an order payment. Leaves the wallet untouched when the amount is
    /// negative or funds are short.
    pub fn debit_order(
        &mut self,
        order_id: &str,
        amount: f64,
        at: DateTime<Utc>,
    ) -> Result<(), DeliveryError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(DeliveryError::Validation(format!(
                "Order amount must be a non-negative number, got {amount}"
            )));
        }
        if self.balance + f64::EPSILON < amount {
            return Err(DeliveryError::InsufficientBalance {
                required: amount,
                available: self.balance,
            });
        }
        self.balance = round_money(self.balance - amount);
        self.history.push(WalletEntry {
            kind: WalletEntryKind::Order,
            amount,
            date: at,
            order_id: Some(order_id.to_string()),
        });
        Ok(())
    }

    pub fn top_up(&mut self, amount: f64, at: DateTime<Utc>) {
        self.balance = round_money(self.balance + amount);
        self.history.push(WalletEntry {
            kind: WalletEntryKind::Topup,
            amount,
            date: at,
            order_id: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_appends_order_entry() {
        let now = Utc::now();
        let mut wallet = Wallet::new("s1", 500.0);

        wallet.debit_order("o1", 150.0, now).unwrap();

        assert_eq!(wallet.balance, 350.0);
        assert_eq!(wallet.history.len(), 1);
        assert_eq!(wallet.history[0].kind, WalletEntryKind::Order);
        assert_eq!(wallet.history[0].order_id.as_deref(), Some("o1"));
    }

    #[test]
    fn test_short_balance_leaves_wallet_untouched() {
        let mut wallet = Wallet::new("s1", 100.0);

        assert!(matches!(
            wallet.debit_order("o1", 150.0, Utc::now()),
            Err(DeliveryError::InsufficientBalance { available, .. }) if available == 100.0
        ));
        assert_eq!(wallet.balance, 100.0);
        assert!(wallet.history.is_empty());
    }

    #[test]
    fn test_negative_debit_is_refused() {
        let mut wallet = Wallet::new("s1", 500.0);

        assert!(matches!(
            wallet.debit_order("o1", -100.0, Utc::now()),
            Err(DeliveryError::Validation(_))
        ));
        assert_eq!(wallet.balance, 500.0);
        assert!(wallet.history.is_empty());
    }

    #[test]
    fn test_entry_kind_serializes_as_type() {
        let mut wallet = Wallet::new("s1", 0.0);
        wallet.top_up(49.999, Utc::now());

        let json = serde_json::to_value(&wallet).unwrap();
        assert_eq!(json["balance"], 50.0);
        assert_eq!(json["history"][0]["type"], "topup");
        assert_eq!(json["userId"], "s1");
    }
}
