use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{day_of, round_money, OrderId, UserId};
use crate::error::DeliveryError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_id: Option<OrderId>,
    pub timestamp: DateTime<Utc>,
    /// `YYYY-MM-DD`, kept alongside the timestamp for per-day earnings views.
    pub date: String,
}

/// Earnings ledger of a delivery buddy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryUser {
    pub user_id: UserId,
    pub total_earnings: f64,
    pub delivery_count: u32,
    pub rating: f64,
    #[serde(default)]
    pub deliveries: Vec<DeliveryRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryUser {
    pub fn new(user_id: impl Into<UserId>, rating: f64, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            total_earnings: 0.0,
            delivery_count: 0,
            rating,
            deliveries: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Records one delivery. Negative amounts are refused and change nothing.
    pub fn credit(
        &mut self,
        amount: f64,
        order_id: Option<OrderId>,
        at: DateTime<Utc>,
    ) -> Result<(), DeliveryError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(DeliveryError::Validation(format!(
                "Earning amount must be a non-negative number, got {amount}"
            )));
        }
        self.total_earnings = round_money(self.total_earnings + amount);
        self.delivery_count += 1;
        self.deliveries.push(DeliveryRecord {
            amount,
            order_id,
            timestamp: at,
            date: day_of(at),
        });
        self.updated_at = at;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_credit_accumulates_earnings_and_history() {
        let created = Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2025, 1, 11, 13, 30, 0).unwrap();
        let mut buddy = DeliveryUser::new("b1", 4.9, created);

        buddy.credit(20.0, Some("o1".to_string()), later).unwrap();
        buddy.credit(15.5, None, later).unwrap();

        assert_eq!(buddy.total_earnings, 35.5);
        assert_eq!(buddy.delivery_count, 2);
        assert_eq!(buddy.deliveries[0].date, "2025-01-11");
        assert_eq!(buddy.updated_at, later);
        assert_eq!(buddy.created_at, created);
    }

    #[test]
    fn test_negative_credit_is_refused() {
        let created = Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();
        let mut buddy = DeliveryUser::new("b1", 4.9, created);

        assert!(buddy.credit(-30.0, Some("o1".to_string()), created).is_err());
        assert_eq!(buddy.total_earnings, 0.0);
        assert_eq!(buddy.delivery_count, 0);
        assert!(buddy.deliveries.is_empty());
    }
}
