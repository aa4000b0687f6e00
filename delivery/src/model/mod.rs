pub mod canteen;
pub mod delivery_user;
pub mod order;
pub mod validation;
pub mod wallet;

pub use canteen::*;
pub use delivery_user::*;
pub use order::*;
pub use wallet::*;

pub type UserId = String;
pub type OrderId = String;

/// Rounds a rupee amount to two decimals, half away from zero.
pub fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Calendar date (`YYYY-MM-DD`) used in delivery history records.
pub fn day_of(at: chrono::DateTime<chrono::Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

pub fn new_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
