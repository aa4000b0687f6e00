//! Handover codes: issuing and checking the 6-digit code a buddy must
//! collect from the student before an order settles.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use std::sync::Arc;

use crate::{clock::Clock, error::DeliveryError, model::Order};

pub const OTP_LENGTH: usize = 6;

pub fn generate_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{:06}", rng.gen_range(0..1_000_000u32))
}

pub fn is_well_formed(code: &str) -> bool {
    code.len() == OTP_LENGTH && code.bytes().all(|b| b.is_ascii_digit())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpGrant {
    pub code: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct OtpIssuer {
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl OtpIssuer {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { ttl, clock }
    }

    pub fn issue(&self) -> OtpGrant {
        let issued_at = self.clock.now();
        OtpGrant {
            code: generate_code(&mut rand::thread_rng()),
            issued_at,
            expires_at: issued_at + self.ttl,
        }
    }
}

/// Compares without short-circuiting on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Checks a submitted code against the order. Returns the stored code on
/// success so settlement can guard on it.
pub fn check_submission(
    order: &Order,
    submitted: &str,
    buddy_id: &str,
    now: DateTime<Utc>,
) -> Result<String, DeliveryError> {
    let submitted = submitted.trim();
    if !is_well_formed(submitted) {
        return Err(DeliveryError::Validation("OTP must be a 6-digit code".to_string()));
    }
    let Some(stored) = order.otp.as_deref() else {
        return Err(DeliveryError::NoOtp);
    };
    // A code without an expiry is treated as already expired.
    if order.otp_expires_at.is_none_or(|expires_at| now >= expires_at) {
        return Err(DeliveryError::OtpExpired);
    }
    if !constant_time_eq(stored.as_bytes(), submitted.as_bytes()) {
        return Err(DeliveryError::InvalidOtp);
    }
    if let Some(assigned) = order.picked_by.as_deref() {
        if assigned != buddy_id {
            return Err(DeliveryError::NotAssigned {
                order_id: order.id.clone(),
                buddy_id: buddy_id.to_string(),
            });
        }
    }
    Ok(stored.to_string())
}
