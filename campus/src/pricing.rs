use delivery::pricing::PricingPolicy;

use crate::catalog::zone_distance;

const BASE_FEE: f64 = 10.0;
const SUBTOTAL_SHARE: f64 = 0.05;
const HANDLING_FEE: f64 = 5.0;

/// Whole-rupee fee: base + 5% of the subtotal + zone weight + handling.
#[derive(Debug, Clone, Copy, Default)]
pub struct CampusPricing;

impl PricingPolicy for CampusPricing {
    fn delivery_fee(&self, _canteen_name: &str, drop_location: &str, subtotal: f64) -> f64 {
        (BASE_FEE + subtotal * SUBTOTAL_SHARE + zone_distance(drop_location) + HANDLING_FEE).round()
    }
}
