use serde::Serialize;
use std::collections::BTreeMap;

use crate::model::{Order, OrderId, OrderStatus, round_money};

/// Orders from the same canteen to the same drop point, offered to one buddy.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBatch {
    pub canteen_name: String,
    pub drop_location: String,
    pub order_ids: Vec<OrderId>,
    pub order_count: usize,
    pub total_delivery_fee: f64,
    pub suggested_payout: f64,
}

fn is_unclaimed(order: &Order) -> bool {
    order.status == OrderStatus::Placed && order.picked_by.is_none()
}

pub fn build_batches(orders: &[Order], payout_ratio: f64) -> Vec<OrderBatch> {
    let mut groups: BTreeMap<(&str, &str), Vec<&Order>> = BTreeMap::new();
    for order in orders.iter().filter(|o| is_unclaimed(o)) {
        groups
            .entry((order.canteen_name.as_str(), order.drop_location.as_str()))
            .or_default()
            .push(order);
    }

    groups
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|((canteen, drop), mut members)| {
            members.sort_by_key(|o| o.created_at);
            let total_delivery_fee = round_money(members.iter().map(|o| o.delivery_fee).sum());
            OrderBatch {
                canteen_name: canteen.to_string(),
                drop_location: drop.to_string(),
                order_ids: members.iter().map(|o| o.id.clone()).collect(),
                order_count: members.len(),
                total_delivery_fee,
                suggested_payout: round_money(payout_ratio * total_delivery_fee),
            }
        })
        .collect()
}
