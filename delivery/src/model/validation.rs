//! Payload checks for client-submitted orders and canteens.
//!
//! Bodies arrive as loose JSON (user ids may be numbers or strings), so the
//! checks run on `serde_json::Value` and report the first problem found.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::{
    MenuItem, NewCanteen, NewOrder, OperatingHours, OrderItem, OrderStatus, UserId, round_money,
};
use crate::error::DeliveryError;

fn invalid(message: impl Into<String>) -> DeliveryError {
    DeliveryError::Validation(message.into())
}

/// Normalizes a JSON user id. Numbers become their decimal text.
pub fn user_id_from_value(value: &Value) -> Option<UserId> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn deserialize_optional_user_id<'de, D>(deserializer: D) -> Result<Option<UserId>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        value => user_id_from_value(&value)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom("user id must be null or a number or string")),
    }
}

fn required_text(body: &Value, key: &str) -> Result<String, DeliveryError> {
    match body.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(invalid(format!("{key} is required"))),
    }
}

fn required_number(body: &Value, key: &str) -> Result<f64, DeliveryError> {
    body.get(key)
        .and_then(Value::as_f64)
        .filter(|n| n.is_finite())
        .ok_or_else(|| invalid(format!("{key} must be a number")))
}

fn required_amount(body: &Value, key: &str) -> Result<f64, DeliveryError> {
    let amount = required_number(body, key)?;
    if amount < 0.0 {
        return Err(invalid(format!("{key} must be a non-negative number")));
    }
    Ok(amount)
}

fn is_absent(value: Option<&Value>) -> bool {
    matches!(value, None | Some(Value::Null))
}

pub fn validate_order_payload(body: &Value) -> Result<NewOrder, DeliveryError> {
    if !body.is_object() {
        return Err(invalid("Body is required"));
    }
    let canteen_name = required_text(body, "canteenName")?;
    let pickup_point = required_text(body, "pickupPoint")?;
    let drop_location = required_text(body, "dropLocation")?;

    let raw_items = match body.get("items") {
        Some(Value::Array(items)) if !items.is_empty() => items,
        _ => return Err(invalid("items must be a non-empty array")),
    };
    let items = raw_items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            OrderItem::deserialize(item).map_err(|e| invalid(format!("items[{i}] is invalid: {e}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(i) = items.iter().position(|item| !(item.price >= 0.0 && item.price.is_finite())) {
        return Err(invalid(format!("items[{i}].price must be a non-negative number")));
    }

    let subtotal = required_amount(body, "subtotal")?;
    let delivery_fee = required_amount(body, "deliveryFee")?;
    let total_amount = required_amount(body, "totalAmount")?;
    if (round_money(total_amount) - round_money(subtotal + delivery_fee)).abs() > 0.005 {
        return Err(invalid("totalAmount must equal subtotal + deliveryFee"));
    }

    let placed_by = body
        .get("placedby")
        .and_then(user_id_from_value)
        .ok_or_else(|| invalid("placedby must be a number or string"))?;

    let picked_by = match body.get("pickedby") {
        value if is_absent(value) => None,
        Some(value) => Some(
            user_id_from_value(value)
                .ok_or_else(|| invalid("pickedby must be null or a number or string"))?,
        ),
        None => None,
    };

    let student_email = match body.get("studentEmail") {
        value if is_absent(value) => None,
        Some(Value::String(email)) if email.contains('@') => Some(email.trim().to_string()),
        _ => return Err(invalid("studentEmail must be a valid email address")),
    };

    if let Some(status) = body.get("status").filter(|v| !v.is_null()) {
        let parsed = status.as_str().and_then(|s| s.parse::<OrderStatus>().ok());
        if parsed != Some(OrderStatus::Placed) {
            return Err(invalid("New orders must have status PLACED"));
        }
    }

    let created_at = match body.get("createdAt") {
        value if is_absent(value) => None,
        Some(Value::String(ts)) => Some(
            DateTime::parse_from_rfc3339(ts)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| invalid("createdAt must be an RFC 3339 timestamp"))?,
        ),
        _ => return Err(invalid("createdAt must be an RFC 3339 timestamp")),
    };

    Ok(NewOrder {
        canteen_name,
        pickup_point,
        drop_location,
        items,
        subtotal,
        delivery_fee,
        total_amount,
        placed_by,
        picked_by,
        student_email,
        created_at,
    })
}

pub fn validate_canteen_payload(body: &Value) -> Result<NewCanteen, DeliveryError> {
    if !body.is_object() {
        return Err(invalid("Body is required"));
    }
    let id = body.get("id").and_then(user_id_from_value);
    let name = required_text(body, "name")?;
    let location = required_text(body, "location")?;
    let contact_number = required_text(body, "contactNumber")?;

    let operating_hours = match body.get("operatingHours") {
        Some(hours @ Value::Object(_)) => OperatingHours::deserialize(hours)
            .map_err(|e| invalid(format!("operatingHours is invalid: {e}")))?,
        _ => return Err(invalid("operatingHours is required")),
    };

    let raw_menu = body
        .get("menu")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("menu must be an array"))?;
    let mut menu = Vec::with_capacity(raw_menu.len());
    for (i, item) in raw_menu.iter().enumerate() {
        let item_name = required_text(item, "itemName")
            .map_err(|_| invalid(format!("menu[{i}].itemName is required")))?;
        let price = item
            .get("price")
            .and_then(Value::as_f64)
            .ok_or_else(|| invalid(format!("menu[{i}].price must be a number")))?;
        let category = required_text(item, "category")
            .map_err(|_| invalid(format!("menu[{i}].category is required")))?;
        menu.push(MenuItem {
            item_name,
            price,
            category,
        });
    }

    Ok(NewCanteen {
        id,
        name,
        location,
        contact_number,
        operating_hours,
        menu,
    })
}
