use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatingHours {
    #[serde(default)]
    pub monday_to_friday: String,
    #[serde(default)]
    pub saturday: String,
    #[serde(default)]
    pub sunday: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItem {
    pub item_name: String,
    pub price: f64,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Canteen {
    pub id: String,
    pub name: String,
    pub location: String,
    pub contact_number: String,
    pub operating_hours: OperatingHours,
    pub menu: Vec<MenuItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated canteen payload. `id` is present for upserts.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCanteen {
    pub id: Option<String>,
    pub name: String,
    pub location: String,
    pub contact_number: String,
    pub operating_hours: OperatingHours,
    pub menu: Vec<MenuItem>,
}

impl Canteen {
    pub fn from_new(id: String, new_canteen: NewCanteen, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: new_canteen.name,
            location: new_canteen.location,
            contact_number: new_canteen.contact_number,
            operating_hours: new_canteen.operating_hours,
            menu: new_canteen.menu,
            created_at: now,
            updated_at: now,
        }
    }
}
