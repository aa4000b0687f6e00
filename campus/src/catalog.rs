//! Static campus data: canteens, their menus, and walking distances to the
//! drop zones students order to.

use delivery::model::{MenuItem, NewCanteen, OperatingHours};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogCanteen {
    pub id: u32,
    pub name: &'static str,
    pub location: &'static str,
    pub rating: f64,
    /// Kilometres from the campus centre.
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogItem {
    pub id: u32,
    pub name: &'static str,
    pub price: f64,
    pub veg: bool,
}

pub const CANTEENS: [CatalogCanteen; 5] = [
    CatalogCanteen { id: 1, name: "Main Canteen", location: "Near VKJ", rating: 4.5, distance: 1.2 },
    CatalogCanteen { id: 2, name: "Nescafe", location: "Near Library", rating: 4.8, distance: 0.5 },
    CatalogCanteen { id: 3, name: "Canopy", location: "Near TIFAC", rating: 4.2, distance: 2.1 },
    CatalogCanteen { id: 4, name: "Night Mess", location: "Girls Hostel", rating: 4.0, distance: 3.5 },
    CatalogCanteen { id: 5, name: "South Mess", location: "Boys Hostel", rating: 4.3, distance: 1.8 },
];

const MAIN_CANTEEN_MENU: [CatalogItem; 3] = [
    CatalogItem { id: 101, name: "Paneer Butter Masala", price: 120.0, veg: true },
    CatalogItem { id: 102, name: "Chicken Biryani", price: 180.0, veg: false },
    CatalogItem { id: 103, name: "Ghee Roast", price: 70.0, veg: true },
];

const NESCAFE_MENU: [CatalogItem; 3] = [
    CatalogItem { id: 201, name: "Veg Burger", price: 95.0, veg: true },
    CatalogItem { id: 202, name: "Peri Peri Fries", price: 80.0, veg: true },
    CatalogItem { id: 203, name: "Cold Coffee", price: 60.0, veg: true },
];

const CANOPY_MENU: [CatalogItem; 3] = [
    CatalogItem { id: 301, name: "Hazelnut Latte", price: 110.0, veg: true },
    CatalogItem { id: 302, name: "Maggi Noodles", price: 45.0, veg: true },
    CatalogItem { id: 303, name: "Chocolate Muffin", price: 55.0, veg: true },
];

/// Drop zones recognised in free-text requests, lowercase.
pub const KNOWN_LOCATIONS: [&str; 5] = ["tifac", "vkj", "vbh", "library", "cvr"];

// canteen -> (zone, km)
const CAMPUS_DISTANCES: [(&str, [(&str, f64); 5]); 4] = [
    ("Main Canteen", [("VKJ", 0.5), ("VBH", 1.2), ("Library", 0.2), ("TIFAC", 0.8), ("CVR", 0.6)]),
    ("Canopy", [("VKJ", 1.5), ("VBH", 0.4), ("Library", 1.1), ("TIFAC", 0.3), ("CVR", 0.9)]),
    ("Nescafe", [("VKJ", 0.8), ("VBH", 0.9), ("Library", 0.1), ("TIFAC", 1.2), ("CVR", 0.4)]),
    ("South Mess", [("VKJ", 1.8), ("VBH", 0.2), ("Library", 1.5), ("TIFAC", 1.4), ("CVR", 1.6)]),
];

const ZONE_DISTANCES: [(&str, f64); 5] = [
    ("VKJ", 10.0),
    ("VBH", 12.0),
    ("Library", 5.0),
    ("TIFAC", 15.0),
    ("CVR", 8.0),
];

pub const DEFAULT_ZONE_DISTANCE: f64 = 10.0;

pub fn canteen_by_id(id: u32) -> Option<&'static CatalogCanteen> {
    CANTEENS.iter().find(|canteen| canteen.id == id)
}

pub fn menu_for(canteen_id: u32) -> &'static [CatalogItem] {
    match canteen_id {
        1 => &MAIN_CANTEEN_MENU,
        2 => &NESCAFE_MENU,
        3 => &CANOPY_MENU,
        _ => &[],
    }
}

/// Distance from a canteen to a drop zone. Both names match case-insensitively.
pub fn campus_distance(canteen_name: &str, zone: &str) -> Option<f64> {
    CAMPUS_DISTANCES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(canteen_name))
        .and_then(|(_, zones)| {
            zones
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(zone))
                .map(|(_, km)| *km)
        })
}

/// Fee weight of a drop zone; unknown zones use [`DEFAULT_ZONE_DISTANCE`].
pub fn zone_distance(drop_location: &str) -> f64 {
    ZONE_DISTANCES
        .iter()
        .find(|(zone, _)| zone.eq_ignore_ascii_case(drop_location.trim()))
        .map(|(_, distance)| *distance)
        .unwrap_or(DEFAULT_ZONE_DISTANCE)
}

impl CatalogCanteen {
    pub fn menu(&self) -> &'static [CatalogItem] {
        menu_for(self.id)
    }

    pub fn to_new_canteen(&self) -> NewCanteen {
        NewCanteen {
            id: Some(self.id.to_string()),
            name: self.name.to_string(),
            location: self.location.to_string(),
            contact_number: "Not listed".to_string(),
            operating_hours: OperatingHours::default(),
            menu: self
                .menu()
                .iter()
                .map(|item| MenuItem {
                    item_name: item.name.to_string(),
                    price: item.price,
                    category: if item.veg { "Veg" } else { "Non-Veg" }.to_string(),
                })
                .collect(),
        }
    }
}
