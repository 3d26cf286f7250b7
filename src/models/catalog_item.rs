use mongodb::bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Trek,
    Tour,
}

impl ItemType {
    pub fn collection(&self) -> &'static str {
        match self {
            ItemType::Trek => "Treks",
            ItemType::Tour => "Tours",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Trek => "trek",
            ItemType::Tour => "tour",
        }
    }
}

/// Per-departure-city price entry. A city is bookable only when `price > 0`;
/// `discount_price`, when present and positive, is the effective unit price.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CityPricing {
    pub city: String,
    pub price: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discount_price: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookableItem {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    #[serde(default)]
    pub city_pricing: Vec<CityPricing>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// 0 means the item carries no group-size cap.
    #[serde(default)]
    pub max_group_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

fn default_active() -> bool {
    true
}

impl BookableItem {
    pub fn pricing_for(&self, city: &str) -> Option<&CityPricing> {
        self.city_pricing
            .iter()
            .find(|entry| entry.city.eq_ignore_ascii_case(city))
    }
}
