//! Keyword-driven canteen recommendations.

pub mod rule_based;

pub use rule_based::*;

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;

lazy_static::lazy_static! {
    static ref MINUTES: Regex = Regex::new(r"(\d+)\s*min(?:ute)?s?").expect("valid minutes pattern");
    static ref HOURS: Regex = Regex::new(r"(\d+)\s*hours?").expect("valid hours pattern");
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Preferences {
    pub fast: bool,
    pub healthy: bool,
    pub filling: bool,
    pub sweet: bool,
    pub spicy: bool,
    pub vegetarian: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    /// Lowercase key of the first known location named in the message.
    pub mentioned_location: Option<String>,
    pub time_constraint_minutes: Option<u32>,
    pub preferences: Preferences,
}

fn mentions_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|word| text.contains(word))
}

pub fn analyze_request(text: &str, known_locations: &[&str]) -> RecommendationRequest {
    let lower = text.to_lowercase();

    let mentioned_location = known_locations
        .iter()
        .map(|loc| loc.to_lowercase())
        .find(|loc| lower.contains(loc.as_str()));

    let time_constraint_minutes = MINUTES
        .captures(&lower)
        .and_then(|c| c[1].parse::<u32>().ok())
        .or_else(|| {
            HOURS
                .captures(&lower)
                .and_then(|c| c[1].parse::<u32>().ok())
                .map(|hours| hours.saturating_mul(60))
        });

    let without_non_veg = lower.replace("non-veg", "").replace("non veg", "");
    let preferences = Preferences {
        fast: mentions_any(&lower, &["fast", "quick", "hurry"]),
        healthy: mentions_any(&lower, &["healthy", "light"]),
        filling: mentions_any(&lower, &["filling", "hungry", "starving"]),
        sweet: mentions_any(&lower, &["sweet", "dessert"]),
        spicy: mentions_any(&lower, &["spicy", "hot"]),
        vegetarian: without_non_veg.contains("veg"),
    };

    RecommendationRequest {
        mentioned_location,
        time_constraint_minutes,
        preferences,
    }
}

/// A menu item at a canteen, with its distance from the requester.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub canteen_id: String,
    pub canteen_name: String,
    pub item_id: String,
    pub name: String,
    pub price: f64,
    pub veg: bool,
    /// Kilometres.
    pub distance: f64,
}

impl Candidate {
    pub fn name_contains_any(&self, words: &[&str]) -> bool {
        let name = self.name.to_lowercase();
        words.iter().any(|word| name.contains(word))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuleHit {
    pub name: String,
    pub score: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    #[serde(flatten)]
    pub candidate: Candidate,
    pub score: i32,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationResponse {
    pub request: RecommendationRequest,
    pub recommendations: Vec<Recommendation>,
    pub reply: String,
}

#[async_trait]
pub trait Recommender: Send + Sync {
    async fn recommend(&self, message: &str, limit: usize) -> RecommendationResponse;
}
