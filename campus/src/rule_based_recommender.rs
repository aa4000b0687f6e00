use async_trait::async_trait;
use delivery::scorers::{
    Candidate, Recommendation, RecommendationRequest, RecommendationResponse, Recommender,
    RuleBasedRecommender, RuleHit, analyze_request,
};

use crate::catalog::{CANTEENS, CatalogCanteen, KNOWN_LOCATIONS, campus_distance};

pub const NO_MATCH_REPLY: &str = "I couldn't find any specific recommendations for your request. Try telling me more about what you're in the mood for or your location!";

fn hit(name: impl Into<String>, score: i32) -> Option<RuleHit> {
    Some(RuleHit {
        name: name.into(),
        score,
    })
}

pub fn get_rule_based_recommender() -> RuleBasedRecommender {
    let mut recommender = RuleBasedRecommender::default();

    recommender.add_rule(|request, candidate| match request.time_constraint_minutes {
        Some(minutes)
            if minutes <= 15
                && (candidate.name_contains_any(&["sandwich", "burger", "noodles", "coffee"])
                    || candidate.price <= 60.0) =>
        {
            hit(format!("Quick to grab within {minutes} min"), 3)
        }
        _ => None,
    });

    // Only the campus distance table counts here, not the canteen's own distance.
    recommender.add_rule(|request, candidate| {
        let location = request.mentioned_location.as_deref()?;
        match campus_distance(&candidate.canteen_name, location) {
            Some(km) if km <= 0.5 => hit(format!("{km}km from {}", location.to_uppercase()), 2),
            _ => None,
        }
    });

    recommender.add_rule(|request, candidate| {
        if request.preferences.fast
            && (candidate.price <= 60.0 || candidate.name_contains_any(&["sandwich", "coffee"]))
        {
            hit("Fast option", 2)
        } else {
            None
        }
    });

    recommender.add_rule(|request, candidate| {
        if request.preferences.healthy && candidate.veg && candidate.name_contains_any(&["salad", "veg"]) {
            hit("Healthy pick", 2)
        } else {
            None
        }
    });

    recommender.add_rule(|request, candidate| {
        if request.preferences.filling
            && candidate.price >= 100.0
            && candidate.name_contains_any(&["biryani", "masala"])
        {
            hit("Filling meal", 2)
        } else {
            None
        }
    });

    recommender.add_rule(|request, candidate| {
        if request.preferences.sweet && candidate.name_contains_any(&["coffee", "latte", "muffin"]) {
            hit("Something sweet", 2)
        } else {
            None
        }
    });

    recommender.add_rule(|request, candidate| {
        if request.preferences.vegetarian && candidate.veg {
            hit("Vegetarian", 3)
        } else {
            None
        }
    });

    recommender
}

/// Canteens worth considering for a request.
///
/// A mentioned location first matches canteen names and locations, then any
/// canteen with a known distance to it (nearest first). Otherwise every
/// canteen is considered.
pub fn candidate_canteens(request: &RecommendationRequest) -> Vec<&'static CatalogCanteen> {
    let Some(location) = request.mentioned_location.as_deref() else {
        return CANTEENS.iter().collect();
    };

    let named: Vec<_> = CANTEENS
        .iter()
        .filter(|canteen| {
            canteen.name.to_lowercase().contains(location)
                || canteen.location.to_lowercase().contains(location)
        })
        .collect();
    if !named.is_empty() {
        return named;
    }

    let mut nearby: Vec<(&CatalogCanteen, f64)> = CANTEENS
        .iter()
        .filter_map(|canteen| campus_distance(canteen.name, location).map(|km| (canteen, km)))
        .collect();
    if nearby.is_empty() {
        return CANTEENS.iter().collect();
    }
    nearby.sort_by(|a, b| a.1.total_cmp(&b.1));
    nearby.into_iter().map(|(canteen, _)| canteen).collect()
}

pub fn candidates_for(request: &RecommendationRequest) -> Vec<Candidate> {
    candidate_canteens(request)
        .into_iter()
        .flat_map(|canteen| {
            let distance = request
                .mentioned_location
                .as_deref()
                .and_then(|location| campus_distance(canteen.name, location))
                .unwrap_or(canteen.distance);
            canteen.menu().iter().map(move |item| Candidate {
                canteen_id: canteen.id.to_string(),
                canteen_name: canteen.name.to_string(),
                item_id: item.id.to_string(),
                name: item.name.to_string(),
                price: item.price,
                veg: item.veg,
                distance,
            })
        })
        .collect()
}

fn reply_for(request: &RecommendationRequest, recommendations: &[Recommendation]) -> String {
    let Some(top) = recommendations.first() else {
        return NO_MATCH_REPLY.to_string();
    };
    let item = &top.candidate;
    let mut reply = format!(
        "Based on current conditions, I recommend: {} from {} (₹{})",
        item.name, item.canteen_name, item.price
    );
    if let Some(location) = request.mentioned_location.as_deref() {
        reply.push_str(&format!(
            ", {}km from {}",
            item.distance,
            location.to_uppercase()
        ));
    }
    reply.push('.');
    if recommendations.len() > 1 {
        let others: Vec<&str> = recommendations[1..]
            .iter()
            .map(|r| r.candidate.name.as_str())
            .collect();
        reply.push_str(&format!(" Also worth a look: {}.", others.join(", ")));
    }
    reply
}

/// Answers "what should I eat" messages from the static campus catalog.
pub struct CampusAdvisor {
    recommender: RuleBasedRecommender,
}

impl Default for CampusAdvisor {
    fn default() -> Self {
        Self::new()
    }
}

impl CampusAdvisor {
    pub fn new() -> Self {
        Self {
            recommender: get_rule_based_recommender(),
        }
    }

    pub fn advise(&self, message: &str, limit: usize) -> RecommendationResponse {
        let request = analyze_request(message, &KNOWN_LOCATIONS);
        let candidates = candidates_for(&request);
        let recommendations = self.recommender.rank(&request, &candidates, limit);
        tracing::debug!(
            location = ?request.mentioned_location,
            candidates = candidates.len(),
            matched = recommendations.len(),
            "Ranked recommendations"
        );
        let reply = reply_for(&request, &recommendations);
        RecommendationResponse {
            request,
            recommendations,
            reply,
        }
    }
}

#[async_trait]
impl Recommender for CampusAdvisor {
    async fn recommend(&self, message: &str, limit: usize) -> RecommendationResponse {
        self.advise(message, limit)
    }
}
