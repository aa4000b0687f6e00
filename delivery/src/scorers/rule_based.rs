use super::{Candidate, Recommendation, RecommendationRequest, RuleHit};

type Rule = Box<dyn Fn(&RecommendationRequest, &Candidate) -> Option<RuleHit> + Send + Sync>;

/// Scores candidates as a base score plus the sum of every matching rule.
pub struct RuleBasedRecommender {
    base_score: i32,
    rules: Vec<Rule>,
}

impl Default for RuleBasedRecommender {
    fn default() -> Self {
        Self::new(1)
    }
}

impl RuleBasedRecommender {
    pub fn new(base_score: i32) -> Self {
        Self {
            base_score,
            rules: Vec::new(),
        }
    }

    pub fn add_rule<F>(&mut self, rule: F)
    where
        F: Fn(&RecommendationRequest, &Candidate) -> Option<RuleHit> + Send + Sync + 'static,
    {
        self.rules.push(Box::new(rule));
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn score(&self, request: &RecommendationRequest, candidate: &Candidate) -> Recommendation {
        let hits: Vec<RuleHit> = self
            .rules
            .iter()
            .filter_map(|rule| rule(request, candidate))
            .collect();
        Recommendation {
            candidate: candidate.clone(),
            score: self.base_score + hits.iter().map(|hit| hit.score).sum::<i32>(),
            reasons: hits.into_iter().map(|hit| hit.name).collect(),
        }
    }

    /// Highest score first, nearer canteen on ties. Stable for equal keys.
    pub fn rank(
        &self,
        request: &RecommendationRequest,
        candidates: &[Candidate],
        limit: usize,
    ) -> Vec<Recommendation> {
        let mut scored: Vec<Recommendation> = candidates
            .iter()
            .map(|candidate| self.score(request, candidate))
            .filter(|recommendation| recommendation.score > 0)
            .collect();
        scored.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.candidate.distance.total_cmp(&b.candidate.distance))
        });
        scored.truncate(limit);
        scored
    }
}
