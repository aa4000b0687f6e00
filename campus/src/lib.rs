pub mod catalog;
pub mod pricing;
pub mod rule_based_recommender;
pub mod seed;
