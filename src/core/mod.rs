pub mod compatibility;
pub mod distance;
pub mod features;
pub mod matcher;
pub mod scoring;

pub use compatibility::{compatible_blood_groups, is_blood_compatible};
pub use distance::haversine_distance;
pub use features::{FeatureVector, FEATURE_NAMES};
pub use matcher::{Matcher, RankOptions, Ranking};
pub use scoring::{HybridWeights, RuleWeights};
