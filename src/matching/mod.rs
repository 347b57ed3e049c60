//! The matching core: name normalization, similarity scoring, the guide
//! index, the tiered match engine with its batch scheduler, and progress
//! estimation.

pub mod engine;
pub mod index;
pub mod normalize;
pub mod progress;
pub mod similarity;

pub use engine::{EngineOutcome, MatchEngine, MatchOptions};
pub use index::GuideIndex;
pub use normalize::normalize_name;
pub use progress::ProgressTracker;
pub use similarity::similarity;
