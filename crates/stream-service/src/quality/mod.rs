//! Quality control: the static profile table and the per-session
//! throughput analyzer that recommends a tier from it.

pub mod analyzer;
pub mod profiles;

pub use analyzer::{AnalyzerSnapshot, ConnectionAnalyzer};
pub use profiles::{QualityProfile, QualityProfileTable, Tier};

/// Tier requested when the client does not name one.
pub const DEFAULT_REQUEST_TIER: Tier = Tier::UltraHigh;
