//! Connection analyzer.
//!
//! Keeps a bounded window of throughput samples for one session and turns
//! the window average into a recommended quality tier. Committing a
//! recommendation is gated by a cooldown so the tier does not flap.
//!
//! All time comes from the tokio clock, which lets tests drive the cooldown
//! with paused time. The `*_at` variants take explicit instants for
//! deterministic callers.

use crate::quality::profiles::{QualityProfileTable, Tier};
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Default number of samples kept in the window.
pub const DEFAULT_HISTORY_SIZE: usize = 10;

/// Default minimum time between committed tier changes.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(10);

/// Headroom multiplier applied to the average before classification.
pub const BUFFER_FACTOR: f64 = 1.5;

/// Upper bounds (exclusive, kbps of effective speed) for each tier below
/// `ultra-high`. Anything at or above the last bound is `ultra-high`.
pub const TIER_THRESHOLDS: [(f64, Tier); 4] = [
    (75.0, Tier::UltraLow),
    (150.0, Tier::Low),
    (300.0, Tier::Medium),
    (600.0, Tier::High),
];

/// Number of recent samples included in a snapshot.
const SNAPSHOT_SAMPLES: usize = 5;

/// Point-in-time view of the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzerSnapshot {
    pub average_speed: f64,
    pub current_tier: Tier,
    pub recommended_tier: Tier,
    pub last_5_samples: Vec<f64>,
}

/// Per-session throughput history and tier recommender.
#[derive(Debug)]
pub struct ConnectionAnalyzer {
    history: VecDeque<f64>,
    capacity: usize,
    current_tier: Tier,
    last_change: Option<Instant>,
    cooldown: Duration,
}

impl Default for ConnectionAnalyzer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE, DEFAULT_COOLDOWN)
    }
}

impl ConnectionAnalyzer {
    /// Creates an analyzer holding at most `capacity` samples.
    ///
    /// A capacity of zero is treated as one.
    #[must_use]
    pub fn new(capacity: usize, cooldown: Duration) -> Self {
        let capacity = capacity.max(1);
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            current_tier: QualityProfileTable::default_tier(),
            last_change: None,
            cooldown,
        }
    }

    /// Records the throughput since `session_start` and returns the window
    /// average.
    pub fn measure_speed(&mut self, session_start: Instant, bytes_total: u64) -> f64 {
        let elapsed = Instant::now().saturating_duration_since(session_start);
        self.measure_speed_at(elapsed, bytes_total)
    }

    /// Same as [`measure_speed`](Self::measure_speed) with an explicit
    /// elapsed time.
    ///
    /// Zero elapsed time returns 0 and records nothing.
    pub fn measure_speed_at(&mut self, elapsed: Duration, bytes_total: u64) -> f64 {
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }

        #[allow(clippy::cast_precision_loss)]
        let kbps = (bytes_total as f64 * 8.0) / (secs * 1000.0);

        if self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(kbps);

        self.average_speed()
    }

    /// Arithmetic mean of the window, 0 when empty.
    #[must_use]
    pub fn average_speed(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let len = self.history.len() as f64;
        self.history.iter().sum::<f64>() / len
    }

    /// Tier the current average supports.
    #[must_use]
    pub fn recommended_tier(&self) -> Tier {
        classify(self.average_speed() * BUFFER_FACTOR)
    }

    /// Commits the recommendation if the cooldown has elapsed.
    ///
    /// Returns `true` only when the current tier actually changed.
    pub fn commit_recommended_if_due(&mut self) -> bool {
        self.commit_recommended_at(Instant::now())
    }

    /// Same as [`commit_recommended_if_due`](Self::commit_recommended_if_due)
    /// at an explicit instant.
    pub fn commit_recommended_at(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_change {
            if now.saturating_duration_since(last) < self.cooldown {
                return false;
            }
        }

        let recommended = self.recommended_tier();
        if recommended == self.current_tier {
            return false;
        }

        self.current_tier = recommended;
        self.last_change = Some(now);
        true
    }

    #[must_use]
    pub fn current_tier(&self) -> Tier {
        self.current_tier
    }

    #[must_use]
    pub fn last_change(&self) -> Option<Instant> {
        self.last_change
    }

    #[must_use]
    pub fn sample_count(&self) -> usize {
        self.history.len()
    }

    #[must_use]
    pub fn snapshot(&self) -> AnalyzerSnapshot {
        let skip = self.history.len().saturating_sub(SNAPSHOT_SAMPLES);
        AnalyzerSnapshot {
            average_speed: self.average_speed(),
            current_tier: self.current_tier,
            recommended_tier: self.recommended_tier(),
            last_5_samples: self.history.iter().skip(skip).copied().collect(),
        }
    }
}

/// Maps an effective speed (kbps) to a tier. Boundary values fall into the
/// higher tier because comparisons are strict.
#[must_use]
pub fn classify(effective_kbps: f64) -> Tier {
    TIER_THRESHOLDS
        .iter()
        .find(|(bound, _)| effective_kbps < *bound)
        .map_or(Tier::UltraHigh, |(_, tier)| *tier)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    /// Bytes that produce `kbps` over `elapsed_secs`.
    fn bytes_for(kbps: u64, elapsed_secs: u64) -> u64 {
        kbps * 1000 * elapsed_secs / 8
    }

    #[test]
    fn test_new_analyzer_defaults() {
        let analyzer = ConnectionAnalyzer::default();
        assert_eq!(analyzer.current_tier(), Tier::Medium);
        assert_eq!(analyzer.average_speed(), 0.0);
        assert!(analyzer.last_change().is_none());
        assert_eq!(analyzer.sample_count(), 0);
    }

    #[test]
    fn test_zero_elapsed_records_nothing() {
        let mut analyzer = ConnectionAnalyzer::default();
        let avg = analyzer.measure_speed_at(Duration::ZERO, 1_000_000);
        assert_eq!(avg, 0.0);
        assert_eq!(analyzer.sample_count(), 0);
    }

    #[test]
    fn test_measure_speed_formula() {
        let mut analyzer = ConnectionAnalyzer::default();
        // 80_000 bytes over 5s = 640_000 bits / 5000 = 128 kbps
        let avg = analyzer.measure_speed_at(secs(5), 80_000);
        assert!((avg - 128.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_is_bounded_and_evicts_oldest() {
        let mut analyzer = ConnectionAnalyzer::new(3, DEFAULT_COOLDOWN);
        analyzer.measure_speed_at(secs(1), bytes_for(100, 1));
        analyzer.measure_speed_at(secs(1), bytes_for(200, 1));
        analyzer.measure_speed_at(secs(1), bytes_for(300, 1));
        let avg = analyzer.measure_speed_at(secs(1), bytes_for(400, 1));

        assert_eq!(analyzer.sample_count(), 3);
        assert!((avg - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_average_over_full_window_of_ten() {
        let mut analyzer = ConnectionAnalyzer::default();
        for i in 1..=12u64 {
            analyzer.measure_speed_at(secs(1), bytes_for(i * 10, 1));
        }
        // Window holds 30..=120, mean 75
        assert_eq!(analyzer.sample_count(), 10);
        assert!((analyzer.average_speed() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_classification_boundaries_use_strict_less_than() {
        assert_eq!(classify(0.0), Tier::UltraLow);
        assert_eq!(classify(74.999), Tier::UltraLow);
        assert_eq!(classify(75.0), Tier::Low);
        assert_eq!(classify(149.9), Tier::Low);
        assert_eq!(classify(150.0), Tier::Medium);
        assert_eq!(classify(300.0), Tier::High);
        assert_eq!(classify(599.0), Tier::High);
        assert_eq!(classify(600.0), Tier::UltraHigh);
        assert_eq!(classify(10_000.0), Tier::UltraHigh);
    }

    #[test]
    fn test_classification_is_monotonic() {
        let mut previous = Tier::UltraLow;
        for kbps in (0..1000).map(f64::from) {
            let tier = classify(kbps);
            assert!(tier >= previous, "tier regressed at {kbps}");
            previous = tier;
        }
    }

    #[test]
    fn test_fast_connection_recommends_ultra_high() {
        // 500 kbps * 1.5 = 750 effective
        let mut analyzer = ConnectionAnalyzer::default();
        let start = Instant::now();
        for _ in 0..3 {
            analyzer.measure_speed_at(secs(10), bytes_for(500, 10));
        }
        assert_eq!(analyzer.recommended_tier(), Tier::UltraHigh);
        assert!(analyzer.commit_recommended_at(start));
        assert_eq!(analyzer.current_tier(), Tier::UltraHigh);
        assert_eq!(analyzer.last_change(), Some(start));
    }

    #[test]
    fn test_slow_connection_recommends_ultra_low() {
        // 40 kbps * 1.5 = 60 effective
        let mut analyzer = ConnectionAnalyzer::default();
        analyzer.measure_speed_at(secs(10), bytes_for(40, 10));
        assert_eq!(analyzer.recommended_tier(), Tier::UltraLow);
        assert!(analyzer.commit_recommended_at(Instant::now()));
        assert_eq!(analyzer.current_tier(), Tier::UltraLow);
    }

    #[test]
    fn test_samples_40_45_50_recommend_ultra_low() {
        // mean 45, effective 67.5
        let mut analyzer = ConnectionAnalyzer::default();
        for kbps in [40, 45, 50] {
            analyzer.measure_speed_at(secs(10), bytes_for(kbps, 10));
        }
        assert!((analyzer.average_speed() - 45.0).abs() < 1e-9);
        assert_eq!(analyzer.recommended_tier(), Tier::UltraLow);
    }

    #[test]
    fn test_samples_250_260_270_recommend_high() {
        // mean 260, effective 390
        let mut analyzer = ConnectionAnalyzer::default();
        for kbps in [250, 260, 270] {
            analyzer.measure_speed_at(secs(10), bytes_for(kbps, 10));
        }
        assert!((analyzer.average_speed() - 260.0).abs() < 1e-9);
        assert_eq!(analyzer.recommended_tier(), Tier::High);
    }

    #[test]
    fn test_same_tier_commit_leaves_cooldown_untouched() {
        // 100 kbps * 1.5 = 150 effective -> medium, the starting tier
        let mut analyzer = ConnectionAnalyzer::default();
        analyzer.measure_speed_at(secs(10), bytes_for(100, 10));
        assert!(!analyzer.commit_recommended_at(Instant::now()));
        assert_eq!(analyzer.current_tier(), Tier::Medium);
        assert!(analyzer.last_change().is_none());
    }

    #[test]
    fn test_cooldown_blocks_second_change() {
        let mut analyzer = ConnectionAnalyzer::default();
        let t0 = Instant::now();

        analyzer.measure_speed_at(secs(10), bytes_for(500, 10));
        assert!(analyzer.commit_recommended_at(t0));
        assert_eq!(analyzer.current_tier(), Tier::UltraHigh);

        // Connection collapses; still inside the window
        for _ in 0..10 {
            analyzer.measure_speed_at(secs(10), bytes_for(10, 10));
        }
        assert_eq!(analyzer.recommended_tier(), Tier::UltraLow);
        assert!(!analyzer.commit_recommended_at(t0 + secs(9)));
        assert_eq!(analyzer.current_tier(), Tier::UltraHigh);
        assert_eq!(analyzer.last_change(), Some(t0));

        // Exactly at the cooldown boundary the change is allowed
        assert!(analyzer.commit_recommended_at(t0 + secs(10)));
        assert_eq!(analyzer.current_tier(), Tier::UltraLow);
        assert_eq!(analyzer.last_change(), Some(t0 + secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cooldown_with_tokio_clock() {
        let mut analyzer = ConnectionAnalyzer::new(10, Duration::from_secs(10));
        let start = Instant::now();

        tokio::time::advance(secs(10)).await;
        analyzer.measure_speed(start, bytes_for(500, 10));
        assert!(analyzer.commit_recommended_if_due());

        for _ in 0..10 {
            analyzer.measure_speed(start, bytes_for(10, 10));
        }
        tokio::time::advance(secs(5)).await;
        assert!(!analyzer.commit_recommended_if_due());

        tokio::time::advance(secs(5)).await;
        assert!(analyzer.commit_recommended_if_due());
        assert_eq!(analyzer.current_tier(), Tier::UltraLow);
    }

    #[test]
    fn test_snapshot_keeps_last_five_samples() {
        let mut analyzer = ConnectionAnalyzer::default();
        for kbps in [10, 20, 30, 40, 50, 60, 70] {
            analyzer.measure_speed_at(secs(1), bytes_for(kbps, 1));
        }
        let snapshot = analyzer.snapshot();
        assert_eq!(snapshot.last_5_samples, vec![30.0, 40.0, 50.0, 60.0, 70.0]);
        assert_eq!(snapshot.current_tier, Tier::Medium);
        assert!((snapshot.average_speed - 40.0).abs() < 1e-9);
        assert_eq!(snapshot.recommended_tier, Tier::UltraLow);
    }

    #[test]
    fn test_snapshot_of_empty_analyzer() {
        let snapshot = ConnectionAnalyzer::default().snapshot();
        assert!(snapshot.last_5_samples.is_empty());
        assert_eq!(snapshot.average_speed, 0.0);
        assert_eq!(snapshot.recommended_tier, Tier::UltraLow);
    }
}
