//! Quality tiers and the profile table.
//!
//! The table is built once at startup and shared read-only (`Arc`) by every
//! session. Nothing mutates it after construction.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Sample rate used by every profile (Hz).
pub const SAMPLE_RATE_HZ: u32 = 44_100;

/// Channel count used by every profile (stereo).
pub const CHANNELS: u8 = 2;

/// Quality tier, ordered from lowest to highest bitrate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Tier {
    UltraLow,
    Low,
    Medium,
    High,
    UltraHigh,
}

impl Tier {
    /// All tiers in ascending order.
    pub const ALL: [Tier; 5] = [
        Tier::UltraLow,
        Tier::Low,
        Tier::Medium,
        Tier::High,
        Tier::UltraHigh,
    ];

    /// Returns the tier as its wire/log string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Tier::UltraLow => "ultra-low",
            Tier::Low => "low",
            Tier::Medium => "medium",
            Tier::High => "high",
            Tier::UltraHigh => "ultra-high",
        }
    }

    /// Every tier from `ultra-low` up to and including `target`.
    ///
    /// This is the rendition ladder a client asking for `target` could be
    /// served from.
    #[must_use]
    pub fn ladder_up_to(target: Tier) -> Vec<Tier> {
        Tier::ALL.into_iter().filter(|t| *t <= target).collect()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown quality tier: {0}")]
pub struct UnknownTier(pub String);

impl FromStr for Tier {
    type Err = UnknownTier;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTier(s.to_string()))
    }
}

/// Output container produced by the transcode stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp3,
}

impl Container {
    /// Format name passed to the transcoder (`-f`).
    #[must_use]
    pub const fn format_name(&self) -> &'static str {
        match self {
            Container::Mp3 => "mp3",
        }
    }

    /// HTTP `Content-Type` for a body in this container.
    #[must_use]
    pub const fn content_type(&self) -> &'static str {
        match self {
            Container::Mp3 => "audio/mpeg",
        }
    }
}

/// Immutable bitrate/codec/encoder bundle for one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QualityProfile {
    pub tier: Tier,
    pub bitrate_kbps: u32,
    pub container: Container,
    pub codec: &'static str,
    pub channels: u8,
    pub sample_rate: u32,
    /// Extra encoder arguments, whitespace separated.
    pub encoder_params: &'static str,
}

impl QualityProfile {
    const fn mp3(tier: Tier, bitrate_kbps: u32, encoder_params: &'static str) -> Self {
        Self {
            tier,
            bitrate_kbps,
            container: Container::Mp3,
            codec: "libmp3lame",
            channels: CHANNELS,
            sample_rate: SAMPLE_RATE_HZ,
            encoder_params,
        }
    }

    /// Bitrate in the transcoder's `<n>k` notation.
    #[must_use]
    pub fn bitrate_arg(&self) -> String {
        format!("{}k", self.bitrate_kbps)
    }
}

/// Fixed tier -> profile mapping.
#[derive(Debug, Clone)]
pub struct QualityProfileTable {
    ultra_low: QualityProfile,
    low: QualityProfile,
    medium: QualityProfile,
    high: QualityProfile,
    ultra_high: QualityProfile,
}

impl Default for QualityProfileTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl QualityProfileTable {
    /// The standard MP3 ladder (32/64/128/192/256 kbps).
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            ultra_low: QualityProfile::mp3(Tier::UltraLow, 32, "-compression_level 9"),
            low: QualityProfile::mp3(Tier::Low, 64, "-compression_level 7"),
            medium: QualityProfile::mp3(Tier::Medium, 128, "-compression_level 5"),
            high: QualityProfile::mp3(Tier::High, 192, "-compression_level 2"),
            ultra_high: QualityProfile::mp3(Tier::UltraHigh, 256, "-compression_level 0"),
        }
    }

    /// Profile for a tier. Total over all tiers.
    #[must_use]
    pub const fn profile_for(&self, tier: Tier) -> &QualityProfile {
        match tier {
            Tier::UltraLow => &self.ultra_low,
            Tier::Low => &self.low,
            Tier::Medium => &self.medium,
            Tier::High => &self.high,
            Tier::UltraHigh => &self.ultra_high,
        }
    }

    /// Tier a fresh analyzer considers neutral.
    #[must_use]
    pub const fn default_tier() -> Tier {
        Tier::Medium
    }

    /// Profiles in ascending tier order.
    pub fn iter(&self) -> impl Iterator<Item = &QualityProfile> {
        Tier::ALL.into_iter().map(move |t| self.profile_for(t))
    }
}
