//! Audio quality tiers and the fallback sequence negotiated for a track.

use serde::Deserialize;
use strum::{Display, EnumString, IntoStaticStr};

/// Discrete quality level offered by the upstream service.
///
/// Variants are declared lowest first so the derived ordering matches
/// priority: `HighRes > Lossless > High`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumString, IntoStaticStr,
    Deserialize,
)]
#[strum(ascii_case_insensitive)]
#[serde(try_from = "String")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum QualityTier {
    /// 320 kbps AAC.
    #[strum(to_string = "HIGH")]
    #[cfg_attr(feature = "clap", value(name = "HIGH", alias = "high"))]
    High,
    /// CD quality FLAC.
    #[strum(to_string = "LOSSLESS")]
    #[cfg_attr(feature = "clap", value(name = "LOSSLESS", alias = "lossless"))]
    Lossless,
    /// Hi-Res FLAC (also reported as MQA by older catalog entries).
    #[strum(
        to_string = "HI_RES_LOSSLESS",
        serialize = "HI_RES",
        serialize = "HIRES_LOSSLESS"
    )]
    #[cfg_attr(
        feature = "clap",
        value(name = "HI_RES", alias = "hi_res", alias = "HI_RES_LOSSLESS")
    )]
    HighRes,
}

impl TryFrom<String> for QualityTier {
    type Error = strum::ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl QualityTier {
    /// All tiers, highest priority first.
    pub const DESCENDING: [QualityTier; 3] =
        [QualityTier::HighRes, QualityTier::Lossless, QualityTier::High];

    /// Name used in the upstream `quality` query parameter.
    pub fn api_name(self) -> &'static str {
        self.into()
    }

    /// Parse a tier name, falling back to `default` for anything unrecognised.
    pub fn parse_or(value: &str, default: QualityTier) -> QualityTier {
        value.trim().parse().unwrap_or(default)
    }

    /// Parse a user-supplied cap; unknown values mean "no cap".
    pub fn parse_user_cap(value: &str) -> QualityTier {
        Self::parse_or(value, QualityTier::HighRes)
    }

    /// Parse a capability reported by track metadata; unknown values mean lossless.
    pub fn parse_capability(value: &str) -> QualityTier {
        Self::parse_or(value, QualityTier::Lossless)
    }
}

/// User preference for which tiers to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityPreference {
    pub cap: QualityTier,
    pub allow_fallback: bool,
}

impl Default for QualityPreference {
    fn default() -> Self {
        Self {
            cap: QualityTier::HighRes,
            allow_fallback: true,
        }
    }
}

/// Ordered list of tiers to attempt for a track.
///
/// The start tier is the higher priority of `user_cap` and `track_capability`.
/// With fallback enabled the sequence walks down to [`QualityTier::High`];
/// it never climbs back up.
pub fn tier_sequence(
    user_cap: QualityTier,
    track_capability: QualityTier,
    allow_fallback: bool,
) -> Vec<QualityTier> {
    let start = user_cap.max(track_capability);
    if !allow_fallback {
        return vec![start];
    }
    QualityTier::DESCENDING
        .into_iter()
        .filter(|tier| *tier <= start)
        .collect()
}
