//! Frequency tiers
//!
//! Batch triggers group sources by their baseline update interval.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::SchedulerConfig;

/// Update-frequency group of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrequencyTier {
    /// `interval <= high_frequency_max_secs`
    High,
    /// `interval <= medium_frequency_max_secs`
    Medium,
    /// Everything slower
    Low,
}

impl FrequencyTier {
    /// Tier of a source with the given update interval
    pub fn classify(update_interval: u64, config: &SchedulerConfig) -> Self {
        if update_interval <= config.high_frequency_max_secs {
            Self::High
        } else if update_interval <= config.medium_frequency_max_secs {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl fmt::Display for FrequencyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FrequencyTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            other => Err(format!("unknown frequency tier '{other}' (expected high, medium or low)")),
        }
    }
}
