use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, WelcomeError};

pub const MAX_TIER: u32 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecencyFilter {
    pub enabled: bool,
    pub days: u32,
}

impl RecencyFilter {
    pub fn enabled(days: u32) -> Self {
        Self {
            enabled: true,
            days,
        }
    }

    pub fn disabled(days: u32) -> Self {
        Self {
            enabled: false,
            days,
        }
    }
}

impl Default for RecencyFilter {
    fn default() -> Self {
        Self::disabled(14)
    }
}

/// Keeps students whose highest completed pre-assessment tier equals `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierFilter {
    pub enabled: bool,
    pub target: u32,
}

impl Default for TierFilter {
    fn default() -> Self {
        Self {
            enabled: false,
            target: 1,
        }
    }
}

/// Per-run filter parameters. Nothing here outlives a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterConfig {
    pub enrollment: RecencyFilter,
    pub lms_activity: RecencyFilter,
    pub saa_activity: RecencyFilter,
    pub tier: TierFilter,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            enrollment: RecencyFilter::enabled(30),
            lms_activity: RecencyFilter::default(),
            saa_activity: RecencyFilter::default(),
            tier: TierFilter::default(),
        }
    }
}

/// A config file as written: every field optional, layered over the defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    enrollment: Option<RecencyFile>,
    lms_activity: Option<RecencyFile>,
    saa_activity: Option<RecencyFile>,
    tier: Option<TierFile>,
}

#[derive(Debug, Default, Deserialize)]
struct RecencyFile {
    enabled: Option<bool>,
    days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct TierFile {
    enabled: Option<bool>,
    target: Option<u32>,
}

impl RecencyFile {
    fn apply(self, base: RecencyFilter) -> RecencyFilter {
        RecencyFilter {
            enabled: self.enabled.unwrap_or(base.enabled),
            days: self.days.unwrap_or(base.days),
        }
    }
}

impl TierFile {
    fn apply(self, base: TierFilter) -> TierFilter {
        TierFilter {
            enabled: self.enabled.unwrap_or(base.enabled),
            target: self.target.unwrap_or(base.target),
        }
    }
}

impl ConfigFile {
    fn apply(self, base: FilterConfig) -> FilterConfig {
        FilterConfig {
            enrollment: self.enrollment.unwrap_or_default().apply(base.enrollment),
            lms_activity: self.lms_activity.unwrap_or_default().apply(base.lms_activity),
            saa_activity: self.saa_activity.unwrap_or_default().apply(base.saa_activity),
            tier: self.tier.unwrap_or_default().apply(base.tier),
        }
    }
}

impl FilterConfig {
    /// Reads a JSON config file; omitted fields keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(raw)?;
        let config = file.apply(FilterConfig::default());
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tier.target > MAX_TIER {
            return Err(WelcomeError::InvalidConfig(format!(
                "target tier {} is outside 0-{}",
                self.tier.target, MAX_TIER
            )));
        }
        Ok(())
    }
}
