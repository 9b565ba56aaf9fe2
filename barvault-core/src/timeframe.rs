//! Bar granularities and per-granularity provider window limits.
//!
//! The provider caps how much history one call may span, and the cap depends
//! on granularity: fine resolutions get short windows, daily gets roughly a
//! year. `WindowLimits` carries the configured caps; `Timeframe` knows its
//! bar interval.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The fixed set of supported bar granularities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum Timeframe {
    M1,
    M5,
    M15,
    M30,
    H1,
    D1,
}

#[derive(Debug, Error)]
#[error("unknown timeframe '{0}' (expected one of 1m, 5m, 15m, 30m, 1h, 1d)")]
pub struct ParseTimeframeError(String);

impl Timeframe {
    pub const ALL: [Timeframe; 6] = [
        Timeframe::M1,
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::M30,
        Timeframe::H1,
        Timeframe::D1,
    ];

    /// Length of one bar in seconds.
    pub fn interval_secs(self) -> i64 {
        match self {
            Timeframe::M1 => 60,
            Timeframe::M5 => 300,
            Timeframe::M15 => 900,
            Timeframe::M30 => 1_800,
            Timeframe::H1 => 3_600,
            Timeframe::D1 => 86_400,
        }
    }

    pub fn is_intraday(self) -> bool {
        !matches!(self, Timeframe::D1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::D1 => "1d",
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = ParseTimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" | "60m" => Ok(Timeframe::H1),
            "1d" => Ok(Timeframe::D1),
            _ => Err(ParseTimeframeError(s.to_string())),
        }
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> String {
        tf.as_str().to_string()
    }
}

impl TryFrom<String> for Timeframe {
    type Error = ParseTimeframeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Maximum calendar days one provider call may span, per granularity class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowLimits {
    /// Cap for intraday resolutions (1m .. 1h).
    pub intraday_days: u32,
    /// Cap for the daily resolution.
    pub daily_days: u32,
}

impl Default for WindowLimits {
    fn default() -> Self {
        Self {
            intraday_days: 100,
            daily_days: 366,
        }
    }
}

impl WindowLimits {
    /// The window cap that applies to `tf`.
    pub fn days_for(&self, tf: Timeframe) -> u32 {
        if tf.is_intraday() {
            self.intraday_days
        } else {
            self.daily_days
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("1D".parse::<Timeframe>().unwrap(), Timeframe::D1);
        assert_eq!("15M".parse::<Timeframe>().unwrap(), Timeframe::M15);
    }

    #[test]
    fn parse_rejects_unknown() {
        assert!("2d".parse::<Timeframe>().is_err());
        assert!("".parse::<Timeframe>().is_err());
    }

    #[test]
    fn display_roundtrip() {
        for tf in Timeframe::ALL {
            assert_eq!(tf.to_string().parse::<Timeframe>().unwrap(), tf);
        }
    }

    #[test]
    fn serde_uses_string_form() {
        let json = serde_json::to_string(&Timeframe::H1).unwrap();
        assert_eq!(json, "\"1h\"");
        let back: Timeframe = serde_json::from_str("\"1D\"").unwrap();
        assert_eq!(back, Timeframe::D1);
    }

    #[test]
    fn default_limits_by_class() {
        let limits = WindowLimits::default();
        assert_eq!(limits.days_for(Timeframe::M5), 100);
        assert_eq!(limits.days_for(Timeframe::D1), 366);
    }

    #[test]
    fn intervals_are_monotonic() {
        let mut prev = 0;
        for tf in Timeframe::ALL {
            assert!(tf.interval_secs() > prev);
            prev = tf.interval_secs();
        }
    }
}
