// src/utils/types.rs

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Bar period understood by the scheduler and the candle pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [Timeframe::M5, Timeframe::M15, Timeframe::H1, Timeframe::D1];

    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::H1 => "1h",
            Timeframe::D1 => "1d",
        }
    }

    pub fn minutes(&self) -> u32 {
        match self {
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::H1 => 60,
            Timeframe::D1 => 1440,
        }
    }

    /// Widest history window the upstream provider serves in one request.
    pub fn max_days(&self) -> u32 {
        match self {
            Timeframe::M5 => 30,
            Timeframe::M15 => 90,
            Timeframe::H1 => 180,
            Timeframe::D1 => 180,
        }
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "1h" => Ok(Timeframe::H1),
            "1d" => Ok(Timeframe::D1),
            other => Err(format!("unsupported timeframe: {other}")),
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discrete state of a symbol relative to its benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Signal {
    #[serde(rename = "TRIGGER_LONG")]
    TriggerLong,
    #[serde(rename = "TRIGGER_SHORT")]
    TriggerShort,
    #[serde(rename = "WATCH")]
    Watch,
    #[serde(rename = "NEUTRAL")]
    Neutral,
    #[serde(rename = "EXIT/AVOID")]
    ExitAvoid,
    #[serde(rename = "NO_DATA")]
    NoData,
}

impl Signal {
    /// Total order used when ranking snapshot rows; smaller sorts first.
    pub fn rank(&self) -> u8 {
        match self {
            Signal::TriggerLong => 0,
            Signal::TriggerShort => 1,
            Signal::Watch => 2,
            Signal::Neutral => 3,
            Signal::ExitAvoid => 4,
            Signal::NoData => 9,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::TriggerLong => "TRIGGER_LONG",
            Signal::TriggerShort => "TRIGGER_SHORT",
            Signal::Watch => "WATCH",
            Signal::Neutral => "NEUTRAL",
            Signal::ExitAvoid => "EXIT/AVOID",
            Signal::NoData => "NO_DATA",
        }
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TRIGGER_LONG" => Ok(Signal::TriggerLong),
            "TRIGGER_SHORT" => Ok(Signal::TriggerShort),
            "WATCH" => Ok(Signal::Watch),
            "NEUTRAL" => Ok(Signal::Neutral),
            "EXIT/AVOID" => Ok(Signal::ExitAvoid),
            "NO_DATA" => Ok(Signal::NoData),
            other => Err(format!("unknown signal: {other}")),
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate regime of a benchmark index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regime {
    #[serde(rename = "BULLISH")]
    Bullish,
    #[serde(rename = "BEARISH")]
    Bearish,
    #[serde(rename = "NEUTRAL")]
    Neutral,
    #[serde(rename = "NO_DATA")]
    NoData,
}

impl Regime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Regime::Bullish => "BULLISH",
            Regime::Bearish => "BEARISH",
            Regime::Neutral => "NEUTRAL",
            Regime::NoData => "NO_DATA",
        }
    }
}

impl FromStr for Regime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BULLISH" => Ok(Regime::Bullish),
            "BEARISH" => Ok(Regime::Bearish),
            "NEUTRAL" => Ok(Regime::Neutral),
            "NO_DATA" => Ok(Regime::NoData),
            other => Err(format!("unknown regime: {other}")),
        }
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}
