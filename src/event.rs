//! Supported WCA events and their round formats.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// How a round of an event is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundFormat {
    /// Five attempts, best and worst dropped, mean of the remaining three.
    AverageOf5,
    /// Three attempts, plain mean.
    MeanOf3,
    /// Three attempts, best single counts.
    BestOf3,
}

impl RoundFormat {
    /// Number of attempts in a round of this format.
    #[must_use]
    pub const fn attempts(self) -> usize {
        match self {
            Self::AverageOf5 => 5,
            Self::MeanOf3 | Self::BestOf3 => 3,
        }
    }
}

/// A supported WCA event, serialized as its WCA id (`"333"`, `"minx"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventId {
    #[serde(rename = "222")]
    Cube2,
    #[serde(rename = "333")]
    Cube3,
    #[serde(rename = "444")]
    Cube4,
    #[serde(rename = "555")]
    Cube5,
    #[serde(rename = "666")]
    Cube6,
    #[serde(rename = "777")]
    Cube7,
    #[serde(rename = "333bf")]
    Blind3,
    #[serde(rename = "333fm")]
    FewestMoves,
    #[serde(rename = "333oh")]
    OneHanded,
    #[serde(rename = "minx")]
    Megaminx,
    #[serde(rename = "pyram")]
    Pyraminx,
    #[serde(rename = "clock")]
    Clock,
    #[serde(rename = "skewb")]
    Skewb,
    #[serde(rename = "sq1")]
    Square1,
    #[serde(rename = "444bf")]
    Blind4,
    #[serde(rename = "555bf")]
    Blind5,
}

impl EventId {
    /// Every supported event, in the order the WCA lists them.
    pub const ALL: [Self; 16] = [
        Self::Cube3,
        Self::Cube2,
        Self::Cube4,
        Self::Cube5,
        Self::Cube6,
        Self::Cube7,
        Self::Blind3,
        Self::FewestMoves,
        Self::OneHanded,
        Self::Clock,
        Self::Megaminx,
        Self::Pyraminx,
        Self::Skewb,
        Self::Square1,
        Self::Blind4,
        Self::Blind5,
    ];

    /// Parses a WCA event id.
    #[must_use]
    pub fn from_wca_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.wca_id() == id)
    }

    /// The WCA id of this event.
    #[must_use]
    pub const fn wca_id(self) -> &'static str {
        match self {
            Self::Cube2 => "222",
            Self::Cube3 => "333",
            Self::Cube4 => "444",
            Self::Cube5 => "555",
            Self::Cube6 => "666",
            Self::Cube7 => "777",
            Self::Blind3 => "333bf",
            Self::FewestMoves => "333fm",
            Self::OneHanded => "333oh",
            Self::Megaminx => "minx",
            Self::Pyraminx => "pyram",
            Self::Clock => "clock",
            Self::Skewb => "skewb",
            Self::Square1 => "sq1",
            Self::Blind4 => "444bf",
            Self::Blind5 => "555bf",
        }
    }

    /// Human readable name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Cube2 => "2x2x2 Cube",
            Self::Cube3 => "3x3x3 Cube",
            Self::Cube4 => "4x4x4 Cube",
            Self::Cube5 => "5x5x5 Cube",
            Self::Cube6 => "6x6x6 Cube",
            Self::Cube7 => "7x7x7 Cube",
            Self::Blind3 => "3x3x3 Blindfolded",
            Self::FewestMoves => "3x3x3 Fewest Moves",
            Self::OneHanded => "3x3x3 One-Handed",
            Self::Megaminx => "Megaminx",
            Self::Pyraminx => "Pyraminx",
            Self::Clock => "Clock",
            Self::Skewb => "Skewb",
            Self::Square1 => "Square-1",
            Self::Blind4 => "4x4x4 Blindfolded",
            Self::Blind5 => "5x5x5 Blindfolded",
        }
    }

    /// Round format used when simulating this event.
    #[must_use]
    pub const fn format(self) -> RoundFormat {
        match self {
            Self::Cube6 | Self::Cube7 | Self::FewestMoves => RoundFormat::MeanOf3,
            Self::Blind3 | Self::Blind4 | Self::Blind5 => RoundFormat::BestOf3,
            _ => RoundFormat::AverageOf5,
        }
    }

    /// Maximum attempts per round.
    #[must_use]
    pub const fn attempts(self) -> usize {
        self.format().attempts()
    }

    /// Fewest moves results count moves (in hundredths), not time.
    #[must_use]
    pub const fn is_fewest_moves(self) -> bool {
        matches!(self, Self::FewestMoves)
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wca_id())
    }
}

impl FromStr for EventId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_wca_id(s).ok_or_else(|| ValidationError::UnsupportedEvent {
            event: s.to_string(),
        })
    }
}
