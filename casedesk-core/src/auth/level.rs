use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Capability tier of a user and of each guarded operation.
///
/// Variants are declared lowest first, so the derived ordering is the
/// authorization order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Viewer,
    Regular,
    Admin,
    Super,
}

impl Level {
    pub const ALL: [Level; 4] = [Level::Viewer, Level::Regular, Level::Admin, Level::Super];

    /// Numeric rank, `viewer` = 0.
    pub fn rank(self) -> u8 {
        self as u8
    }

    /// True if a holder of `self` may run an operation guarded at `required`.
    pub fn satisfies(self, required: Level) -> bool {
        self >= required
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Level::Viewer => write!(f, "viewer"),
            Level::Regular => write!(f, "regular"),
            Level::Admin => write!(f, "admin"),
            Level::Super => write!(f, "super"),
        }
    }
}

impl FromStr for Level {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "viewer" => Ok(Level::Viewer),
            "regular" => Ok(Level::Regular),
            "admin" => Ok(Level::Admin),
            "super" => Ok(Level::Super),
            _ => Err(format!(
                "Invalid level '{}'. Valid options: viewer, regular, admin, super",
                s
            )),
        }
    }
}
