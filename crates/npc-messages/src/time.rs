//! Simulation Time
//!
//! Monotonic simulation time measured from world start.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use npc_messages::SimTime;
//!
//! let start = SimTime::ZERO;
//! let later = start + Duration::from_millis(1500);
//! assert_eq!(later.since(start), Duration::from_millis(1500));
//! assert_eq!(later.as_secs_f64(), 1.5);
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, AddAssign};
use std::time::Duration;

/// A point in simulated time.
///
/// Serializes to a floating point number of seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SimTime(Duration);

impl SimTime {
    /// World start.
    pub const ZERO: SimTime = SimTime(Duration::ZERO);

    /// Creates a time from elapsed seconds. Negative or non-finite input clamps to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        Self(Duration::try_from_secs_f64(secs).unwrap_or_default())
    }

    /// Returns the elapsed duration since world start.
    pub fn elapsed(self) -> Duration {
        self.0
    }

    /// Returns the elapsed seconds since world start.
    pub fn as_secs_f64(self) -> f64 {
        self.0.as_secs_f64()
    }

    /// Time elapsed between `earlier` and `self`, zero if `earlier` is later.
    pub fn since(self, earlier: SimTime) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> SimTime {
        SimTime(self.0.saturating_add(rhs))
    }
}

impl AddAssign<Duration> for SimTime {
    fn add_assign(&mut self, rhs: Duration) {
        self.0 = self.0.saturating_add(rhs);
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0.as_secs_f64())
    }
}

impl Serialize for SimTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_secs_f64())
    }
}

impl<'de> Deserialize<'de> for SimTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "invalid simulation time: {}",
                secs
            )));
        }
        Ok(SimTime::from_secs_f64(secs))
    }
}
