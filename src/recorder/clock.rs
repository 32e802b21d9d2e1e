//! Time source for records and waits.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Where timestamps come from.
///
/// A simulated clock only moves when told to, so dry-run reports are stable
/// across runs and repeated checks on unchanged state carry equal stamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clock {
    /// Real UTC time. Waits sleep.
    Wall,
    /// Fixed origin plus explicitly advanced time.
    Simulated {
        origin: DateTime<Utc>,
        elapsed: Duration,
    },
}

impl Clock {
    /// Simulated clock starting now.
    #[must_use]
    pub fn simulated() -> Self {
        Self::simulated_from(Utc::now())
    }

    /// Simulated clock starting at `origin`.
    #[must_use]
    pub const fn simulated_from(origin: DateTime<Utc>) -> Self {
        Self::Simulated {
            origin,
            elapsed: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::Wall => Utc::now(),
            Self::Simulated { origin, elapsed } => {
                chrono::Duration::from_std(*elapsed)
                    .ok()
                    .and_then(|d| origin.checked_add_signed(d))
                    .unwrap_or(*origin)
            }
        }
    }

    /// Move simulated time forward. Wall clocks ignore this.
    pub fn advance(&mut self, by: Duration) {
        if let Self::Simulated { elapsed, .. } = self {
            *elapsed = elapsed.saturating_add(by);
        }
    }

    #[must_use]
    pub const fn is_simulated(&self) -> bool {
        matches!(self, Self::Simulated { .. })
    }
}
