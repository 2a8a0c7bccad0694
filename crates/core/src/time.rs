use chrono::{DateTime, Duration, Utc};

/// Source of wall-clock time for progress timestamps.
///
/// Everything that stamps `updated_at` or `completed_at` goes through a
/// `Clock` so persistence ordering (last writer wins) can be tested without
/// sleeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Clock {
    #[default]
    System,
    Fixed(DateTime<Utc>),
}

impl Clock {
    #[must_use]
    pub fn system() -> Self {
        Self::System
    }

    #[must_use]
    pub fn fixed(at: DateTime<Utc>) -> Self {
        Self::Fixed(at)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Clock::System => Utc::now(),
            Clock::Fixed(t) => *t,
        }
    }

    /// Move a fixed clock forward. A system clock is left untouched.
    pub fn advance(&mut self, delta: Duration) {
        if let Clock::Fixed(t) = self {
            *t += delta;
        }
    }

    /// A copy of this clock shifted by `delta` (fixed clocks only).
    #[must_use]
    pub fn shifted(mut self, delta: Duration) -> Self {
        self.advance(delta);
        self
    }
}

/// 2023-11-14T22:13:20Z, used as the epoch of every deterministic test.
pub const FIXED_TEST_TIMESTAMP: i64 = 1_700_000_000;

/// Deterministic timestamp for tests.
///
/// # Panics
///
/// Panics if the fixed timestamp cannot be represented.
#[must_use]
pub fn fixed_now() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(FIXED_TEST_TIMESTAMP, 0)
        .expect("fixed timestamp should be valid")
}

#[must_use]
pub fn fixed_clock() -> Clock {
    Clock::fixed(fixed_now())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shifted_clock_moves_fixed_time_only() {
        let later = fixed_clock().shifted(Duration::seconds(5));
        assert_eq!(later.now(), fixed_now() + Duration::seconds(5));

        let mut system = Clock::system();
        system.advance(Duration::seconds(5));
        assert_eq!(system, Clock::System);
    }
}
