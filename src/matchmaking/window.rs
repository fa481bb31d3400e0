//! Compatibility windows that widen while a combatant waits in queue

use std::fmt;

/// Bounds every ping window is clamped to (milliseconds)
pub const PING_BOUNDS: (i64, i64) = (0, 5000);
/// Bounds every rating window is clamped to
pub const RATING_BOUNDS: (i64, i64) = (0, 5000);

/// Ping widening applied every widening cycle
pub const PING_STEP: i64 = 2;
/// Rating widening applied every widening cycle (ranked only)
pub const RATING_STEP: i64 = 20;
/// Rating spread a ranked window starts with on each side
pub const INITIAL_RATING_SPREAD: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Span {
    min: i64,
    max: i64,
}

impl Span {
    fn at(value: i64, (lo, hi): (i64, i64)) -> Self {
        let v = value.clamp(lo, hi);
        Self { min: v, max: v }
    }

    fn extend(self, by: i64, (lo, hi): (i64, i64)) -> Self {
        Self {
            min: self.min.saturating_sub(by).max(lo),
            max: self.max.saturating_add(by).min(hi),
        }
    }

    fn contains(&self, v: i64) -> bool {
        v >= self.min && v <= self.max
    }
}

/// Latency range a partner must fall in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingWindow {
    unrestricted: bool,
    span: Span,
}

impl PingWindow {
    pub fn around(ping: i64) -> Self {
        Self {
            unrestricted: false,
            span: Span::at(ping, PING_BOUNDS),
        }
    }

    /// A window that accepts any latency
    pub fn unrestricted() -> Self {
        Self {
            unrestricted: true,
            span: Span {
                min: PING_BOUNDS.0,
                max: PING_BOUNDS.1,
            },
        }
    }

    pub fn is_unrestricted(&self) -> bool {
        self.unrestricted
    }

    pub fn min(&self) -> i64 {
        self.span.min
    }

    pub fn max(&self) -> i64 {
        self.span.max
    }

    /// Widen symmetrically; unrestricted windows are returned as-is
    pub fn extend(self, by: i64) -> Self {
        if self.unrestricted {
            return self;
        }
        Self {
            unrestricted: false,
            span: self.span.extend(by, PING_BOUNDS),
        }
    }

    pub fn contains(&self, ping: i64) -> bool {
        self.unrestricted || self.span.contains(ping)
    }
}

impl fmt::Display for PingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unrestricted {
            return f.write_str("Unrestricted");
        }
        write!(f, "{} - {}", self.span.min, self.span.max)
    }
}

/// Rating range a partner must fall in (ranked only)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatingWindow {
    span: Span,
}

impl RatingWindow {
    pub fn around(rating: i64) -> Self {
        Self {
            span: Span::at(rating, RATING_BOUNDS),
        }
    }

    pub fn min(&self) -> i64 {
        self.span.min
    }

    pub fn max(&self) -> i64 {
        self.span.max
    }

    pub fn extend(self, by: i64) -> Self {
        Self {
            span: self.span.extend(by, RATING_BOUNDS),
        }
    }

    pub fn contains(&self, rating: i64) -> bool {
        self.span.contains(rating)
    }
}

impl fmt::Display for RatingWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.span.min, self.span.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_is_inclusive() {
        let w = PingWindow::around(40).extend(10);
        assert!(w.contains(30));
        assert!(w.contains(50));
        assert!(!w.contains(29));
        assert!(!w.contains(51));
    }

    #[test]
    fn windows_clamp_to_bounds() {
        let w = RatingWindow::around(30).extend(100);
        assert_eq!((w.min(), w.max()), (0, 130));

        let w = RatingWindow::around(4990).extend(100);
        assert_eq!(w.max(), 5000);

        let w = PingWindow::around(9000);
        assert_eq!((w.min(), w.max()), (5000, 5000));
    }

    #[test]
    fn unrestricted_ignores_extension_and_accepts_everything() {
        let w = PingWindow::unrestricted().extend(2);
        assert!(w.is_unrestricted());
        assert!(w.contains(0));
        assert!(w.contains(4999));
        assert_eq!(w.to_string(), "Unrestricted");
    }

    #[test]
    fn display_shows_bounds() {
        assert_eq!(RatingWindow::around(1000).extend(20).to_string(), "980 - 1020");
    }
}
