//! Deadline arithmetic: relative at creation, absolute thereafter.

use std::time::{Duration, Instant};

/// An absolute per-call deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline(Instant);

impl Deadline {
    #[inline]
    pub fn after(d: Duration) -> Self {
        Self(Instant::now() + d)
    }

    #[inline]
    pub fn at(t: Instant) -> Self {
        Self(t)
    }

    #[inline]
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    #[inline]
    pub fn expired(&self) -> bool {
        self.remaining() == Duration::ZERO
    }

    /// Wire form: relative millis at this hop. A budget already below 1ms
    /// still travels as 1, since 0 means "no deadline".
    #[inline]
    pub fn to_timeout_ms(&self) -> u64 {
        (self.remaining().as_millis() as u64).max(1)
    }

    /// Re-anchor a received relative timeout to this hop's clock.
    #[inline]
    pub fn from_timeout_ms(ms: u64) -> Option<Self> {
        if ms == 0 {
            None
        } else {
            Some(Self::after(Duration::from_millis(ms)))
        }
    }
}

/// Clamp a child call's budget to the parent's remaining budget.
///
/// A child call issued while serving a parent call must not outlive the
/// parent; the clamp only ever shrinks, never extends.
pub fn clamp_child(
    requested: Option<Duration>, parent_remaining: Option<Duration>,
) -> Option<Duration> {
    match (requested, parent_remaining) {
        (Some(r), Some(p)) => Some(r.min(p)),
        (None, Some(p)) => Some(p),
        (Some(r), None) => Some(r),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_child() {
        let short = Some(Duration::from_millis(100));
        let long = Some(Duration::from_secs(10));
        assert_eq!(clamp_child(long, short), short);
        assert_eq!(clamp_child(short, long), short);
        assert_eq!(clamp_child(None, short), short);
        assert_eq!(clamp_child(short, None), short);
        assert_eq!(clamp_child(None, None), None);
    }

    #[test]
    fn test_timeout_ms_floor() {
        let dl = Deadline::after(Duration::from_micros(10));
        assert_eq!(dl.to_timeout_ms(), 1);
        assert_eq!(Deadline::from_timeout_ms(0), None);
        assert!(Deadline::from_timeout_ms(50).is_some());
    }

    #[test]
    fn test_expiry() {
        let dl = Deadline::at(Instant::now() - Duration::from_millis(1));
        assert!(dl.expired());
        assert_eq!(dl.remaining(), Duration::ZERO);
        let dl = Deadline::after(Duration::from_secs(60));
        assert!(!dl.expired());
    }
}
