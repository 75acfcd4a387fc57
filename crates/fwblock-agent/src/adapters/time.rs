//! Wall-clock time source.

use std::time::SystemTime;

use crate::domain::Timestamp;
use crate::ports::TimeSource;

/// [`TimeSource`] reading the system clock. A clock set before the Unix
/// epoch reads as zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Timestamp {
        let secs = SystemTime::UNIX_EPOCH
            .elapsed()
            .map(|elapsed| elapsed.as_secs())
            .unwrap_or(0);
        Timestamp::new(secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_is_after_2020() {
        assert!(SystemTimeSource.now().as_secs() > 1_577_836_800);
    }

    #[test]
    fn test_now_does_not_go_backwards() {
        let a = SystemTimeSource.now();
        let b = SystemTimeSource.now();
        assert!(b.secs_since(a) < 2);
        assert!(b.as_secs() >= a.as_secs());
    }
}
