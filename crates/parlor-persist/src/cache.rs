use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Time source for the cache, injectable so tests never sleep.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Single-slot cache with a fixed TTL and manual invalidation.
///
/// Writers to the backing store must call `invalidate` so stale reads do
/// not outlive a write.
pub struct TtlCache<T> {
    ttl: Duration,
    clock: Arc<dyn Clock>,
    slot: Mutex<Option<(T, Instant)>>,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            ttl,
            clock,
            slot: Mutex::new(None),
        }
    }

    pub fn get(&self) -> Option<T> {
        let slot = self.slot.lock().expect("cache lock poisoned");
        match slot.as_ref() {
            Some((value, stored_at)) if self.clock.now().duration_since(*stored_at) < self.ttl => {
                Some(value.clone())
            }
            _ => None,
        }
    }

    pub fn set(&self, value: T) {
        let mut slot = self.slot.lock().expect("cache lock poisoned");
        *slot = Some((value, self.clock.now()));
    }

    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().expect("cache lock poisoned");
        *slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeClock {
        now: Mutex<Instant>,
    }

    impl FakeClock {
        fn new() -> Self {
            Self {
                now: Mutex::new(Instant::now()),
            }
        }

        fn advance(&self, by: Duration) {
            let mut now = self.now.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }
    }

    #[test]
    fn returns_value_within_ttl() {
        let clock = Arc::new(FakeClock::new());
        let cache = TtlCache::new(Duration::from_secs(60), clock.clone());

        cache.set(42);
        clock.advance(Duration::from_secs(59));

        assert_eq!(cache.get(), Some(42));
    }

    #[test]
    fn expires_after_ttl() {
        let clock = Arc::new(FakeClock::new());
        let cache = TtlCache::new(Duration::from_secs(60), clock.clone());

        cache.set(42);
        clock.advance(Duration::from_secs(60));

        assert_eq!(cache.get(), None);
    }

    #[test]
    fn invalidate_clears_immediately() {
        let clock = Arc::new(FakeClock::new());
        let cache = TtlCache::new(Duration::from_secs(60), clock);

        cache.set(vec!["model-a".to_string()]);
        cache.invalidate();

        assert_eq!(cache.get(), None);
    }

    #[test]
    fn set_refreshes_age() {
        let clock = Arc::new(FakeClock::new());
        let cache = TtlCache::new(Duration::from_secs(60), clock.clone());

        cache.set(1);
        clock.advance(Duration::from_secs(59));
        cache.set(2);
        clock.advance(Duration::from_secs(59));

        assert_eq!(cache.get(), Some(2));
    }

    #[test]
    fn empty_cache_misses() {
        let clock = Arc::new(FakeClock::new());
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60), clock);
        assert_eq!(cache.get(), None);
    }
}
