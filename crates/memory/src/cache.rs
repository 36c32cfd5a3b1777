use parking_lot::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct CacheEntry {
    content: String,
    cached_at: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entry: Option<CacheEntry>,
    /// Bumped by every write so reads started earlier cannot fill stale data.
    generation: u64,
}

/// TTL cache in front of the memory tiers. The lock is never held across an
/// await point.
#[derive(Debug)]
pub struct MemoryCache {
    state: Mutex<CacheState>,
    ttl: Duration,
}

impl MemoryCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            state: Mutex::new(CacheState::default()),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Content if an unexpired entry exists.
    pub fn fresh(&self) -> Option<String> {
        let state = self.state.lock();
        state
            .entry
            .as_ref()
            .filter(|entry| entry.cached_at.elapsed() < self.ttl)
            .map(|entry| entry.content.clone())
    }

    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Populate from a read. Ignored if a write happened since `generation`
    /// was observed.
    pub fn fill(&self, generation: u64, content: &str) -> bool {
        let mut state = self.state.lock();
        if state.generation != generation {
            return false;
        }
        state.entry = Some(CacheEntry {
            content: content.to_string(),
            cached_at: Instant::now(),
        });
        true
    }

    /// Unconditional refresh after a write.
    pub fn refresh(&self, content: &str) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.entry = Some(CacheEntry {
            content: content.to_string(),
            cached_at: Instant::now(),
        });
    }

    pub fn invalidate(&self) {
        let mut state = self.state.lock();
        state.generation += 1;
        state.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_cache_misses() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        assert!(cache.fresh().is_none());
    }

    #[test]
    fn test_fill_then_hit() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        let generation = cache.generation();
        assert!(cache.fill(generation, "doc"));
        assert_eq!(cache.fresh().as_deref(), Some("doc"));
    }

    #[test]
    fn test_entry_expires() {
        let cache = MemoryCache::new(Duration::from_millis(20));
        cache.refresh("doc");
        std::thread::sleep(Duration::from_millis(40));
        assert!(cache.fresh().is_none());
    }

    #[test]
    fn test_fill_after_write_is_discarded() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        let observed = cache.generation();
        cache.refresh("new");
        assert!(!cache.fill(observed, "old"));
        assert_eq!(cache.fresh().as_deref(), Some("new"));
    }

    #[test]
    fn test_invalidate_clears_entry() {
        let cache = MemoryCache::new(Duration::from_secs(60));
        cache.refresh("doc");
        cache.invalidate();
        assert!(cache.fresh().is_none());
    }
}
