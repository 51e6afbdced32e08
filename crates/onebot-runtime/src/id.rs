//! Per-instance id generation.

use std::sync::atomic::{AtomicU64, Ordering};

/// A strictly increasing id counter.
///
/// Message ids and event ids of one runtime instance are drawn from the same
/// generator, so every id handed out by an instance is unique. The first id
/// is `1`.
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: AtomicU64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Returns the next id.
    pub fn next(&self) -> u64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Returns the next id in its wire form.
    pub fn next_id(&self) -> String {
        self.next().to_string()
    }

    /// Returns the most recently issued id, or `0` if none.
    pub fn last(&self) -> u64 {
        self.last.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    #[test]
    fn test_starts_at_one() {
        let ids = IdGenerator::new();
        assert_eq!(ids.last(), 0);
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next_id(), "2");
        assert_eq!(ids.last(), 2);
    }

    #[test]
    fn test_concurrent_ids_are_unique() {
        let ids = Arc::new(IdGenerator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ids = Arc::clone(&ids);
                std::thread::spawn(move || (0..1000).map(|_| ids.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            let batch = handle.join().unwrap();
            assert!(batch.windows(2).all(|w| w[0] < w[1]));
            for id in batch {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 8000);
        assert_eq!(ids.last(), 8000);
    }
}
