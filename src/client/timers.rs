//! Per-key one-shot timers used for debouncing and batching

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;

struct TimerTable<K> {
    /// Bumped for every timer started; identifies the live timer of a key
    generation: u64,
    timers: HashMap<K, (u64, JoinHandle<()>)>,
}

/// A set of one-shot timers, at most one pending per key.
///
/// A timer that fires removes itself before running its action, so a
/// cancelled or replaced timer never runs. Dropping the set cancels
/// everything still pending.
pub struct KeyedTimers<K> {
    table: Arc<Mutex<TimerTable<K>>>,
}

impl<K> Default for KeyedTimers<K> {
    fn default() -> Self {
        Self {
            table: Arc::new(Mutex::new(TimerTable {
                generation: 0,
                timers: HashMap::new(),
            })),
        }
    }
}

impl<K> KeyedTimers<K>
where
    K: Eq + Hash + Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a timer for `key`, replacing any pending one (trailing debounce)
    pub fn restart<F>(&self, key: K, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut table = self.table.lock();
        if let Some((_, handle)) = table.timers.remove(&key) {
            handle.abort();
        }
        self.spawn_locked(&mut table, key, delay, action);
    }

    /// Start a timer for `key` only if none is pending.
    /// Returns false when a timer was already running.
    pub fn start_if_idle<F>(&self, key: K, delay: Duration, action: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let mut table = self.table.lock();
        if table.timers.contains_key(&key) {
            return false;
        }
        self.spawn_locked(&mut table, key, delay, action);
        true
    }

    pub fn cancel(&self, key: &K) -> bool {
        match self.table.lock().timers.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer, returning how many were pending
    pub fn cancel_all(&self) -> usize {
        let mut table = self.table.lock();
        let count = table.timers.len();
        for (_, (_, handle)) in table.timers.drain() {
            handle.abort();
        }
        count
    }

    pub fn is_pending(&self, key: &K) -> bool {
        self.table.lock().timers.contains_key(key)
    }

    pub fn pending(&self) -> usize {
        self.table.lock().timers.len()
    }

    fn spawn_locked<F>(&self, table: &mut TimerTable<K>, key: K, delay: Duration, action: F)
    where
        F: FnOnce() + Send + 'static,
    {
        table.generation += 1;
        let generation = table.generation;
        let shared = Arc::clone(&self.table);
        let own_key = key.clone();

        let handle = tokio::spawn(async move {
            sleep(delay).await;
            {
                let mut table = shared.lock();
                match table.timers.get(&own_key) {
                    Some((live, _)) if *live == generation => {
                        table.timers.remove(&own_key);
                    }
                    _ => return,
                }
            }
            action();
        });

        table.timers.insert(key, (generation, handle));
    }
}

impl<K> Drop for KeyedTimers<K> {
    fn drop(&mut self) {
        for (_, (_, handle)) in self.table.lock().timers.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let shared = hits.clone();
        let make = move || {
            let hits = shared.clone();
            Box::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }) as Box<dyn FnOnce() + Send>
        };
        (hits, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_debounces() {
        let timers = KeyedTimers::new();
        let (hits, make) = counter();

        for _ in 0..5 {
            timers.restart("n1", Duration::from_millis(300), make());
            sleep(Duration::from_millis(100)).await;
        }
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        sleep(Duration::from_millis(250)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(timers.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent() {
        let timers = KeyedTimers::new();
        let (hits, make) = counter();

        timers.restart("n1", Duration::from_millis(300), make());
        timers.restart("n2", Duration::from_millis(300), make());
        assert_eq!(timers.pending(), 2);

        sleep(Duration::from_millis(301)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_if_idle_keeps_first_window() {
        let timers = KeyedTimers::new();
        let (hits, make) = counter();

        assert!(timers.start_if_idle("n1", Duration::from_millis(50), make()));
        sleep(Duration::from_millis(30)).await;
        assert!(!timers.start_if_idle("n1", Duration::from_millis(50), make()));

        sleep(Duration::from_millis(21)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!timers.is_pending(&"n1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_prevents_action() {
        let timers = KeyedTimers::new();
        let (hits, make) = counter();

        timers.restart("n1", Duration::from_millis(300), make());
        timers.restart("n2", Duration::from_millis(300), make());
        assert!(timers.cancel(&"n1"));
        assert!(!timers.cancel(&"n1"));
        assert_eq!(timers.cancel_all(), 1);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_pending() {
        let (hits, make) = counter();
        {
            let timers = KeyedTimers::new();
            timers.restart(1u32, Duration::from_millis(10), make());
        }

        sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }
}
