use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Monotonic tag identifying which round armed a deferred job.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Generation(u64);

impl Generation {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn value(self) -> u64 {
        self.0
    }

    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired<T> {
    pub handle: TimerHandle,
    pub generation: Generation,
    pub job: T,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    due: Duration,
    handle: TimerHandle,
    generation: Generation,
    job: T,
}

/// One-shot deferred jobs, executed from the tick loop.
///
/// The queue keeps its own clock, moved forward by [`DeferredQueue::advance`].
/// Jobs carry the [`Generation`] they were armed under so a whole round's worth
/// can be dropped with a single [`DeferredQueue::cancel_generation`].
#[derive(Debug, Clone)]
pub struct DeferredQueue<T> {
    now: Duration,
    next_handle: u64,
    entries: Vec<Entry<T>>,
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> DeferredQueue<T> {
    pub fn new() -> Self {
        Self {
            now: Duration::ZERO,
            next_handle: 0,
            entries: Vec::new(),
        }
    }

    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn arm(&mut self, generation: Generation, delay: Duration, job: T) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push(Entry {
            due: self.now.saturating_add(delay),
            handle,
            generation,
            job,
        });
        handle
    }

    /// Moves the clock forward and returns every job now due, earliest first.
    pub fn advance(&mut self, dt: Duration) -> Vec<Fired<T>> {
        self.now = self.now.saturating_add(dt);
        let now = self.now;

        let (mut due, pending): (Vec<_>, Vec<_>) =
            self.entries.drain(..).partition(|entry| entry.due <= now);
        self.entries = pending;

        due.sort_by_key(|entry| (entry.due, entry.handle));
        due.into_iter()
            .map(|entry| Fired {
                handle: entry.handle,
                generation: entry.generation,
                job: entry.job,
            })
            .collect()
    }

    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.handle != handle);
        self.entries.len() != before
    }

    pub fn cancel_generation(&mut self, generation: Generation) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.generation != generation);
        before - self.entries.len()
    }

    pub fn cancel_all(&mut self) -> usize {
        let cancelled = self.entries.len();
        self.entries.clear();
        cancelled
    }

    pub fn pending(&self, generation: Generation) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.generation == generation)
            .count()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn jobs_fire_once_in_delay_order() {
        let mut q = DeferredQueue::new();
        let g = Generation::new(1);
        q.arm(g, ms(300), "late");
        q.arm(g, ms(100), "early");

        assert!(q.advance(ms(50)).is_empty());

        let fired: Vec<_> = q.advance(ms(400)).into_iter().map(|f| f.job).collect();
        assert_eq!(fired, vec!["early", "late"]);
        assert!(q.advance(ms(1000)).is_empty());
    }

    #[test]
    fn delay_is_measured_from_arm_time() {
        let mut q = DeferredQueue::new();
        q.advance(ms(1000));
        q.arm(Generation::new(1), ms(500), ());
        assert!(q.advance(ms(499)).is_empty());
        assert_eq!(q.advance(ms(1)).len(), 1);
    }

    #[test]
    fn cancel_generation_leaves_other_generations() {
        let mut q = DeferredQueue::new();
        let old = Generation::new(1);
        let new = old.next();
        q.arm(old, ms(100), "stale-a");
        q.arm(old, ms(200), "stale-b");
        q.arm(new, ms(150), "fresh");

        assert_eq!(q.cancel_generation(old), 2);
        assert_eq!(q.pending(old), 0);

        let fired = q.advance(ms(500));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].job, "fresh");
        assert_eq!(fired[0].generation, new);
    }

    #[test]
    fn cancel_all_empties_queue() {
        let mut q = DeferredQueue::new();
        q.arm(Generation::new(1), ms(1), 1);
        q.arm(Generation::new(2), ms(1), 2);
        assert_eq!(q.cancel_all(), 2);
        assert!(q.is_empty());
        assert!(q.advance(ms(10)).is_empty());
    }

    #[test]
    fn cancel_single_handle() {
        let mut q = DeferredQueue::new();
        let h = q.arm(Generation::new(1), ms(10), 'a');
        q.arm(Generation::new(1), ms(10), 'b');
        assert!(q.cancel(h));
        assert!(!q.cancel(h));
        let fired: Vec<_> = q.advance(ms(10)).into_iter().map(|f| f.job).collect();
        assert_eq!(fired, vec!['b']);
    }
}
