// Task id generation

use crate::clock::Clock;
use crate::models::TaskId;
use std::collections::BTreeSet;

/// Issues clock-derived ids that strictly increase.
///
/// An id is the current time in milliseconds, bumped past the last id issued
/// or observed. Adds within the same millisecond, or a clock that steps
/// backwards, still get distinct ids. Once the largest id is `i64::MAX` the
/// generator hands out the lowest non-negative id it has never seen instead.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    seen: BTreeSet<TaskId>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from ids already present in a loaded list
    pub fn seeded<I: IntoIterator<Item = TaskId>>(ids: I) -> Self {
        let mut generator = Self::new();
        for id in ids {
            generator.observe(id);
        }
        generator
    }

    /// Record an id so it is never issued again
    pub fn observe(&mut self, id: TaskId) {
        self.seen.insert(id);
    }

    /// Next unused id, or `None` if every non-negative id is taken
    pub fn next_id(&mut self, clock: &dyn Clock) -> Option<TaskId> {
        let now = clock.now_ms();
        let id = match self.last() {
            Some(last) if now <= last => match last.checked_add(1) {
                Some(id) => id,
                None => self.lowest_free()?,
            },
            _ => now,
        };
        self.seen.insert(id);
        Some(id)
    }

    /// Largest id issued or observed
    pub fn last(&self) -> Option<TaskId> {
        self.seen.last().copied()
    }

    fn lowest_free(&self) -> Option<TaskId> {
        let mut candidate: TaskId = 0;
        for &id in self.seen.range(0..) {
            if id != candidate {
                break;
            }
            candidate = candidate.checked_add(1)?;
        }
        Some(candidate)
    }
}
