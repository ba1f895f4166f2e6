use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

/// Returned by blocking operations once [`SlotBuffer::close`] was called.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("slot buffer closed")]
pub struct Closed;

struct Slots<T> {
    slots: VecDeque<Option<T>>,
    closed: bool,
}

impl<T> Slots<T> {
    fn front_ready(&self) -> bool {
        matches!(self.slots.front(), Some(Some(_)))
    }
}

/// Fixed-capacity hand-off buffer between the arrival path and the drain
/// thread. Position 0 is the front; [`SlotBuffer::remove`] shifts every other
/// slot one position forward.
pub struct SlotBuffer<T> {
    inner: Mutex<Slots<T>>,
    front_ready: Condvar,
    capacity: usize,
}

impl<T> SlotBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        let mut slots = VecDeque::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self {
            inner: Mutex::new(Slots {
                slots,
                closed: false,
            }),
            front_ready: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store `item` at `position`, returning whatever occupied the slot.
    ///
    /// Never blocks. Wakes waiters when the front slot becomes occupied.
    ///
    /// # Panics
    /// Panics if `position >= capacity`.
    pub fn set(&self, position: usize, item: T) -> Option<T> {
        assert!(
            position < self.capacity,
            "slot position {position} outside buffer of {}",
            self.capacity
        );
        let mut inner = self.lock();
        let previous = inner.slots[position].replace(item);
        if position == 0 {
            self.front_ready.notify_all();
        }
        previous
    }

    /// Remove the front slot, blocking until it is occupied.
    pub fn remove(&self) -> Result<T, Closed> {
        let mut inner = self.wait_front_ready(self.lock())?;
        let item = inner.slots.pop_front().flatten();
        inner.slots.push_back(None);
        // wait_front_ready guarantees the front was occupied
        item.ok_or(Closed)
    }

    /// Block until the front slot is occupied.
    pub fn await_not_empty(&self) -> Result<(), Closed> {
        self.wait_front_ready(self.lock()).map(drop)
    }

    /// Number of occupied slots contiguous from the front.
    pub fn size(&self) -> usize {
        self.lock()
            .slots
            .iter()
            .take_while(|slot| slot.is_some())
            .count()
    }

    pub fn is_occupied(&self, position: usize) -> bool {
        self.lock()
            .slots
            .get(position)
            .is_some_and(Option::is_some)
    }

    /// Wake every blocked caller; they and all later blocking calls return
    /// [`Closed`].
    pub fn close(&self) {
        self.lock().closed = true;
        self.front_ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    fn wait_front_ready<'a>(
        &'a self,
        guard: MutexGuard<'a, Slots<T>>,
    ) -> Result<MutexGuard<'a, Slots<T>>, Closed> {
        let guard = self
            .front_ready
            .wait_while(guard, |inner| !inner.closed && !inner.front_ready())
            .unwrap_or_else(PoisonError::into_inner);
        if guard.closed {
            return Err(Closed);
        }
        Ok(guard)
    }

    fn lock(&self) -> MutexGuard<'_, Slots<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
