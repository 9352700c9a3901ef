//! Sample-accurate event queue
//!
//! A min-heap of transport events keyed by `(due_sample, id)`. The heap is
//! allocated once at its full capacity; `schedule` refuses events beyond it
//! instead of growing, so the audio thread can insert and pop without
//! touching the allocator.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::fmt;

use crate::types::{LoopId, Position};

/// Default capacity of the engine's event queue
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// Caller-assigned event identifier; breaks ties between equal due times
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a scheduled event does when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventAction {
    Play,
    Pause,
    Stop,
    /// Arm the event's track position
    RecordStart,
    /// Disarm whatever is armed
    RecordStop,
}

/// A transport action due at an absolute sample index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub id: EventId,
    pub action: EventAction,
    pub track: Option<Position>,
    pub loop_id: LoopId,
    pub due_sample: u64,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due_sample, self.id).cmp(&(other.due_sample, other.id))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Bounded priority queue of events, earliest first
pub struct EventQueue {
    heap: BinaryHeap<Reverse<Event>>,
    capacity: usize,
}

impl EventQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(capacity),
            capacity,
        }
    }

    /// Insert an event; gives it back when the queue is full
    pub fn schedule(&mut self, event: Event) -> Result<(), Event> {
        if self.heap.len() >= self.capacity {
            return Err(event);
        }
        self.heap.push(Reverse(event));
        Ok(())
    }

    /// Earliest event without removing it
    pub fn peek_next(&self) -> Option<&Event> {
        self.heap.peek().map(|Reverse(event)| event)
    }

    /// Pop the earliest event if it is due at `current_sample`
    #[inline]
    pub fn pop_next_due(&mut self, current_sample: u64) -> Option<Event> {
        match self.heap.peek() {
            Some(Reverse(event)) if event.due_sample <= current_sample => {
                self.heap.pop().map(|Reverse(event)| event)
            }
            _ => None,
        }
    }

    /// Pop every event due at `current_sample`, earliest first
    pub fn pop_due(&mut self, current_sample: u64) -> PopDue<'_> {
        PopDue {
            queue: self,
            current_sample,
        }
    }

    /// Drop all pending events (keeps the allocation)
    pub fn clear(&mut self) {
        self.heap.clear();
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::with_capacity(EVENT_QUEUE_CAPACITY)
    }
}

/// Iterator returned by [`EventQueue::pop_due`]
pub struct PopDue<'a> {
    queue: &'a mut EventQueue,
    current_sample: u64,
}

impl Iterator for PopDue<'_> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        self.queue.pop_next_due(self.current_sample)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: u64, due: u64) -> Event {
        Event {
            id: EventId(id),
            action: EventAction::Play,
            track: None,
            loop_id: LoopId(1),
            due_sample: due,
        }
    }

    #[test]
    fn test_ordering_by_due_then_id() {
        let mut queue = EventQueue::with_capacity(8);
        queue.schedule(event(5, 100)).unwrap();
        queue.schedule(event(3, 100)).unwrap();
        queue.schedule(event(9, 50)).unwrap();

        let order: Vec<u64> = queue.pop_due(100).map(|e| e.id.0).collect();
        assert_eq!(order, vec![9, 3, 5]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_due_leaves_future_events() {
        let mut queue = EventQueue::with_capacity(8);
        queue.schedule(event(1, 10)).unwrap();
        queue.schedule(event(2, 20)).unwrap();
        queue.schedule(event(3, 30)).unwrap();

        let fired: Vec<u64> = queue.pop_due(20).map(|e| e.id.0).collect();
        assert_eq!(fired, vec![1, 2]);
        assert_eq!(queue.peek_next().map(|e| e.id.0), Some(3));
    }

    #[test]
    fn test_empty_queue() {
        let mut queue = EventQueue::default();
        assert!(queue.peek_next().is_none());
        assert_eq!(queue.pop_due(u64::MAX).count(), 0);
    }

    #[test]
    fn test_full_queue_rejects_without_growing() {
        let mut queue = EventQueue::with_capacity(2);
        queue.schedule(event(1, 1)).unwrap();
        queue.schedule(event(2, 2)).unwrap();
        let rejected = queue.schedule(event(3, 0)).unwrap_err();
        assert_eq!(rejected.id, EventId(3));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.peek_next().map(|e| e.id.0), Some(1));
    }

    #[test]
    fn test_clear() {
        let mut queue = EventQueue::with_capacity(4);
        queue.schedule(event(1, 1)).unwrap();
        queue.clear();
        assert!(queue.is_empty());
        assert_eq!(queue.capacity(), 4);
    }
}
