//! Event scheduling: the time-ordered queue driving simulation.
//!
//! Events are ordered by due time with an insertion sequence number as
//! tie-break, so events scheduled for the same instant execute in FIFO
//! order and the whole simulation is deterministic.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use serde::Serialize;

use crate::types::{ComponentId, SimTime};

/// One scheduled evaluation of a component.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SimEvent {
    pub due: SimTime,
    /// Queue-wide insertion counter; the FIFO tie-break.
    pub seq: u64,
    pub component: ComponentId,
    /// The component's epoch when this event was scheduled. A mismatch at
    /// pop time means the event was cancelled.
    pub epoch: u64,
}

impl Ord for SimEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.due, self.seq).cmp(&(other.due, other.seq))
    }
}

impl PartialOrd for SimEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Min-heap of pending events.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<SimEvent>>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }

    /// Schedules `component` for evaluation at `due`, tagged with the
    /// epoch it was scheduled under.
    pub fn schedule(&mut self, due: SimTime, component: ComponentId, epoch: u64) {
        let event = SimEvent {
            due,
            seq: self.next_seq,
            component,
            epoch,
        };
        self.next_seq += 1;
        self.heap.push(Reverse(event));
    }

    /// Due time of the earliest pending event.
    pub fn next_due(&self) -> Option<SimTime> {
        self.heap.peek().map(|Reverse(event)| event.due)
    }

    /// Pops every event sharing the earliest due time, in FIFO order.
    ///
    /// Stale-epoch filtering is the caller's job; the queue has no view
    /// of current component epochs.
    pub fn pop_batch(&mut self) -> Vec<SimEvent> {
        let mut batch = Vec::new();
        let Some(Reverse(first)) = self.heap.pop() else {
            return batch;
        };
        let due = first.due;
        batch.push(first);
        while self.heap.peek().is_some_and(|Reverse(event)| event.due == due) {
            if let Some(Reverse(event)) = self.heap.pop() {
                batch.push(event);
            }
        }
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ComponentId {
        uuid::Uuid::new_v4()
    }

    #[test]
    fn orders_by_due_time() {
        let mut queue = EventQueue::new();
        let (a, b) = (id(), id());
        queue.schedule(10, a, 0);
        queue.schedule(5, b, 0);

        let batch = queue.pop_batch();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].component, b);
        assert_eq!(queue.next_due(), Some(10));
    }

    #[test]
    fn same_due_time_is_fifo() {
        let mut queue = EventQueue::new();
        let ids: Vec<_> = (0..4).map(|_| id()).collect();
        for &component in &ids {
            queue.schedule(3, component, 0);
        }
        let batch = queue.pop_batch();
        let order: Vec<_> = batch.iter().map(|event| event.component).collect();
        assert_eq!(order, ids);
    }

    #[test]
    fn batch_takes_only_earliest_due() {
        let mut queue = EventQueue::new();
        queue.schedule(1, id(), 0);
        queue.schedule(1, id(), 0);
        queue.schedule(2, id(), 0);

        assert_eq!(queue.pop_batch().len(), 2);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop_batch().len(), 1);
        assert!(queue.is_empty());
        assert!(queue.pop_batch().is_empty());
    }

    #[test]
    fn events_carry_their_epoch() {
        let mut queue = EventQueue::new();
        let component = id();
        queue.schedule(1, component, 4);
        let batch = queue.pop_batch();
        assert_eq!(batch[0].epoch, 4);
    }
}
