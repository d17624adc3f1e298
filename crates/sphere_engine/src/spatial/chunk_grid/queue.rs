//! Inbound transfer queues
//!
//! Every chunk owns one inbox. The single-threaded grid uses a plain
//! `RefCell<VecDeque>`; the concurrent grid swaps in a lock-free `SegQueue`
//! so chunks of the same color can post to a shared neighbor at once.

use std::cell::RefCell;
use std::collections::VecDeque;

use crossbeam::queue::SegQueue;

use crate::entity::EntityRef;

/// FIFO of entities handed to a chunk by its neighbors
pub trait TransferQueue: Default {
    /// Append an entity
    fn push(&self, entity: EntityRef);

    /// Take the oldest entity
    fn pop(&self) -> Option<EntityRef>;

    /// Number of queued entities
    fn len(&self) -> usize;

    /// True if nothing is queued
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Queue for the single-threaded grid
#[derive(Debug, Default)]
pub struct LocalQueue(RefCell<VecDeque<EntityRef>>);

impl TransferQueue for LocalQueue {
    fn push(&self, entity: EntityRef) {
        self.0.borrow_mut().push_back(entity);
    }

    fn pop(&self) -> Option<EntityRef> {
        self.0.borrow_mut().pop_front()
    }

    fn len(&self) -> usize {
        self.0.borrow().len()
    }
}

/// Queue for the concurrent grid
#[derive(Debug, Default)]
pub struct SharedQueue(SegQueue<EntityRef>);

impl TransferQueue for SharedQueue {
    fn push(&self, entity: EntityRef) {
        self.0.push(entity);
    }

    fn pop(&self) -> Option<EntityRef> {
        self.0.pop()
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{Entity, EntityId};
    use crate::foundation::math::Vec3;

    fn fifo_order<Q: TransferQueue>() {
        let queue = Q::default();
        assert!(queue.is_empty());
        for i in 0..3 {
            queue.push(Entity::inert(EntityId::from_raw(i), Vec3::zeros(), 1.0));
        }
        assert_eq!(queue.len(), 3);
        let order: Vec<u64> = std::iter::from_fn(|| queue.pop()).map(|e| e.id().raw()).collect();
        assert_eq!(order, vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_local_queue_is_fifo() {
        fifo_order::<LocalQueue>();
    }

    #[test]
    fn test_shared_queue_is_fifo() {
        fifo_order::<SharedQueue>();
    }
}
