//! Bounded FIFO frontier queue.

use std::collections::VecDeque;

/// FIFO queue with a hard capacity. Enqueueing past the capacity is
/// an error rather than a reallocation, keeping the solver's memory
/// footprint fixed.
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push to the back. `Err(())` on overflow, the item is dropped.
    pub fn enqueue(&mut self, item: T) -> Result<(), ()> {
        if self.items.len() >= self.capacity {
            return Err(());
        }
        self.items.push_back(item);
        Ok(())
    }

    pub fn dequeue(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let mut q = BoundedQueue::new(4);
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        q.enqueue(3).unwrap();
        assert_eq!(q.dequeue(), Some(1));
        assert_eq!(q.dequeue(), Some(2));
        q.enqueue(4).unwrap();
        assert_eq!(q.dequeue(), Some(3));
        assert_eq!(q.dequeue(), Some(4));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn test_overflow() {
        let mut q = BoundedQueue::new(2);
        q.enqueue(1).unwrap();
        q.enqueue(2).unwrap();
        assert!(q.enqueue(3).is_err());
        assert_eq!(q.len(), 2);
    }
}
