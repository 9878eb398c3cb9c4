//! Bounded LIFO used for the undo and redo stacks.

use std::collections::VecDeque;

/// A stack that silently drops its oldest entry once it grows past
/// `capacity`. Pushing never fails.
#[derive(Debug, Clone)]
pub struct BoundedStack<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedStack<T> {
    /// Creates an empty stack holding at most `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Pushes an item, evicting the oldest one when over capacity.
    pub fn push(&mut self, item: T) {
        self.items.push_back(item);
        while self.items.len() > self.capacity {
            self.items.pop_front();
        }
    }

    /// Removes and returns the most recently pushed item.
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_back()
    }

    /// Returns the most recently pushed item.
    pub fn peek(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifo_order() {
        let mut stack = BoundedStack::new(3);
        stack.push(1);
        stack.push(2);

        assert_eq!(stack.peek(), Some(&2));
        assert_eq!(stack.pop(), Some(2));
        assert_eq!(stack.pop(), Some(1));
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn test_evicts_oldest() {
        let mut stack = BoundedStack::new(100);
        for item in 0..150 {
            stack.push(item);
        }

        assert_eq!(stack.len(), 100);
        let drained: Vec<i32> = std::iter::from_fn(|| stack.pop()).collect();
        assert_eq!(drained.first(), Some(&149));
        assert_eq!(drained.last(), Some(&50));
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut stack = BoundedStack::new(0);
        stack.push("op");
        assert!(stack.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut stack = BoundedStack::new(2);
        stack.push('a');
        stack.push('b');
        stack.clear();
        assert!(stack.is_empty());
        assert_eq!(stack.capacity(), 2);
    }
}
