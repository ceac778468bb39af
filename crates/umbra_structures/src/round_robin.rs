//! RoundRobinQueue - Cyclic step scheduler
//!
//! Spreads a fixed set of expensive steps across consecutive frames: each call
//! to [`RoundRobinQueue::next`] yields the step at the head of the cycle and
//! moves the head forward. Stored as a plain vector plus a head index, so a
//! rotation is O(1).
//!
//! ```ignore
//! let mut passes: RoundRobinQueue<Box<dyn FnMut(&mut Voxelizer)>> = RoundRobinQueue::new();
//! passes.add(Box::new(|v| v.voxelize_axis(Axis::X)));
//! passes.add(Box::new(|v| v.voxelize_axis(Axis::Y)));
//! passes.add(Box::new(|v| v.voxelize_axis(Axis::Z)));
//! passes.add(Box::new(|v| v.generate_mipmaps()));
//!
//! // Once per frame
//! if let Some(step) = passes.next_mut() {
//!     step(&mut voxelizer);
//! }
//! ```

use alloc::boxed::Box;
use alloc::vec::Vec;

/// Fixed cycle of steps visited one at a time
#[derive(Clone, Debug)]
pub struct RoundRobinQueue<T> {
    steps: Vec<T>,
    /// Index of the step returned by the next call to `next`
    head: usize,
}

/// Queue of boxed frame callbacks
pub type StepQueue = RoundRobinQueue<Box<dyn FnMut()>>;

impl<T> RoundRobinQueue<T> {
    /// Create an empty queue
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            head: 0,
        }
    }

    /// Append a step to the back of the cycle
    ///
    /// The new step is visited after every step already queued, regardless of
    /// how far the cycle has rotated.
    pub fn add(&mut self, step: T) {
        if self.head == 0 {
            self.steps.push(step);
        } else {
            self.steps.insert(self.head, step);
            self.head += 1;
        }
    }

    /// Append several steps in order
    pub fn extend(&mut self, steps: impl IntoIterator<Item = T>) {
        for step in steps {
            self.add(step);
        }
    }

    /// Return the step at the front and rotate it to the back
    pub fn next(&mut self) -> Option<&T> {
        let index = self.advance()?;
        self.steps.get(index)
    }

    /// Mutable variant of [`next`](Self::next)
    pub fn next_mut(&mut self) -> Option<&mut T> {
        let index = self.advance()?;
        self.steps.get_mut(index)
    }

    /// Step that the next call to `next` would return
    pub fn peek(&self) -> Option<&T> {
        self.steps.get(self.head)
    }

    /// Steps in cycle order, starting at the front
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let (back, front) = self.steps.split_at(self.head);
        front.iter().chain(back.iter())
    }

    /// Number of steps in the cycle
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Remove all steps
    pub fn clear(&mut self) {
        self.steps.clear();
        self.head = 0;
    }

    fn advance(&mut self) -> Option<usize> {
        if self.steps.is_empty() {
            return None;
        }
        let index = self.head;
        self.head = (self.head + 1) % self.steps.len();
        Some(index)
    }
}

impl<T: FnMut()> RoundRobinQueue<T> {
    /// Run the step at the front and rotate it to the back
    ///
    /// Returns false if the queue is empty.
    pub fn exec_next(&mut self) -> bool {
        match self.next_mut() {
            Some(step) => {
                step();
                true
            }
            None => false,
        }
    }
}

impl<T> Default for RoundRobinQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use core::cell::RefCell;

    #[test]
    fn test_next_rotates() {
        let mut queue = RoundRobinQueue::new();
        queue.extend(["x", "y", "z", "mips"]);

        assert_eq!(queue.next(), Some(&"x"));
        assert_eq!(queue.next(), Some(&"y"));
        assert_eq!(queue.peek(), Some(&"z"));
        assert_eq!(queue.next(), Some(&"z"));
        assert_eq!(queue.next(), Some(&"mips"));
        assert_eq!(queue.next(), Some(&"x"));
    }

    #[test]
    fn test_exhaustive_coverage() {
        let mut queue = RoundRobinQueue::new();
        queue.extend(0..7);

        // Start mid-cycle to make sure coverage does not depend on the head
        queue.next();
        queue.next();

        let first = *queue.peek().unwrap();
        let mut seen: Vec<i32> = (0..queue.len()).map(|_| *queue.next().unwrap()).collect();

        // The (n+1)th call lands on the first visited step again
        assert_eq!(queue.next(), Some(&first));

        seen.sort_unstable();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
    }

    #[test]
    fn test_add_after_rotation_goes_to_back() {
        let mut queue = RoundRobinQueue::new();
        queue.extend(['a', 'b', 'c']);
        queue.next(); // a

        queue.add('d');
        let order: Vec<char> = queue.iter().copied().collect();
        assert_eq!(order, vec!['b', 'c', 'a', 'd']);

        assert_eq!(queue.next(), Some(&'b'));
        assert_eq!(queue.next(), Some(&'c'));
        assert_eq!(queue.next(), Some(&'a'));
        assert_eq!(queue.next(), Some(&'d'));
        assert_eq!(queue.next(), Some(&'b'));
    }

    #[test]
    fn test_empty_queue() {
        let mut queue: RoundRobinQueue<u32> = RoundRobinQueue::new();
        assert!(queue.is_empty());
        assert_eq!(queue.next(), None);
        assert_eq!(queue.peek(), None);
    }

    #[test]
    fn test_exec_next() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queue: StepQueue = RoundRobinQueue::new();

        for axis in ["x", "y", "z"] {
            let log = Rc::clone(&log);
            queue.add(Box::new(move || log.borrow_mut().push(axis)));
        }

        for _ in 0..4 {
            assert!(queue.exec_next());
        }

        assert_eq!(*log.borrow(), vec!["x", "y", "z", "x"]);
    }

    #[test]
    fn test_exec_next_closure() {
        let mut count = 0;
        {
            let mut queue = RoundRobinQueue::new();
            queue.add(|| count += 1);
            assert!(queue.exec_next());
            assert!(queue.exec_next());
        }
        assert_eq!(count, 2);
    }
}
