//! Stable binary min-heap with a caller-supplied comparator.

use std::cmp::Ordering;

#[derive(Clone, Debug)]
struct Node<T> {
    value: T,
    /// Insertion sequence; breaks comparator ties first-in first-out.
    seq: u64,
}

/// Min-heap ordered by `compare`, with equal elements popped in insertion
/// order.
///
/// Besides the usual heap operations it supports [`find_max`], a linear
/// scan for the worst element that backs the scheduler's overflow eviction.
///
/// [`find_max`]: Self::find_max
pub struct PriorityQueue<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    nodes: Vec<Node<T>>,
    next_seq: u64,
    compare: C,
}

impl<T, C> PriorityQueue<T, C>
where
    C: Fn(&T, &T) -> Ordering,
{
    /// Creates an empty queue ordered by `compare` (smallest pops first).
    pub fn new(compare: C) -> Self {
        Self {
            nodes: Vec::new(),
            next_seq: 0,
            compare,
        }
    }

    fn order(&self, a: &Node<T>, b: &Node<T>) -> Ordering {
        (self.compare)(&a.value, &b.value).then(a.seq.cmp(&b.seq))
    }

    fn less(&self, i: usize, j: usize) -> bool {
        self.order(&self.nodes[i], &self.nodes[j]) == Ordering::Less
    }

    fn sift_up(&mut self, mut i: usize) {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.less(i, parent) {
                break;
            }
            self.nodes.swap(i, parent);
            i = parent;
        }
    }

    fn sift_down(&mut self, mut i: usize) {
        let len = self.nodes.len();
        loop {
            let left = 2 * i + 1;
            let right = left + 1;
            let mut smallest = i;
            if left < len && self.less(left, smallest) {
                smallest = left;
            }
            if right < len && self.less(right, smallest) {
                smallest = right;
            }
            if smallest == i {
                break;
            }
            self.nodes.swap(i, smallest);
            i = smallest;
        }
    }

    /// Inserts a value. O(log n).
    pub fn push(&mut self, value: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.nodes.push(Node { value, seq });
        let last = self.nodes.len() - 1;
        self.sift_up(last);
    }

    /// Removes and returns the smallest value. O(log n).
    pub fn pop(&mut self) -> Option<T> {
        if self.nodes.is_empty() {
            return None;
        }
        let node = self.nodes.swap_remove(0);
        if !self.nodes.is_empty() {
            self.sift_down(0);
        }
        Some(node.value)
    }

    /// The smallest value without removing it.
    #[must_use]
    pub fn peek(&self) -> Option<&T> {
        self.nodes.first().map(|n| &n.value)
    }

    /// Number of stored values.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Removes every value and restarts the insertion sequence.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.next_seq = 0;
    }

    /// The greatest value among those matching `filter`. O(n).
    ///
    /// Uses the same ordering as `pop`, so among equal priorities the most
    /// recently inserted value is the greatest.
    pub fn find_max(&self, filter: impl Fn(&T) -> bool) -> Option<&T> {
        self.nodes
            .iter()
            .filter(|n| filter(&n.value))
            .max_by(|a, b| self.order(a, b))
            .map(|n| &n.value)
    }

    /// Removes every value, returned in insertion order.
    pub fn drain(&mut self) -> Vec<T> {
        let mut nodes = std::mem::take(&mut self.nodes);
        nodes.sort_by_key(|n| n.seq);
        nodes.into_iter().map(|n| n.value).collect()
    }
}
