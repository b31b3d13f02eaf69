//! Per-channel hit queues and the global time sort.
//!
//! Hits wait here, one queue per (module, channel), until the spill is
//! complete. The time sort is a k-way merge over the queue heads: each
//! channel is already in timestamp order when it leaves the instrument, so
//! only the heads need ordering.

use crate::types::Hit;
use log::debug;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};

/// One channel's pending hits.
#[derive(Debug, Default)]
struct ChannelQueue {
    hits: VecDeque<Hit>,
    /// Set when a hit arrived earlier than its predecessor
    unordered: bool,
}

impl ChannelQueue {
    fn push(&mut self, hit: Hit) {
        if let Some(last) = self.hits.back() {
            if hit.timestamp < last.timestamp {
                self.unordered = true;
            }
        }
        self.hits.push_back(hit);
    }
}

/// Queue head taking part in the merge.
///
/// Ordered by (timestamp, module, channel), reversed for the min-heap, so
/// equal timestamps resolve to the lower module and then the lower channel.
#[derive(Debug, PartialEq, Eq)]
struct Head {
    timestamp: u64,
    module: u16,
    channel: u16,
}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.module.cmp(&self.module))
            .then_with(|| other.channel.cmp(&self.channel))
    }
}

/// Hit queues indexed by (module, channel).
///
/// Module rows are allocated lazily, up to the configured bound, as hits
/// for higher modules arrive.
#[derive(Debug)]
pub struct HitQueues {
    max_module: u16,
    max_channel: u16,
    modules: Vec<Vec<ChannelQueue>>,
    len: usize,
    rejected: u64,
}

impl HitQueues {
    /// Creates empty queues for modules `0..=max_module` and channels
    /// `0..=max_channel`.
    pub fn new(max_module: u16, max_channel: u16) -> Self {
        Self {
            max_module,
            max_channel,
            modules: Vec::new(),
            len: 0,
            rejected: 0,
        }
    }

    /// Returns true if a hit from this module and channel would be queued.
    #[inline]
    pub fn accepts(&self, module: u16, channel: u16) -> bool {
        module <= self.max_module && channel <= self.max_channel
    }

    /// Appends a hit to its channel queue.
    ///
    /// Returns false and drops the hit when its module or channel is out of
    /// bounds.
    pub fn add(&mut self, hit: Hit) -> bool {
        if !self.accepts(hit.module, hit.channel) {
            debug!(
                "Rejecting hit from module {} channel {}",
                hit.module, hit.channel
            );
            self.rejected += 1;
            return false;
        }

        let module = hit.module as usize;
        if module >= self.modules.len() {
            let channels = self.max_channel as usize + 1;
            self.modules.resize_with(module + 1, || {
                (0..channels).map(|_| ChannelQueue::default()).collect()
            });
        }
        self.modules[module][hit.channel as usize].push(hit);
        self.len += 1;
        true
    }

    /// Number of queued hits.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of module rows allocated (highest module seen + 1).
    #[inline]
    pub fn module_count(&self) -> usize {
        self.modules.len()
    }

    /// Hits refused by [`HitQueues::add`] since the last clear.
    #[inline]
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Pending hits for one channel, oldest first.
    pub fn channel(&self, module: u16, channel: u16) -> Option<&VecDeque<Hit>> {
        self.modules
            .get(module as usize)
            .and_then(|row| row.get(channel as usize))
            .map(|queue| &queue.hits)
    }

    /// Drains every queue into one timestamp-ascending sequence.
    ///
    /// Equal timestamps keep queue-iteration order: lower module first,
    /// then lower channel, then arrival order within the channel.
    pub fn time_sort(&mut self) -> Vec<Hit> {
        let mut sorted = Vec::with_capacity(self.len);
        let mut heap = BinaryHeap::new();

        for (module, row) in self.modules.iter_mut().enumerate() {
            for (channel, queue) in row.iter_mut().enumerate() {
                if queue.unordered {
                    debug!(
                        "Module {} channel {} arrived out of order, sorting",
                        module, channel
                    );
                    queue
                        .hits
                        .make_contiguous()
                        .sort_by_key(|hit| hit.timestamp);
                    queue.unordered = false;
                }
                if let Some(front) = queue.hits.front() {
                    heap.push(Head {
                        timestamp: front.timestamp,
                        module: module as u16,
                        channel: channel as u16,
                    });
                }
            }
        }

        while let Some(head) = heap.pop() {
            let queue = &mut self.modules[head.module as usize][head.channel as usize];
            if let Some(hit) = queue.hits.pop_front() {
                sorted.push(hit);
            }
            if let Some(next) = queue.hits.front() {
                heap.push(Head {
                    timestamp: next.timestamp,
                    ..head
                });
            }
        }

        self.len = 0;
        sorted
    }

    /// Drops every queued hit and the rejection count.
    ///
    /// Module rows stay allocated.
    pub fn clear(&mut self) {
        for queue in self.modules.iter_mut().flatten() {
            queue.hits.clear();
            queue.unordered = false;
        }
        self.len = 0;
        self.rejected = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timestamps(hits: &[Hit]) -> Vec<u64> {
        hits.iter().map(|h| h.timestamp).collect()
    }

    #[test]
    fn test_add_rejects_out_of_range() {
        let mut queues = HitQueues::new(12, 15);
        assert!(queues.add(Hit::new(12, 15, 1, 1)));
        assert!(!queues.add(Hit::new(13, 0, 1, 1)));
        assert!(!queues.add(Hit::new(0, 16, 1, 1)));
        assert_eq!(queues.len(), 1);
        assert_eq!(queues.rejected(), 2);
        assert_eq!(queues.module_count(), 13);
    }

    #[test]
    fn test_time_sort_merges_channels() {
        let mut queues = HitQueues::new(12, 15);
        for t in [10, 40, 70] {
            queues.add(Hit::new(0, 0, t, 0));
        }
        for t in [5, 45, 90] {
            queues.add(Hit::new(1, 3, t, 0));
        }
        for t in [20, 21] {
            queues.add(Hit::new(0, 7, t, 0));
        }

        let sorted = queues.time_sort();
        assert_eq!(timestamps(&sorted), vec![5, 10, 20, 21, 40, 45, 70, 90]);
        assert!(queues.is_empty());
        assert!(queues.channel(0, 0).map_or(true, |q| q.is_empty()));
    }

    #[test]
    fn test_equal_timestamps_follow_module_then_channel() {
        let mut queues = HitQueues::new(12, 15);
        queues.add(Hit::new(2, 0, 100, 1));
        queues.add(Hit::new(0, 5, 100, 2));
        queues.add(Hit::new(0, 1, 100, 3));
        queues.add(Hit::new(0, 1, 100, 4));

        let sorted = queues.time_sort();
        let order: Vec<_> = sorted.iter().map(|h| (h.module, h.channel, h.energy)).collect();
        assert_eq!(order, vec![(0, 1, 3), (0, 1, 4), (0, 5, 2), (2, 0, 1)]);
    }

    #[test]
    fn test_unordered_channel_is_sorted() {
        let mut queues = HitQueues::new(1, 1);
        queues.add(Hit::new(0, 0, 50, 0));
        queues.add(Hit::new(0, 0, 30, 0));
        queues.add(Hit::new(1, 1, 40, 0));

        let sorted = queues.time_sort();
        assert_eq!(timestamps(&sorted), vec![30, 40, 50]);
    }

    #[test]
    fn test_clear() {
        let mut queues = HitQueues::new(3, 3);
        queues.add(Hit::new(1, 1, 1, 1));
        queues.add(Hit::new(9, 1, 1, 1));
        queues.clear();
        assert!(queues.is_empty());
        assert_eq!(queues.rejected(), 0);
        assert!(queues.time_sort().is_empty());
    }
}
