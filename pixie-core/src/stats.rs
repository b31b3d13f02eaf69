//! Per-channel hit counters.

/// Running count of accepted hits per (module, channel).
///
/// The table is sized from the configured bounds; indices outside them are
/// refused, never counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCounts {
    max_module: u16,
    max_channel: u16,
    counts: Vec<u64>,
}

impl ChannelCounts {
    /// Creates a zeroed table for modules `0..=max_module` and channels
    /// `0..=max_channel`.
    pub fn new(max_module: u16, max_channel: u16) -> Self {
        let size = (max_module as usize + 1) * (max_channel as usize + 1);
        Self {
            max_module,
            max_channel,
            counts: vec![0; size],
        }
    }

    #[inline]
    fn index(&self, module: u16, channel: u16) -> Option<usize> {
        if module > self.max_module || channel > self.max_channel {
            return None;
        }
        Some(module as usize * (self.max_channel as usize + 1) + channel as usize)
    }

    /// Returns true if the pair lies within the table bounds.
    #[inline]
    pub fn in_bounds(&self, module: u16, channel: u16) -> bool {
        self.index(module, channel).is_some()
    }

    /// Counts one hit. Returns false, leaving the table untouched, when the
    /// pair is out of bounds.
    #[inline]
    pub fn increment(&mut self, module: u16, channel: u16) -> bool {
        match self.index(module, channel) {
            Some(idx) => {
                self.counts[idx] += 1;
                true
            }
            None => false,
        }
    }

    /// Count for one pair, `None` when out of bounds.
    pub fn get(&self, module: u16, channel: u16) -> Option<u64> {
        self.index(module, channel).map(|idx| self.counts[idx])
    }

    /// Sum over all channels.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    pub fn max_module(&self) -> u16 {
        self.max_module
    }

    pub fn max_channel(&self) -> u16 {
        self.max_channel
    }

    /// Iterates over every (module, channel, count), module-major.
    pub fn iter(&self) -> impl Iterator<Item = (u16, u16, u64)> + '_ {
        let per_module = self.max_channel as usize + 1;
        self.counts.iter().enumerate().map(move |(idx, &count)| {
            (
                (idx / per_module) as u16,
                (idx % per_module) as u16,
                count,
            )
        })
    }

    /// Zeroes every counter.
    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
    }

    /// Returns true if no hit has been counted.
    pub fn is_zero(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }
}
