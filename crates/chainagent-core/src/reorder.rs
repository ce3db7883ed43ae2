//! Bounded re-order window for live block delivery.
//!
//! Subscriptions may deliver blocks out of order. The window holds early
//! arrivals until the gap before them is filled, or until it holds more than
//! `capacity` blocks, in which case the oldest held block is released and the
//! gap is given up. Blocks at or below the last released number are dropped.

use std::collections::BTreeMap;

use crate::types::Block;

pub struct ReorderWindow {
    capacity: usize,
    pending: BTreeMap<u64, Block>,
    last_released: Option<u64>,
}

impl ReorderWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            pending: BTreeMap::new(),
            last_released: None,
        }
    }

    /// Accept a block and return the blocks that can now be delivered, in order.
    pub fn push(&mut self, block: Block) -> Vec<Block> {
        let number = block.number;
        if let Some(last) = self.last_released {
            if number <= last {
                tracing::warn!(block = number, last_delivered = last, "dropping stale live block");
                return vec![];
            }
        }
        if self.pending.contains_key(&number) {
            tracing::warn!(block = number, "dropping duplicate live block");
            return vec![];
        }

        // The first block of a run fixes the starting offset.
        if self.last_released.is_none() && self.pending.is_empty() {
            self.last_released = Some(number);
            return vec![block];
        }

        self.pending.insert(number, block);
        let mut ready = self.release_contiguous();
        while self.pending.len() > self.capacity {
            if let Some((number, block)) = self.pending.pop_first() {
                tracing::warn!(
                    block = number,
                    after = ?self.last_released,
                    "re-order window full, skipping missing blocks"
                );
                self.last_released = Some(number);
                ready.push(block);
            }
            ready.extend(self.release_contiguous());
        }
        ready
    }

    /// Release everything still held, in order (end of subscription).
    pub fn drain(&mut self) -> Vec<Block> {
        let blocks: Vec<Block> = std::mem::take(&mut self.pending).into_values().collect();
        if let Some(last) = blocks.last() {
            self.last_released = Some(last.number);
        }
        blocks
    }

    /// Number of blocks held back.
    pub fn held(&self) -> usize {
        self.pending.len()
    }

    pub fn last_released(&self) -> Option<u64> {
        self.last_released
    }

    fn release_contiguous(&mut self) -> Vec<Block> {
        let mut ready = Vec::new();
        while let Some(last) = self.last_released {
            match self.pending.remove(&(last + 1)) {
                Some(block) => {
                    self.last_released = Some(block.number);
                    ready.push(block);
                }
                None => break,
            }
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(number: u64) -> Block {
        Block {
            number,
            hash: format!("0x{number}"),
            parent_hash: format!("0x{}", number.saturating_sub(1)),
            timestamp: (number * 12) as i64,
            transactions: vec![],
            synthetic: false,
        }
    }

    fn numbers(blocks: Vec<Block>) -> Vec<u64> {
        blocks.into_iter().map(|b| b.number).collect()
    }

    #[test]
    fn in_order_passes_through() {
        let mut w = ReorderWindow::new(4);
        assert_eq!(numbers(w.push(b(10))), vec![10]);
        assert_eq!(numbers(w.push(b(11))), vec![11]);
        assert_eq!(numbers(w.push(b(12))), vec![12]);
        assert_eq!(w.held(), 0);
    }

    #[test]
    fn restores_order_within_window() {
        let mut w = ReorderWindow::new(4);
        w.push(b(10));
        assert!(w.push(b(12)).is_empty());
        assert!(w.push(b(13)).is_empty());
        assert_eq!(numbers(w.push(b(11))), vec![11, 12, 13]);
    }

    #[test]
    fn drops_stale_and_duplicate_blocks() {
        let mut w = ReorderWindow::new(4);
        w.push(b(10));
        w.push(b(11));
        assert!(w.push(b(9)).is_empty());
        assert!(w.push(b(11)).is_empty());
        assert!(w.push(b(13)).is_empty());
        assert!(w.push(b(13)).is_empty());
        assert_eq!(w.held(), 1);
    }

    #[test]
    fn full_window_gives_up_gap() {
        let mut w = ReorderWindow::new(2);
        w.push(b(10));
        assert!(w.push(b(12)).is_empty());
        assert!(w.push(b(13)).is_empty());
        // Third held block overflows the window; 11 is abandoned.
        assert_eq!(numbers(w.push(b(14))), vec![12, 13, 14]);
        assert!(w.push(b(11)).is_empty());
    }

    #[test]
    fn drain_releases_in_order() {
        let mut w = ReorderWindow::new(8);
        w.push(b(1));
        w.push(b(5));
        w.push(b(3));
        assert_eq!(numbers(w.drain()), vec![3, 5]);
        assert_eq!(w.last_released(), Some(5));
    }
}
