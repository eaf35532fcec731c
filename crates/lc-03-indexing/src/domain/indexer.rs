//! The synchronization contract every index follows.

use super::errors::IndexError;
use shared_types::{Block, ChainEntry, CoinView};

/// An index fed main-chain blocks in height order.
///
/// `view` holds the coins the block spent, as emitted with the chain's
/// connect and disconnect events.
pub trait BlockIndexer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Height of the last indexed block, `None` before the first one.
    fn synced_height(&self) -> Option<u32>;

    fn index_block(
        &mut self,
        entry: &ChainEntry,
        block: &Block,
        view: &CoinView,
    ) -> Result<(), IndexError>;

    /// Drops everything indexed above `height`.
    fn rollback(&mut self, height: u32);

    /// Removes the block at the indexed tip.
    fn unindex_block(&mut self, entry: &ChainEntry) -> Result<(), IndexError> {
        if self.synced_height() != Some(entry.height) {
            return Err(IndexError::NotIndexedTip {
                index: self.name(),
                height: entry.height,
            });
        }
        match entry.height.checked_sub(1) {
            Some(below) => self.rollback(below),
            None => self.clear(),
        }
        Ok(())
    }

    /// Drops everything, including height zero.
    fn clear(&mut self);

    /// Rejects blocks that do not directly follow the indexed tip.
    fn check_next(&self, entry: &ChainEntry) -> Result<(), IndexError> {
        let expected = self.synced_height().map_or(entry.height, |h| h + 1);
        if entry.height != expected {
            return Err(IndexError::HeightMismatch {
                index: self.name(),
                expected,
                actual: entry.height,
            });
        }
        Ok(())
    }
}
