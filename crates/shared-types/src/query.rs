//! Address history pagination shared by the pool and the confirmed index.

use crate::entities::Hash;
use serde::{Deserialize, Serialize};

/// Options for address history queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressQuery {
    /// Maximum number of results; `None` or zero means unbounded.
    pub limit: Option<usize>,
    pub reverse: bool,
    /// Continue strictly after this transaction hash.
    pub after: Option<Hash>,
}

impl AddressQuery {
    pub fn limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn after(mut self, hash: Hash) -> Self {
        self.after = Some(hash);
        self
    }

    /// Effective bound, `None` when unbounded.
    pub fn bound(&self) -> Option<usize> {
        self.limit.filter(|l| *l > 0)
    }

    /// Same cursor with a smaller bound.
    pub fn with_limit(&self, limit: Option<usize>) -> Self {
        Self {
            limit,
            ..self.clone()
        }
    }

    /// Pages `history` (oldest first) for the given segment.
    ///
    /// A cursor the segment does not contain is assumed to point into the
    /// other segment: when that segment is iterated first the cursor has
    /// already been passed and the whole segment is returned, otherwise the
    /// cursor has not been reached yet and nothing is.
    pub fn page(&self, history: &[Hash], segment: HistorySegment) -> Vec<Hash> {
        let ordered: Vec<Hash> = match (self.after, self.reverse) {
            (None, false) => history.to_vec(),
            (None, true) => history.iter().rev().copied().collect(),
            (Some(after), reverse) => match history.iter().position(|h| *h == after) {
                Some(pos) if !reverse => history[pos + 1..].to_vec(),
                Some(pos) => history[..pos].iter().rev().copied().collect(),
                None if segment.other_comes_first(reverse) => {
                    if reverse {
                        history.iter().rev().copied().collect()
                    } else {
                        history.to_vec()
                    }
                }
                None => Vec::new(),
            },
        };
        match self.bound() {
            Some(limit) => ordered.into_iter().take(limit).collect(),
            None => ordered,
        }
    }
}

/// Which half of an address history a page is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistorySegment {
    /// Confirmed transactions, older than anything pending.
    Confirmed,
    /// Pool transactions, newer than anything confirmed.
    Pending,
}

impl HistorySegment {
    fn other_comes_first(self, reverse: bool) -> bool {
        match self {
            HistorySegment::Confirmed => reverse,
            HistorySegment::Pending => !reverse,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(n: u8) -> Hash {
        [n; 32]
    }

    #[test]
    fn test_forward_and_reverse_limits() {
        let history = [h(1), h(2), h(3)];
        let q = AddressQuery::limit(2);
        assert_eq!(q.page(&history, HistorySegment::Confirmed), vec![h(1), h(2)]);
        assert_eq!(
            q.reversed().page(&history, HistorySegment::Confirmed),
            vec![h(3), h(2)]
        );
    }

    #[test]
    fn test_zero_limit_is_unbounded() {
        let history = [h(1), h(2), h(3)];
        let q = AddressQuery::limit(0);
        assert_eq!(q.page(&history, HistorySegment::Pending).len(), 3);
    }

    #[test]
    fn test_known_cursor_continues_past_it() {
        let history = [h(1), h(2), h(3)];
        let forward = AddressQuery::default().after(h(2));
        assert_eq!(forward.page(&history, HistorySegment::Confirmed), vec![h(3)]);
        let reverse = AddressQuery::default().reversed().after(h(2));
        assert_eq!(reverse.page(&history, HistorySegment::Confirmed), vec![h(1)]);
    }

    #[test]
    fn test_unknown_cursor_depends_on_segment_order() {
        let history = [h(1), h(2)];
        let forward = AddressQuery::default().after(h(9));
        assert!(forward.page(&history, HistorySegment::Confirmed).is_empty());
        assert_eq!(forward.page(&history, HistorySegment::Pending), vec![h(1), h(2)]);

        let reverse = AddressQuery::default().reversed().after(h(9));
        assert_eq!(
            reverse.page(&history, HistorySegment::Confirmed),
            vec![h(2), h(1)]
        );
        assert!(reverse.page(&history, HistorySegment::Pending).is_empty());
    }
}
