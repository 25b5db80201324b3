//! Identifier-pair mapping between the two round identifier spaces.
//!
//! A round is identified by a client-assigned `rank` before its protocol
//! `order` is known, and by `order` on messages that never echo the rank.
//! Only PrePrepare and Reply carry both, so the pair tables are built
//! exclusively from those kinds. The tables are round-scoped and cleared on
//! every round boundary.

use std::collections::HashMap;

/// Bidirectional order/rank mapping for the round in flight.
///
/// Invariant: the two tables are always mutual inverses, and a recorded
/// pair is never altered until the tables are cleared.
#[derive(Debug, Default)]
pub struct IdentifierMap {
    order_to_rank: HashMap<i64, i64>,
    rank_to_order: HashMap<i64, i64>,
}

impl IdentifierMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an identifier pair, first writer wins.
    ///
    /// Returns the authoritative pair: if either identifier was already
    /// mapped, the existing pair stands and is returned unchanged; only a
    /// pair of two unmapped identifiers is inserted.
    pub fn record_pair(&mut self, order: i64, rank: i64) -> (i64, i64) {
        if let Some(&existing_rank) = self.order_to_rank.get(&order) {
            return (order, existing_rank);
        }
        if let Some(&existing_order) = self.rank_to_order.get(&rank) {
            return (existing_order, rank);
        }
        self.order_to_rank.insert(order, rank);
        self.rank_to_order.insert(rank, order);
        (order, rank)
    }

    pub fn order_for_rank(&self, rank: i64) -> Option<i64> {
        self.rank_to_order.get(&rank).copied()
    }

    pub fn rank_for_order(&self, order: i64) -> Option<i64> {
        self.order_to_rank.get(&order).copied()
    }

    /// Drop all recorded pairs. Called on round boundaries and session
    /// resets; orders and ranks are only unique within one run.
    pub fn clear(&mut self) {
        self.order_to_rank.clear();
        self.rank_to_order.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.order_to_rank.is_empty()
    }
}
