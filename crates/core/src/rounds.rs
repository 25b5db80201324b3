//! Round buffers, boundary detection, and flush policy.
//!
//! This module owns the hard coupled core of the monitor: routing each
//! inbound event to the buffer of the round it belongs to (resolving the
//! two-identifier ambiguity online), deciding when a round is complete or
//! abandoned, and draining buffers in a deterministic order.

use crate::build::RoutableEvent;
use crate::correlate::IdentifierMap;
use roundscope_types::{CorrelationKey, Envelope, Phase};
use std::collections::HashMap;
use tracing::warn;

/// Why a buffer was flushed. Carried on every [`Flush`] and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Boundary detection saw a new round begin.
    Boundary,
    /// A different final key became active.
    KeySwitch,
    /// No new event arrived within the idle window.
    IdleTimeout,
    /// Capacity ceiling reached; oldest buffer evicted.
    EvictOldest,
    /// Control epoch advanced; all round-scoped state discarded.
    SessionReset,
    /// Engine is terminating; draining is not optional.
    Shutdown,
}

impl FlushReason {
    /// Number of distinct reasons.
    pub const COUNT: usize = 6;

    /// All reasons, indexable by [`FlushReason::index`].
    pub const ALL: [FlushReason; Self::COUNT] = [
        FlushReason::Boundary,
        FlushReason::KeySwitch,
        FlushReason::IdleTimeout,
        FlushReason::EvictOldest,
        FlushReason::SessionReset,
        FlushReason::Shutdown,
    ];

    pub const fn index(self) -> usize {
        match self {
            FlushReason::Boundary => 0,
            FlushReason::KeySwitch => 1,
            FlushReason::IdleTimeout => 2,
            FlushReason::EvictOldest => 3,
            FlushReason::SessionReset => 4,
            FlushReason::Shutdown => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            FlushReason::Boundary => "boundary",
            FlushReason::KeySwitch => "key switch",
            FlushReason::IdleTimeout => "idle timeout",
            FlushReason::EvictOldest => "evict oldest",
            FlushReason::SessionReset => "session reset",
            FlushReason::Shutdown => "shutdown",
        }
    }
}

/// One event parked in a round buffer, with its drain-sort metadata.
#[derive(Debug, Clone)]
pub struct BufferedEvent {
    pub envelope: Envelope,
    phase_rank: u8,
    message_index: Option<i64>,
}

impl BufferedEvent {
    /// Drain-sort key: `(phase_rank, message_index | +inf, from, min(to) | -1, ts)`.
    ///
    /// Deterministic and total over event identity, so repeated drains of the
    /// same input set produce identical output order.
    fn sort_key(&self) -> (u8, i64, i64, i64, u64) {
        (
            self.phase_rank,
            self.message_index.unwrap_or(i64::MAX),
            self.envelope.from,
            self.envelope.to.iter().copied().min().unwrap_or(-1),
            self.envelope.ts,
        )
    }
}

/// Per-key accumulator for a round in progress.
#[derive(Debug)]
struct RoundBuffer {
    events: Vec<BufferedEvent>,
    first_seen: u64,
    last_seen: u64,
}

impl RoundBuffer {
    fn new(now: u64) -> Self {
        Self {
            events: Vec::new(),
            first_seen: now,
            last_seen: now,
        }
    }

    fn push(&mut self, event: BufferedEvent, now: u64) {
        self.events.push(event);
        self.last_seen = self.last_seen.max(now);
    }

    /// Merge another buffer into this one: concatenate events, keep the
    /// earliest `first_seen` and latest `last_seen`.
    fn absorb(&mut self, mut other: RoundBuffer) {
        self.events.append(&mut other.events);
        self.first_seen = self.first_seen.min(other.first_seen);
        self.last_seen = self.last_seen.max(other.last_seen);
    }

    fn drain_sorted(mut self) -> Vec<BufferedEvent> {
        self.events.sort_by_key(BufferedEvent::sort_key);
        self.events
    }
}

/// A drained buffer: its key, why it was flushed, and its events in drain
/// order.
#[derive(Debug)]
pub struct Flush {
    pub key: CorrelationKey,
    pub reason: FlushReason,
    pub events: Vec<BufferedEvent>,
}

/// Outcome of routing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    /// Appended to the buffer under this key.
    Buffered(CorrelationKey),
    /// No identifiers and no active round; reported and dropped.
    Unroutable,
}

/// The live buffer table plus the boundary-detection state carried across
/// the stream.
#[derive(Debug)]
pub struct RoundTable {
    buffers: HashMap<CorrelationKey, RoundBuffer>,
    ids: IdentifierMap,
    last_order: Option<i64>,
    last_rank: Option<i64>,
    active_final: Option<CorrelationKey>,
    idle_timeout_micros: u64,
    max_live_buffers: usize,
}

impl RoundTable {
    pub fn new(idle_timeout_micros: u64, max_live_buffers: usize) -> Self {
        Self {
            buffers: HashMap::new(),
            ids: IdentifierMap::new(),
            last_order: None,
            last_rank: None,
            active_final: None,
            idle_timeout_micros,
            max_live_buffers: max_live_buffers.max(1),
        }
    }

    /// Route one event into its round buffer.
    ///
    /// Returns any flushes the routing triggered (boundary, key switch,
    /// capacity eviction) in completion order, plus where the event landed.
    pub fn route(&mut self, event: RoutableEvent, now: u64) -> (Vec<Flush>, Routed) {
        let mut flushes = Vec::new();

        if self.is_round_boundary(&event) {
            if let Some(key) = self.active_final.take() {
                self.flush_key(key, FlushReason::Boundary, &mut flushes);
            }
            // Orders and ranks are only unique within one run; the pair
            // tables are round-scoped.
            self.ids.clear();
        }
        if let Some(order) = event.order {
            self.last_order = Some(order);
        }
        if let Some(rank) = event.rank {
            self.last_rank = Some(rank);
        }

        let Some(target) = self.resolve_key(&event) else {
            warn!(
                phase = event.phase.type_name(),
                from = event.envelope.from,
                "record carries no identifiers and no round is active; dropped"
            );
            return (flushes, Routed::Unroutable);
        };

        if target.is_final() && self.active_final != Some(target) {
            if let Some(previous) = self.active_final.replace(target) {
                self.flush_key(previous, FlushReason::KeySwitch, &mut flushes);
            }
        }

        if !self.buffers.contains_key(&target) && self.buffers.len() >= self.max_live_buffers {
            self.evict_oldest(&mut flushes);
        }

        let buffer = self
            .buffers
            .entry(target)
            .or_insert_with(|| RoundBuffer::new(now));
        buffer.push(
            BufferedEvent {
                phase_rank: event.phase.rank(),
                message_index: event.message_index,
                envelope: event.envelope,
            },
            now,
        );

        (flushes, Routed::Buffered(target))
    }

    /// Flush every buffer idle for longer than the configured window.
    pub fn take_idle(&mut self, now: u64) -> Vec<Flush> {
        let mut idle_keys: Vec<(u64, CorrelationKey)> = self
            .buffers
            .iter()
            .filter(|(_, buffer)| now.saturating_sub(buffer.last_seen) > self.idle_timeout_micros)
            .map(|(key, buffer)| (buffer.last_seen, *key))
            .collect();
        // FIFO by how long ago the buffer went quiet.
        idle_keys.sort_by_key(|(last_seen, _)| *last_seen);

        let mut flushes = Vec::new();
        for (_, key) in idle_keys {
            self.flush_key(key, FlushReason::IdleTimeout, &mut flushes);
        }
        flushes
    }

    /// Flush everything and clear all round-scoped state. Used when the
    /// control epoch advances.
    pub fn reset(&mut self) -> Vec<Flush> {
        let flushes = self.drain_with(FlushReason::SessionReset);
        self.ids.clear();
        self.last_order = None;
        self.last_rank = None;
        self.active_final = None;
        flushes
    }

    /// Flush everything for engine termination. Draining is not optional.
    pub fn drain_all(&mut self) -> Vec<Flush> {
        self.drain_with(FlushReason::Shutdown)
    }

    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    pub fn active_final(&self) -> Option<CorrelationKey> {
        self.active_final
    }

    /// A new round has begun if the triggering kind sees its identifier
    /// change against the last-seen values.
    fn is_round_boundary(&self, event: &RoutableEvent) -> bool {
        let order_changed = event
            .order
            .is_some_and(|o| self.last_order.is_some_and(|last| last != o));
        let rank_changed = event
            .rank
            .is_some_and(|r| self.last_rank.is_some_and(|last| last != r));
        match event.phase {
            Phase::ClientRequest => rank_changed,
            Phase::PrePrepare | Phase::Reply => order_changed || rank_changed,
            Phase::Prepare | Phase::Commit => order_changed,
        }
    }

    /// Resolve the correlation key for an event, merging provisional buffers
    /// into final ones as identifier knowledge improves.
    fn resolve_key(&mut self, event: &RoutableEvent) -> Option<CorrelationKey> {
        match (event.phase, event.order, event.rank) {
            // PrePrepare/Reply carrying both identifiers: record the pair
            // (first writer wins) and collapse both pending buffers.
            (Phase::PrePrepare | Phase::Reply, Some(order), Some(rank)) => {
                let (order, rank) = self.ids.record_pair(order, rank);
                let key = CorrelationKey::Final { order, rank };
                self.merge_into(key, CorrelationKey::PendingRank(rank));
                self.merge_into(key, CorrelationKey::PendingOrder(order));
                Some(key)
            }
            // Rank routing: ClientRequest always, PrePrepare/Reply missing
            // their order.
            (Phase::ClientRequest, _, Some(rank))
            | (Phase::PrePrepare | Phase::Reply, None, Some(rank)) => {
                Some(match self.ids.order_for_rank(rank) {
                    Some(order) => {
                        let key = CorrelationKey::Final { order, rank };
                        self.merge_into(key, CorrelationKey::PendingRank(rank));
                        key
                    }
                    None => CorrelationKey::PendingRank(rank),
                })
            }
            // Order routing: Prepare/Commit always (a nested rank on their
            // wrapped payload is not theirs to introduce), PrePrepare/Reply
            // missing their rank.
            (Phase::Prepare | Phase::Commit, Some(order), _)
            | (Phase::PrePrepare | Phase::Reply, Some(order), None) => {
                Some(match self.ids.rank_for_order(order) {
                    Some(rank) => {
                        let key = CorrelationKey::Final { order, rank };
                        self.merge_into(key, CorrelationKey::PendingOrder(order));
                        key
                    }
                    None => CorrelationKey::PendingOrder(order),
                })
            }
            // No usable identifier: fall back to the active round.
            _ => self.active_final,
        }
    }

    /// Merge the buffer under `source` into the buffer under `target`.
    /// Idempotent: merging a key into itself, or a key with no live buffer,
    /// is a no-op.
    fn merge_into(&mut self, target: CorrelationKey, source: CorrelationKey) {
        if target == source {
            return;
        }
        let Some(source_buffer) = self.buffers.remove(&source) else {
            return;
        };
        match self.buffers.get_mut(&target) {
            Some(target_buffer) => target_buffer.absorb(source_buffer),
            None => {
                self.buffers.insert(target, source_buffer);
            }
        }
    }

    /// Flush the buffer with the globally oldest `first_seen`.
    fn evict_oldest(&mut self, flushes: &mut Vec<Flush>) {
        let oldest = self
            .buffers
            .iter()
            .min_by_key(|(_, buffer)| buffer.first_seen)
            .map(|(key, _)| *key);
        if let Some(key) = oldest {
            self.flush_key(key, FlushReason::EvictOldest, flushes);
        }
    }

    fn flush_key(&mut self, key: CorrelationKey, reason: FlushReason, flushes: &mut Vec<Flush>) {
        if let Some(buffer) = self.buffers.remove(&key) {
            flushes.push(Flush {
                key,
                reason,
                events: buffer.drain_sorted(),
            });
        }
    }

    fn drain_with(&mut self, reason: FlushReason) -> Vec<Flush> {
        let mut keys: Vec<(u64, CorrelationKey)> = self
            .buffers
            .iter()
            .map(|(key, buffer)| (buffer.first_seen, *key))
            .collect();
        keys.sort_by_key(|(first_seen, _)| *first_seen);

        let mut flushes = Vec::new();
        for (_, key) in keys {
            self.flush_key(key, reason, &mut flushes);
        }
        flushes
    }
}
