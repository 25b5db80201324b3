//! Protocol phases and emitted event kinds.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// The five protocol message kinds in their fixed execution order.
///
/// The rank ordering defines the deterministic drain order within a round:
/// `ClientRequest < PrePrepare < Prepare < Commit < Reply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    ClientRequest,
    PrePrepare,
    Prepare,
    Commit,
    Reply,
}

impl Phase {
    /// Rank within the fixed phase total order. Lower rank drains first.
    pub const fn rank(self) -> u8 {
        match self {
            Phase::ClientRequest => 0,
            Phase::PrePrepare => 1,
            Phase::Prepare => 2,
            Phase::Commit => 3,
            Phase::Reply => 4,
        }
    }

    /// Map a raw log `kind` tag to its canonical phase.
    ///
    /// The mapping is closed: anything outside it is noise and yields `None`.
    /// `inform` is the legacy tag some replicas use for replies.
    pub fn from_kind(kind: &str) -> Option<Phase> {
        match kind.to_ascii_lowercase().as_str() {
            "request" => Some(Phase::ClientRequest),
            "preprepare" => Some(Phase::PrePrepare),
            "prepare" => Some(Phase::Prepare),
            "commit" => Some(Phase::Commit),
            "inform" | "reply" => Some(Phase::Reply),
            _ => None,
        }
    }

    /// Whether this phase carries the protocol `order` identifier.
    pub const fn carries_order(self) -> bool {
        !matches!(self, Phase::ClientRequest)
    }

    /// Whether this phase carries the client `rank` identifier.
    pub const fn carries_rank(self) -> bool {
        matches!(self, Phase::ClientRequest | Phase::PrePrepare | Phase::Reply)
    }

    /// Human-readable name, matching the wire `type` tag.
    pub const fn type_name(self) -> &'static str {
        match self {
            Phase::ClientRequest => "ClientRequest",
            Phase::PrePrepare => "PrePrepare",
            Phase::Prepare => "Prepare",
            Phase::Commit => "Commit",
            Phase::Reply => "Reply",
        }
    }
}

impl PartialOrd for Phase {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Phase {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// Everything an emitted envelope can be: the five round phases plus the
/// control events the monitor injects once per session.
///
/// Control events are not part of any round and bypass buffering entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    ClientRequest,
    PrePrepare,
    Prepare,
    Commit,
    Reply,
    SessionStart,
    PrimaryElected,
}

impl EventKind {
    /// The round phase this kind corresponds to, if any.
    pub const fn phase(self) -> Option<Phase> {
        match self {
            EventKind::ClientRequest => Some(Phase::ClientRequest),
            EventKind::PrePrepare => Some(Phase::PrePrepare),
            EventKind::Prepare => Some(Phase::Prepare),
            EventKind::Commit => Some(Phase::Commit),
            EventKind::Reply => Some(Phase::Reply),
            EventKind::SessionStart | EventKind::PrimaryElected => None,
        }
    }

    /// Whether this kind participates in round buffering.
    pub const fn is_round_phase(self) -> bool {
        self.phase().is_some()
    }
}

impl From<Phase> for EventKind {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::ClientRequest => EventKind::ClientRequest,
            Phase::PrePrepare => EventKind::PrePrepare,
            Phase::Prepare => EventKind::Prepare,
            Phase::Commit => EventKind::Commit,
            Phase::Reply => EventKind::Reply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_rank_total_order() {
        let mut phases = vec![
            Phase::Reply,
            Phase::Commit,
            Phase::ClientRequest,
            Phase::Prepare,
            Phase::PrePrepare,
        ];
        phases.sort();
        assert_eq!(
            phases,
            vec![
                Phase::ClientRequest,
                Phase::PrePrepare,
                Phase::Prepare,
                Phase::Commit,
                Phase::Reply,
            ]
        );
    }

    #[test]
    fn test_kind_mapping_is_closed() {
        assert_eq!(Phase::from_kind("request"), Some(Phase::ClientRequest));
        assert_eq!(Phase::from_kind("PrePrepare"), Some(Phase::PrePrepare));
        assert_eq!(Phase::from_kind("inform"), Some(Phase::Reply));
        assert_eq!(Phase::from_kind("reply"), Some(Phase::Reply));
        assert_eq!(Phase::from_kind("viewchange"), None);
        assert_eq!(Phase::from_kind(""), None);
    }

    #[test]
    fn test_identifier_carriage() {
        assert!(Phase::ClientRequest.carries_rank());
        assert!(!Phase::ClientRequest.carries_order());
        assert!(Phase::PrePrepare.carries_order() && Phase::PrePrepare.carries_rank());
        assert!(Phase::Prepare.carries_order() && !Phase::Prepare.carries_rank());
        assert!(Phase::Reply.carries_order() && Phase::Reply.carries_rank());
    }

    #[test]
    fn test_event_kind_serializes_as_type_tag() {
        let json = serde_json::to_string(&EventKind::PrePrepare).unwrap();
        assert_eq!(json, "\"PrePrepare\"");
        let json = serde_json::to_string(&EventKind::SessionStart).unwrap();
        assert_eq!(json, "\"SessionStart\"");
    }

    #[test]
    fn test_control_kinds_are_not_round_phases() {
        assert!(!EventKind::SessionStart.is_round_phase());
        assert!(!EventKind::PrimaryElected.is_round_phase());
        assert!(EventKind::Commit.is_round_phase());
    }
}
