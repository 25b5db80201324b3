//! Envelope construction from normalized fields.

use crate::normalize::NormalizedFields;
use roundscope_types::{Envelope, Phase, UNKNOWN_SENDER, SCHEMA_VERSION};

/// An envelope together with the correlation metadata the round table needs
/// to route it. The metadata never reaches the wire; `seq` on the envelope
/// is the collapsed `order | rank | 0` value.
#[derive(Debug, Clone)]
pub struct RoutableEvent {
    pub envelope: Envelope,
    pub phase: Phase,
    pub order: Option<i64>,
    pub rank: Option<i64>,
    pub message_index: Option<i64>,
}

/// Build a routable envelope from normalized fields, or discard the record
/// if its kind is outside the closed phase mapping. The discard is
/// intentional noise filtering, not an error.
pub fn build_envelope(
    fields: NormalizedFields,
    sid: &str,
    now_micros: u64,
) -> Option<RoutableEvent> {
    let phase = Phase::from_kind(&fields.kind)?;

    let envelope = Envelope {
        schema_ver: SCHEMA_VERSION,
        kind: phase.into(),
        ts: fields.timestamp.unwrap_or(now_micros),
        sid: sid.to_string(),
        eid: 0,
        view: fields.view.unwrap_or(0),
        seq: fields.order.or(fields.rank).unwrap_or(0),
        from: fields.participant.unwrap_or(UNKNOWN_SENDER),
        to: fields.receiver.map(|r| vec![r]).unwrap_or_default(),
        data: fields.raw_body,
    };

    Some(RoutableEvent {
        envelope,
        phase,
        order: fields.order,
        rank: fields.rank,
        message_index: fields.message_index,
    })
}
