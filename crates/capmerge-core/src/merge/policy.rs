//! Per-record acceptance rules.
//!
//! Every record pulled from a source passes through [`evaluate`] before it
//! may enter the pending heap. Rules are checked in a fixed order, so a
//! record that is both oversized and stale reports as oversized.

use std::fmt;

use time::{OffsetDateTime, format_description::well_known::Rfc3339};

use crate::Record;

/// How far a record may lag behind the newest accepted timestamp before
/// it is considered stale: one hour, in nanoseconds.
pub const TOLERANCE_WINDOW_NANOS: i64 = 3_600_000_000_000;

/// Outcome of evaluating one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Verdict {
    Accept,
    Drop(DropReason),
}

/// Why a record was dropped instead of merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// The record's timestamp lags more than [`TOLERANCE_WINDOW_NANOS`]
    /// behind the newest timestamp already sent to the sink.
    StaleTimestamp {
        ts_nanos: i64,
        last_accepted_nanos: i64,
    },
    /// The record carries no payload bytes.
    EmptyPayload,
    /// The captured length exceeds the configured record ceiling.
    Oversized { caplen: u32, limit: u32 },
    /// The captured length exceeds the original wire length, which no
    /// well-formed capture produces.
    BadCaptureLength { caplen: u32, origlen: u32 },
}

/// Decide whether `record` may be merged.
///
/// `last_accepted_nanos` is the newest timestamp already sent to the sink,
/// if any. `init_read` marks the very first read of a source, where the
/// staleness rule does not apply: the merge baseline is still being
/// established at that point.
pub(crate) fn evaluate(
    record: &Record,
    last_accepted_nanos: Option<i64>,
    init_read: bool,
    max_record_len: u32,
) -> Verdict {
    if record.meta.caplen > max_record_len {
        return Verdict::Drop(DropReason::Oversized {
            caplen: record.meta.caplen,
            limit: max_record_len,
        });
    }
    if record.meta.caplen > record.meta.origlen {
        return Verdict::Drop(DropReason::BadCaptureLength {
            caplen: record.meta.caplen,
            origlen: record.meta.origlen,
        });
    }
    if !init_read {
        if let Some(last) = last_accepted_nanos {
            if record.ts_nanos.saturating_add(TOLERANCE_WINDOW_NANOS) < last {
                return Verdict::Drop(DropReason::StaleTimestamp {
                    ts_nanos: record.ts_nanos,
                    last_accepted_nanos: last,
                });
            }
        }
    }
    if record.data.is_empty() {
        return Verdict::Drop(DropReason::EmptyPayload);
    }
    Verdict::Accept
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::StaleTimestamp {
                ts_nanos,
                last_accepted_nanos,
            } => write!(
                f,
                "illegal timestamp {} - more than an hour before the last merged timestamp {}",
                ts_to_rfc3339(*ts_nanos),
                ts_to_rfc3339(*last_accepted_nanos),
            ),
            DropReason::EmptyPayload => write!(f, "empty record data"),
            DropReason::Oversized { caplen, limit } => {
                write!(f, "capture length {caplen} exceeds snap length {limit}")
            }
            DropReason::BadCaptureLength { caplen, origlen } => write!(
                f,
                "capture length {caplen} exceeds original packet length {origlen}"
            ),
        }
    }
}

fn ts_to_rfc3339(ts_nanos: i64) -> String {
    OffsetDateTime::from_unix_timestamp_nanos(ts_nanos as i128)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
        .unwrap_or_else(|| format!("{ts_nanos}ns"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CaptureMeta;
    use pcap_parser::Linktype;

    const MAX: u32 = 262_144;

    fn record(ts_nanos: i64, caplen: u32, origlen: u32, payload_len: usize) -> Record {
        Record {
            ts_nanos,
            meta: CaptureMeta {
                caplen,
                origlen,
                link_type: Linktype::ETHERNET,
            },
            data: vec![0xab; payload_len],
        }
    }

    #[test]
    fn accepts_record_within_tolerance() {
        let r = record(1_000, 60, 60, 60);
        assert_eq!(evaluate(&r, Some(500_000), false, MAX), Verdict::Accept);
    }

    #[test]
    fn accepts_record_exactly_one_hour_behind() {
        let last = 2 * TOLERANCE_WINDOW_NANOS;
        let r = record(last - TOLERANCE_WINDOW_NANOS, 60, 60, 60);
        assert_eq!(evaluate(&r, Some(last), false, MAX), Verdict::Accept);
    }

    #[test]
    fn drops_record_more_than_one_hour_behind() {
        let last = 2 * TOLERANCE_WINDOW_NANOS;
        let ts = last - TOLERANCE_WINDOW_NANOS - 1;
        let r = record(ts, 60, 60, 60);
        assert_eq!(
            evaluate(&r, Some(last), false, MAX),
            Verdict::Drop(DropReason::StaleTimestamp {
                ts_nanos: ts,
                last_accepted_nanos: last,
            })
        );
    }

    #[test]
    fn staleness_does_not_apply_on_first_read() {
        let last = 2 * TOLERANCE_WINDOW_NANOS;
        let r = record(0, 60, 60, 60);
        assert_eq!(evaluate(&r, Some(last), true, MAX), Verdict::Accept);
    }

    #[test]
    fn staleness_does_not_apply_before_any_acceptance() {
        let r = record(0, 60, 60, 60);
        assert_eq!(evaluate(&r, None, false, MAX), Verdict::Accept);
    }

    #[test]
    fn drops_empty_payload_even_on_first_read() {
        let r = record(1_000, 0, 0, 0);
        assert_eq!(
            evaluate(&r, None, true, MAX),
            Verdict::Drop(DropReason::EmptyPayload)
        );
    }

    #[test]
    fn drops_record_over_length_ceiling() {
        let r = record(1_000, MAX + 1, MAX + 1, 16);
        assert_eq!(
            evaluate(&r, None, false, MAX),
            Verdict::Drop(DropReason::Oversized {
                caplen: MAX + 1,
                limit: MAX,
            })
        );
    }

    #[test]
    fn drops_capture_length_beyond_original_length() {
        let r = record(1_000, 128, 64, 128);
        assert_eq!(
            evaluate(&r, None, false, MAX),
            Verdict::Drop(DropReason::BadCaptureLength {
                caplen: 128,
                origlen: 64,
            })
        );
    }

    #[test]
    fn oversized_wins_over_staleness() {
        let last = 2 * TOLERANCE_WINDOW_NANOS;
        let r = record(0, MAX + 1, MAX + 1, 16);
        assert_eq!(
            evaluate(&r, Some(last), false, MAX),
            Verdict::Drop(DropReason::Oversized {
                caplen: MAX + 1,
                limit: MAX,
            })
        );
    }

    #[test]
    fn stale_message_renders_rfc3339() {
        let reason = DropReason::StaleTimestamp {
            ts_nanos: 0,
            last_accepted_nanos: 2 * TOLERANCE_WINDOW_NANOS,
        };
        let text = reason.to_string();
        assert!(text.contains("1970-01-01T00:00:00Z"), "got: {text}");
        assert!(text.contains("1970-01-01T02:00:00Z"), "got: {text}");
    }
}
