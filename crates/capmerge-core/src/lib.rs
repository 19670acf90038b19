//! Capmerge core library for merging packet captures.
//!
//! This crate implements the streaming merge used by the CLI: each input
//! capture feeds a record source, a timestamp-keyed min-heap schedules the
//! globally earliest pending record, and accepted records are handed to the
//! output sink in chronological order. Acceptance rules are concentrated in
//! one policy function so that corrupt files, corrupt records, and clock
//! skew degrade a merge instead of aborting it. Memory stays bounded by the
//! number of open inputs, never by their size.
//!
//! Invariants:
//! - The heap holds at most one pending record per still-active source.
//! - Output timestamps are non-decreasing across accepted records.
//! - Per-source and per-record failures never abort a run; only sink
//!   construction can, and that happens before the engine starts.
//!
//! Version française (résumé):
//! Cette crate fournit le cœur de fusion : sources -> ordonnanceur à tas
//! minimal -> politique d'acceptation -> puits de sortie. Les règles
//! d'acceptation sont centralisées dans la politique, les E/S restent dans
//! `source` et `sink`. La mémoire est bornée par le nombre d'entrées
//! ouvertes ; les erreurs par fichier ou par enregistrement n'interrompent
//! jamais la fusion.
//!
//! # Examples
//! ```no_run
//! use std::fs::File;
//! use std::path::PathBuf;
//!
//! use capmerge_core::{MergeOptions, PcapSink, merge_files};
//!
//! let inputs = vec![PathBuf::from("first.pcap"), PathBuf::from("second.pcap")];
//! let mut sink = PcapSink::new(File::create("merged.pcap")?);
//! let report = merge_files(&inputs, &mut sink, &MergeOptions::default(), |_event| {});
//! println!("merged {} records", report.records_written);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use serde::{Deserialize, Serialize};

mod merge;
mod sink;
mod source;

pub use merge::{
    DropReason, MergeEvent, MergeOptions, TOLERANCE_WINDOW_NANOS, merge_files, merge_sources,
};
pub use pcap_parser::Linktype;
pub use sink::{PcapSink, RecordSink, SinkError};
pub use source::{PcapFileSource, RecordSource, SourceError};

/// Default ceiling for a record's captured length, in bytes.
///
/// Doubles as the snap length written to the output file header.
pub const DEFAULT_MAX_RECORD_LEN: u32 = 262_144;

/// One decoded capture record.
///
/// # Examples
/// ```
/// use capmerge_core::{CaptureMeta, Linktype, Record};
///
/// let record = Record {
///     ts_nanos: 1_700_000_000_000_000_000,
///     meta: CaptureMeta {
///         caplen: 4,
///         origlen: 4,
///         link_type: Linktype::ETHERNET,
///     },
///     data: vec![0xde, 0xad, 0xbe, 0xef],
/// };
/// assert_eq!(record.data.len(), record.meta.caplen as usize);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Capture time in nanoseconds since the Unix epoch.
    pub ts_nanos: i64,
    /// Framing metadata needed to re-encode the record.
    pub meta: CaptureMeta,
    /// Raw captured bytes.
    pub data: Vec<u8>,
}

/// Framing metadata carried alongside a record's payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureMeta {
    /// Captured length in bytes.
    pub caplen: u32,
    /// Original on-the-wire length in bytes.
    pub origlen: u32,
    /// Link type of the capture this record came from.
    pub link_type: Linktype,
}

/// Aggregated result of one merge run.
///
/// Counters are totals; per-record detail flows through [`MergeEvent`]
/// while the run is in progress.
///
/// # Examples
/// ```
/// use capmerge_core::{DropCounts, MergeReport, ToolInfo};
///
/// let report = MergeReport {
///     tool: ToolInfo {
///         name: "capmerge".to_string(),
///         version: "0.1.0".to_string(),
///     },
///     sources: Vec::new(),
///     records_written: 0,
///     write_failures: 0,
///     drops: DropCounts::default(),
///     output_link_type: 0,
///     total_input_bytes: 0,
/// };
/// assert_eq!(report.drops.total(), 0);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeReport {
    /// Tool identification metadata.
    pub tool: ToolInfo,
    /// Per-source outcomes, in input order.
    pub sources: Vec<SourceReport>,
    /// Records successfully written to the sink.
    pub records_written: u64,
    /// Records the sink rejected; the merge proceeded past them.
    pub write_failures: u64,
    /// Dropped-record counters by reason.
    pub drops: DropCounts,
    /// Link type written to the output header (raw link-layer value).
    pub output_link_type: i32,
    /// Combined size of all inputs that opened, in bytes.
    pub total_input_bytes: u64,
}

/// Tool metadata embedded in reports.
///
/// # Examples
/// ```
/// use capmerge_core::ToolInfo;
///
/// let tool = ToolInfo {
///     name: "capmerge".to_string(),
///     version: "0.1.0".to_string(),
/// };
/// assert_eq!(tool.name, "capmerge");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name (e.g., "capmerge").
    pub name: String,
    /// Tool version (semver).
    pub version: String,
}

/// Per-source outcome embedded in a [`MergeReport`].
///
/// # Examples
/// ```
/// use capmerge_core::{SourceReport, SourceStatus};
///
/// let source = SourceReport {
///     path: "first.pcap".to_string(),
///     bytes: 1024,
///     status: SourceStatus::Merged,
///     error: None,
///     records_merged: 10,
///     records_dropped: 0,
/// };
/// assert!(matches!(source.status, SourceStatus::Merged));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceReport {
    /// Input path (or label) as provided to the engine.
    pub path: String,
    /// Input size in bytes, zero when unknown.
    pub bytes: u64,
    /// How this source ended.
    pub status: SourceStatus,
    /// Why the source was skipped or failed, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Records from this source emitted to the sink.
    pub records_merged: u64,
    /// Records from this source rejected by the acceptance rules.
    pub records_dropped: u64,
}

/// How a source ended its participation in a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Consumed to end of stream.
    Merged,
    /// Contributed nothing: unopenable, unreadable, or empty.
    Skipped,
    /// Contributed records, then hit an unrecoverable decode error.
    Failed,
}

/// Dropped-record counters, one per rejection reason.
///
/// # Examples
/// ```
/// use capmerge_core::DropCounts;
///
/// let drops = DropCounts {
///     stale_timestamp: 2,
///     empty_payload: 1,
///     oversized: 0,
///     bad_capture_length: 0,
/// };
/// assert_eq!(drops.total(), 3);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DropCounts {
    /// Records more than the tolerance window behind the last merged one.
    pub stale_timestamp: u64,
    /// Records with zero-length payloads.
    pub empty_payload: u64,
    /// Records whose captured length exceeded the configured ceiling.
    pub oversized: u64,
    /// Records whose captured length exceeded their original length.
    pub bad_capture_length: u64,
}

impl DropCounts {
    /// Total records dropped across all reasons.
    pub fn total(&self) -> u64 {
        self.stale_timestamp + self.empty_payload + self.oversized + self.bad_capture_length
    }
}
