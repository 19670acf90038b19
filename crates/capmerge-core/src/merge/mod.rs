//! Chronological k-way merge over any number of record sources.
//!
//! The engine owns the pending heap and all per-source cursors. At any
//! moment at most one record per live source is buffered, so memory stays
//! proportional to the number of inputs, never to their size.

use std::fs;
use std::path::PathBuf;

use pcap_parser::Linktype;

use crate::sink::{RecordSink, SinkError};
use crate::source::{PcapFileSource, RecordSource, SourceError};
use crate::{DropCounts, MergeReport, Record, SourceReport, SourceStatus, ToolInfo};

mod heap;
mod policy;

use heap::{HeapEntry, PendingHeap};
use policy::{Verdict, evaluate};

pub use policy::{DropReason, TOLERANCE_WINDOW_NANOS};

/// Tunables for a merge run.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Largest captured record length accepted into the output, also
    /// advertised as the snap length of the output header.
    pub max_record_len: u32,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            max_record_len: crate::DEFAULT_MAX_RECORD_LEN,
        }
    }
}

/// Diagnostic events reported to the observer callback while merging.
///
/// Borrowed fields point into the engine's working state and are only
/// valid for the duration of the callback.
#[derive(Debug)]
pub enum MergeEvent<'a> {
    /// An input could not be opened, or produced no mergeable record; it
    /// takes no further part in the merge.
    SourceSkipped { path: &'a str, reason: &'a str },
    /// Every input has been examined; merging starts with `sources` live
    /// streams.
    Initialized {
        sources: usize,
        total_input_bytes: u64,
    },
    /// A record was rejected by an acceptance rule.
    RecordDropped {
        path: &'a str,
        reason: &'a DropReason,
    },
    /// A source reached its end and was closed.
    SourceFinished { path: &'a str },
    /// A source failed mid-stream and was closed; records already merged
    /// from it stay in the output.
    SourceFailed { path: &'a str, reason: &'a str },
    /// The sink rejected a header or record write.
    WriteFailed { error: &'a SinkError },
}

/// Merge capture files into `sink`, returning a report of what happened.
///
/// Inputs that cannot be opened or parsed are skipped, not fatal: the merge
/// always runs to completion over whatever remains, and an all-invalid
/// input set still yields a well-formed, header-only output.
pub fn merge_files<K, F>(
    inputs: &[PathBuf],
    sink: &mut K,
    options: &MergeOptions,
    observe: F,
) -> MergeReport
where
    K: RecordSink,
    F: FnMut(MergeEvent<'_>),
{
    let prepared = inputs
        .iter()
        .map(|path| {
            let label = path.display().to_string();
            let bytes = fs::metadata(path).map(|meta| meta.len()).unwrap_or(0);
            let opened = PcapFileSource::open_with_limit(path, options.max_record_len);
            PreparedSource {
                label,
                opened,
                bytes,
            }
        })
        .collect();
    run(prepared, sink, options, observe)
}

/// Merge already-opened sources, labelled for reporting. Useful for
/// feeding the engine from something other than capture files.
pub fn merge_sources<S, K, F>(
    sources: Vec<(String, S)>,
    sink: &mut K,
    options: &MergeOptions,
    observe: F,
) -> MergeReport
where
    S: RecordSource,
    K: RecordSink,
    F: FnMut(MergeEvent<'_>),
{
    let prepared = sources
        .into_iter()
        .map(|(label, source)| PreparedSource {
            label,
            opened: Ok(source),
            bytes: 0,
        })
        .collect();
    run(prepared, sink, options, observe)
}

struct PreparedSource<S> {
    label: String,
    opened: Result<S, SourceError>,
    bytes: u64,
}

enum ReadOutcome {
    Accepted(Record),
    EndOfStream,
    Failed(SourceError),
}

fn run<S, K, F>(
    prepared: Vec<PreparedSource<S>>,
    sink: &mut K,
    options: &MergeOptions,
    mut observe: F,
) -> MergeReport
where
    S: RecordSource,
    K: RecordSink,
    F: FnMut(MergeEvent<'_>),
{
    let mut reports: Vec<SourceReport> = Vec::with_capacity(prepared.len());
    let mut slots: Vec<Option<S>> = Vec::with_capacity(prepared.len());
    let mut heap = PendingHeap::new();
    let mut drops = DropCounts::default();
    let mut resolved: Option<Linktype> = None;
    let mut baseline: Option<i64> = None;
    let mut total_input_bytes = 0u64;
    let mut records_written = 0u64;
    let mut write_failures = 0u64;

    for (index, prep) in prepared.into_iter().enumerate() {
        let mut entry = SourceReport {
            path: prep.label,
            bytes: prep.bytes,
            status: SourceStatus::Skipped,
            error: None,
            records_merged: 0,
            records_dropped: 0,
        };
        match prep.opened {
            Err(err) => {
                let reason = err.to_string();
                observe(MergeEvent::SourceSkipped {
                    path: &entry.path,
                    reason: &reason,
                });
                entry.error = Some(reason);
                slots.push(None);
            }
            Ok(mut source) => {
                total_input_bytes += entry.bytes;
                if let Some(lt) = source.link_type() {
                    resolved = fold_link_type(resolved, lt);
                }
                match read_accepted(
                    &mut source,
                    &mut entry,
                    None,
                    true,
                    options,
                    &mut drops,
                    &mut observe,
                ) {
                    ReadOutcome::Accepted(record) => {
                        // Some formats only reveal the link type once the
                        // first record has been decoded.
                        if let Some(lt) = source.link_type() {
                            resolved = fold_link_type(resolved, lt);
                        }
                        baseline = Some(match baseline {
                            Some(earliest) => earliest.min(record.ts_nanos),
                            None => record.ts_nanos,
                        });
                        heap.push(HeapEntry {
                            record,
                            source: index,
                        });
                        entry.status = SourceStatus::Merged;
                        slots.push(Some(source));
                    }
                    ReadOutcome::EndOfStream => {
                        let reason = "end of stream before the first record".to_string();
                        observe(MergeEvent::SourceSkipped {
                            path: &entry.path,
                            reason: &reason,
                        });
                        entry.error = Some(reason);
                        slots.push(None);
                    }
                    ReadOutcome::Failed(err) => {
                        let reason = format!("{err} before the first record");
                        observe(MergeEvent::SourceSkipped {
                            path: &entry.path,
                            reason: &reason,
                        });
                        entry.error = Some(reason);
                        slots.push(None);
                    }
                }
            }
        }
        reports.push(entry);
    }

    observe(MergeEvent::Initialized {
        sources: heap.len(),
        total_input_bytes,
    });

    let link_type = resolved.unwrap_or(Linktype::NULL);
    if let Err(err) = sink.write_header(options.max_record_len, link_type) {
        observe(MergeEvent::WriteFailed { error: &err });
    }

    // Seed the staleness baseline with the earliest first record, so a
    // source whose stream starts far in the past is not immediately judged
    // against a much newer one.
    let mut last_accepted = baseline;

    while let Some(popped) = heap.pop_min() {
        let index = popped.source;
        emit_record(
            sink,
            &popped.record,
            &mut reports[index],
            &mut last_accepted,
            &mut records_written,
            &mut write_failures,
            &mut observe,
        );

        let Some(mut source) = slots[index].take() else {
            continue;
        };

        // Keep draining the same source while it stays at or below the
        // earliest record buffered from the others; this skips heap churn
        // for the common case of long single-source runs.
        let threshold = heap.peek_min_ts();
        loop {
            match read_accepted(
                &mut source,
                &mut reports[index],
                last_accepted,
                false,
                options,
                &mut drops,
                &mut observe,
            ) {
                ReadOutcome::Accepted(record) => {
                    if threshold.is_none_or(|min_ts| record.ts_nanos <= min_ts) {
                        emit_record(
                            sink,
                            &record,
                            &mut reports[index],
                            &mut last_accepted,
                            &mut records_written,
                            &mut write_failures,
                            &mut observe,
                        );
                    } else {
                        heap.push(HeapEntry {
                            record,
                            source: index,
                        });
                        slots[index] = Some(source);
                        break;
                    }
                }
                ReadOutcome::EndOfStream => {
                    observe(MergeEvent::SourceFinished {
                        path: &reports[index].path,
                    });
                    break;
                }
                ReadOutcome::Failed(err) => {
                    let reason = err.to_string();
                    observe(MergeEvent::SourceFailed {
                        path: &reports[index].path,
                        reason: &reason,
                    });
                    reports[index].status = SourceStatus::Failed;
                    reports[index].error = Some(reason);
                    break;
                }
            }
        }
    }

    MergeReport {
        tool: ToolInfo {
            name: "capmerge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        sources: reports,
        records_written,
        write_failures,
        drops,
        output_link_type: link_type.0,
        total_input_bytes,
    }
}

/// Fold one observed link type into the resolved output link type.
/// Disagreeing inputs fall back to Ethernet.
fn fold_link_type(resolved: Option<Linktype>, observed: Linktype) -> Option<Linktype> {
    match resolved {
        None => Some(observed),
        Some(current) if current != observed => Some(Linktype::ETHERNET),
        same => same,
    }
}

/// Pull records from `source` until one passes the acceptance rules,
/// recording every drop along the way.
fn read_accepted<S, F>(
    source: &mut S,
    entry: &mut SourceReport,
    last_accepted: Option<i64>,
    init_read: bool,
    options: &MergeOptions,
    drops: &mut DropCounts,
    observe: &mut F,
) -> ReadOutcome
where
    S: RecordSource,
    F: FnMut(MergeEvent<'_>),
{
    loop {
        match source.next_record() {
            Ok(Some(record)) => {
                match evaluate(&record, last_accepted, init_read, options.max_record_len) {
                    Verdict::Accept => return ReadOutcome::Accepted(record),
                    Verdict::Drop(reason) => {
                        count_drop(drops, &reason);
                        entry.records_dropped += 1;
                        observe(MergeEvent::RecordDropped {
                            path: &entry.path,
                            reason: &reason,
                        });
                    }
                }
            }
            Ok(None) => return ReadOutcome::EndOfStream,
            Err(err) => return ReadOutcome::Failed(err),
        }
    }
}

fn count_drop(drops: &mut DropCounts, reason: &DropReason) {
    match reason {
        DropReason::StaleTimestamp { .. } => drops.stale_timestamp += 1,
        DropReason::EmptyPayload => drops.empty_payload += 1,
        DropReason::Oversized { .. } => drops.oversized += 1,
        DropReason::BadCaptureLength { .. } => drops.bad_capture_length += 1,
    }
}

fn emit_record<K, F>(
    sink: &mut K,
    record: &Record,
    entry: &mut SourceReport,
    last_accepted: &mut Option<i64>,
    records_written: &mut u64,
    write_failures: &mut u64,
    observe: &mut F,
) where
    K: RecordSink,
    F: FnMut(MergeEvent<'_>),
{
    match sink.write_record(record.ts_nanos, &record.meta, &record.data) {
        Ok(()) => *records_written += 1,
        Err(err) => {
            *write_failures += 1;
            observe(MergeEvent::WriteFailed { error: &err });
        }
    }
    entry.records_merged += 1;
    // The ordering baseline advances even when the write fails.
    *last_accepted = Some(record.ts_nanos);
}
