//! Destinations for merged records.

use thiserror::Error;

use crate::CaptureMeta;
use pcap_parser::Linktype;

mod pcap;

pub use pcap::PcapSink;

/// A destination that accepts one capture header followed by
/// time-ordered records.
///
/// Implementations decide the on-disk encoding; the merge engine only
/// promises to call [`RecordSink::write_header`] once, before the first
/// [`RecordSink::write_record`].
pub trait RecordSink {
    /// Write the capture file header.
    ///
    /// `max_record_len` is the snap length advertised to readers of the
    /// output; `link_type` is the single link type shared by every record
    /// that follows.
    fn write_header(&mut self, max_record_len: u32, link_type: Linktype) -> Result<(), SinkError>;

    /// Append one record with its capture metadata and payload bytes.
    fn write_record(
        &mut self,
        ts_nanos: i64,
        meta: &CaptureMeta,
        payload: &[u8],
    ) -> Result<(), SinkError>;
}

/// Errors surfaced by a record sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
