mod pcap;

pub use pcap::PcapFileSource;

use pcap_parser::Linktype;
use thiserror::Error;

use crate::Record;

/// One input capture stream and its decode cursor.
///
/// `next_record` advances by exactly one record; `Ok(None)` signals end of
/// stream and `Err` an unrecoverable decode or I/O failure. Dropping the
/// source closes its input handle, so a retired source can never be read
/// again.
pub trait RecordSource {
    /// Declared link type, once known.
    ///
    /// Classic PCAP sources know it from their file header at open; PCAPNG
    /// sources learn it from their first interface block.
    fn link_type(&self) -> Option<Linktype>;

    /// Decode the next record from the stream.
    fn next_record(&mut self) -> Result<Option<Record>, SourceError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PCAP parse error: {0}")]
    Pcap(String),
}

impl From<pcap::error::PcapSourceError> for SourceError {
    fn from(value: pcap::error::PcapSourceError) -> Self {
        match value {
            pcap::error::PcapSourceError::Io(err) => SourceError::Io(err),
            pcap::error::PcapSourceError::Pcap { context, message } => {
                SourceError::Pcap(format!("{context}: {message}"))
            }
        }
    }
}
