//! Legacy pcap writer.
//!
//! The output is always a little-endian, microsecond-resolution legacy
//! pcap file, whatever the inputs were. Nanosecond inputs lose sub-micro
//! precision at this boundary.

use std::io::{BufWriter, Write};

use pcap_parser::Linktype;

use crate::CaptureMeta;

use super::{RecordSink, SinkError};

const MAGIC_MICROS: u32 = 0xa1b2_c3d4;
const VERSION_MAJOR: u16 = 2;
const VERSION_MINOR: u16 = 4;

/// Buffered legacy pcap writer over any [`Write`] destination.
pub struct PcapSink<W: Write> {
    writer: BufWriter<W>,
}

impl<W: Write> PcapSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    /// Flush buffered bytes to the underlying destination.
    pub fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

impl<W: Write> RecordSink for PcapSink<W> {
    fn write_header(&mut self, max_record_len: u32, link_type: Linktype) -> Result<(), SinkError> {
        self.writer.write_all(&MAGIC_MICROS.to_le_bytes())?;
        self.writer.write_all(&VERSION_MAJOR.to_le_bytes())?;
        self.writer.write_all(&VERSION_MINOR.to_le_bytes())?;
        self.writer.write_all(&0i32.to_le_bytes())?; // thiszone
        self.writer.write_all(&0u32.to_le_bytes())?; // sigfigs
        self.writer.write_all(&max_record_len.to_le_bytes())?;
        self.writer.write_all(&(link_type.0 as u32).to_le_bytes())?;
        Ok(())
    }

    fn write_record(
        &mut self,
        ts_nanos: i64,
        meta: &CaptureMeta,
        payload: &[u8],
    ) -> Result<(), SinkError> {
        let ts_sec = ts_nanos.div_euclid(1_000_000_000) as u32;
        let ts_usec = (ts_nanos.rem_euclid(1_000_000_000) / 1_000) as u32;
        self.writer.write_all(&ts_sec.to_le_bytes())?;
        self.writer.write_all(&ts_usec.to_le_bytes())?;
        self.writer.write_all(&(payload.len() as u32).to_le_bytes())?;
        self.writer.write_all(&meta.origlen.to_le_bytes())?;
        self.writer.write_all(payload)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(caplen: u32, origlen: u32) -> CaptureMeta {
        CaptureMeta {
            caplen,
            origlen,
            link_type: Linktype::ETHERNET,
        }
    }

    #[test]
    fn header_layout_is_little_endian_micros() {
        let mut out = Vec::new();
        let mut sink = PcapSink::new(&mut out);
        sink.write_header(262_144, Linktype::ETHERNET)
            .expect("write header");
        sink.flush().expect("flush");
        drop(sink);

        assert_eq!(out.len(), 24);
        assert_eq!(&out[..4], &[0xd4, 0xc3, 0xb2, 0xa1]);
        assert_eq!(&out[4..8], &[2, 0, 4, 0]);
        assert_eq!(&out[16..20], &262_144u32.to_le_bytes());
        assert_eq!(&out[20..24], &1u32.to_le_bytes());
    }

    #[test]
    fn record_header_carries_split_timestamp() {
        let mut out = Vec::new();
        let mut sink = PcapSink::new(&mut out);
        sink.write_record(1_500_000_000, &meta(3, 80), &[0xaa, 0xbb, 0xcc])
            .expect("write record");
        sink.flush().expect("flush");
        drop(sink);

        assert_eq!(&out[..4], &1u32.to_le_bytes());
        assert_eq!(&out[4..8], &500_000u32.to_le_bytes());
        assert_eq!(&out[8..12], &3u32.to_le_bytes());
        assert_eq!(&out[12..16], &80u32.to_le_bytes());
        assert_eq!(&out[16..], &[0xaa, 0xbb, 0xcc]);
    }
}
