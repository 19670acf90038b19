use std::cell::Cell;
use std::io::{Read, Seek, SeekFrom};
use std::rc::Rc;

use pcap_parser::Linktype;

use super::error::PcapSourceError;
use super::layout;

/// Shared running total of bytes produced by a [`CountingReader`].
pub type ByteCounter = Rc<Cell<u64>>;

/// `Read` adapter tracking how many bytes the inner reader has produced.
///
/// The streaming decoders refill an internal buffer on demand. Watching this
/// counter across a refill is the only way to tell a short read apart from a
/// stalled one, which is how a record truncated at end of file is detected
/// instead of looping on it.
pub struct CountingReader<R> {
    inner: R,
    consumed: ByteCounter,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> (Self, ByteCounter) {
        let consumed = Rc::new(Cell::new(0));
        let reader = Self {
            inner,
            consumed: Rc::clone(&consumed),
        };
        (reader, consumed)
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed.set(self.consumed.get() + n as u64);
        Ok(n)
    }
}

/// Read the magic bytes and rewind the reader to the start.
///
/// # Errors
/// Returns `PcapSourceError` when the reader cannot be read or rewound.
pub fn read_magic_and_rewind<R: Read + Seek>(reader: &mut R) -> Result<[u8; 4], PcapSourceError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(magic)
}

/// Check whether the magic bytes match PCAPNG.
///
/// # Examples
/// This helper is part of an internal module, so the example is marked as
/// text example.
/// ```text
/// let magic = [0x0a, 0x0d, 0x0d, 0x0a];
/// assert!(is_pcapng_magic(&magic));
/// ```
pub fn is_pcapng_magic(magic: &[u8; 4]) -> bool {
    magic == &layout::PCAPNG_MAGIC
}

/// Properties a classic PCAP file declares in its global header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegacyFileInfo {
    /// Timestamp fractions are nanoseconds rather than microseconds.
    pub nanosecond: bool,
    /// Declared link type for every record in the file.
    pub link_type: Linktype,
}

/// Read the full classic PCAP global header and rewind the reader.
///
/// Returns `Ok(None)` when the magic is not a classic PCAP magic; the
/// streaming decoder then reports the malformed header itself.
///
/// # Errors
/// Returns `PcapSourceError` when fewer than 24 bytes can be read or the
/// reader cannot be rewound.
pub fn read_legacy_header_and_rewind<R: Read + Seek>(
    reader: &mut R,
) -> Result<Option<LegacyFileInfo>, PcapSourceError> {
    let mut header = [0u8; layout::LEGACY_HEADER_LEN];
    reader.read_exact(&mut header)?;
    reader.seek(SeekFrom::Start(0))?;
    Ok(parse_legacy_file_header(&header))
}

/// Decode the magic and link type from a classic PCAP global header.
///
/// Handles both byte orders and both timestamp resolutions; returns `None`
/// for an unrecognized magic.
pub fn parse_legacy_file_header(header: &[u8; layout::LEGACY_HEADER_LEN]) -> Option<LegacyFileInfo> {
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&header[layout::MAGIC_RANGE.clone()]);
    let (big_endian, nanosecond) = match u32::from_le_bytes(magic) {
        layout::LEGACY_MAGIC_MICROS => (false, false),
        layout::LEGACY_MAGIC_NANOS => (false, true),
        layout::LEGACY_MAGIC_MICROS_BE => (true, false),
        layout::LEGACY_MAGIC_NANOS_BE => (true, true),
        _ => return None,
    };

    let mut network = [0u8; 4];
    network.copy_from_slice(&header[layout::NETWORK_RANGE.clone()]);
    let network = if big_endian {
        i32::from_be_bytes(network)
    } else {
        i32::from_le_bytes(network)
    };
    Some(LegacyFileInfo {
        nanosecond,
        link_type: Linktype(network),
    })
}

/// Convert a classic PCAP record timestamp to nanoseconds.
///
/// The fractional field counts microseconds in standard captures and
/// nanoseconds in nanosecond-magic captures.
pub fn legacy_ts_to_nanos(ts_sec: u32, ts_frac: u32, nanosecond: bool) -> i64 {
    let frac = if nanosecond {
        ts_frac as i64
    } else {
        (ts_frac as i64) * 1_000
    };
    (ts_sec as i64) * 1_000_000_000 + frac
}

/// Convert a PCAPNG high/low timestamp to nanoseconds.
///
/// Assumes the default microsecond interface resolution.
pub fn pcapng_ts_to_nanos(ts_high: u32, ts_low: u32) -> i64 {
    let micros = ((ts_high as u64) << 32) | (ts_low as u64);
    micros.saturating_mul(1_000).min(i64::MAX as u64) as i64
}

/// Resolve the linktype for a given interface id, defaulting to Ethernet.
///
/// # Examples
/// This helper is part of an internal module, so the example is marked as
/// text example.
/// ```text
/// let linktypes = [Linktype::RAW];
/// assert_eq!(linktype_for_interface(&linktypes, 0), Linktype::RAW);
/// assert_eq!(linktype_for_interface(&linktypes, 1), Linktype::ETHERNET);
/// ```
pub fn linktype_for_interface(linktypes: &[Linktype], if_id: u32) -> Linktype {
    linktypes
        .get(if_id as usize)
        .copied()
        .unwrap_or(Linktype::ETHERNET)
}

/// Size the decode buffer so a record of `max_record_len` captured bytes
/// always frames without growing the buffer.
pub fn reader_buffer_size(max_record_len: u32) -> usize {
    layout::MIN_READER_BUFFER_SIZE.max(2 * max_record_len as usize)
}

#[cfg(test)]
mod tests {
    use super::{
        CountingReader, is_pcapng_magic, legacy_ts_to_nanos, linktype_for_interface,
        parse_legacy_file_header, pcapng_ts_to_nanos, read_legacy_header_and_rewind,
        read_magic_and_rewind, reader_buffer_size,
    };
    use crate::source::pcap::error::PcapSourceError;
    use crate::source::pcap::layout;
    use pcap_parser::Linktype;
    use std::io::Cursor;
    use std::io::Read;

    fn legacy_header(magic: u32, network_le: bool, network: i32) -> [u8; 24] {
        let mut header = [0u8; 24];
        header[..4].copy_from_slice(&magic.to_le_bytes());
        let network_bytes = if network_le {
            network.to_le_bytes()
        } else {
            network.to_be_bytes()
        };
        header[20..24].copy_from_slice(&network_bytes);
        header
    }

    #[test]
    fn detect_pcapng_magic() {
        let data = layout::PCAPNG_MAGIC;
        assert!(is_pcapng_magic(&data));
    }

    #[test]
    fn read_magic_rewinds() {
        let bytes = [0x0a, 0x0d, 0x0d, 0x0a, 0x01];
        let mut cursor = Cursor::new(bytes);
        let magic = read_magic_and_rewind(&mut cursor).unwrap();
        assert_eq!(magic, [0x0a, 0x0d, 0x0d, 0x0a]);
        let mut buf = [0u8; 1];
        cursor.read_exact(&mut buf).unwrap();
        assert_eq!(buf[0], 0x0a);
    }

    #[test]
    fn read_magic_too_short() {
        let bytes = [0x0a, 0x0d, 0x0d];
        let mut cursor = Cursor::new(bytes);
        let err = read_magic_and_rewind(&mut cursor).unwrap_err();
        assert!(matches!(err, PcapSourceError::Io(_)));
    }

    #[test]
    fn parse_header_microsecond_little_endian() {
        let header = legacy_header(layout::LEGACY_MAGIC_MICROS, true, 101);
        let info = parse_legacy_file_header(&header).unwrap();
        assert!(!info.nanosecond);
        assert_eq!(info.link_type, Linktype::RAW);
    }

    #[test]
    fn parse_header_nanosecond_little_endian() {
        let header = legacy_header(layout::LEGACY_MAGIC_NANOS, true, 1);
        let info = parse_legacy_file_header(&header).unwrap();
        assert!(info.nanosecond);
        assert_eq!(info.link_type, Linktype::ETHERNET);
    }

    #[test]
    fn parse_header_big_endian_decodes_network_big_endian() {
        let header = legacy_header(layout::LEGACY_MAGIC_MICROS_BE, false, 101);
        let info = parse_legacy_file_header(&header).unwrap();
        assert!(!info.nanosecond);
        assert_eq!(info.link_type, Linktype::RAW);
    }

    #[test]
    fn parse_header_rejects_unknown_magic() {
        let header = legacy_header(0xdead_beef, true, 1);
        assert!(parse_legacy_file_header(&header).is_none());
    }

    #[test]
    fn read_legacy_header_rewinds_and_parses() {
        let header = legacy_header(layout::LEGACY_MAGIC_NANOS, true, 0);
        let mut cursor = Cursor::new(header.to_vec());
        let info = read_legacy_header_and_rewind(&mut cursor).unwrap().unwrap();
        assert!(info.nanosecond);
        assert_eq!(info.link_type, Linktype::NULL);
        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic).unwrap();
        assert_eq!(u32::from_le_bytes(magic), layout::LEGACY_MAGIC_NANOS);
    }

    #[test]
    fn legacy_ts_scales_fraction_by_resolution() {
        assert_eq!(legacy_ts_to_nanos(1, 500, false), 1_000_000_000 + 500_000);
        assert_eq!(legacy_ts_to_nanos(1, 500, true), 1_000_000_000 + 500);
    }

    #[test]
    fn pcapng_ts_converts_microseconds() {
        assert_eq!(pcapng_ts_to_nanos(0, 1_500_000), 1_500_000_000);
        let high_part = pcapng_ts_to_nanos(1, 0);
        assert_eq!(high_part, (1i64 << 32) * 1_000);
    }

    #[test]
    fn linktype_defaults_to_ethernet_when_missing() {
        let linktypes = [Linktype::RAW];
        assert_eq!(linktype_for_interface(&linktypes, 0), Linktype::RAW);
        assert_eq!(linktype_for_interface(&linktypes, 1), Linktype::ETHERNET);
    }

    #[test]
    fn buffer_size_scales_with_record_ceiling() {
        assert_eq!(reader_buffer_size(1024), layout::MIN_READER_BUFFER_SIZE);
        assert_eq!(reader_buffer_size(262_144), 524_288);
    }

    #[test]
    fn counting_reader_tracks_bytes() {
        let (mut reader, consumed) = CountingReader::new(Cursor::new(vec![0u8; 10]));
        let mut buf = [0u8; 6];
        reader.read_exact(&mut buf).unwrap();
        assert_eq!(consumed.get(), 6);
        let n = reader.read(&mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(consumed.get(), 10);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
        assert_eq!(consumed.get(), 10);
    }
}
