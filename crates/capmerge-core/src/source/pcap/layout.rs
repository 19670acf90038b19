pub const PCAPNG_MAGIC: [u8; 4] = [0x0a, 0x0d, 0x0d, 0x0a];

/// Size of the classic PCAP global header in bytes.
pub const LEGACY_HEADER_LEN: usize = 24;

pub const MAGIC_RANGE: std::ops::Range<usize> = 0..4;
pub const NETWORK_RANGE: std::ops::Range<usize> = 20..24;

// Classic PCAP magic numbers as decoded little-endian from the first four
// bytes; the `_BE` values are what a big-endian file yields under that
// decoding.
pub const LEGACY_MAGIC_MICROS: u32 = 0xa1b2_c3d4;
pub const LEGACY_MAGIC_NANOS: u32 = 0xa1b2_3c4d;
pub const LEGACY_MAGIC_MICROS_BE: u32 = 0xd4c3_b2a1;
pub const LEGACY_MAGIC_NANOS_BE: u32 = 0x4d3c_b2a1;

/// Smallest read buffer handed to the streaming decoders.
pub const MIN_READER_BUFFER_SIZE: usize = 64 * 1024;
