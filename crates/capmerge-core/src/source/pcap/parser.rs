use std::fs::File;
use std::path::Path;

use pcap_parser::{
    Block, LegacyPcapReader, Linktype, PcapBlockOwned, PcapNGReader, traits::PcapReaderIterator,
};

use crate::source::{RecordSource, SourceError};
use crate::{CaptureMeta, DEFAULT_MAX_RECORD_LEN, Record};

use super::error::PcapSourceError;
use super::reader::{
    ByteCounter, CountingReader, is_pcapng_magic, legacy_ts_to_nanos, linktype_for_interface,
    pcapng_ts_to_nanos, read_legacy_header_and_rewind, read_magic_and_rewind, reader_buffer_size,
};

pub struct PcapFileSource {
    inner: PcapReader,
}

enum PcapReader {
    Legacy {
        reader: LegacyPcapReader<CountingReader<File>>,
        consumed: ByteCounter,
        nanosecond: bool,
        linktype: Option<Linktype>,
    },
    Ng {
        reader: PcapNGReader<CountingReader<File>>,
        consumed: ByteCounter,
        linktypes: Vec<Linktype>,
    },
}

impl PcapFileSource {
    /// Open a capture with the default record-length ceiling.
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        Self::open_with_limit(path, DEFAULT_MAX_RECORD_LEN)
    }

    /// Open a capture, sizing the decode buffer for records up to
    /// `max_record_len` captured bytes.
    pub fn open_with_limit(path: &Path, max_record_len: u32) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(SourceError::from)?;
        let inner = create_reader(file, max_record_len).map_err(SourceError::from)?;
        Ok(Self { inner })
    }
}

impl RecordSource for PcapFileSource {
    fn link_type(&self) -> Option<Linktype> {
        match &self.inner {
            PcapReader::Legacy { linktype, .. } => *linktype,
            PcapReader::Ng { linktypes, .. } => linktypes.first().copied(),
        }
    }

    fn next_record(&mut self) -> Result<Option<Record>, SourceError> {
        next_record(&mut self.inner).map_err(SourceError::from)
    }
}

fn create_reader(mut file: File, max_record_len: u32) -> Result<PcapReader, PcapSourceError> {
    let magic = read_magic_and_rewind(&mut file)?;
    let buffer_size = reader_buffer_size(max_record_len);

    if is_pcapng_magic(&magic) {
        let (counting, consumed) = CountingReader::new(file);
        let reader = PcapNGReader::new(buffer_size, counting).map_err(|e| {
            PcapSourceError::Pcap {
                context: "pcapng reader init",
                message: e.to_string(),
            }
        })?;
        Ok(PcapReader::Ng {
            reader,
            consumed,
            linktypes: Vec::new(),
        })
    } else {
        let info = read_legacy_header_and_rewind(&mut file)?;
        let (counting, consumed) = CountingReader::new(file);
        let reader = LegacyPcapReader::new(buffer_size, counting).map_err(|e| {
            PcapSourceError::Pcap {
                context: "pcap reader init",
                message: e.to_string(),
            }
        })?;
        Ok(PcapReader::Legacy {
            reader,
            consumed,
            nanosecond: info.as_ref().is_some_and(|info| info.nanosecond),
            linktype: info.map(|info| info.link_type),
        })
    }
}

fn next_record(reader: &mut PcapReader) -> Result<Option<Record>, PcapSourceError> {
    loop {
        match reader {
            PcapReader::Legacy {
                reader,
                consumed,
                nanosecond,
                linktype,
            } => match reader.next() {
                Ok((offset, block)) => {
                    let record = match block {
                        PcapBlockOwned::LegacyHeader(header) => {
                            *linktype = Some(header.network);
                            None
                        }
                        PcapBlockOwned::Legacy(packet) => {
                            let lt = linktype.unwrap_or(Linktype::ETHERNET);
                            Some(Record {
                                ts_nanos: legacy_ts_to_nanos(
                                    packet.ts_sec,
                                    packet.ts_usec,
                                    *nanosecond,
                                ),
                                meta: CaptureMeta {
                                    caplen: packet.caplen,
                                    origlen: packet.origlen,
                                    link_type: lt,
                                },
                                data: packet.data.to_vec(),
                            })
                        }
                        _ => None,
                    };
                    reader.consume(offset);
                    if record.is_some() {
                        return Ok(record);
                    }
                }
                Err(pcap_parser::PcapError::Eof) => return Ok(None),
                Err(pcap_parser::PcapError::Incomplete(_)) => {
                    refill_or_bail(reader, consumed, "pcap reader refill")?;
                }
                Err(e) => {
                    return Err(PcapSourceError::Pcap {
                        context: "pcap reader next",
                        message: e.to_string(),
                    });
                }
            },
            PcapReader::Ng {
                reader,
                consumed,
                linktypes,
            } => match reader.next() {
                Ok((offset, block)) => {
                    let record = match block {
                        PcapBlockOwned::NG(Block::InterfaceDescription(intf)) => {
                            linktypes.push(intf.linktype);
                            None
                        }
                        PcapBlockOwned::NG(Block::EnhancedPacket(packet)) => {
                            let lt = linktype_for_interface(linktypes, packet.if_id);
                            // Block bodies are padded to 32 bits; trim to the
                            // captured length.
                            let caplen = packet.caplen as usize;
                            let data = packet.data.get(..caplen).unwrap_or(packet.data).to_vec();
                            Some(Record {
                                ts_nanos: pcapng_ts_to_nanos(packet.ts_high, packet.ts_low),
                                meta: CaptureMeta {
                                    caplen: data.len() as u32,
                                    origlen: packet.origlen,
                                    link_type: lt,
                                },
                                data,
                            })
                        }
                        _ => None,
                    };
                    reader.consume(offset);
                    if record.is_some() {
                        return Ok(record);
                    }
                }
                Err(pcap_parser::PcapError::Eof) => return Ok(None),
                Err(pcap_parser::PcapError::Incomplete(_)) => {
                    refill_or_bail(reader, consumed, "pcapng reader refill")?;
                }
                Err(e) => {
                    return Err(PcapSourceError::Pcap {
                        context: "pcapng reader next",
                        message: e.to_string(),
                    });
                }
            },
        }
    }
}

/// Refill the decode buffer, failing instead of spinning when the input
/// cannot advance any further (record truncated at end of file).
fn refill_or_bail<R: PcapReaderIterator>(
    reader: &mut R,
    consumed: &ByteCounter,
    context: &'static str,
) -> Result<(), PcapSourceError> {
    let before = consumed.get();
    reader.refill().map_err(|e| PcapSourceError::Pcap {
        context,
        message: e.to_string(),
    })?;
    if consumed.get() == before {
        return Err(PcapSourceError::Pcap {
            context,
            message: "truncated record at end of file".to_string(),
        });
    }
    Ok(())
}
