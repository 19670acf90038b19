//! PCAP/PCAPNG source implementation.
//!
//! This module provides a `RecordSource` backed by PCAP or PCAPNG files. It
//! handles file I/O and low-level parsing, emitting decoded records for the
//! merge engine. Classic captures in either byte order and at either
//! timestamp resolution are accepted; output-side conventions live in the
//! sink instead.

pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;

pub use parser::PcapFileSource;
