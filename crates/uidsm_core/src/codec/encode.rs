//! Exchanged-set encoder.
//!
//! # Invariants
//! - The whole document is rendered before the sink sees any byte, so a
//!   failing record leaves the sink untouched.
//! - Every record type must be registered in the table used for encoding.

use super::{CodecError, CodecOptions, CodecResult, DispatchTable};
use crate::dto::EntityDto;
use log::{debug, error};
use serde::Serialize;
use std::io::Write;
use std::time::Instant;

/// Encodes `records` as a JSON array and writes it to `sink`.
///
/// # Errors
/// - `UnregisteredType` when a record type is missing from `table`.
/// - `Io` when the sink rejects the write.
pub fn encode<W: Write>(
    records: &[EntityDto],
    sink: &mut W,
    options: &CodecOptions,
    table: &DispatchTable,
) -> CodecResult<()> {
    let buffer = encode_to_vec(records, options, table)?;
    write_all(sink, &buffer)
}

/// Encodes one record as a single tagged object.
pub fn encode_one<W: Write>(
    record: &EntityDto,
    sink: &mut W,
    options: &CodecOptions,
    table: &DispatchTable,
) -> CodecResult<()> {
    ensure_registered(std::slice::from_ref(record), table)?;
    let buffer = render(record, options)?;
    write_all(sink, &buffer)
}

/// Encodes `records` into an owned byte buffer.
pub fn encode_to_vec(
    records: &[EntityDto],
    options: &CodecOptions,
    table: &DispatchTable,
) -> CodecResult<Vec<u8>> {
    let started_at = Instant::now();
    ensure_registered(records, table)?;
    let buffer = render(records, options)?;
    debug!(
        "event=codec_encode module=codec status=ok records={} bytes={} pretty={} duration_us={}",
        records.len(),
        buffer.len(),
        options.pretty,
        started_at.elapsed().as_micros()
    );
    Ok(buffer)
}

/// Encodes `records` into a JSON string.
pub fn encode_to_string(
    records: &[EntityDto],
    options: &CodecOptions,
    table: &DispatchTable,
) -> CodecResult<String> {
    let buffer = encode_to_vec(records, options, table)?;
    // serde_json only emits UTF-8.
    String::from_utf8(buffer).map_err(|err| {
        CodecError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    })
}

fn ensure_registered(records: &[EntityDto], table: &DispatchTable) -> CodecResult<()> {
    match records.iter().find(|record| !table.contains(record.type_tag())) {
        Some(record) => {
            error!(
                "event=codec_encode module=codec status=error error_code=unregistered_type tag={}",
                record.type_tag()
            );
            Err(CodecError::UnregisteredType(record.type_tag().to_string()))
        }
        None => Ok(()),
    }
}

fn render<T: Serialize + ?Sized>(value: &T, options: &CodecOptions) -> CodecResult<Vec<u8>> {
    let buffer = if options.pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };
    Ok(buffer)
}

fn write_all<W: Write>(sink: &mut W, buffer: &[u8]) -> CodecResult<()> {
    sink.write_all(buffer)?;
    sink.flush()?;
    Ok(())
}
