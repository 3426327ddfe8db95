//! Exchanged-set decoder with `@type` dispatch.
//!
//! # Invariants
//! - Accepts one object or an array of objects. Anything else fails.
//! - Output order equals input order.
//! - Referenced ids are not checked against the decoded set.

use super::{json_kind, CodecError, CodecResult, DispatchTable};
use crate::dto::{EntityDto, TYPE_PROPERTY};
use log::{debug, warn};
use serde_json::{Map, Value};
use std::io::Read;

/// Decodes a JSON document held in a string.
pub fn decode_str(input: &str, table: &DispatchTable) -> CodecResult<Vec<EntityDto>> {
    let value: Value = serde_json::from_str(input)?;
    decode_value(value, table)
}

/// Decodes a JSON document held in a byte slice.
pub fn decode_slice(input: &[u8], table: &DispatchTable) -> CodecResult<Vec<EntityDto>> {
    let value: Value = serde_json::from_slice(input)?;
    decode_value(value, table)
}

/// Decodes a JSON document read from `reader`.
pub fn decode_reader<R: Read>(reader: R, table: &DispatchTable) -> CodecResult<Vec<EntityDto>> {
    let value: Value = serde_json::from_reader(reader)?;
    decode_value(value, table)
}

/// Decodes an already-parsed JSON value.
pub fn decode_value(value: Value, table: &DispatchTable) -> CodecResult<Vec<EntityDto>> {
    let records = match value {
        Value::Object(object) => vec![decode_object(0, object, table)?],
        Value::Array(items) => {
            let mut records = Vec::with_capacity(items.len());
            for (index, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(object) => records.push(decode_object(index, object, table)?),
                    other => {
                        return Err(CodecError::NotAnObject {
                            index,
                            found: json_kind(&other),
                        });
                    }
                }
            }
            records
        }
        other => {
            warn!(
                "event=codec_decode module=codec status=error error_code=unsupported_top_level kind={}",
                json_kind(&other)
            );
            return Err(CodecError::UnsupportedTopLevel(json_kind(&other)));
        }
    };

    debug!(
        "event=codec_decode module=codec status=ok records={}",
        records.len()
    );
    Ok(records)
}

/// Decodes a payload that must hold exactly one record.
pub fn decode_one(input: &str, table: &DispatchTable) -> CodecResult<EntityDto> {
    let mut records = decode_str(input, table)?;
    if records.len() != 1 {
        return Err(CodecError::ExpectedSingleRecord(records.len()));
    }
    Ok(records.remove(0))
}

fn decode_object(
    index: usize,
    object: Map<String, Value>,
    table: &DispatchTable,
) -> CodecResult<EntityDto> {
    let tag = match object.get(TYPE_PROPERTY) {
        Some(Value::String(tag)) => tag.clone(),
        Some(other) => {
            return Err(CodecError::InvalidDiscriminator {
                index,
                found: json_kind(other),
            });
        }
        None => return Err(CodecError::MissingDiscriminator { index }),
    };

    let Some(parser) = table.lookup(&tag) else {
        warn!(
            "event=codec_decode module=codec status=error error_code=unknown_discriminator tag={tag}"
        );
        return Err(CodecError::UnknownDiscriminator { index, tag });
    };

    parser(object).map_err(|source| CodecError::InvalidRecord { index, tag, source })
}
