//! DTO graph codec: tagged-record JSON encoding and `@type` dispatch decoding.
//!
//! # Responsibility
//! - Encode an exchanged set of records as a flat JSON array.
//! - Decode one object or an array of objects back into records.
//! - Own the discriminator dispatch table used during decode.
//!
//! # Invariants
//! - Relationships stay as id fields. Records are never inlined.
//! - Input order is preserved in both directions.
//! - The codec holds no mutable state; the dispatch table is read-only once
//!   shared.

mod decode;
mod encode;
mod registry;

pub use decode::{decode_one, decode_reader, decode_slice, decode_str, decode_value};
pub use encode::{encode, encode_one, encode_to_string, encode_to_vec};
pub use registry::{DispatchTable, ParseFn};

use crate::dto::EntityDto;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io::{Read, Write};

pub type CodecResult<T> = Result<T, CodecError>;

/// Encode/decode failure.
#[derive(Debug)]
pub enum CodecError {
    /// Payload is not well-formed JSON, or serialization failed.
    Json(serde_json::Error),
    /// Writing to the sink or reading the source failed.
    Io(std::io::Error),
    /// An object has no `@type` property.
    MissingDiscriminator { index: usize },
    /// `@type` is present but not a string.
    InvalidDiscriminator { index: usize, found: &'static str },
    /// `@type` names no registered record type.
    UnknownDiscriminator { index: usize, tag: String },
    /// The top-level JSON value is neither an object nor an array.
    UnsupportedTopLevel(&'static str),
    /// An array element is not an object.
    NotAnObject { index: usize, found: &'static str },
    /// The record fields do not match the shape named by `@type`.
    InvalidRecord {
        index: usize,
        tag: String,
        source: serde_json::Error,
    },
    /// Encode was asked for a record type missing from the dispatch table.
    UnregisteredType(String),
    /// A single record was expected but the payload held another count.
    ExpectedSingleRecord(usize),
}

impl Display for CodecError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "invalid json payload: {err}"),
            Self::Io(err) => write!(f, "codec i/o failure: {err}"),
            Self::MissingDiscriminator { index } => write!(
                f,
                "record {index}: cannot deserialize without a type discriminator (`@type`)"
            ),
            Self::InvalidDiscriminator { index, found } => write!(
                f,
                "record {index}: type discriminator must be a string, found {found}"
            ),
            Self::UnknownDiscriminator { index, tag } => {
                write!(f, "record {index}: unknown type discriminator `{tag}`")
            }
            Self::UnsupportedTopLevel(kind) => write!(
                f,
                "unsupported top-level json value: expected object or array, found {kind}"
            ),
            Self::NotAnObject { index, found } => {
                write!(f, "record {index}: expected object, found {found}")
            }
            Self::InvalidRecord { index, tag, source } => {
                write!(f, "record {index}: invalid `{tag}` record: {source}")
            }
            Self::UnregisteredType(tag) => {
                write!(f, "cannot encode unregistered record type `{tag}`")
            }
            Self::ExpectedSingleRecord(count) => {
                write!(f, "expected exactly one record, found {count}")
            }
        }
    }
}

impl Error for CodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            Self::Io(err) => Some(err),
            Self::InvalidRecord { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(value: serde_json::Error) -> Self {
        if value.is_io() {
            return Self::Io(value.into());
        }
        Self::Json(value)
    }
}

impl From<std::io::Error> for CodecError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

/// Output formatting options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodecOptions {
    /// Indent output for human readers.
    #[serde(default)]
    pub pretty: bool,
}

impl CodecOptions {
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

/// Encoder/decoder bound to one dispatch table and output options.
#[derive(Debug, Clone, Copy)]
pub struct Codec<'t> {
    table: &'t DispatchTable,
    options: CodecOptions,
}

impl Codec<'static> {
    /// Creates a codec over the process-wide dispatch table.
    pub fn new(options: CodecOptions) -> Self {
        Self {
            table: DispatchTable::global(),
            options,
        }
    }
}

impl Default for Codec<'static> {
    fn default() -> Self {
        Self::new(CodecOptions::default())
    }
}

impl<'t> Codec<'t> {
    pub fn with_table(table: &'t DispatchTable, options: CodecOptions) -> Self {
        Self { table, options }
    }

    pub fn table(&self) -> &'t DispatchTable {
        self.table
    }

    pub fn options(&self) -> CodecOptions {
        self.options
    }

    pub fn encode<W: Write>(&self, records: &[EntityDto], sink: &mut W) -> CodecResult<()> {
        encode(records, sink, &self.options, self.table)
    }

    pub fn encode_one<W: Write>(&self, record: &EntityDto, sink: &mut W) -> CodecResult<()> {
        encode_one(record, sink, &self.options, self.table)
    }

    pub fn encode_to_string(&self, records: &[EntityDto]) -> CodecResult<String> {
        encode_to_string(records, &self.options, self.table)
    }

    pub fn decode_str(&self, input: &str) -> CodecResult<Vec<EntityDto>> {
        decode_str(input, self.table)
    }

    pub fn decode_reader<R: Read>(&self, reader: R) -> CodecResult<Vec<EntityDto>> {
        decode_reader(reader, self.table)
    }

    pub fn decode_one(&self, input: &str) -> CodecResult<EntityDto> {
        decode_one(input, self.table)
    }
}

/// Short JSON type name used in error messages.
pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
