//! Data core of the UI-DSM review tool.
//!
//! Entity records travel as `@type`-tagged JSON through [`codec`], are
//! reassembled into a navigable [`graph::EntityGraph`], and are persisted by
//! the SQLite repositories behind the [`service`] managers.

pub mod codec;
pub mod config;
pub mod db;
pub mod dto;
pub mod graph;
pub mod logging;
pub mod model;
pub mod repo;
pub mod search;
pub mod service;

pub use codec::{
    decode_one, decode_reader, decode_slice, decode_str, decode_value, encode, encode_one,
    encode_to_string, encode_to_vec, Codec, CodecError, CodecOptions, CodecResult,
    DispatchTable, ParseFn,
};
pub use config::{ConfigError, CoreConfig};
pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use dto::{EntityDto, Reference, TaggedRecord, TYPE_PROPERTY};
pub use graph::{AssemblyReport, DanglingReference, EntityGraph};
pub use logging::{
    default_log_level, init_from_config, init_logging, logging_status, LogSink, LoggingError,
};
pub use model::entity::{AccessRight, EntityId, EntityKind, ModelValidationError, StatusKind};
pub use model::review::{
    Comment, Participant, Project, Reply, Review, ReviewObjective, ReviewTask, Role,
};
pub use repo::{RepoError, RepoResult};
pub use search::index_client::{
    HttpSearchIndexClient, NoopIndexer, SearchIndexError, SearchIndexResult, SearchIndexer,
};
pub use service::EntityOperationResult;

/// Minimal health-check API for smoke tests.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
