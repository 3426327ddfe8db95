//! Discriminator dispatch table.
//!
//! # Invariants
//! - Registering an already-known discriminator replaces the earlier parser
//!   without error. The replaced parser is returned to the caller.
//! - The global table is built once and never mutated afterwards.

use crate::dto::{EntityDto, TaggedRecord};
use crate::model::entity::EntityKind;
use crate::model::review::{
    Comment, Participant, Project, Reply, Review, ReviewObjective, ReviewTask, Role,
};
use log::debug;
use once_cell::sync::Lazy;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Reconstructs one record from its tagged JSON object.
pub type ParseFn = fn(Map<String, Value>) -> Result<EntityDto, serde_json::Error>;

static GLOBAL_TABLE: Lazy<DispatchTable> = Lazy::new(DispatchTable::with_builtin_types);

fn parse_record<T: TaggedRecord>(object: Map<String, Value>) -> Result<EntityDto, serde_json::Error> {
    serde_json::from_value::<T>(Value::Object(object)).map(TaggedRecord::into_dto)
}

/// Maps `@type` discriminators to record parsers.
#[derive(Debug, Clone, Default)]
pub struct DispatchTable {
    parsers: HashMap<String, ParseFn>,
}

impl DispatchTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table holding a parser for every `EntityKind`.
    pub fn with_builtin_types() -> Self {
        let mut table = Self::new();
        table.register_type::<Role>();
        table.register_type::<Project>();
        table.register_type::<Participant>();
        table.register_type::<Review>();
        table.register_type::<ReviewObjective>();
        table.register_type::<ReviewTask>();
        table.register_type::<Comment>();
        table.register_type::<Reply>();
        debug_assert_eq!(table.len(), EntityKind::all().len());
        table
    }

    /// Shared process-wide table with every built-in type registered.
    pub fn global() -> &'static DispatchTable {
        &GLOBAL_TABLE
    }

    /// Associates `tag` with `parser`, returning the parser it replaced.
    pub fn register(&mut self, tag: impl Into<String>, parser: ParseFn) -> Option<ParseFn> {
        let tag = tag.into();
        let previous = self.parsers.insert(tag.clone(), parser);
        if previous.is_some() {
            debug!("event=dispatch_register module=codec status=overwritten tag={tag}");
        }
        previous
    }

    /// Registers the parser of a concrete record type under its discriminator.
    pub fn register_type<T: TaggedRecord>(&mut self) -> Option<ParseFn> {
        self.register(T::KIND.type_tag(), parse_record::<T>)
    }

    pub fn lookup(&self, tag: &str) -> Option<ParseFn> {
        self.parsers.get(tag).copied()
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.parsers.contains_key(tag)
    }

    /// Removes a discriminator, returning its parser.
    pub fn unregister(&mut self, tag: &str) -> Option<ParseFn> {
        self.parsers.remove(tag)
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }

    /// Registered discriminators, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags = self.parsers.keys().map(String::as_str).collect::<Vec<_>>();
        tags.sort_unstable();
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_record, DispatchTable};
    use crate::model::entity::EntityKind;
    use crate::model::review::{Participant, Role};

    #[test]
    fn builtin_table_covers_every_kind() {
        let table = DispatchTable::with_builtin_types();
        for kind in EntityKind::all() {
            assert!(table.contains(kind.type_tag()), "missing {kind}");
        }
    }

    #[test]
    fn registering_twice_overwrites_and_returns_previous_parser() {
        let mut table = DispatchTable::new();
        assert!(table.register("Role", parse_record::<Role>).is_none());

        let previous = table.register("Role", parse_record::<Participant>);
        assert!(previous.is_some());
        assert_eq!(table.len(), 1);

        let object = serde_json::json!({
            "id": "11111111-2222-4333-8444-555555555555",
            "userName": "alice",
            "role": "21111111-2222-4333-8444-555555555555"
        });
        let serde_json::Value::Object(object) = object else {
            unreachable!("fixture is an object");
        };
        let parser = table.lookup("Role").unwrap();
        let record = parser(object).unwrap();
        assert_eq!(record.kind(), EntityKind::Participant);
    }

    #[test]
    fn tags_are_sorted() {
        let table = DispatchTable::with_builtin_types();
        let tags = table.tags();
        let mut sorted = tags.clone();
        sorted.sort_unstable();
        assert_eq!(tags, sorted);
    }
}
