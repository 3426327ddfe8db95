//! Review domain model exchanged by the codec and persisted by the store.
//!
//! # Responsibility
//! - Define the canonical record shape of every review entity.
//! - Keep relationships as id references, never as nested objects.
//!
//! # Invariants
//! - Every entity is identified by a stable, non-nil `EntityId`.
//! - Owned collections are ordered id lists on the owning record.

pub mod entity;
pub mod review;
