//! Search-index integration.
//!
//! # Responsibility
//! - Keep the external search index in step with entity writes.

pub mod index_client;
