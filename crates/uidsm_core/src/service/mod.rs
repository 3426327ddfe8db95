//! Entity managers: use-case services over the repositories.
//!
//! # Responsibility
//! - Enforce business rules (unique names, known roles, sequential numbers).
//! - Report expected rejections as messages in `EntityOperationResult`.
//! - Keep the search index in step with successful writes.
//!
//! # Invariants
//! - Business-rule rejections never surface as `Err`; storage failures do.
//! - A failed index/de-index call is logged and never undoes a write.

pub mod annotation_service;
pub mod exchange_service;
pub mod project_service;
pub mod review_service;
pub mod role_service;

use crate::dto::EntityDto;
use crate::model::entity::{EntityId, EntityKind};
use crate::repo::{RepoError, RepoResult};
use crate::search::index_client::SearchIndexer;
use log::warn;

/// Outcome of a create/update/delete use-case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityOperationResult<T> {
    /// Resulting entity when the operation succeeded.
    pub entity: Option<T>,
    /// Human-readable rejection reasons.
    pub errors: Vec<String>,
}

impl<T> EntityOperationResult<T> {
    pub fn success(entity: T) -> Self {
        Self {
            entity: Some(entity),
            errors: Vec::new(),
        }
    }

    pub fn failure(errors: Vec<String>) -> Self {
        Self {
            entity: None,
            errors,
        }
    }

    /// Failure carrying a single message.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::failure(vec![message.into()])
    }

    pub fn is_succeeded(&self) -> bool {
        self.entity.is_some() && self.errors.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> EntityOperationResult<U> {
        EntityOperationResult {
            entity: self.entity.map(f),
            errors: self.errors,
        }
    }
}

/// Splits repository outcomes into business rejections and hard failures.
///
/// Validation, missing container/reference, not-found and in-use errors
/// become result messages. Storage and data-integrity errors stay `Err`.
pub(crate) fn into_operation_result<T>(
    result: RepoResult<T>,
) -> RepoResult<EntityOperationResult<T>> {
    match result {
        Ok(entity) => Ok(EntityOperationResult::success(entity)),
        Err(err @ RepoError::Validation(_))
        | Err(err @ RepoError::NotFound(_))
        | Err(err @ RepoError::MissingContainer { .. })
        | Err(err @ RepoError::UnknownReference { .. })
        | Err(err @ RepoError::ForeignParticipant { .. })
        | Err(err @ RepoError::InUse(_)) => Ok(EntityOperationResult::rejected(err.to_string())),
        Err(err) => Err(err),
    }
}

pub(crate) fn index_quietly(indexer: &dyn SearchIndexer, record: EntityDto) {
    if let Err(err) = indexer.index(&record) {
        warn!(
            "event=search_index module=service status=error type={} id={} error={}",
            record.type_tag(),
            record.id(),
            err
        );
    }
}

pub(crate) fn deindex_quietly(indexer: &dyn SearchIndexer, kind: EntityKind, id: EntityId) {
    if let Err(err) = indexer.deindex(kind, id) {
        warn!("event=search_deindex module=service status=error type={kind} id={id} error={err}");
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::dto::EntityDto;
    use crate::model::entity::{EntityId, EntityKind};
    use crate::search::index_client::{SearchIndexError, SearchIndexResult, SearchIndexer};
    use std::sync::Mutex;

    /// Indexer recording every call; optionally failing each one.
    #[derive(Default)]
    pub struct RecordingIndexer {
        pub indexed: Mutex<Vec<(EntityKind, EntityId)>>,
        pub deindexed: Mutex<Vec<(EntityKind, EntityId)>>,
        pub fail: bool,
    }

    impl SearchIndexer for RecordingIndexer {
        fn index(&self, record: &EntityDto) -> SearchIndexResult<()> {
            self.indexed
                .lock()
                .unwrap()
                .push((record.kind(), record.id()));
            if self.fail {
                return Err(SearchIndexError::EmptyResponse {
                    endpoint: "test".to_string(),
                });
            }
            Ok(())
        }

        fn deindex(&self, kind: EntityKind, id: EntityId) -> SearchIndexResult<()> {
            self.deindexed.lock().unwrap().push((kind, id));
            if self.fail {
                return Err(SearchIndexError::EmptyResponse {
                    endpoint: "test".to_string(),
                });
            }
            Ok(())
        }
    }
}
