//! Role manager.
//!
//! # Invariants
//! - Role names are unique, compared case-insensitively after trimming.
//! - A role still held by participants cannot be deleted.

use crate::dto::EntityDto;
use crate::model::entity::{AccessRight, EntityId, EntityKind};
use crate::model::review::Role;
use crate::repo::role_repo::RoleRepository;
use crate::repo::RepoResult;
use crate::search::index_client::{NoopIndexer, SearchIndexer};
use crate::service::{deindex_quietly, index_quietly, into_operation_result, EntityOperationResult};
use log::info;
use std::sync::Arc;

/// Use-case service for roles.
pub struct RoleService<R: RoleRepository> {
    repo: R,
    indexer: Arc<dyn SearchIndexer>,
}

impl<R: RoleRepository> RoleService<R> {
    pub fn new(repo: R) -> Self {
        Self::with_indexer(repo, Arc::new(NoopIndexer))
    }

    pub fn with_indexer(repo: R, indexer: Arc<dyn SearchIndexer>) -> Self {
        Self { repo, indexer }
    }

    /// Creates a role with a unique name.
    pub fn create_role(
        &self,
        role_name: &str,
        access_rights: Vec<AccessRight>,
    ) -> RepoResult<EntityOperationResult<Role>> {
        let role = Role::new(role_name.trim(), access_rights);
        if let Err(err) = role.validate() {
            return Ok(EntityOperationResult::rejected(err.to_string()));
        }
        if self.repo.find_role_by_name(&role.role_name)?.is_some() {
            return Ok(EntityOperationResult::rejected(format!(
                "A role named `{}` already exists",
                role.role_name
            )));
        }

        let outcome = into_operation_result(self.repo.create_role(&role).map(|_| role))?;
        if let Some(role) = outcome.entity.as_ref() {
            info!(
                "event=role_create module=service status=ok id={}",
                role.id
            );
            index_quietly(self.indexer.as_ref(), EntityDto::from(role.clone()));
        }
        Ok(outcome)
    }

    /// Replaces name and access rights of an existing role.
    pub fn update_role(&self, role: &Role) -> RepoResult<EntityOperationResult<Role>> {
        if let Some(existing) = self.repo.find_role_by_name(&role.role_name)? {
            if existing.id != role.id {
                return Ok(EntityOperationResult::rejected(format!(
                    "A role named `{}` already exists",
                    role.role_name.trim()
                )));
            }
        }

        let outcome = into_operation_result(self.repo.update_role(role).map(|()| role.clone()))?;
        if let Some(role) = outcome.entity.as_ref() {
            index_quietly(self.indexer.as_ref(), EntityDto::from(role.clone()));
        }
        Ok(outcome)
    }

    pub fn get_role(&self, id: EntityId) -> RepoResult<Option<Role>> {
        self.repo.get_role(id)
    }

    pub fn list_roles(&self) -> RepoResult<Vec<Role>> {
        self.repo.list_roles()
    }

    /// Deletes an unused role.
    pub fn delete_role(&self, id: EntityId) -> RepoResult<EntityOperationResult<EntityId>> {
        let outcome = into_operation_result(self.repo.delete_role(id).map(|()| id))?;
        if outcome.is_succeeded() {
            deindex_quietly(self.indexer.as_ref(), EntityKind::Role, id);
        }
        Ok(outcome)
    }
}
