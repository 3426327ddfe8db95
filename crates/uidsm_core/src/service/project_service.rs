//! Project and participant manager.
//!
//! # Invariants
//! - Project names are unique, compared case-insensitively after trimming.
//! - A user joins a project at most once, under an existing role.
//! - User names follow `USER_NAME_RE`.

use crate::dto::EntityDto;
use crate::model::entity::{EntityId, EntityKind};
use crate::model::review::{Participant, Project};
use crate::repo::project_repo::ProjectRepository;
use crate::repo::RepoResult;
use crate::search::index_client::{NoopIndexer, SearchIndexer};
use crate::service::{deindex_quietly, index_quietly, into_operation_result, EntityOperationResult};
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

static USER_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._@-]{0,63}$").expect("valid user name regex"));

/// Use-case service for projects and their participants.
pub struct ProjectService<R: ProjectRepository> {
    repo: R,
    indexer: Arc<dyn SearchIndexer>,
}

impl<R: ProjectRepository> ProjectService<R> {
    pub fn new(repo: R) -> Self {
        Self::with_indexer(repo, Arc::new(NoopIndexer))
    }

    pub fn with_indexer(repo: R, indexer: Arc<dyn SearchIndexer>) -> Self {
        Self { repo, indexer }
    }

    /// Creates an empty project with a unique name.
    pub fn create_project(&self, project_name: &str) -> RepoResult<EntityOperationResult<Project>> {
        let project = Project::new(project_name.trim());
        if let Err(err) = project.validate() {
            return Ok(EntityOperationResult::rejected(err.to_string()));
        }
        if let Some(message) = self.name_conflict(&project)? {
            return Ok(EntityOperationResult::rejected(message));
        }

        let outcome = into_operation_result(self.repo.create_project(&project).map(|_| project))?;
        if let Some(project) = outcome.entity.as_ref() {
            info!(
                "event=project_create module=service status=ok id={}",
                project.id
            );
            index_quietly(self.indexer.as_ref(), EntityDto::from(project.clone()));
        }
        Ok(outcome)
    }

    /// Renames a project, keeping names unique.
    pub fn rename_project(
        &self,
        id: EntityId,
        project_name: &str,
    ) -> RepoResult<EntityOperationResult<Project>> {
        let Some(mut project) = self.repo.get_project(id)? else {
            return Ok(EntityOperationResult::rejected(format!(
                "entity not found: {id}"
            )));
        };
        project.project_name = project_name.trim().to_string();
        if let Some(message) = self.name_conflict(&project)? {
            return Ok(EntityOperationResult::rejected(message));
        }

        let outcome =
            into_operation_result(self.repo.update_project(&project).map(|()| project))?;
        if let Some(project) = outcome.entity.as_ref() {
            index_quietly(self.indexer.as_ref(), EntityDto::from(project.clone()));
        }
        Ok(outcome)
    }

    pub fn get_project(&self, id: EntityId) -> RepoResult<Option<Project>> {
        self.repo.get_project(id)
    }

    pub fn list_projects(&self) -> RepoResult<Vec<Project>> {
        self.repo.list_projects()
    }

    /// Deletes a project and everything it owns.
    pub fn delete_project(&self, id: EntityId) -> RepoResult<EntityOperationResult<EntityId>> {
        let owned = self.repo.owned_records(id)?;
        let outcome = into_operation_result(self.repo.delete_project(id).map(|()| id))?;
        if outcome.is_succeeded() {
            info!(
                "event=project_delete module=service status=ok id={id} cascaded={}",
                owned.len()
            );
            deindex_quietly(self.indexer.as_ref(), EntityKind::Project, id);
            for (kind, owned_id) in owned {
                deindex_quietly(self.indexer.as_ref(), kind, owned_id);
            }
        }
        Ok(outcome)
    }

    /// Adds a user to a project under `role`.
    pub fn add_participant(
        &self,
        project: EntityId,
        user_name: &str,
        role: EntityId,
    ) -> RepoResult<EntityOperationResult<Participant>> {
        let user_name = user_name.trim();
        if !USER_NAME_RE.is_match(user_name) {
            return Ok(EntityOperationResult::rejected(format!(
                "`{user_name}` is not a valid user name"
            )));
        }
        if self.repo.find_participant(project, user_name)?.is_some() {
            return Ok(EntityOperationResult::rejected(format!(
                "`{user_name}` already participates in project {project}"
            )));
        }

        let participant = Participant::new(user_name, role);
        let outcome = into_operation_result(
            self.repo
                .create_participant(project, &participant)
                .map(|_| participant),
        )?;
        if let Some(participant) = outcome.entity.as_ref() {
            index_quietly(self.indexer.as_ref(), EntityDto::from(participant.clone()));
        }
        Ok(outcome)
    }

    /// Moves a participant to another role.
    pub fn change_participant_role(
        &self,
        participant: EntityId,
        role: EntityId,
    ) -> RepoResult<EntityOperationResult<Participant>> {
        let Some(mut record) = self.repo.get_participant(participant)? else {
            return Ok(EntityOperationResult::rejected(format!(
                "entity not found: {participant}"
            )));
        };
        record.role = role;
        let outcome =
            into_operation_result(self.repo.update_participant(&record).map(|()| record))?;
        if let Some(record) = outcome.entity.as_ref() {
            index_quietly(self.indexer.as_ref(), EntityDto::from(record.clone()));
        }
        Ok(outcome)
    }

    pub fn list_participants(&self, project: EntityId) -> RepoResult<Vec<Participant>> {
        self.repo.list_participants(project)
    }

    /// Removes a participant that authored nothing.
    pub fn remove_participant(&self, id: EntityId) -> RepoResult<EntityOperationResult<EntityId>> {
        let outcome = into_operation_result(self.repo.delete_participant(id).map(|()| id))?;
        if outcome.is_succeeded() {
            deindex_quietly(self.indexer.as_ref(), EntityKind::Participant, id);
        }
        Ok(outcome)
    }

    fn name_conflict(&self, project: &Project) -> RepoResult<Option<String>> {
        Ok(self
            .repo
            .find_project_by_name(&project.project_name)?
            .filter(|existing| existing.id != project.id)
            .map(|existing| {
                format!(
                    "A project named `{}` already exists",
                    existing.project_name
                )
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::ProjectService;
    use crate::db::open_db_in_memory;
    use crate::model::entity::EntityKind;
    use crate::model::review::{Comment, Reply, Review, ReviewObjective, ReviewTask, Role};
    use crate::repo::annotation_repo::{AnnotationRepository, SqliteAnnotationRepository};
    use crate::repo::project_repo::SqliteProjectRepository;
    use crate::repo::review_repo::{ReviewRepository, SqliteReviewRepository};
    use crate::repo::role_repo::{RoleRepository, SqliteRoleRepository};
    use crate::service::test_support::RecordingIndexer;
    use std::sync::Arc;

    #[test]
    fn duplicate_project_name_is_rejected() {
        let conn = open_db_in_memory().unwrap();
        let service = ProjectService::new(SqliteProjectRepository::try_new(&conn).unwrap());

        assert!(service.create_project("Envision").unwrap().is_succeeded());
        let duplicate = service.create_project("ENVISION").unwrap();
        assert!(duplicate.errors[0].contains("already exists"));
    }

    #[test]
    fn participant_rules_are_reported_as_messages() {
        let conn = open_db_in_memory().unwrap();
        let roles = SqliteRoleRepository::try_new(&conn).unwrap();
        let role = Role::new("Reviewer", Vec::new());
        roles.create_role(&role).unwrap();

        let service = ProjectService::new(SqliteProjectRepository::try_new(&conn).unwrap());
        let project = service.create_project("Envision").unwrap().entity.unwrap();

        assert!(service
            .add_participant(project.id, "alice", role.id)
            .unwrap()
            .is_succeeded());

        let duplicate = service.add_participant(project.id, "Alice", role.id).unwrap();
        assert!(duplicate.errors[0].contains("already participates"));

        let invalid = service.add_participant(project.id, "bad name", role.id).unwrap();
        assert!(invalid.errors[0].contains("not a valid user name"));

        let unknown_role = service
            .add_participant(project.id, "bob", uuid::Uuid::new_v4())
            .unwrap();
        assert!(unknown_role.errors[0].contains("reference `role`"));

        assert_eq!(service.list_participants(project.id).unwrap().len(), 1);
    }

    #[test]
    fn rename_keeps_names_unique() {
        let conn = open_db_in_memory().unwrap();
        let service = ProjectService::new(SqliteProjectRepository::try_new(&conn).unwrap());
        let first = service.create_project("Alpha").unwrap().entity.unwrap();
        service.create_project("Beta").unwrap();

        let clash = service.rename_project(first.id, "beta").unwrap();
        assert!(!clash.is_succeeded());

        let renamed = service.rename_project(first.id, "Alpha II").unwrap();
        assert_eq!(renamed.entity.unwrap().project_name, "Alpha II");
    }

    #[test]
    fn deleting_a_project_deindexes_every_owned_record() {
        let conn = open_db_in_memory().unwrap();
        let role = Role::new("Reviewer", Vec::new());
        SqliteRoleRepository::try_new(&conn)
            .unwrap()
            .create_role(&role)
            .unwrap();
        let indexer = Arc::new(RecordingIndexer::default());
        let service = ProjectService::with_indexer(
            SqliteProjectRepository::try_new(&conn).unwrap(),
            indexer.clone(),
        );
        let project = service.create_project("Envision").unwrap().entity.unwrap();
        let alice = service
            .add_participant(project.id, "alice", role.id)
            .unwrap()
            .entity
            .unwrap();

        let reviews = SqliteReviewRepository::try_new(&conn).unwrap();
        let review = Review::new("Mission", "", alice.id);
        reviews.create_review(project.id, &review).unwrap();
        let objective = ReviewObjective::new("Budget", "", alice.id);
        reviews.create_objective(review.id, &objective).unwrap();
        let task = ReviewTask::new("Check margins", "", alice.id);
        reviews.create_task(objective.id, &task).unwrap();

        let annotations = SqliteAnnotationRepository::try_new(&conn).unwrap();
        let comment = Comment::new("Margin too thin", alice.id);
        annotations.create_comment(project.id, &comment).unwrap();
        let reply = Reply::new("Agreed", alice.id);
        annotations.create_reply(comment.id, &reply).unwrap();

        assert!(service.delete_project(project.id).unwrap().is_succeeded());
        assert_eq!(
            *indexer.deindexed.lock().unwrap(),
            vec![
                (EntityKind::Project, project.id),
                (EntityKind::Participant, alice.id),
                (EntityKind::Review, review.id),
                (EntityKind::ReviewObjective, objective.id),
                (EntityKind::ReviewTask, task.id),
                (EntityKind::Comment, comment.id),
                (EntityKind::Reply, reply.id),
            ]
        );
    }
}
