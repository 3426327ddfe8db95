//! Comment and reply manager.

use crate::dto::EntityDto;
use crate::model::entity::{EntityId, EntityKind, StatusKind};
use crate::model::review::{Comment, Reply};
use crate::repo::annotation_repo::AnnotationRepository;
use crate::repo::RepoResult;
use crate::search::index_client::{NoopIndexer, SearchIndexer};
use crate::service::{deindex_quietly, index_quietly, into_operation_result, EntityOperationResult};
use log::info;
use std::sync::Arc;

/// Use-case service for project annotations.
pub struct AnnotationService<R: AnnotationRepository> {
    repo: R,
    indexer: Arc<dyn SearchIndexer>,
}

impl<R: AnnotationRepository> AnnotationService<R> {
    pub fn new(repo: R) -> Self {
        Self::with_indexer(repo, Arc::new(NoopIndexer))
    }

    pub fn with_indexer(repo: R, indexer: Arc<dyn SearchIndexer>) -> Self {
        Self { repo, indexer }
    }

    /// Attaches a new open comment to `project`.
    pub fn add_comment(
        &self,
        project: EntityId,
        author: EntityId,
        content: &str,
    ) -> RepoResult<EntityOperationResult<Comment>> {
        let comment = Comment::new(content.trim(), author);
        let outcome =
            into_operation_result(self.repo.create_comment(project, &comment).map(|_| comment))?;
        if let Some(comment) = outcome.entity.as_ref() {
            info!(
                "event=comment_create module=service status=ok id={} project={project}",
                comment.id
            );
            index_quietly(self.indexer.as_ref(), EntityDto::from(comment.clone()));
        }
        Ok(outcome)
    }

    pub fn edit_comment(
        &self,
        id: EntityId,
        content: &str,
    ) -> RepoResult<EntityOperationResult<Comment>> {
        self.modify_comment(id, |comment| comment.content = content.trim().to_string())
    }

    pub fn update_comment_status(
        &self,
        id: EntityId,
        status: StatusKind,
    ) -> RepoResult<EntityOperationResult<Comment>> {
        self.modify_comment(id, |comment| comment.status = status)
    }

    pub fn get_comment(&self, id: EntityId) -> RepoResult<Option<Comment>> {
        self.repo.get_comment(id)
    }

    pub fn list_comments(&self, project: EntityId) -> RepoResult<Vec<Comment>> {
        self.repo.list_comments(project)
    }

    /// Deletes a comment together with its replies.
    pub fn delete_comment(&self, id: EntityId) -> RepoResult<EntityOperationResult<EntityId>> {
        let replies = self
            .repo
            .get_comment(id)?
            .map(|comment| comment.replies)
            .unwrap_or_default();
        let outcome = into_operation_result(self.repo.delete_comment(id).map(|()| id))?;
        if outcome.is_succeeded() {
            info!("event=entity_delete module=service status=ok type=Comment id={id}");
            deindex_quietly(self.indexer.as_ref(), EntityKind::Comment, id);
            for reply in replies {
                deindex_quietly(self.indexer.as_ref(), EntityKind::Reply, reply);
            }
        }
        Ok(outcome)
    }

    /// Appends a reply to `comment`.
    pub fn reply_to(
        &self,
        comment: EntityId,
        author: EntityId,
        content: &str,
    ) -> RepoResult<EntityOperationResult<Reply>> {
        let reply = Reply::new(content.trim(), author);
        let outcome =
            into_operation_result(self.repo.create_reply(comment, &reply).map(|_| reply))?;
        if let Some(reply) = outcome.entity.as_ref() {
            index_quietly(self.indexer.as_ref(), EntityDto::from(reply.clone()));
        }
        Ok(outcome)
    }

    pub fn edit_reply(&self, id: EntityId, content: &str) -> RepoResult<EntityOperationResult<Reply>> {
        let Some(mut reply) = self.repo.get_reply(id)? else {
            return Ok(EntityOperationResult::rejected(format!("entity not found: {id}")));
        };
        reply.content = content.trim().to_string();
        let outcome = into_operation_result(self.repo.update_reply(&reply).map(|()| reply))?;
        if let Some(reply) = outcome.entity.as_ref() {
            index_quietly(self.indexer.as_ref(), EntityDto::from(reply.clone()));
        }
        Ok(outcome)
    }

    pub fn list_replies(&self, comment: EntityId) -> RepoResult<Vec<Reply>> {
        self.repo.list_replies(comment)
    }

    pub fn delete_reply(&self, id: EntityId) -> RepoResult<EntityOperationResult<EntityId>> {
        let outcome = into_operation_result(self.repo.delete_reply(id).map(|()| id))?;
        if outcome.is_succeeded() {
            deindex_quietly(self.indexer.as_ref(), EntityKind::Reply, id);
        }
        Ok(outcome)
    }

    fn modify_comment(
        &self,
        id: EntityId,
        change: impl FnOnce(&mut Comment),
    ) -> RepoResult<EntityOperationResult<Comment>> {
        let Some(mut comment) = self.repo.get_comment(id)? else {
            return Ok(EntityOperationResult::rejected(format!("entity not found: {id}")));
        };
        change(&mut comment);
        let outcome = into_operation_result(self.repo.update_comment(&comment).map(|()| comment))?;
        if let Some(comment) = outcome.entity.as_ref() {
            index_quietly(self.indexer.as_ref(), EntityDto::from(comment.clone()));
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::AnnotationService;
    use crate::db::open_db_in_memory;
    use crate::model::entity::{EntityKind, StatusKind};
    use crate::model::review::{Participant, Project, Role};
    use crate::repo::annotation_repo::SqliteAnnotationRepository;
    use crate::repo::project_repo::{ProjectRepository, SqliteProjectRepository};
    use crate::repo::role_repo::{RoleRepository, SqliteRoleRepository};
    use crate::service::test_support::RecordingIndexer;
    use std::sync::Arc;

    #[test]
    fn comment_thread_lifecycle_keeps_index_in_step() {
        let conn = open_db_in_memory().unwrap();
        let role = Role::new("Reviewer", Vec::new());
        SqliteRoleRepository::try_new(&conn)
            .unwrap()
            .create_role(&role)
            .unwrap();
        let projects = SqliteProjectRepository::try_new(&conn).unwrap();
        let project = Project::new("Envision");
        projects.create_project(&project).unwrap();
        let author = Participant::new("alice", role.id);
        projects.create_participant(project.id, &author).unwrap();

        let indexer = Arc::new(RecordingIndexer::default());
        let service = AnnotationService::with_indexer(
            SqliteAnnotationRepository::try_new(&conn).unwrap(),
            indexer.clone(),
        );

        let blank = service.add_comment(project.id, author.id, "   ").unwrap();
        assert!(!blank.is_succeeded());

        let comment = service
            .add_comment(project.id, author.id, "Mass budget exceeds margin")
            .unwrap()
            .entity
            .unwrap();
        let reply = service
            .reply_to(comment.id, author.id, "Agreed")
            .unwrap()
            .entity
            .unwrap();

        let done = service
            .update_comment_status(comment.id, StatusKind::Done)
            .unwrap()
            .entity
            .unwrap();
        assert_eq!(done.status, StatusKind::Done);
        assert_eq!(done.replies, vec![reply.id]);

        assert!(service.delete_comment(comment.id).unwrap().is_succeeded());
        assert!(service.list_replies(comment.id).unwrap().is_empty());

        let deindexed = indexer.deindexed.lock().unwrap().clone();
        assert_eq!(
            deindexed,
            vec![(EntityKind::Comment, comment.id), (EntityKind::Reply, reply.id)]
        );
    }

    #[test]
    fn authors_from_another_project_are_rejected() {
        let conn = open_db_in_memory().unwrap();
        let role = Role::new("Reviewer", Vec::new());
        SqliteRoleRepository::try_new(&conn)
            .unwrap()
            .create_role(&role)
            .unwrap();
        let projects = SqliteProjectRepository::try_new(&conn).unwrap();
        let envision = Project::new("Envision");
        let hera = Project::new("Hera");
        projects.create_project(&envision).unwrap();
        projects.create_project(&hera).unwrap();
        let alice = Participant::new("alice", role.id);
        let bob = Participant::new("bob", role.id);
        projects.create_participant(envision.id, &alice).unwrap();
        projects.create_participant(hera.id, &bob).unwrap();

        let service = AnnotationService::new(SqliteAnnotationRepository::try_new(&conn).unwrap());
        let foreign = service.add_comment(envision.id, bob.id, "Drop it").unwrap();
        assert!(foreign.errors[0].contains("outside project"));

        let comment = service
            .add_comment(envision.id, alice.id, "Margin too thin")
            .unwrap()
            .entity
            .unwrap();
        let foreign_reply = service.reply_to(comment.id, bob.id, "Agreed").unwrap();
        assert!(!foreign_reply.is_succeeded());
        assert!(service.list_replies(comment.id).unwrap().is_empty());
    }
}
