//! Review hierarchy manager.
//!
//! # Invariants
//! - New reviews, objectives and tasks receive the next sequential number
//!   within their container.
//! - Authors and task assignees must be participants of the review's project.
//! - Deleting an item removes it and everything it owns from the search index.

use crate::dto::EntityDto;
use crate::model::entity::{EntityId, EntityKind, StatusKind};
use crate::model::review::{Review, ReviewObjective, ReviewTask};
use crate::repo::review_repo::ReviewRepository;
use crate::repo::RepoResult;
use crate::search::index_client::{NoopIndexer, SearchIndexer};
use crate::service::{deindex_quietly, index_quietly, into_operation_result, EntityOperationResult};
use log::info;
use std::sync::Arc;

/// Use-case service for reviews, review objectives and review tasks.
pub struct ReviewService<R: ReviewRepository> {
    repo: R,
    indexer: Arc<dyn SearchIndexer>,
}

impl<R: ReviewRepository> ReviewService<R> {
    pub fn new(repo: R) -> Self {
        Self::with_indexer(repo, Arc::new(NoopIndexer))
    }

    pub fn with_indexer(repo: R, indexer: Arc<dyn SearchIndexer>) -> Self {
        Self { repo, indexer }
    }

    /// Opens a new review in `project`.
    pub fn create_review(
        &self,
        project: EntityId,
        title: &str,
        description: &str,
        author: EntityId,
    ) -> RepoResult<EntityOperationResult<Review>> {
        let mut review = Review::new(title.trim(), description, author);
        review.review_number = self.repo.next_review_number(project)?;
        let outcome =
            into_operation_result(self.repo.create_review(project, &review).map(|_| review))?;
        if let Some(review) = outcome.entity.as_ref() {
            info!(
                "event=review_create module=service status=ok id={} number={}",
                review.id, review.review_number
            );
            index_quietly(self.indexer.as_ref(), EntityDto::from(review.clone()));
        }
        Ok(outcome)
    }

    pub fn update_review(&self, review: &Review) -> RepoResult<EntityOperationResult<Review>> {
        let outcome = into_operation_result(self.repo.update_review(review).map(|()| review.clone()))?;
        if let Some(review) = outcome.entity.as_ref() {
            index_quietly(self.indexer.as_ref(), EntityDto::from(review.clone()));
        }
        Ok(outcome)
    }

    pub fn set_review_status(
        &self,
        id: EntityId,
        status: StatusKind,
    ) -> RepoResult<EntityOperationResult<Review>> {
        let Some(mut review) = self.repo.get_review(id)? else {
            return Ok(EntityOperationResult::rejected(format!("entity not found: {id}")));
        };
        review.status = status;
        self.update_review(&review)
    }

    pub fn get_review(&self, id: EntityId) -> RepoResult<Option<Review>> {
        self.repo.get_review(id)
    }

    pub fn list_reviews(&self, project: EntityId) -> RepoResult<Vec<Review>> {
        self.repo.list_reviews(project)
    }

    pub fn delete_review(&self, id: EntityId) -> RepoResult<EntityOperationResult<EntityId>> {
        self.delete_with(EntityKind::Review, id, |repo, id| repo.delete_review(id))
    }

    /// Adds an objective to `review`.
    pub fn create_objective(
        &self,
        review: EntityId,
        title: &str,
        description: &str,
        author: EntityId,
    ) -> RepoResult<EntityOperationResult<ReviewObjective>> {
        let mut objective = ReviewObjective::new(title.trim(), description, author);
        objective.review_objective_number = self.repo.next_objective_number(review)?;
        let outcome = into_operation_result(
            self.repo
                .create_objective(review, &objective)
                .map(|_| objective),
        )?;
        if let Some(objective) = outcome.entity.as_ref() {
            index_quietly(self.indexer.as_ref(), EntityDto::from(objective.clone()));
        }
        Ok(outcome)
    }

    pub fn update_objective(
        &self,
        objective: &ReviewObjective,
    ) -> RepoResult<EntityOperationResult<ReviewObjective>> {
        let outcome = into_operation_result(
            self.repo
                .update_objective(objective)
                .map(|()| objective.clone()),
        )?;
        if let Some(objective) = outcome.entity.as_ref() {
            index_quietly(self.indexer.as_ref(), EntityDto::from(objective.clone()));
        }
        Ok(outcome)
    }

    pub fn list_objectives(&self, review: EntityId) -> RepoResult<Vec<ReviewObjective>> {
        self.repo.list_objectives(review)
    }

    pub fn delete_objective(&self, id: EntityId) -> RepoResult<EntityOperationResult<EntityId>> {
        self.delete_with(EntityKind::ReviewObjective, id, |repo, id| {
            repo.delete_objective(id)
        })
    }

    /// Adds a task to `objective`, assigned to `assignees` in order.
    pub fn create_task(
        &self,
        objective: EntityId,
        title: &str,
        description: &str,
        author: EntityId,
        assignees: Vec<EntityId>,
    ) -> RepoResult<EntityOperationResult<ReviewTask>> {
        let mut task = ReviewTask::new(title.trim(), description, author);
        task.task_number = self.repo.next_task_number(objective)?;
        task.is_assigned_to = dedup_preserving_order(assignees);
        let outcome =
            into_operation_result(self.repo.create_task(objective, &task).map(|_| task))?;
        if let Some(task) = outcome.entity.as_ref() {
            index_quietly(self.indexer.as_ref(), EntityDto::from(task.clone()));
        }
        Ok(outcome)
    }

    /// Replaces the full assignee list of a task.
    pub fn assign_task(
        &self,
        task: EntityId,
        assignees: Vec<EntityId>,
    ) -> RepoResult<EntityOperationResult<ReviewTask>> {
        let Some(mut record) = self.repo.get_task(task)? else {
            return Ok(EntityOperationResult::rejected(format!("entity not found: {task}")));
        };
        record.is_assigned_to = dedup_preserving_order(assignees);
        self.update_task(&record)
    }

    pub fn update_task(&self, task: &ReviewTask) -> RepoResult<EntityOperationResult<ReviewTask>> {
        let outcome = into_operation_result(self.repo.update_task(task).map(|()| task.clone()))?;
        if let Some(task) = outcome.entity.as_ref() {
            index_quietly(self.indexer.as_ref(), EntityDto::from(task.clone()));
        }
        Ok(outcome)
    }

    pub fn get_task(&self, id: EntityId) -> RepoResult<Option<ReviewTask>> {
        self.repo.get_task(id)
    }

    pub fn list_tasks(&self, objective: EntityId) -> RepoResult<Vec<ReviewTask>> {
        self.repo.list_tasks(objective)
    }

    pub fn delete_task(&self, id: EntityId) -> RepoResult<EntityOperationResult<EntityId>> {
        self.delete_with(EntityKind::ReviewTask, id, |repo, id| repo.delete_task(id))
    }

    fn delete_with(
        &self,
        kind: EntityKind,
        id: EntityId,
        delete: impl FnOnce(&R, EntityId) -> RepoResult<()>,
    ) -> RepoResult<EntityOperationResult<EntityId>> {
        let owned = self.repo.owned_records(kind, id)?;
        let outcome = into_operation_result(delete(&self.repo, id).map(|()| id))?;
        if outcome.is_succeeded() {
            info!(
                "event=entity_delete module=service status=ok type={kind} id={id} cascaded={}",
                owned.len()
            );
            deindex_quietly(self.indexer.as_ref(), kind, id);
            for (owned_kind, owned_id) in owned {
                deindex_quietly(self.indexer.as_ref(), owned_kind, owned_id);
            }
        }
        Ok(outcome)
    }
}

fn dedup_preserving_order(ids: Vec<EntityId>) -> Vec<EntityId> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

#[cfg(test)]
mod tests {
    use super::{dedup_preserving_order, ReviewService};
    use crate::db::open_db_in_memory;
    use crate::model::entity::{EntityId, EntityKind, StatusKind};
    use crate::model::review::{Participant, Project, Role};
    use crate::repo::project_repo::{ProjectRepository, SqliteProjectRepository};
    use crate::repo::review_repo::SqliteReviewRepository;
    use crate::repo::role_repo::{RoleRepository, SqliteRoleRepository};
    use crate::service::test_support::RecordingIndexer;
    use rusqlite::Connection;
    use std::sync::Arc;
    use uuid::Uuid;

    fn seed_project(conn: &Connection) -> (EntityId, EntityId) {
        let role = Role::new("Reviewer", Vec::new());
        SqliteRoleRepository::try_new(conn)
            .unwrap()
            .create_role(&role)
            .unwrap();
        let projects = SqliteProjectRepository::try_new(conn).unwrap();
        let project = Project::new("Envision");
        projects.create_project(&project).unwrap();
        let author = Participant::new("alice", role.id);
        projects.create_participant(project.id, &author).unwrap();
        (project.id, author.id)
    }

    #[test]
    fn numbers_are_sequential_per_container() {
        let conn = open_db_in_memory().unwrap();
        let (project, author) = seed_project(&conn);
        let service = ReviewService::new(SqliteReviewRepository::try_new(&conn).unwrap());

        let first = service
            .create_review(project, "Mission", "", author)
            .unwrap()
            .entity
            .unwrap();
        let second = service
            .create_review(project, "Power", "", author)
            .unwrap()
            .entity
            .unwrap();
        assert_eq!((first.review_number, second.review_number), (1, 2));

        let objective = service
            .create_objective(first.id, "Budget", "", author)
            .unwrap()
            .entity
            .unwrap();
        assert_eq!(objective.review_objective_number, 1);

        let task = service
            .create_task(objective.id, "Check margins", "", author, vec![author, author])
            .unwrap()
            .entity
            .unwrap();
        assert_eq!(task.task_number, 1);
        assert_eq!(task.is_assigned_to, vec![author]);
    }

    #[test]
    fn unknown_container_and_assignee_become_messages() {
        let conn = open_db_in_memory().unwrap();
        let (project, author) = seed_project(&conn);
        let service = ReviewService::new(SqliteReviewRepository::try_new(&conn).unwrap());

        let orphan = service
            .create_objective(Uuid::new_v4(), "Budget", "", author)
            .unwrap();
        assert!(!orphan.is_succeeded());

        let review = service
            .create_review(project, "Mission", "", author)
            .unwrap()
            .entity
            .unwrap();
        let objective = service
            .create_objective(review.id, "Budget", "", author)
            .unwrap()
            .entity
            .unwrap();
        let stranger = service
            .create_task(objective.id, "Check", "", author, vec![Uuid::new_v4()])
            .unwrap();
        assert!(!stranger.is_succeeded());
        assert!(service.list_tasks(objective.id).unwrap().is_empty());
    }

    #[test]
    fn status_change_and_delete() {
        let conn = open_db_in_memory().unwrap();
        let (project, author) = seed_project(&conn);
        let service = ReviewService::new(SqliteReviewRepository::try_new(&conn).unwrap());
        let review = service
            .create_review(project, "Mission", "", author)
            .unwrap()
            .entity
            .unwrap();

        let closed = service
            .set_review_status(review.id, StatusKind::Closed)
            .unwrap();
        assert_eq!(closed.entity.unwrap().status, StatusKind::Closed);

        assert!(service.delete_review(review.id).unwrap().is_succeeded());
        assert!(service.get_review(review.id).unwrap().is_none());
        assert!(!service.delete_review(review.id).unwrap().is_succeeded());
    }

    #[test]
    fn members_of_another_project_are_rejected() {
        let conn = open_db_in_memory().unwrap();
        let (project, alice) = seed_project(&conn);
        let projects = SqliteProjectRepository::try_new(&conn).unwrap();
        let other = Project::new("Hera");
        projects.create_project(&other).unwrap();
        let role = projects.get_participant(alice).unwrap().unwrap().role;
        let bob = Participant::new("bob", role);
        projects.create_participant(other.id, &bob).unwrap();

        let service = ReviewService::new(SqliteReviewRepository::try_new(&conn).unwrap());
        let foreign_author = service.create_review(project, "Mission", "", bob.id).unwrap();
        assert!(foreign_author.errors[0].contains("outside project"));

        let review = service
            .create_review(project, "Mission", "", alice)
            .unwrap()
            .entity
            .unwrap();
        let objective = service
            .create_objective(review.id, "Budget", "", alice)
            .unwrap()
            .entity
            .unwrap();

        let foreign_assignee = service
            .create_task(objective.id, "Check", "", alice, vec![bob.id])
            .unwrap();
        assert!(!foreign_assignee.is_succeeded());
        assert!(foreign_assignee.errors[0].contains("isAssignedTo"));
        assert!(service.list_tasks(objective.id).unwrap().is_empty());

        let task = service
            .create_task(objective.id, "Check", "", alice, Vec::new())
            .unwrap()
            .entity
            .unwrap();
        let reassigned = service.assign_task(task.id, vec![bob.id]).unwrap();
        assert!(!reassigned.is_succeeded());
        assert!(service.get_task(task.id).unwrap().unwrap().is_assigned_to.is_empty());

        let mut moved = objective.clone();
        moved.author = bob.id;
        assert!(!service.update_objective(&moved).unwrap().is_succeeded());
    }

    #[test]
    fn deleting_a_review_deindexes_its_objectives_and_tasks() {
        let conn = open_db_in_memory().unwrap();
        let (project, author) = seed_project(&conn);
        let indexer = Arc::new(RecordingIndexer::default());
        let service = ReviewService::with_indexer(
            SqliteReviewRepository::try_new(&conn).unwrap(),
            indexer.clone(),
        );
        let review = service
            .create_review(project, "Mission", "", author)
            .unwrap()
            .entity
            .unwrap();
        let objective = service
            .create_objective(review.id, "Budget", "", author)
            .unwrap()
            .entity
            .unwrap();
        let task = service
            .create_task(objective.id, "Check margins", "", author, vec![author])
            .unwrap()
            .entity
            .unwrap();

        assert!(service.delete_review(review.id).unwrap().is_succeeded());

        assert_eq!(
            *indexer.deindexed.lock().unwrap(),
            vec![
                (EntityKind::Review, review.id),
                (EntityKind::ReviewObjective, objective.id),
                (EntityKind::ReviewTask, task.id),
            ]
        );
    }

    #[test]
    fn dedup_keeps_first_occurrence_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(dedup_preserving_order(vec![b, a, b, a]), vec![b, a]);
    }
}
