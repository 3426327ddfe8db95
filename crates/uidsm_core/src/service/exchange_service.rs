//! Project exchange: export a project as an exchanged set and import one back.
//!
//! # Invariants
//! - Import is all-or-nothing: it runs inside one transaction and any
//!   rejection rolls every write back.
//! - Import refuses payloads with references that resolve neither inside the
//!   payload nor against already-stored records.
//! - New children keep the order of their owner's id list.
//! - Records already stored are updated in place. Import never moves them to
//!   another container or reorders them; a payload listing a stored record
//!   under a different owner is rejected.

use crate::dto::EntityDto;
use crate::graph::EntityGraph;
use crate::model::entity::{EntityId, EntityKind};
use crate::repo::annotation_repo::{AnnotationRepository, SqliteAnnotationRepository};
use crate::repo::project_repo::{ProjectRepository, SqliteProjectRepository};
use crate::repo::review_repo::{ReviewRepository, SqliteReviewRepository};
use crate::repo::role_repo::{RoleRepository, SqliteRoleRepository};
use crate::repo::{container_of, row_exists, RepoError, RepoResult};
use crate::search::index_client::{NoopIndexer, SearchIndexer};
use crate::service::{index_quietly, into_operation_result, EntityOperationResult};
use log::{info, warn};
use rusqlite::Connection;
use std::collections::HashSet;
use std::sync::Arc;

/// Counts of records written by one import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
}

/// Moves whole projects between the store and exchanged sets.
pub struct ExchangeService<'conn> {
    conn: &'conn Connection,
    indexer: Arc<dyn SearchIndexer>,
}

impl<'conn> ExchangeService<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self::with_indexer(conn, Arc::new(NoopIndexer))
    }

    pub fn with_indexer(conn: &'conn Connection, indexer: Arc<dyn SearchIndexer>) -> Self {
        Self { conn, indexer }
    }

    /// Collects a project and everything it owns, plus the roles its
    /// participants hold, into a referentially complete exchanged set.
    ///
    /// Roles come first, then the project, then owned records depth-first in
    /// list order.
    pub fn export_project(
        &self,
        project_id: EntityId,
    ) -> RepoResult<EntityOperationResult<Vec<EntityDto>>> {
        let roles = SqliteRoleRepository::try_new(self.conn)?;
        let projects = SqliteProjectRepository::try_new(self.conn)?;
        let reviews = SqliteReviewRepository::try_new(self.conn)?;
        let annotations = SqliteAnnotationRepository::try_new(self.conn)?;

        let Some(project) = projects.get_project(project_id)? else {
            return Ok(EntityOperationResult::rejected(format!(
                "entity not found: {project_id}"
            )));
        };

        let participants = projects.list_participants(project_id)?;
        let mut seen_roles = HashSet::new();
        let mut records = Vec::new();
        for participant in &participants {
            if !seen_roles.insert(participant.role) {
                continue;
            }
            let role = roles
                .get_role(participant.role)?
                .ok_or_else(|| {
                    RepoError::InvalidData(format!(
                        "participant {} holds missing role {}",
                        participant.id, participant.role
                    ))
                })?;
            records.push(EntityDto::from(role));
        }

        records.push(EntityDto::from(project));
        records.extend(participants.into_iter().map(EntityDto::from));

        for review in reviews.list_reviews(project_id)? {
            let review_id = review.id;
            records.push(EntityDto::from(review));
            for objective in reviews.list_objectives(review_id)? {
                let objective_id = objective.id;
                records.push(EntityDto::from(objective));
                records.extend(
                    reviews
                        .list_tasks(objective_id)?
                        .into_iter()
                        .map(EntityDto::from),
                );
            }
        }

        for comment in annotations.list_comments(project_id)? {
            let comment_id = comment.id;
            records.push(EntityDto::from(comment));
            records.extend(
                annotations
                    .list_replies(comment_id)?
                    .into_iter()
                    .map(EntityDto::from),
            );
        }

        info!(
            "event=project_export module=service status=ok id={project_id} records={}",
            records.len()
        );
        Ok(EntityOperationResult::success(records))
    }

    /// Upserts an exchanged set into the store.
    ///
    /// Records already stored are updated in place. New owned records are
    /// attached to the payload record whose id list contains them.
    pub fn import(
        &self,
        records: Vec<EntityDto>,
    ) -> RepoResult<EntityOperationResult<ImportSummary>> {
        let (graph, report) = EntityGraph::from_records(records);

        let mut errors = Vec::new();
        for dangling in &report.dangling {
            if !self.stored_anywhere(dangling.target)? {
                errors.push(format!(
                    "{} {} field `{}` references unknown entity {}",
                    dangling.source_kind, dangling.source, dangling.field, dangling.target
                ));
            }
        }
        if !errors.is_empty() {
            warn!(
                "event=project_import module=service status=rejected dangling={}",
                errors.len()
            );
            return Ok(EntityOperationResult::failure(errors));
        }

        let tx = self.conn.unchecked_transaction()?;
        let roles = SqliteRoleRepository::try_new(&tx)?;
        let projects = SqliteProjectRepository::try_new(&tx)?;
        let reviews = SqliteReviewRepository::try_new(&tx)?;
        let annotations = SqliteAnnotationRepository::try_new(&tx)?;

        let mut summary = ImportSummary::default();
        for kind in EntityKind::all() {
            for record in ordered_by_owner(&graph, *kind) {
                let id = record.id();
                let exists = match record {
                    EntityDto::Role(_) => roles.get_role(id)?.is_some(),
                    EntityDto::Project(_) => projects.get_project(id)?.is_some(),
                    EntityDto::Participant(_) => projects.get_participant(id)?.is_some(),
                    EntityDto::Review(_) => reviews.get_review(id)?.is_some(),
                    EntityDto::ReviewObjective(_) => reviews.get_objective(id)?.is_some(),
                    EntityDto::ReviewTask(_) => reviews.get_task(id)?.is_some(),
                    EntityDto::Comment(_) => annotations.get_comment(id)?.is_some(),
                    EntityDto::Reply(_) => annotations.get_reply(id)?.is_some(),
                };

                if exists {
                    if let Some(message) = moved_owner(&tx, &graph, record)? {
                        errors.push(message);
                        continue;
                    }
                }

                let write = if exists {
                    match record {
                        EntityDto::Role(role) => roles.update_role(role),
                        EntityDto::Project(project) => projects.update_project(project),
                        EntityDto::Participant(participant) => {
                            projects.update_participant(participant)
                        }
                        EntityDto::Review(review) => reviews.update_review(review),
                        EntityDto::ReviewObjective(objective) => {
                            reviews.update_objective(objective)
                        }
                        EntityDto::ReviewTask(task) => reviews.update_task(task),
                        EntityDto::Comment(comment) => annotations.update_comment(comment),
                        EntityDto::Reply(reply) => annotations.update_reply(reply),
                    }
                } else {
                    let owner = owner_in_payload(&graph, record).map(|(owner, _)| owner);
                    match (record, owner) {
                        (EntityDto::Role(role), _) => roles.create_role(role).map(|_| ()),
                        (EntityDto::Project(project), _) => {
                            projects.create_project(project).map(|_| ())
                        }
                        (EntityDto::Participant(participant), Some(owner)) => projects
                            .create_participant(owner, participant)
                            .map(|_| ()),
                        (EntityDto::Review(review), Some(owner)) => {
                            reviews.create_review(owner, review).map(|_| ())
                        }
                        (EntityDto::ReviewObjective(objective), Some(owner)) => {
                            reviews.create_objective(owner, objective).map(|_| ())
                        }
                        (EntityDto::ReviewTask(task), Some(owner)) => {
                            reviews.create_task(owner, task).map(|_| ())
                        }
                        (EntityDto::Comment(comment), Some(owner)) => {
                            annotations.create_comment(owner, comment).map(|_| ())
                        }
                        (EntityDto::Reply(reply), Some(owner)) => {
                            annotations.create_reply(owner, reply).map(|_| ())
                        }
                        (record, None) => {
                            errors.push(format!(
                                "{} {} has no owning container in the payload",
                                record.kind(),
                                record.id()
                            ));
                            continue;
                        }
                    }
                };

                let outcome = into_operation_result(write)?;
                if !outcome.errors.is_empty() {
                    errors.extend(
                        outcome
                            .errors
                            .into_iter()
                            .map(|message| format!("{} {}: {message}", record.kind(), id)),
                    );
                } else if exists {
                    summary.updated += 1;
                } else {
                    summary.created += 1;
                }
            }
        }

        if !errors.is_empty() {
            warn!(
                "event=project_import module=service status=rejected errors={}",
                errors.len()
            );
            return Ok(EntityOperationResult::failure(errors));
        }
        tx.commit()?;

        info!(
            "event=project_import module=service status=ok created={} updated={}",
            summary.created, summary.updated
        );
        for record in graph.records() {
            index_quietly(self.indexer.as_ref(), record.clone());
        }
        Ok(EntityOperationResult::success(summary))
    }

    fn stored_anywhere(&self, id: EntityId) -> RepoResult<bool> {
        for table in STORED_TABLES {
            if row_exists(self.conn, table, id)? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

const STORED_TABLES: [&str; 8] = [
    "roles",
    "projects",
    "participants",
    "reviews",
    "review_objectives",
    "review_tasks",
    "comments",
    "replies",
];

/// Field through which a container lists the records it owns.
fn owning_field(kind: EntityKind) -> Option<&'static str> {
    match kind {
        EntityKind::Participant => Some("participants"),
        EntityKind::Review => Some("reviews"),
        EntityKind::Comment => Some("annotations"),
        EntityKind::ReviewObjective => Some("reviewObjectives"),
        EntityKind::ReviewTask => Some("reviewTasks"),
        EntityKind::Reply => Some("replies"),
        EntityKind::Role | EntityKind::Project => None,
    }
}

/// Table and parent column holding the stored owner of a `kind` record.
fn owner_column(kind: EntityKind) -> Option<(&'static str, &'static str)> {
    match kind {
        EntityKind::Participant => Some(("participants", "project_uuid")),
        EntityKind::Review => Some(("reviews", "project_uuid")),
        EntityKind::Comment => Some(("comments", "project_uuid")),
        EntityKind::ReviewObjective => Some(("review_objectives", "review_uuid")),
        EntityKind::ReviewTask => Some(("review_tasks", "review_objective_uuid")),
        EntityKind::Reply => Some(("replies", "comment_uuid")),
        EntityKind::Role | EntityKind::Project => None,
    }
}

/// Rejection message when the payload lists a stored record under an owner
/// other than its stored container.
fn moved_owner(
    conn: &Connection,
    graph: &EntityGraph,
    record: &EntityDto,
) -> RepoResult<Option<String>> {
    let (Some((owner, _)), Some((table, column))) =
        (owner_in_payload(graph, record), owner_column(record.kind()))
    else {
        return Ok(None);
    };
    let stored = container_of(conn, table, column, record.id())?;
    Ok(stored.filter(|stored| *stored != owner).map(|stored| {
        format!(
            "{} {} belongs to {stored}; import does not move it to {owner}",
            record.kind(),
            record.id()
        )
    }))
}

/// Owner id and list position of `record` within the payload.
fn owner_in_payload(graph: &EntityGraph, record: &EntityDto) -> Option<(EntityId, usize)> {
    let field = owning_field(record.kind())?;
    let id = record.id();
    graph
        .referrers_of(id)
        .into_iter()
        .filter(|(_, via)| *via == field)
        .find_map(|(owner, _)| {
            owner
                .references()
                .into_iter()
                .filter(|reference| reference.field == field)
                .position(|reference| reference.target == id)
                .map(|position| (owner.id(), position))
        })
}

/// Records of one kind, children sorted by their position in the owner list.
fn ordered_by_owner(graph: &EntityGraph, kind: EntityKind) -> Vec<&EntityDto> {
    let mut records: Vec<&EntityDto> = graph
        .records()
        .filter(|record| record.kind() == kind)
        .collect();
    records.sort_by_key(|record| owner_in_payload(graph, record).map(|(_, position)| position));
    records
}
