//! Repository layer over the SQLite entity store.
//!
//! # Responsibility
//! - Provide create/read/update/delete APIs keyed by entity id.
//! - Keep SQL details behind per-aggregate repository traits.
//!
//! # Invariants
//! - Write paths call `validate()` on the record before any SQL mutation.
//! - Owned id lists on parent records are read-side projections ordered by
//!   `position`; writing a parent never rewrites its children.
//! - Deleting a parent removes owned descendants through SQL cascades.

pub mod annotation_repo;
pub mod project_repo;
pub mod review_repo;
pub mod role_repo;

use crate::db::migrations::latest_version;
use crate::db::DbError;
use crate::model::entity::{EntityId, EntityKind, ModelValidationError, StatusKind};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for entity persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Record failed its model invariants.
    Validation(ModelValidationError),
    Db(DbError),
    NotFound(EntityId),
    /// Owning container of a new child record does not exist.
    MissingContainer { kind: EntityKind, id: EntityId },
    /// A non-owning reference points at a record that does not exist.
    UnknownReference { field: &'static str, target: EntityId },
    /// A participant reference names a member of a different project.
    ForeignParticipant {
        field: &'static str,
        participant: EntityId,
        project: EntityId,
    },
    /// Record cannot be deleted while other records reference it.
    InUse(EntityId),
    /// Connection schema is not at the version this binary expects.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Persisted data cannot be converted into a valid record.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "entity not found: {id}"),
            Self::MissingContainer { kind, id } => write!(f, "{kind} container not found: {id}"),
            Self::UnknownReference { field, target } => {
                write!(f, "reference `{field}` points at unknown entity {target}")
            }
            Self::ForeignParticipant {
                field,
                participant,
                project,
            } => write!(
                f,
                "reference `{field}` points at participant {participant} outside project {project}"
            ),
            Self::InUse(id) => write!(f, "entity {id} is still referenced"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "repository requires schema version {expected_version}, got {actual_version}"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted entity data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ModelValidationError> for RepoError {
    fn from(value: ModelValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Fails unless `conn` has every migration applied.
pub(crate) fn ensure_schema_ready(conn: &Connection) -> RepoResult<()> {
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    let expected_version = latest_version();
    if actual_version != expected_version {
        return Err(RepoError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }
    Ok(())
}

pub(crate) fn parse_uuid(value: &str, column: &str) -> RepoResult<EntityId> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in {column}")))
}

pub(crate) fn parse_status(value: &str, column: &str) -> RepoResult<StatusKind> {
    StatusKind::parse(value)
        .ok_or_else(|| RepoError::InvalidData(format!("invalid status `{value}` in {column}")))
}

pub(crate) fn parse_number(value: i64, column: &str) -> RepoResult<u32> {
    u32::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid number `{value}` in {column}")))
}

pub(crate) fn row_exists(conn: &Connection, table: &str, id: EntityId) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        &format!("SELECT EXISTS(SELECT 1 FROM {table} WHERE uuid = ?1);"),
        [id.to_string()],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

pub(crate) fn require_container(
    conn: &Connection,
    table: &str,
    kind: EntityKind,
    id: EntityId,
) -> RepoResult<()> {
    if !row_exists(conn, table, id)? {
        return Err(RepoError::MissingContainer { kind, id });
    }
    Ok(())
}

pub(crate) fn require_reference(
    conn: &Connection,
    table: &str,
    field: &'static str,
    target: EntityId,
) -> RepoResult<()> {
    if !row_exists(conn, table, target)? {
        return Err(RepoError::UnknownReference { field, target });
    }
    Ok(())
}

/// Fails unless `participant` is a member of `project`.
pub(crate) fn require_member(
    conn: &Connection,
    project: EntityId,
    field: &'static str,
    participant: EntityId,
) -> RepoResult<()> {
    match container_of(conn, "participants", "project_uuid", participant)? {
        None => Err(RepoError::UnknownReference {
            field,
            target: participant,
        }),
        Some(owner) if owner != project => Err(RepoError::ForeignParticipant {
            field,
            participant,
            project,
        }),
        Some(_) => Ok(()),
    }
}

/// Tables holding the records owned by a `kind` container.
fn owned_tables(kind: EntityKind) -> &'static [(EntityKind, &'static str, &'static str)] {
    match kind {
        EntityKind::Project => &[
            (EntityKind::Participant, "participants", "project_uuid"),
            (EntityKind::Review, "reviews", "project_uuid"),
            (EntityKind::Comment, "comments", "project_uuid"),
        ],
        EntityKind::Review => &[(EntityKind::ReviewObjective, "review_objectives", "review_uuid")],
        EntityKind::ReviewObjective => &[(
            EntityKind::ReviewTask,
            "review_tasks",
            "review_objective_uuid",
        )],
        EntityKind::Comment => &[(EntityKind::Reply, "replies", "comment_uuid")],
        _ => &[],
    }
}

/// Every record a delete of `id` cascades to, depth first in list order.
/// The record itself is not included.
pub(crate) fn owned_subtree(
    conn: &Connection,
    kind: EntityKind,
    id: EntityId,
) -> RepoResult<Vec<(EntityKind, EntityId)>> {
    let mut owned = Vec::new();
    for (child_kind, table, parent_column) in owned_tables(kind) {
        for child in child_ids(conn, table, parent_column, id)? {
            owned.push((*child_kind, child));
            owned.extend(owned_subtree(conn, *child_kind, child)?);
        }
    }
    Ok(owned)
}

/// Next free `position` among the children of `parent`.
pub(crate) fn next_position(
    conn: &Connection,
    table: &str,
    parent_column: &str,
    parent: EntityId,
) -> RepoResult<i64> {
    let position: i64 = conn.query_row(
        &format!("SELECT COALESCE(MAX(position), -1) + 1 FROM {table} WHERE {parent_column} = ?1;"),
        [parent.to_string()],
        |row| row.get(0),
    )?;
    Ok(position)
}

/// Next sequential business number among the children of `parent`.
pub(crate) fn next_number(
    conn: &Connection,
    table: &str,
    number_column: &str,
    parent_column: &str,
    parent: EntityId,
) -> RepoResult<u32> {
    let number: i64 = conn.query_row(
        &format!(
            "SELECT COALESCE(MAX({number_column}), 0) + 1 FROM {table} WHERE {parent_column} = ?1;"
        ),
        [parent.to_string()],
        |row| row.get(0),
    )?;
    parse_number(number, number_column)
}

/// Ids of the children of `parent`, in list order.
pub(crate) fn child_ids(
    conn: &Connection,
    table: &str,
    parent_column: &str,
    parent: EntityId,
) -> RepoResult<Vec<EntityId>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT uuid FROM {table} WHERE {parent_column} = ?1 ORDER BY position ASC, uuid ASC;"
    ))?;
    let mut rows = stmt.query([parent.to_string()])?;
    let mut ids = Vec::new();
    while let Some(row) = rows.next()? {
        let value: String = row.get(0)?;
        ids.push(parse_uuid(&value, &format!("{table}.uuid"))?);
    }
    Ok(ids)
}

/// Owning container id of child record `id`.
pub(crate) fn container_of(
    conn: &Connection,
    table: &str,
    parent_column: &str,
    id: EntityId,
) -> RepoResult<Option<EntityId>> {
    let value: Option<String> = conn
        .query_row(
            &format!("SELECT {parent_column} FROM {table} WHERE uuid = ?1;"),
            [id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    value
        .map(|value| parse_uuid(&value, &format!("{table}.{parent_column}")))
        .transpose()
}

/// Deletes one row by id, mapping foreign-key violations to `InUse`.
pub(crate) fn delete_row(conn: &Connection, table: &str, id: EntityId) -> RepoResult<()> {
    let changed = conn
        .execute(
            &format!("DELETE FROM {table} WHERE uuid = ?1;"),
            [id.to_string()],
        )
        .map_err(|err| match err.sqlite_error_code() {
            Some(ErrorCode::ConstraintViolation) => RepoError::InUse(id),
            _ => RepoError::from(err),
        })?;

    if changed == 0 {
        return Err(RepoError::NotFound(id));
    }
    Ok(())
}
