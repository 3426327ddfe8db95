//! Project and participant repository contract and SQLite implementation.
//!
//! # Responsibility
//! - Persist projects and the participants they own.
//! - Project the owned `participants`, `reviews` and `annotations` id lists
//!   on read.
//!
//! # Invariants
//! - Project names are unique, compared case-insensitively.
//! - A user name appears at most once per project.
//! - Deleting a project cascades to everything it owns.

use crate::model::entity::{EntityId, EntityKind};
use crate::model::review::{Participant, Project};
use crate::repo::{
    child_ids, container_of, delete_row, ensure_schema_ready, next_position, owned_subtree,
    parse_uuid, require_container, require_reference, RepoError, RepoResult,
};
use rusqlite::{params, Connection, Row};

const PROJECT_SELECT_SQL: &str = "SELECT uuid, project_name, created_on FROM projects";
const PARTICIPANT_SELECT_SQL: &str = "SELECT uuid, user_name, role_uuid FROM participants";

/// Repository interface for projects and their participants.
pub trait ProjectRepository {
    fn create_project(&self, project: &Project) -> RepoResult<EntityId>;
    /// Renames a project. Owned lists are ignored.
    fn update_project(&self, project: &Project) -> RepoResult<()>;
    fn get_project(&self, id: EntityId) -> RepoResult<Option<Project>>;
    fn find_project_by_name(&self, project_name: &str) -> RepoResult<Option<Project>>;
    /// Lists projects sorted by name.
    fn list_projects(&self) -> RepoResult<Vec<Project>>;
    fn delete_project(&self, id: EntityId) -> RepoResult<()>;
    /// Every record removed along with project `id`, depth first in list order.
    fn owned_records(&self, id: EntityId) -> RepoResult<Vec<(EntityKind, EntityId)>>;

    fn create_participant(&self, project: EntityId, participant: &Participant)
        -> RepoResult<EntityId>;
    fn update_participant(&self, participant: &Participant) -> RepoResult<()>;
    fn get_participant(&self, id: EntityId) -> RepoResult<Option<Participant>>;
    /// Case-insensitive lookup of a user inside one project.
    fn find_participant(&self, project: EntityId, user_name: &str)
        -> RepoResult<Option<Participant>>;
    /// Lists participants of one project in list order.
    fn list_participants(&self, project: EntityId) -> RepoResult<Vec<Participant>>;
    /// Owning project of a participant.
    fn participant_project(&self, participant: EntityId) -> RepoResult<Option<EntityId>>;
    fn delete_participant(&self, id: EntityId) -> RepoResult<()>;
}

/// SQLite-backed project repository.
pub struct SqliteProjectRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteProjectRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }

    fn load_project(&self, row: &Row<'_>) -> RepoResult<Project> {
        let uuid_text: String = row.get("uuid")?;
        let id = parse_uuid(&uuid_text, "projects.uuid")?;
        let project = Project {
            id,
            project_name: row.get("project_name")?,
            created_on: row.get("created_on")?,
            participants: child_ids(self.conn, "participants", "project_uuid", id)?,
            reviews: child_ids(self.conn, "reviews", "project_uuid", id)?,
            annotations: child_ids(self.conn, "comments", "project_uuid", id)?,
        };
        project.validate()?;
        Ok(project)
    }

    fn query_projects(&self, sql: &str, bind: Option<&str>) -> RepoResult<Vec<Project>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = match bind {
            Some(value) => stmt.query([value])?,
            None => stmt.query([])?,
        };
        let mut projects = Vec::new();
        while let Some(row) = rows.next()? {
            projects.push(self.load_project(row)?);
        }
        Ok(projects)
    }

    fn query_participants(&self, sql: &str, bind: &[&str]) -> RepoResult<Vec<Participant>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(bind))?;
        let mut participants = Vec::new();
        while let Some(row) = rows.next()? {
            participants.push(parse_participant_row(row)?);
        }
        Ok(participants)
    }
}

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn create_project(&self, project: &Project) -> RepoResult<EntityId> {
        project.validate()?;
        self.conn.execute(
            "INSERT INTO projects (uuid, project_name, created_on) VALUES (?1, ?2, ?3);",
            params![
                project.id.to_string(),
                project.project_name.trim(),
                project.created_on,
            ],
        )?;
        Ok(project.id)
    }

    fn update_project(&self, project: &Project) -> RepoResult<()> {
        project.validate()?;
        let changed = self.conn.execute(
            "UPDATE projects
             SET
                project_name = ?1,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?2;",
            params![project.project_name.trim(), project.id.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(project.id));
        }
        Ok(())
    }

    fn get_project(&self, id: EntityId) -> RepoResult<Option<Project>> {
        let id_text = id.to_string();
        let mut projects = self.query_projects(
            &format!("{PROJECT_SELECT_SQL} WHERE uuid = ?1;"),
            Some(id_text.as_str()),
        )?;
        Ok(projects.pop())
    }

    fn find_project_by_name(&self, project_name: &str) -> RepoResult<Option<Project>> {
        let mut projects = self.query_projects(
            &format!("{PROJECT_SELECT_SQL} WHERE project_name = ?1 COLLATE NOCASE;"),
            Some(project_name.trim()),
        )?;
        Ok(projects.pop())
    }

    fn list_projects(&self) -> RepoResult<Vec<Project>> {
        self.query_projects(
            &format!("{PROJECT_SELECT_SQL} ORDER BY project_name COLLATE NOCASE ASC, uuid ASC;"),
            None,
        )
    }

    fn delete_project(&self, id: EntityId) -> RepoResult<()> {
        delete_row(self.conn, "projects", id)
    }

    fn owned_records(&self, id: EntityId) -> RepoResult<Vec<(EntityKind, EntityId)>> {
        owned_subtree(self.conn, EntityKind::Project, id)
    }

    fn create_participant(
        &self,
        project: EntityId,
        participant: &Participant,
    ) -> RepoResult<EntityId> {
        participant.validate()?;
        require_container(self.conn, "projects", EntityKind::Project, project)?;
        require_reference(self.conn, "roles", "role", participant.role)?;

        let position = next_position(self.conn, "participants", "project_uuid", project)?;
        self.conn.execute(
            "INSERT INTO participants (uuid, project_uuid, user_name, role_uuid, position)
             VALUES (?1, ?2, ?3, ?4, ?5);",
            params![
                participant.id.to_string(),
                project.to_string(),
                participant.user_name.trim(),
                participant.role.to_string(),
                position,
            ],
        )?;
        Ok(participant.id)
    }

    fn update_participant(&self, participant: &Participant) -> RepoResult<()> {
        participant.validate()?;
        require_reference(self.conn, "roles", "role", participant.role)?;
        let changed = self.conn.execute(
            "UPDATE participants SET user_name = ?1, role_uuid = ?2 WHERE uuid = ?3;",
            params![
                participant.user_name.trim(),
                participant.role.to_string(),
                participant.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(participant.id));
        }
        Ok(())
    }

    fn get_participant(&self, id: EntityId) -> RepoResult<Option<Participant>> {
        let id_text = id.to_string();
        let mut participants = self.query_participants(
            &format!("{PARTICIPANT_SELECT_SQL} WHERE uuid = ?1;"),
            &[id_text.as_str()],
        )?;
        Ok(participants.pop())
    }

    fn find_participant(
        &self,
        project: EntityId,
        user_name: &str,
    ) -> RepoResult<Option<Participant>> {
        let project_text = project.to_string();
        let mut participants = self.query_participants(
            &format!(
                "{PARTICIPANT_SELECT_SQL} WHERE project_uuid = ?1 AND user_name = ?2 COLLATE NOCASE;"
            ),
            &[project_text.as_str(), user_name.trim()],
        )?;
        Ok(participants.pop())
    }

    fn list_participants(&self, project: EntityId) -> RepoResult<Vec<Participant>> {
        let project_text = project.to_string();
        self.query_participants(
            &format!(
                "{PARTICIPANT_SELECT_SQL} WHERE project_uuid = ?1 ORDER BY position ASC, uuid ASC;"
            ),
            &[project_text.as_str()],
        )
    }

    fn participant_project(&self, participant: EntityId) -> RepoResult<Option<EntityId>> {
        container_of(self.conn, "participants", "project_uuid", participant)
    }

    fn delete_participant(&self, id: EntityId) -> RepoResult<()> {
        delete_row(self.conn, "participants", id)
    }
}

fn parse_participant_row(row: &Row<'_>) -> RepoResult<Participant> {
    let uuid_text: String = row.get("uuid")?;
    let role_text: String = row.get("role_uuid")?;
    let participant = Participant {
        id: parse_uuid(&uuid_text, "participants.uuid")?,
        user_name: row.get("user_name")?,
        role: parse_uuid(&role_text, "participants.role_uuid")?,
    };
    participant.validate()?;
    Ok(participant)
}
