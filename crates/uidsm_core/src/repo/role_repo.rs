//! Role repository contract and SQLite implementation.
//!
//! # Invariants
//! - Role names are unique, compared case-insensitively.
//! - A role referenced by any participant cannot be deleted.

use crate::model::entity::{AccessRight, EntityId};
use crate::model::review::Role;
use crate::repo::{delete_row, ensure_schema_ready, parse_uuid, RepoError, RepoResult};
use rusqlite::{params, Connection, Row};

const ROLE_SELECT_SQL: &str = "SELECT uuid, role_name, access_rights FROM roles";

/// Repository interface for role CRUD operations.
pub trait RoleRepository {
    fn create_role(&self, role: &Role) -> RepoResult<EntityId>;
    fn update_role(&self, role: &Role) -> RepoResult<()>;
    fn get_role(&self, id: EntityId) -> RepoResult<Option<Role>>;
    /// Case-insensitive lookup by role name.
    fn find_role_by_name(&self, role_name: &str) -> RepoResult<Option<Role>>;
    /// Lists roles sorted by name.
    fn list_roles(&self) -> RepoResult<Vec<Role>>;
    fn delete_role(&self, id: EntityId) -> RepoResult<()>;
}

/// SQLite-backed role repository.
pub struct SqliteRoleRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteRoleRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }
}

impl RoleRepository for SqliteRoleRepository<'_> {
    fn create_role(&self, role: &Role) -> RepoResult<EntityId> {
        role.validate()?;
        self.conn.execute(
            "INSERT INTO roles (uuid, role_name, access_rights) VALUES (?1, ?2, ?3);",
            params![
                role.id.to_string(),
                role.role_name.trim(),
                access_rights_to_db(&role.access_rights)?,
            ],
        )?;
        Ok(role.id)
    }

    fn update_role(&self, role: &Role) -> RepoResult<()> {
        role.validate()?;
        let changed = self.conn.execute(
            "UPDATE roles
             SET
                role_name = ?1,
                access_rights = ?2,
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE uuid = ?3;",
            params![
                role.role_name.trim(),
                access_rights_to_db(&role.access_rights)?,
                role.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(role.id));
        }
        Ok(())
    }

    fn get_role(&self, id: EntityId) -> RepoResult<Option<Role>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ROLE_SELECT_SQL} WHERE uuid = ?1;"))?;
        let mut rows = stmt.query([id.to_string()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_role_row(row)?)),
            None => Ok(None),
        }
    }

    fn find_role_by_name(&self, role_name: &str) -> RepoResult<Option<Role>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ROLE_SELECT_SQL} WHERE role_name = ?1 COLLATE NOCASE;"
        ))?;
        let mut rows = stmt.query([role_name.trim()])?;
        match rows.next()? {
            Some(row) => Ok(Some(parse_role_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_roles(&self) -> RepoResult<Vec<Role>> {
        let mut stmt = self.conn.prepare(&format!(
            "{ROLE_SELECT_SQL} ORDER BY role_name COLLATE NOCASE ASC, uuid ASC;"
        ))?;
        let mut rows = stmt.query([])?;
        let mut roles = Vec::new();
        while let Some(row) = rows.next()? {
            roles.push(parse_role_row(row)?);
        }
        Ok(roles)
    }

    fn delete_role(&self, id: EntityId) -> RepoResult<()> {
        delete_row(self.conn, "roles", id)
    }
}

fn parse_role_row(row: &Row<'_>) -> RepoResult<Role> {
    let uuid_text: String = row.get("uuid")?;
    let rights_text: String = row.get("access_rights")?;
    let access_rights = serde_json::from_str::<Vec<AccessRight>>(&rights_text).map_err(|err| {
        RepoError::InvalidData(format!(
            "invalid access rights `{rights_text}` in roles.access_rights: {err}"
        ))
    })?;

    let role = Role {
        id: parse_uuid(&uuid_text, "roles.uuid")?,
        role_name: row.get("role_name")?,
        access_rights,
    };
    role.validate()?;
    Ok(role)
}

fn access_rights_to_db(rights: &[AccessRight]) -> RepoResult<String> {
    serde_json::to_string(rights)
        .map_err(|err| RepoError::InvalidData(format!("cannot store access rights: {err}")))
}
