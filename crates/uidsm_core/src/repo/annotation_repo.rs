//! Comment and reply repository contract and SQLite implementation.
//!
//! # Invariants
//! - Comments belong to a project; replies belong to a comment.
//! - Authors are participants of the project the annotation belongs to.
//! - Deleting a comment cascades to its replies.

use crate::model::entity::{EntityId, EntityKind};
use crate::model::review::{Comment, Reply};
use crate::repo::{
    child_ids, container_of, delete_row, ensure_schema_ready, next_position, parse_status,
    parse_uuid, require_container, require_member, RepoError, RepoResult,
};
use rusqlite::{params, Connection, Row};

const COMMENT_SELECT_SQL: &str =
    "SELECT uuid, content, status, created_on, author_uuid FROM comments";
const REPLY_SELECT_SQL: &str = "SELECT uuid, content, created_on, author_uuid FROM replies";

/// Repository interface for comments and replies.
pub trait AnnotationRepository {
    fn create_comment(&self, project: EntityId, comment: &Comment) -> RepoResult<EntityId>;
    fn update_comment(&self, comment: &Comment) -> RepoResult<()>;
    fn get_comment(&self, id: EntityId) -> RepoResult<Option<Comment>>;
    fn list_comments(&self, project: EntityId) -> RepoResult<Vec<Comment>>;
    fn comment_project(&self, comment: EntityId) -> RepoResult<Option<EntityId>>;
    fn delete_comment(&self, id: EntityId) -> RepoResult<()>;

    fn create_reply(&self, comment: EntityId, reply: &Reply) -> RepoResult<EntityId>;
    fn update_reply(&self, reply: &Reply) -> RepoResult<()>;
    fn get_reply(&self, id: EntityId) -> RepoResult<Option<Reply>>;
    fn list_replies(&self, comment: EntityId) -> RepoResult<Vec<Reply>>;
    fn delete_reply(&self, id: EntityId) -> RepoResult<()>;
}

/// SQLite-backed annotation repository.
pub struct SqliteAnnotationRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAnnotationRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }

    fn query_comments(&self, sql: &str, value: EntityId) -> RepoResult<Vec<Comment>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([value.to_string()])?;
        let mut comments = Vec::new();
        while let Some(row) = rows.next()? {
            comments.push(self.parse_comment_row(row)?);
        }
        Ok(comments)
    }

    fn query_replies(&self, sql: &str, value: EntityId) -> RepoResult<Vec<Reply>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([value.to_string()])?;
        let mut replies = Vec::new();
        while let Some(row) = rows.next()? {
            replies.push(parse_reply_row(row)?);
        }
        Ok(replies)
    }

    fn parse_comment_row(&self, row: &Row<'_>) -> RepoResult<Comment> {
        let uuid_text: String = row.get("uuid")?;
        let status_text: String = row.get("status")?;
        let author_text: String = row.get("author_uuid")?;
        let id = parse_uuid(&uuid_text, "comments.uuid")?;

        let comment = Comment {
            id,
            content: row.get("content")?,
            status: parse_status(&status_text, "comments.status")?,
            created_on: row.get("created_on")?,
            author: parse_uuid(&author_text, "comments.author_uuid")?,
            replies: child_ids(self.conn, "replies", "comment_uuid", id)?,
        };
        comment.validate()?;
        Ok(comment)
    }
}

impl AnnotationRepository for SqliteAnnotationRepository<'_> {
    fn create_comment(&self, project: EntityId, comment: &Comment) -> RepoResult<EntityId> {
        comment.validate()?;
        require_container(self.conn, "projects", EntityKind::Project, project)?;
        require_member(self.conn, project, "author", comment.author)?;

        let position = next_position(self.conn, "comments", "project_uuid", project)?;
        self.conn.execute(
            "INSERT INTO comments (uuid, project_uuid, content, status, created_on, author_uuid, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7);",
            params![
                comment.id.to_string(),
                project.to_string(),
                comment.content.as_str(),
                comment.status.as_str(),
                comment.created_on,
                comment.author.to_string(),
                position,
            ],
        )?;
        Ok(comment.id)
    }

    fn update_comment(&self, comment: &Comment) -> RepoResult<()> {
        comment.validate()?;
        let changed = self.conn.execute(
            "UPDATE comments SET content = ?1, status = ?2 WHERE uuid = ?3;",
            params![
                comment.content.as_str(),
                comment.status.as_str(),
                comment.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(comment.id));
        }
        Ok(())
    }

    fn get_comment(&self, id: EntityId) -> RepoResult<Option<Comment>> {
        Ok(self
            .query_comments(&format!("{COMMENT_SELECT_SQL} WHERE uuid = ?1;"), id)?
            .pop())
    }

    fn list_comments(&self, project: EntityId) -> RepoResult<Vec<Comment>> {
        self.query_comments(
            &format!(
                "{COMMENT_SELECT_SQL} WHERE project_uuid = ?1 ORDER BY position ASC, uuid ASC;"
            ),
            project,
        )
    }

    fn comment_project(&self, comment: EntityId) -> RepoResult<Option<EntityId>> {
        container_of(self.conn, "comments", "project_uuid", comment)
    }

    fn delete_comment(&self, id: EntityId) -> RepoResult<()> {
        delete_row(self.conn, "comments", id)
    }

    fn create_reply(&self, comment: EntityId, reply: &Reply) -> RepoResult<EntityId> {
        reply.validate()?;
        require_container(self.conn, "comments", EntityKind::Comment, comment)?;
        let project = container_of(self.conn, "comments", "project_uuid", comment)?
            .ok_or(RepoError::MissingContainer {
                kind: EntityKind::Comment,
                id: comment,
            })?;
        require_member(self.conn, project, "author", reply.author)?;

        let position = next_position(self.conn, "replies", "comment_uuid", comment)?;
        self.conn.execute(
            "INSERT INTO replies (uuid, comment_uuid, content, created_on, author_uuid, position)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6);",
            params![
                reply.id.to_string(),
                comment.to_string(),
                reply.content.as_str(),
                reply.created_on,
                reply.author.to_string(),
                position,
            ],
        )?;
        Ok(reply.id)
    }

    fn update_reply(&self, reply: &Reply) -> RepoResult<()> {
        reply.validate()?;
        let changed = self.conn.execute(
            "UPDATE replies SET content = ?1 WHERE uuid = ?2;",
            params![reply.content.as_str(), reply.id.to_string()],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(reply.id));
        }
        Ok(())
    }

    fn get_reply(&self, id: EntityId) -> RepoResult<Option<Reply>> {
        Ok(self
            .query_replies(&format!("{REPLY_SELECT_SQL} WHERE uuid = ?1;"), id)?
            .pop())
    }

    fn list_replies(&self, comment: EntityId) -> RepoResult<Vec<Reply>> {
        self.query_replies(
            &format!("{REPLY_SELECT_SQL} WHERE comment_uuid = ?1 ORDER BY position ASC, uuid ASC;"),
            comment,
        )
    }

    fn delete_reply(&self, id: EntityId) -> RepoResult<()> {
        delete_row(self.conn, "replies", id)
    }
}

fn parse_reply_row(row: &Row<'_>) -> RepoResult<Reply> {
    let uuid_text: String = row.get("uuid")?;
    let author_text: String = row.get("author_uuid")?;
    let reply = Reply {
        id: parse_uuid(&uuid_text, "replies.uuid")?,
        content: row.get("content")?,
        created_on: row.get("created_on")?,
        author: parse_uuid(&author_text, "replies.author_uuid")?,
    };
    reply.validate()?;
    Ok(reply)
}
