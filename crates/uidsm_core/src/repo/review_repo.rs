//! Review, review objective and review task repository.
//!
//! # Responsibility
//! - Persist the review hierarchy: project -> review -> objective -> task.
//! - Keep task assignments in `review_task_assignees`, in list order.
//!
//! # Invariants
//! - Every item has an existing container. Its author and task assignees
//!   are participants of the project the item belongs to.
//! - Text is stored exactly as given.
//! - Item numbers are sequential per container; `next_*_number` returns
//!   `max + 1` (starting at 1).
//! - Assignment replacement is atomic.

use crate::model::entity::{EntityId, EntityKind, StatusKind};
use crate::model::review::{Review, ReviewObjective, ReviewTask};
use crate::repo::{
    child_ids, container_of, delete_row, ensure_schema_ready, next_number, next_position,
    owned_subtree, parse_number, parse_status, parse_uuid, require_container, require_member,
    RepoError, RepoResult,
};
use rusqlite::{params, Connection, Row};

/// Storage layout shared by the three review item tables.
struct ItemTable {
    table: &'static str,
    parent_column: &'static str,
    number_column: &'static str,
    container_table: &'static str,
    container_kind: EntityKind,
}

const REVIEWS: ItemTable = ItemTable {
    table: "reviews",
    parent_column: "project_uuid",
    number_column: "review_number",
    container_table: "projects",
    container_kind: EntityKind::Project,
};

const OBJECTIVES: ItemTable = ItemTable {
    table: "review_objectives",
    parent_column: "review_uuid",
    number_column: "review_objective_number",
    container_table: "reviews",
    container_kind: EntityKind::Review,
};

const TASKS: ItemTable = ItemTable {
    table: "review_tasks",
    parent_column: "review_objective_uuid",
    number_column: "task_number",
    container_table: "review_objectives",
    container_kind: EntityKind::ReviewObjective,
};

/// Column values common to reviews, objectives and tasks.
struct ItemRow {
    id: EntityId,
    title: String,
    description: String,
    number: u32,
    status: StatusKind,
    created_on: i64,
    author: EntityId,
}

impl ItemRow {
    fn from_review(review: &Review) -> Self {
        Self {
            id: review.id,
            title: review.title.clone(),
            description: review.description.clone(),
            number: review.review_number,
            status: review.status,
            created_on: review.created_on,
            author: review.author,
        }
    }

    fn from_objective(objective: &ReviewObjective) -> Self {
        Self {
            id: objective.id,
            title: objective.title.clone(),
            description: objective.description.clone(),
            number: objective.review_objective_number,
            status: objective.status,
            created_on: objective.created_on,
            author: objective.author,
        }
    }

    fn from_task(task: &ReviewTask) -> Self {
        Self {
            id: task.id,
            title: task.title.clone(),
            description: task.description.clone(),
            number: task.task_number,
            status: task.status,
            created_on: task.created_on,
            author: task.author,
        }
    }
}

/// Repository interface for the review hierarchy.
pub trait ReviewRepository {
    fn create_review(&self, project: EntityId, review: &Review) -> RepoResult<EntityId>;
    fn update_review(&self, review: &Review) -> RepoResult<()>;
    fn get_review(&self, id: EntityId) -> RepoResult<Option<Review>>;
    fn list_reviews(&self, project: EntityId) -> RepoResult<Vec<Review>>;
    fn next_review_number(&self, project: EntityId) -> RepoResult<u32>;
    fn review_project(&self, review: EntityId) -> RepoResult<Option<EntityId>>;
    fn delete_review(&self, id: EntityId) -> RepoResult<()>;

    fn create_objective(&self, review: EntityId, objective: &ReviewObjective)
        -> RepoResult<EntityId>;
    fn update_objective(&self, objective: &ReviewObjective) -> RepoResult<()>;
    fn get_objective(&self, id: EntityId) -> RepoResult<Option<ReviewObjective>>;
    fn list_objectives(&self, review: EntityId) -> RepoResult<Vec<ReviewObjective>>;
    fn next_objective_number(&self, review: EntityId) -> RepoResult<u32>;
    fn delete_objective(&self, id: EntityId) -> RepoResult<()>;

    /// Creates a task and its assignments.
    fn create_task(&self, objective: EntityId, task: &ReviewTask) -> RepoResult<EntityId>;
    /// Updates task fields and replaces the full assignment list.
    fn update_task(&self, task: &ReviewTask) -> RepoResult<()>;
    fn get_task(&self, id: EntityId) -> RepoResult<Option<ReviewTask>>;
    fn list_tasks(&self, objective: EntityId) -> RepoResult<Vec<ReviewTask>>;
    fn next_task_number(&self, objective: EntityId) -> RepoResult<u32>;
    fn delete_task(&self, id: EntityId) -> RepoResult<()>;

    /// Objectives and tasks removed along with `id`, depth first.
    fn owned_records(&self, kind: EntityKind, id: EntityId)
        -> RepoResult<Vec<(EntityKind, EntityId)>>;
}

/// SQLite-backed review repository.
pub struct SqliteReviewRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteReviewRepository<'conn> {
    /// Constructs a repository from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_schema_ready(conn)?;
        Ok(Self { conn })
    }

    /// Project owning `container`, the direct parent of a `layout` item.
    fn project_of_container(
        &self,
        layout: &ItemTable,
        container: EntityId,
    ) -> RepoResult<EntityId> {
        require_container(
            self.conn,
            layout.container_table,
            layout.container_kind,
            container,
        )?;
        let project = match layout.container_kind {
            EntityKind::Review => {
                container_of(self.conn, REVIEWS.table, REVIEWS.parent_column, container)?
            }
            EntityKind::ReviewObjective => {
                let review =
                    container_of(self.conn, OBJECTIVES.table, OBJECTIVES.parent_column, container)?;
                match review {
                    Some(review) => {
                        container_of(self.conn, REVIEWS.table, REVIEWS.parent_column, review)?
                    }
                    None => None,
                }
            }
            _ => Some(container),
        };
        project.ok_or_else(|| {
            RepoError::InvalidData(format!(
                "{} {container} has no owning project",
                layout.container_kind
            ))
        })
    }

    /// Project owning the stored item `id`.
    fn project_of_item(&self, layout: &ItemTable, id: EntityId) -> RepoResult<EntityId> {
        let container = container_of(self.conn, layout.table, layout.parent_column, id)?
            .ok_or(RepoError::NotFound(id))?;
        self.project_of_container(layout, container)
    }

    fn insert_item(
        &self,
        layout: &ItemTable,
        parent: EntityId,
        project: EntityId,
        item: &ItemRow,
    ) -> RepoResult<()> {
        require_member(self.conn, project, "author", item.author)?;

        let position = next_position(self.conn, layout.table, layout.parent_column, parent)?;
        self.conn.execute(
            &format!(
                "INSERT INTO {table} (
                    uuid,
                    {parent_column},
                    title,
                    description,
                    {number_column},
                    status,
                    created_on,
                    author_uuid,
                    position
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9);",
                table = layout.table,
                parent_column = layout.parent_column,
                number_column = layout.number_column,
            ),
            params![
                item.id.to_string(),
                parent.to_string(),
                item.title.as_str(),
                item.description.as_str(),
                item.number,
                item.status.as_str(),
                item.created_on,
                item.author.to_string(),
                position,
            ],
        )?;
        Ok(())
    }

    fn update_item(&self, layout: &ItemTable, project: EntityId, item: &ItemRow) -> RepoResult<()> {
        require_member(self.conn, project, "author", item.author)?;
        let changed = self.conn.execute(
            &format!(
                "UPDATE {table}
                 SET
                    title = ?1,
                    description = ?2,
                    {number_column} = ?3,
                    status = ?4,
                    author_uuid = ?5
                 WHERE uuid = ?6;",
                table = layout.table,
                number_column = layout.number_column,
            ),
            params![
                item.title.as_str(),
                item.description.as_str(),
                item.number,
                item.status.as_str(),
                item.author.to_string(),
                item.id.to_string(),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(item.id));
        }
        Ok(())
    }

    fn select_items(
        &self,
        layout: &ItemTable,
        filter_column: &str,
        value: EntityId,
    ) -> RepoResult<Vec<ItemRow>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT
                uuid,
                title,
                description,
                {number_column} AS number,
                status,
                created_on,
                author_uuid
             FROM {table}
             WHERE {filter_column} = ?1
             ORDER BY position ASC, uuid ASC;",
            table = layout.table,
            number_column = layout.number_column,
        ))?;
        let mut rows = stmt.query([value.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row, layout.table)?);
        }
        Ok(items)
    }

    fn review_from_row(&self, item: ItemRow) -> RepoResult<Review> {
        let review = Review {
            review_objectives: child_ids(
                self.conn,
                OBJECTIVES.table,
                OBJECTIVES.parent_column,
                item.id,
            )?,
            id: item.id,
            title: item.title,
            description: item.description,
            review_number: item.number,
            status: item.status,
            created_on: item.created_on,
            author: item.author,
        };
        review.validate()?;
        Ok(review)
    }

    fn objective_from_row(&self, item: ItemRow) -> RepoResult<ReviewObjective> {
        let objective = ReviewObjective {
            review_tasks: child_ids(self.conn, TASKS.table, TASKS.parent_column, item.id)?,
            id: item.id,
            title: item.title,
            description: item.description,
            review_objective_number: item.number,
            status: item.status,
            created_on: item.created_on,
            author: item.author,
        };
        objective.validate()?;
        Ok(objective)
    }

    fn task_from_row(&self, item: ItemRow) -> RepoResult<ReviewTask> {
        let task = ReviewTask {
            is_assigned_to: self.load_assignees(item.id)?,
            id: item.id,
            title: item.title,
            description: item.description,
            task_number: item.number,
            status: item.status,
            created_on: item.created_on,
            author: item.author,
        };
        task.validate()?;
        Ok(task)
    }

    fn load_assignees(&self, task: EntityId) -> RepoResult<Vec<EntityId>> {
        let mut stmt = self.conn.prepare(
            "SELECT participant_uuid
             FROM review_task_assignees
             WHERE task_uuid = ?1
             ORDER BY position ASC;",
        )?;
        let mut rows = stmt.query([task.to_string()])?;
        let mut assignees = Vec::new();
        while let Some(row) = rows.next()? {
            let value: String = row.get(0)?;
            assignees.push(parse_uuid(&value, "review_task_assignees.participant_uuid")?);
        }
        Ok(assignees)
    }

    fn require_assignees(&self, project: EntityId, assignees: &[EntityId]) -> RepoResult<()> {
        for participant in assignees {
            require_member(self.conn, project, "isAssignedTo", *participant)?;
        }
        Ok(())
    }

    /// Replaces assignments atomically. Joins the caller's transaction when
    /// one is already open.
    fn replace_assignees(&self, task: EntityId, assignees: &[EntityId]) -> RepoResult<()> {
        if !self.conn.is_autocommit() {
            return write_assignees(self.conn, task, assignees);
        }

        let tx = self.conn.unchecked_transaction()?;
        write_assignees(&tx, task, assignees)?;
        tx.commit()?;
        Ok(())
    }
}

impl ReviewRepository for SqliteReviewRepository<'_> {
    fn create_review(&self, project: EntityId, review: &Review) -> RepoResult<EntityId> {
        review.validate()?;
        let owner = self.project_of_container(&REVIEWS, project)?;
        self.insert_item(&REVIEWS, project, owner, &ItemRow::from_review(review))?;
        Ok(review.id)
    }

    fn update_review(&self, review: &Review) -> RepoResult<()> {
        review.validate()?;
        let project = self.project_of_item(&REVIEWS, review.id)?;
        self.update_item(&REVIEWS, project, &ItemRow::from_review(review))
    }

    fn get_review(&self, id: EntityId) -> RepoResult<Option<Review>> {
        self.select_items(&REVIEWS, "uuid", id)?
            .pop()
            .map(|item| self.review_from_row(item))
            .transpose()
    }

    fn list_reviews(&self, project: EntityId) -> RepoResult<Vec<Review>> {
        self.select_items(&REVIEWS, REVIEWS.parent_column, project)?
            .into_iter()
            .map(|item| self.review_from_row(item))
            .collect()
    }

    fn next_review_number(&self, project: EntityId) -> RepoResult<u32> {
        next_number(
            self.conn,
            REVIEWS.table,
            REVIEWS.number_column,
            REVIEWS.parent_column,
            project,
        )
    }

    fn review_project(&self, review: EntityId) -> RepoResult<Option<EntityId>> {
        container_of(self.conn, REVIEWS.table, REVIEWS.parent_column, review)
    }

    fn delete_review(&self, id: EntityId) -> RepoResult<()> {
        delete_row(self.conn, REVIEWS.table, id)
    }

    fn create_objective(
        &self,
        review: EntityId,
        objective: &ReviewObjective,
    ) -> RepoResult<EntityId> {
        objective.validate()?;
        let project = self.project_of_container(&OBJECTIVES, review)?;
        self.insert_item(&OBJECTIVES, review, project, &ItemRow::from_objective(objective))?;
        Ok(objective.id)
    }

    fn update_objective(&self, objective: &ReviewObjective) -> RepoResult<()> {
        objective.validate()?;
        let project = self.project_of_item(&OBJECTIVES, objective.id)?;
        self.update_item(&OBJECTIVES, project, &ItemRow::from_objective(objective))
    }

    fn get_objective(&self, id: EntityId) -> RepoResult<Option<ReviewObjective>> {
        self.select_items(&OBJECTIVES, "uuid", id)?
            .pop()
            .map(|item| self.objective_from_row(item))
            .transpose()
    }

    fn list_objectives(&self, review: EntityId) -> RepoResult<Vec<ReviewObjective>> {
        self.select_items(&OBJECTIVES, OBJECTIVES.parent_column, review)?
            .into_iter()
            .map(|item| self.objective_from_row(item))
            .collect()
    }

    fn next_objective_number(&self, review: EntityId) -> RepoResult<u32> {
        next_number(
            self.conn,
            OBJECTIVES.table,
            OBJECTIVES.number_column,
            OBJECTIVES.parent_column,
            review,
        )
    }

    fn delete_objective(&self, id: EntityId) -> RepoResult<()> {
        delete_row(self.conn, OBJECTIVES.table, id)
    }

    fn create_task(&self, objective: EntityId, task: &ReviewTask) -> RepoResult<EntityId> {
        task.validate()?;
        let project = self.project_of_container(&TASKS, objective)?;
        self.require_assignees(project, &task.is_assigned_to)?;
        self.insert_item(&TASKS, objective, project, &ItemRow::from_task(task))?;
        self.replace_assignees(task.id, &task.is_assigned_to)?;
        Ok(task.id)
    }

    fn update_task(&self, task: &ReviewTask) -> RepoResult<()> {
        task.validate()?;
        let project = self.project_of_item(&TASKS, task.id)?;
        self.require_assignees(project, &task.is_assigned_to)?;
        self.update_item(&TASKS, project, &ItemRow::from_task(task))?;
        self.replace_assignees(task.id, &task.is_assigned_to)
    }

    fn get_task(&self, id: EntityId) -> RepoResult<Option<ReviewTask>> {
        self.select_items(&TASKS, "uuid", id)?
            .pop()
            .map(|item| self.task_from_row(item))
            .transpose()
    }

    fn list_tasks(&self, objective: EntityId) -> RepoResult<Vec<ReviewTask>> {
        self.select_items(&TASKS, TASKS.parent_column, objective)?
            .into_iter()
            .map(|item| self.task_from_row(item))
            .collect()
    }

    fn next_task_number(&self, objective: EntityId) -> RepoResult<u32> {
        next_number(
            self.conn,
            TASKS.table,
            TASKS.number_column,
            TASKS.parent_column,
            objective,
        )
    }

    fn delete_task(&self, id: EntityId) -> RepoResult<()> {
        delete_row(self.conn, TASKS.table, id)
    }

    fn owned_records(
        &self,
        kind: EntityKind,
        id: EntityId,
    ) -> RepoResult<Vec<(EntityKind, EntityId)>> {
        owned_subtree(self.conn, kind, id)
    }
}

fn write_assignees(conn: &Connection, task: EntityId, assignees: &[EntityId]) -> RepoResult<()> {
    conn.execute(
        "DELETE FROM review_task_assignees WHERE task_uuid = ?1;",
        [task.to_string()],
    )?;
    for (position, participant) in assignees.iter().enumerate() {
        conn.execute(
            "INSERT OR IGNORE INTO review_task_assignees (task_uuid, participant_uuid, position)
             VALUES (?1, ?2, ?3);",
            params![task.to_string(), participant.to_string(), position as i64],
        )?;
    }
    Ok(())
}

fn parse_item_row(row: &Row<'_>, table: &str) -> RepoResult<ItemRow> {
    let uuid_text: String = row.get("uuid")?;
    let author_text: String = row.get("author_uuid")?;
    let status_text: String = row.get("status")?;
    let number: i64 = row.get("number")?;

    Ok(ItemRow {
        id: parse_uuid(&uuid_text, &format!("{table}.uuid"))?,
        title: row.get("title")?,
        description: row.get("description")?,
        number: parse_number(number, &format!("{table}.number"))?,
        status: parse_status(&status_text, &format!("{table}.status"))?,
        created_on: row.get("created_on")?,
        author: parse_uuid(&author_text, &format!("{table}.author_uuid"))?,
    })
}
