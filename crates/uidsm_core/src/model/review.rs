//! Review entity records.
//!
//! # Responsibility
//! - Define the record of every review entity as it travels on the wire.
//! - Provide constructors and invariant checks per entity.
//!
//! # Invariants
//! - References are ids. A record never embeds another record.
//! - `validate()` must pass before a record is persisted.

use crate::model::entity::{
    forbid_self_reference, new_entity_id, now_epoch_ms, require_id, require_text, AccessRight,
    EntityId, EntityKind, ModelValidationError, StatusKind,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Named set of access rights assigned to participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: EntityId,
    pub role_name: String,
    #[serde(default)]
    pub access_rights: Vec<AccessRight>,
}

impl Role {
    pub fn new(role_name: impl Into<String>, access_rights: Vec<AccessRight>) -> Self {
        Self {
            id: new_entity_id(),
            role_name: role_name.into(),
            access_rights,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_id(EntityKind::Role, self.id)?;
        require_text(EntityKind::Role, "roleName", &self.role_name)?;
        let mut seen = BTreeSet::new();
        for right in &self.access_rights {
            if !seen.insert(*right) {
                return Err(ModelValidationError::DuplicateAccessRight(*right));
            }
        }
        Ok(())
    }

    pub fn has_access_right(&self, right: AccessRight) -> bool {
        self.access_rights.contains(&right)
    }
}

/// Top-level container of a review campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: EntityId,
    pub project_name: String,
    pub created_on: i64,
    /// Owned participants, in insertion order.
    #[serde(default)]
    pub participants: Vec<EntityId>,
    /// Owned reviews, in insertion order.
    #[serde(default)]
    pub reviews: Vec<EntityId>,
    /// Owned comments attached to the project.
    #[serde(default)]
    pub annotations: Vec<EntityId>,
}

impl Project {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            id: new_entity_id(),
            project_name: project_name.into(),
            created_on: now_epoch_ms(),
            participants: Vec::new(),
            reviews: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_id(EntityKind::Project, self.id)?;
        require_text(EntityKind::Project, "projectName", &self.project_name)?;
        let owned = self
            .participants
            .iter()
            .map(|id| ("participants", *id))
            .chain(self.reviews.iter().map(|id| ("reviews", *id)))
            .chain(self.annotations.iter().map(|id| ("annotations", *id)))
            .collect::<Vec<_>>();
        forbid_self_reference(EntityKind::Project, self.id, &owned)
    }
}

/// A user taking part in one project under a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: EntityId,
    pub user_name: String,
    pub role: EntityId,
}

impl Participant {
    pub fn new(user_name: impl Into<String>, role: EntityId) -> Self {
        Self {
            id: new_entity_id(),
            user_name: user_name.into(),
            role,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_id(EntityKind::Participant, self.id)?;
        require_text(EntityKind::Participant, "userName", &self.user_name)?;
        require_id(EntityKind::Role, self.role)?;
        forbid_self_reference(EntityKind::Participant, self.id, &[("role", self.role)])
    }
}

/// A review of engineering data within a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub review_number: u32,
    #[serde(default)]
    pub status: StatusKind,
    pub created_on: i64,
    pub author: EntityId,
    #[serde(default)]
    pub review_objectives: Vec<EntityId>,
}

impl Review {
    pub fn new(title: impl Into<String>, description: impl Into<String>, author: EntityId) -> Self {
        Self {
            id: new_entity_id(),
            title: title.into(),
            description: description.into(),
            review_number: 0,
            status: StatusKind::Open,
            created_on: now_epoch_ms(),
            author,
            review_objectives: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_id(EntityKind::Review, self.id)?;
        require_text(EntityKind::Review, "title", &self.title)?;
        require_id(EntityKind::Participant, self.author)?;
        let mut references = vec![("author", self.author)];
        references.extend(self.review_objectives.iter().map(|id| ("reviewObjectives", *id)));
        forbid_self_reference(EntityKind::Review, self.id, &references)
    }
}

/// One objective of a review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewObjective {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub review_objective_number: u32,
    #[serde(default)]
    pub status: StatusKind,
    pub created_on: i64,
    pub author: EntityId,
    #[serde(default)]
    pub review_tasks: Vec<EntityId>,
}

impl ReviewObjective {
    pub fn new(title: impl Into<String>, description: impl Into<String>, author: EntityId) -> Self {
        Self {
            id: new_entity_id(),
            title: title.into(),
            description: description.into(),
            review_objective_number: 0,
            status: StatusKind::Open,
            created_on: now_epoch_ms(),
            author,
            review_tasks: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_id(EntityKind::ReviewObjective, self.id)?;
        require_text(EntityKind::ReviewObjective, "title", &self.title)?;
        require_id(EntityKind::Participant, self.author)?;
        let mut references = vec![("author", self.author)];
        references.extend(self.review_tasks.iter().map(|id| ("reviewTasks", *id)));
        forbid_self_reference(EntityKind::ReviewObjective, self.id, &references)
    }
}

/// A unit of review work, assignable to participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewTask {
    pub id: EntityId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub task_number: u32,
    #[serde(default)]
    pub status: StatusKind,
    pub created_on: i64,
    pub author: EntityId,
    /// Assigned participants. Non-owning.
    #[serde(default)]
    pub is_assigned_to: Vec<EntityId>,
}

impl ReviewTask {
    pub fn new(title: impl Into<String>, description: impl Into<String>, author: EntityId) -> Self {
        Self {
            id: new_entity_id(),
            title: title.into(),
            description: description.into(),
            task_number: 0,
            status: StatusKind::Open,
            created_on: now_epoch_ms(),
            author,
            is_assigned_to: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_id(EntityKind::ReviewTask, self.id)?;
        require_text(EntityKind::ReviewTask, "title", &self.title)?;
        require_id(EntityKind::Participant, self.author)?;
        let mut references = vec![("author", self.author)];
        references.extend(self.is_assigned_to.iter().map(|id| ("isAssignedTo", *id)));
        forbid_self_reference(EntityKind::ReviewTask, self.id, &references)
    }
}

/// Free-text annotation written by a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: EntityId,
    pub content: String,
    #[serde(default)]
    pub status: StatusKind,
    pub created_on: i64,
    pub author: EntityId,
    #[serde(default)]
    pub replies: Vec<EntityId>,
}

impl Comment {
    pub fn new(content: impl Into<String>, author: EntityId) -> Self {
        Self {
            id: new_entity_id(),
            content: content.into(),
            status: StatusKind::Open,
            created_on: now_epoch_ms(),
            author,
            replies: Vec::new(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_id(EntityKind::Comment, self.id)?;
        require_text(EntityKind::Comment, "content", &self.content)?;
        require_id(EntityKind::Participant, self.author)?;
        let mut references = vec![("author", self.author)];
        references.extend(self.replies.iter().map(|id| ("replies", *id)));
        forbid_self_reference(EntityKind::Comment, self.id, &references)
    }
}

/// Answer to a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: EntityId,
    pub content: String,
    pub created_on: i64,
    pub author: EntityId,
}

impl Reply {
    pub fn new(content: impl Into<String>, author: EntityId) -> Self {
        Self {
            id: new_entity_id(),
            content: content.into(),
            created_on: now_epoch_ms(),
            author,
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        require_id(EntityKind::Reply, self.id)?;
        require_text(EntityKind::Reply, "content", &self.content)?;
        require_id(EntityKind::Participant, self.author)?;
        forbid_self_reference(EntityKind::Reply, self.id, &[("author", self.author)])
    }
}
