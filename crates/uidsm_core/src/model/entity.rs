//! Shared identity, kind and validation types for review entities.
//!
//! # Responsibility
//! - Define `EntityId`, `EntityKind` and the enums shared across entities.
//! - Provide the validation error used by every entity `validate()`.
//!
//! # Invariants
//! - Each `EntityKind` maps to exactly one wire discriminator.
//! - Nil ids never pass validation.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable identifier shared by every review entity.
pub type EntityId = Uuid;

/// Concrete entity shapes known to the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKind {
    Role,
    Project,
    Participant,
    Review,
    ReviewObjective,
    ReviewTask,
    Comment,
    Reply,
}

const ALL_KINDS: &[EntityKind] = &[
    EntityKind::Role,
    EntityKind::Project,
    EntityKind::Participant,
    EntityKind::Review,
    EntityKind::ReviewObjective,
    EntityKind::ReviewTask,
    EntityKind::Comment,
    EntityKind::Reply,
];

impl EntityKind {
    /// Returns every known kind in declaration order.
    pub fn all() -> &'static [EntityKind] {
        ALL_KINDS
    }

    /// Wire discriminator written to the `@type` property.
    pub fn type_tag(self) -> &'static str {
        match self {
            Self::Role => "Role",
            Self::Project => "Project",
            Self::Participant => "Participant",
            Self::Review => "Review",
            Self::ReviewObjective => "ReviewObjective",
            Self::ReviewTask => "ReviewTask",
            Self::Comment => "Comment",
            Self::Reply => "Reply",
        }
    }

    /// Parses a wire discriminator.
    pub fn from_type_tag(tag: &str) -> Option<Self> {
        ALL_KINDS.iter().copied().find(|kind| kind.type_tag() == tag)
    }
}

impl Display for EntityKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_tag())
    }
}

/// Lifecycle state of reviewable items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusKind {
    #[default]
    Open,
    Closed,
    Done,
}

impl StatusKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "Open",
            Self::Closed => "Closed",
            Self::Done => "Done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Open" => Some(Self::Open),
            "Closed" => Some(Self::Closed),
            "Done" => Some(Self::Done),
            _ => None,
        }
    }
}

/// Permission granted to participants through their role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessRight {
    CreateReview,
    ReviewTask,
    CreateReviewObjective,
    CreateTask,
    ManageParticipant,
    ManageRoles,
}

/// Validation failure for one entity record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelValidationError {
    /// The record carries the nil uuid.
    NilId(EntityKind),
    /// A required text field is empty after trimming.
    BlankField {
        kind: EntityKind,
        field: &'static str,
    },
    /// The same access right is listed twice on a role.
    DuplicateAccessRight(AccessRight),
    /// A reference field points back at the record itself.
    SelfReference {
        kind: EntityKind,
        field: &'static str,
    },
}

impl Display for ModelValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NilId(kind) => write!(f, "{kind} id must not be nil"),
            Self::BlankField { kind, field } => write!(f, "{kind}.{field} must not be blank"),
            Self::DuplicateAccessRight(right) => {
                write!(f, "access right {right:?} is listed more than once")
            }
            Self::SelfReference { kind, field } => {
                write!(f, "{kind}.{field} must not reference the record itself")
            }
        }
    }
}

impl Error for ModelValidationError {}

pub(crate) fn require_id(kind: EntityKind, id: EntityId) -> Result<(), ModelValidationError> {
    if id.is_nil() {
        return Err(ModelValidationError::NilId(kind));
    }
    Ok(())
}

pub(crate) fn require_text(
    kind: EntityKind,
    field: &'static str,
    value: &str,
) -> Result<(), ModelValidationError> {
    if value.trim().is_empty() {
        return Err(ModelValidationError::BlankField { kind, field });
    }
    Ok(())
}

pub(crate) fn forbid_self_reference(
    kind: EntityKind,
    id: EntityId,
    references: &[(&'static str, EntityId)],
) -> Result<(), ModelValidationError> {
    match references.iter().find(|(_, target)| *target == id) {
        Some((field, _)) => Err(ModelValidationError::SelfReference { kind, field }),
        None => Ok(()),
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as i64)
        .unwrap_or_default()
}

/// Generates a fresh random entity id.
pub fn new_entity_id() -> EntityId {
    Uuid::new_v4()
}
