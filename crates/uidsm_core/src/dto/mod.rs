//! Tagged records: the flat, discriminated wire form of review entities.
//!
//! # Responsibility
//! - Wrap every concrete entity record in one closed `EntityDto` enum.
//! - Expose the discriminator, id and outgoing references of each record.
//!
//! # Invariants
//! - `type_tag()` always equals `kind().type_tag()`.
//! - The tagged JSON object starts with `@type`, followed by the record fields.

use crate::model::entity::{EntityId, EntityKind, ModelValidationError};
use crate::model::review::{
    Comment, Participant, Project, Reply, Review, ReviewObjective, ReviewTask, Role,
};
use serde::de::DeserializeOwned;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Property carrying the discriminator in every tagged object.
pub const TYPE_PROPERTY: &str = "@type";

/// One id-valued reference held by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reference {
    /// Wire name of the reference field.
    pub field: &'static str,
    /// Referenced entity id.
    pub target: EntityId,
}

impl Reference {
    fn new(field: &'static str, target: EntityId) -> Self {
        Self { field, target }
    }
}

fn list_references<'a>(
    field: &'static str,
    ids: &'a [EntityId],
) -> impl Iterator<Item = Reference> + 'a {
    ids.iter().map(move |id| Reference::new(field, *id))
}

/// A concrete entity record that can travel as a tagged object.
pub trait TaggedRecord: Serialize + DeserializeOwned + Sized {
    /// Entity kind, which fixes the wire discriminator.
    const KIND: EntityKind;

    fn id(&self) -> EntityId;

    /// Every id-valued field, in field declaration and list order.
    fn references(&self) -> Vec<Reference>;

    fn into_dto(self) -> EntityDto;

    /// Borrows the concrete record when `dto` holds this type.
    fn from_dto(dto: &EntityDto) -> Option<&Self>;
}

impl TaggedRecord for Role {
    const KIND: EntityKind = EntityKind::Role;

    fn id(&self) -> EntityId {
        self.id
    }

    fn references(&self) -> Vec<Reference> {
        Vec::new()
    }

    fn into_dto(self) -> EntityDto {
        EntityDto::Role(self)
    }

    fn from_dto(dto: &EntityDto) -> Option<&Self> {
        match dto {
            EntityDto::Role(record) => Some(record),
            _ => None,
        }
    }
}

impl TaggedRecord for Project {
    const KIND: EntityKind = EntityKind::Project;

    fn id(&self) -> EntityId {
        self.id
    }

    fn references(&self) -> Vec<Reference> {
        list_references("participants", &self.participants)
            .chain(list_references("reviews", &self.reviews))
            .chain(list_references("annotations", &self.annotations))
            .collect()
    }

    fn into_dto(self) -> EntityDto {
        EntityDto::Project(self)
    }

    fn from_dto(dto: &EntityDto) -> Option<&Self> {
        match dto {
            EntityDto::Project(record) => Some(record),
            _ => None,
        }
    }
}

impl TaggedRecord for Participant {
    const KIND: EntityKind = EntityKind::Participant;

    fn id(&self) -> EntityId {
        self.id
    }

    fn references(&self) -> Vec<Reference> {
        vec![Reference::new("role", self.role)]
    }

    fn into_dto(self) -> EntityDto {
        EntityDto::Participant(self)
    }

    fn from_dto(dto: &EntityDto) -> Option<&Self> {
        match dto {
            EntityDto::Participant(record) => Some(record),
            _ => None,
        }
    }
}

impl TaggedRecord for Review {
    const KIND: EntityKind = EntityKind::Review;

    fn id(&self) -> EntityId {
        self.id
    }

    fn references(&self) -> Vec<Reference> {
        std::iter::once(Reference::new("author", self.author))
            .chain(list_references("reviewObjectives", &self.review_objectives))
            .collect()
    }

    fn into_dto(self) -> EntityDto {
        EntityDto::Review(self)
    }

    fn from_dto(dto: &EntityDto) -> Option<&Self> {
        match dto {
            EntityDto::Review(record) => Some(record),
            _ => None,
        }
    }
}

impl TaggedRecord for ReviewObjective {
    const KIND: EntityKind = EntityKind::ReviewObjective;

    fn id(&self) -> EntityId {
        self.id
    }

    fn references(&self) -> Vec<Reference> {
        std::iter::once(Reference::new("author", self.author))
            .chain(list_references("reviewTasks", &self.review_tasks))
            .collect()
    }

    fn into_dto(self) -> EntityDto {
        EntityDto::ReviewObjective(self)
    }

    fn from_dto(dto: &EntityDto) -> Option<&Self> {
        match dto {
            EntityDto::ReviewObjective(record) => Some(record),
            _ => None,
        }
    }
}

impl TaggedRecord for ReviewTask {
    const KIND: EntityKind = EntityKind::ReviewTask;

    fn id(&self) -> EntityId {
        self.id
    }

    fn references(&self) -> Vec<Reference> {
        std::iter::once(Reference::new("author", self.author))
            .chain(list_references("isAssignedTo", &self.is_assigned_to))
            .collect()
    }

    fn into_dto(self) -> EntityDto {
        EntityDto::ReviewTask(self)
    }

    fn from_dto(dto: &EntityDto) -> Option<&Self> {
        match dto {
            EntityDto::ReviewTask(record) => Some(record),
            _ => None,
        }
    }
}

impl TaggedRecord for Comment {
    const KIND: EntityKind = EntityKind::Comment;

    fn id(&self) -> EntityId {
        self.id
    }

    fn references(&self) -> Vec<Reference> {
        std::iter::once(Reference::new("author", self.author))
            .chain(list_references("replies", &self.replies))
            .collect()
    }

    fn into_dto(self) -> EntityDto {
        EntityDto::Comment(self)
    }

    fn from_dto(dto: &EntityDto) -> Option<&Self> {
        match dto {
            EntityDto::Comment(record) => Some(record),
            _ => None,
        }
    }
}

impl TaggedRecord for Reply {
    const KIND: EntityKind = EntityKind::Reply;

    fn id(&self) -> EntityId {
        self.id
    }

    fn references(&self) -> Vec<Reference> {
        vec![Reference::new("author", self.author)]
    }

    fn into_dto(self) -> EntityDto {
        EntityDto::Reply(self)
    }

    fn from_dto(dto: &EntityDto) -> Option<&Self> {
        match dto {
            EntityDto::Reply(record) => Some(record),
            _ => None,
        }
    }
}

/// Any tagged record of the exchanged set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityDto {
    Role(Role),
    Project(Project),
    Participant(Participant),
    Review(Review),
    ReviewObjective(ReviewObjective),
    ReviewTask(ReviewTask),
    Comment(Comment),
    Reply(Reply),
}

impl EntityDto {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Role(_) => EntityKind::Role,
            Self::Project(_) => EntityKind::Project,
            Self::Participant(_) => EntityKind::Participant,
            Self::Review(_) => EntityKind::Review,
            Self::ReviewObjective(_) => EntityKind::ReviewObjective,
            Self::ReviewTask(_) => EntityKind::ReviewTask,
            Self::Comment(_) => EntityKind::Comment,
            Self::Reply(_) => EntityKind::Reply,
        }
    }

    /// Wire discriminator of this record.
    pub fn type_tag(&self) -> &'static str {
        self.kind().type_tag()
    }

    pub fn id(&self) -> EntityId {
        match self {
            Self::Role(record) => record.id,
            Self::Project(record) => record.id,
            Self::Participant(record) => record.id,
            Self::Review(record) => record.id,
            Self::ReviewObjective(record) => record.id,
            Self::ReviewTask(record) => record.id,
            Self::Comment(record) => record.id,
            Self::Reply(record) => record.id,
        }
    }

    pub fn references(&self) -> Vec<Reference> {
        match self {
            Self::Role(record) => record.references(),
            Self::Project(record) => record.references(),
            Self::Participant(record) => record.references(),
            Self::Review(record) => record.references(),
            Self::ReviewObjective(record) => record.references(),
            Self::ReviewTask(record) => record.references(),
            Self::Comment(record) => record.references(),
            Self::Reply(record) => record.references(),
        }
    }

    pub fn validate(&self) -> Result<(), ModelValidationError> {
        match self {
            Self::Role(record) => record.validate(),
            Self::Project(record) => record.validate(),
            Self::Participant(record) => record.validate(),
            Self::Review(record) => record.validate(),
            Self::ReviewObjective(record) => record.validate(),
            Self::ReviewTask(record) => record.validate(),
            Self::Comment(record) => record.validate(),
            Self::Reply(record) => record.validate(),
        }
    }

    /// Borrows the concrete record when it has type `T`.
    pub fn as_record<T: TaggedRecord>(&self) -> Option<&T> {
        T::from_dto(self)
    }

    /// Builds the tagged JSON object: `@type` first, then the record fields.
    pub fn to_tagged_object(&self) -> Result<Map<String, Value>, serde_json::Error> {
        let fields = match self {
            Self::Role(record) => serde_json::to_value(record)?,
            Self::Project(record) => serde_json::to_value(record)?,
            Self::Participant(record) => serde_json::to_value(record)?,
            Self::Review(record) => serde_json::to_value(record)?,
            Self::ReviewObjective(record) => serde_json::to_value(record)?,
            Self::ReviewTask(record) => serde_json::to_value(record)?,
            Self::Comment(record) => serde_json::to_value(record)?,
            Self::Reply(record) => serde_json::to_value(record)?,
        };

        let mut object = Map::new();
        object.insert(
            TYPE_PROPERTY.to_string(),
            Value::String(self.type_tag().to_string()),
        );
        if let Value::Object(fields) = fields {
            object.extend(fields);
        }
        Ok(object)
    }
}

impl Serialize for EntityDto {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_tagged_object()
            .map_err(serde::ser::Error::custom)?
            .serialize(serializer)
    }
}

macro_rules! impl_from_record {
    ($($record:ident),* $(,)?) => {
        $(
            impl From<$record> for EntityDto {
                fn from(value: $record) -> Self {
                    value.into_dto()
                }
            }
        )*
    };
}

impl_from_record!(Role, Project, Participant, Review, ReviewObjective, ReviewTask, Comment, Reply);

#[cfg(test)]
mod tests {
    use super::{list_references, EntityDto, Reference, TaggedRecord, TYPE_PROPERTY};
    use crate::model::review::{Participant, Project, Role};
    use uuid::Uuid;

    #[test]
    fn tagged_object_puts_discriminator_first() {
        let role = Role::new("Reviewer", Vec::new());
        let object = EntityDto::from(role.clone()).to_tagged_object().unwrap();
        let keys = object.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(keys[0], TYPE_PROPERTY);
        assert_eq!(keys[1], "id");
        assert_eq!(object["roleName"], "Reviewer");
    }

    #[test]
    fn references_follow_list_order() {
        let first = Participant::new("alice", Role::new("r", Vec::new()).id);
        let second = Participant::new("bob", first.role);
        let mut project = Project::new("Mars sample return");
        project.participants = vec![second.id, first.id];

        let targets = project
            .references()
            .into_iter()
            .map(|reference| reference.target)
            .collect::<Vec<_>>();
        assert_eq!(targets, vec![second.id, first.id]);
    }

    #[test]
    fn list_references_tags_each_id_with_its_field() {
        let ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        let references = list_references("reviews", &ids).collect::<Vec<_>>();
        assert_eq!(
            references,
            vec![
                Reference { field: "reviews", target: ids[0] },
                Reference { field: "reviews", target: ids[1] },
            ]
        );
    }

    #[test]
    fn as_record_only_matches_the_held_type() {
        let dto = EntityDto::from(Role::new("Reviewer", Vec::new()));
        assert!(dto.as_record::<Role>().is_some());
        assert!(dto.as_record::<Project>().is_none());
    }
}
