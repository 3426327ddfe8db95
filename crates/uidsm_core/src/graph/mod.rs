//! In-memory entity graph assembled from decoded records.
//!
//! # Responsibility
//! - Hold an exchanged set keyed by id, merged with previously held state.
//! - Resolve id references into typed records for navigation.
//! - Report references that cannot be resolved.
//!
//! # Invariants
//! - One record per id. A later record with the same id replaces the earlier.
//! - Iteration order is first-insertion order.
//! - Removing a record removes its owned descendants and strips the removed
//!   ids from owning lists and assignments.

use crate::dto::{EntityDto, Reference, TaggedRecord};
use crate::model::entity::{EntityId, EntityKind};
use crate::model::review::{
    Comment, Participant, Project, Reply, Review, ReviewObjective, ReviewTask, Role,
};
use log::debug;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Reference whose target is absent from the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub source: EntityId,
    pub source_kind: EntityKind,
    pub field: &'static str,
    pub target: EntityId,
}

/// Outcome of merging one payload into the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyReport {
    /// Records whose id was new to the graph.
    pub inserted: usize,
    /// Records that replaced an already-held record.
    pub replaced: usize,
    /// Unresolved references held by the merged records.
    pub dangling: Vec<DanglingReference>,
}

impl AssemblyReport {
    /// True when every reference of the merged records resolved.
    pub fn is_complete(&self) -> bool {
        self.dangling.is_empty()
    }
}

/// Id-keyed arena of tagged records.
#[derive(Debug, Clone, Default)]
pub struct EntityGraph {
    records: HashMap<EntityId, EntityDto>,
    order: Vec<EntityId>,
}

impl EntityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from one exchanged set.
    pub fn from_records(records: impl IntoIterator<Item = EntityDto>) -> (Self, AssemblyReport) {
        let mut graph = Self::new();
        let report = graph.absorb(records);
        (graph, report)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.records.contains_key(&id)
    }

    /// Merges `records` and reports references that still do not resolve.
    ///
    /// References may point forward within the payload or at records held
    /// from earlier payloads.
    pub fn absorb(&mut self, records: impl IntoIterator<Item = EntityDto>) -> AssemblyReport {
        let mut report = AssemblyReport::default();
        let mut touched = Vec::new();

        for record in records {
            let id = record.id();
            if self.records.insert(id, record).is_some() {
                report.replaced += 1;
            } else {
                self.order.push(id);
                report.inserted += 1;
            }
            touched.push(id);
        }

        let mut seen = HashSet::new();
        for id in touched {
            if !seen.insert(id) {
                continue;
            }
            if let Some(record) = self.records.get(&id) {
                report.dangling.extend(self.dangling_of(record));
            }
        }

        debug!(
            "event=graph_absorb module=graph status=ok inserted={} replaced={} dangling={}",
            report.inserted,
            report.replaced,
            report.dangling.len()
        );
        report
    }

    /// Every unresolved reference held anywhere in the graph.
    pub fn dangling_references(&self) -> Vec<DanglingReference> {
        self.records()
            .flat_map(|record| self.dangling_of(record))
            .collect()
    }

    pub fn get(&self, id: EntityId) -> Option<&EntityDto> {
        self.records.get(&id)
    }

    /// Returns the record with `id` when it has type `T`.
    pub fn get_as<T: TaggedRecord>(&self, id: EntityId) -> Option<&T> {
        self.get(id).and_then(T::from_dto)
    }

    /// Records in first-insertion order.
    pub fn records(&self) -> impl Iterator<Item = &EntityDto> {
        self.order.iter().filter_map(|id| self.records.get(id))
    }

    /// Every record of type `T`, in first-insertion order.
    pub fn all_of<T: TaggedRecord>(&self) -> Vec<&T> {
        self.records().filter_map(T::from_dto).collect()
    }

    /// Clones the graph back into an exchanged set.
    pub fn to_records(&self) -> Vec<EntityDto> {
        self.records().cloned().collect()
    }

    pub fn count_by_kind(&self) -> BTreeMap<EntityKind, usize> {
        let mut counts = BTreeMap::new();
        for record in self.records() {
            *counts.entry(record.kind()).or_insert(0) += 1;
        }
        counts
    }

    /// Resolves every target held in `field` of record `id`, skipping
    /// unresolved ids.
    pub fn resolve(&self, id: EntityId, field: &str) -> Vec<&EntityDto> {
        let Some(record) = self.get(id) else {
            return Vec::new();
        };
        record
            .references()
            .into_iter()
            .filter(|reference| reference.field == field)
            .filter_map(|reference| self.get(reference.target))
            .collect()
    }

    /// Records referencing `target`, with the referencing field name.
    pub fn referrers_of(&self, target: EntityId) -> Vec<(&EntityDto, &'static str)> {
        self.records()
            .flat_map(|record| {
                record
                    .references()
                    .into_iter()
                    .filter(move |reference| reference.target == target)
                    .map(move |reference| (record, reference.field))
            })
            .collect()
    }

    pub fn role_of(&self, participant: EntityId) -> Option<&Role> {
        let participant = self.get_as::<Participant>(participant)?;
        self.get_as::<Role>(participant.role)
    }

    /// Participant authoring the record `id`, for records that carry one.
    pub fn author_of(&self, id: EntityId) -> Option<&Participant> {
        let author = match self.get(id)? {
            EntityDto::Review(record) => record.author,
            EntityDto::ReviewObjective(record) => record.author,
            EntityDto::ReviewTask(record) => record.author,
            EntityDto::Comment(record) => record.author,
            EntityDto::Reply(record) => record.author,
            _ => return None,
        };
        self.get_as::<Participant>(author)
    }

    pub fn participants_of(&self, project: EntityId) -> Vec<&Participant> {
        self.get_as::<Project>(project)
            .map(|project| self.collect(&project.participants))
            .unwrap_or_default()
    }

    pub fn reviews_of(&self, project: EntityId) -> Vec<&Review> {
        self.get_as::<Project>(project)
            .map(|project| self.collect(&project.reviews))
            .unwrap_or_default()
    }

    pub fn annotations_of(&self, project: EntityId) -> Vec<&Comment> {
        self.get_as::<Project>(project)
            .map(|project| self.collect(&project.annotations))
            .unwrap_or_default()
    }

    pub fn objectives_of(&self, review: EntityId) -> Vec<&ReviewObjective> {
        self.get_as::<Review>(review)
            .map(|review| self.collect(&review.review_objectives))
            .unwrap_or_default()
    }

    pub fn tasks_of(&self, objective: EntityId) -> Vec<&ReviewTask> {
        self.get_as::<ReviewObjective>(objective)
            .map(|objective| self.collect(&objective.review_tasks))
            .unwrap_or_default()
    }

    pub fn assignees_of(&self, task: EntityId) -> Vec<&Participant> {
        self.get_as::<ReviewTask>(task)
            .map(|task| self.collect(&task.is_assigned_to))
            .unwrap_or_default()
    }

    pub fn replies_of(&self, comment: EntityId) -> Vec<&Reply> {
        self.get_as::<Comment>(comment)
            .map(|comment| self.collect(&comment.replies))
            .unwrap_or_default()
    }

    /// Removes `id` and its owned descendants, returning the removed records
    /// in removal order (parent first).
    pub fn remove(&mut self, id: EntityId) -> Vec<EntityDto> {
        let mut removed = Vec::new();
        let mut pending = vec![id];
        while let Some(next) = pending.pop() {
            let Some(record) = self.records.remove(&next) else {
                continue;
            };
            pending.extend(owned_children(&record).into_iter().rev());
            removed.push(record);
        }

        if removed.is_empty() {
            return removed;
        }

        let removed_ids = removed.iter().map(EntityDto::id).collect::<HashSet<_>>();
        self.order.retain(|id| !removed_ids.contains(id));
        for record in self.records.values_mut() {
            strip_ids(record, &removed_ids);
        }

        debug!(
            "event=graph_remove module=graph status=ok root={id} removed={}",
            removed.len()
        );
        removed
    }

    fn collect<T: TaggedRecord>(&self, ids: &[EntityId]) -> Vec<&T> {
        ids.iter().filter_map(|id| self.get_as::<T>(*id)).collect()
    }

    fn dangling_of(&self, record: &EntityDto) -> Vec<DanglingReference> {
        record
            .references()
            .into_iter()
            .filter(|reference: &Reference| !self.records.contains_key(&reference.target))
            .map(|reference| DanglingReference {
                source: record.id(),
                source_kind: record.kind(),
                field: reference.field,
                target: reference.target,
            })
            .collect()
    }
}

/// Ids of the records owned by `record`.
fn owned_children(record: &EntityDto) -> Vec<EntityId> {
    match record {
        EntityDto::Project(project) => project
            .participants
            .iter()
            .chain(&project.reviews)
            .chain(&project.annotations)
            .copied()
            .collect(),
        EntityDto::Review(review) => review.review_objectives.clone(),
        EntityDto::ReviewObjective(objective) => objective.review_tasks.clone(),
        EntityDto::Comment(comment) => comment.replies.clone(),
        _ => Vec::new(),
    }
}

fn strip_ids(record: &mut EntityDto, removed: &HashSet<EntityId>) {
    let keep = |id: &EntityId| !removed.contains(id);
    match record {
        EntityDto::Project(project) => {
            project.participants.retain(keep);
            project.reviews.retain(keep);
            project.annotations.retain(keep);
        }
        EntityDto::Review(review) => review.review_objectives.retain(keep),
        EntityDto::ReviewObjective(objective) => objective.review_tasks.retain(keep),
        EntityDto::ReviewTask(task) => task.is_assigned_to.retain(keep),
        EntityDto::Comment(comment) => comment.replies.retain(keep),
        EntityDto::Role(_) | EntityDto::Participant(_) | EntityDto::Reply(_) => {}
    }
}
