use serde_json::json;
use uidsm_core::{
    decode_str, DispatchTable, EntityDto, EntityGraph, EntityKind, Participant, Project, Review,
    ReviewObjective, ReviewTask, Role,
};
use uuid::Uuid;

struct Ids {
    role: Uuid,
    alice: Uuid,
    bob: Uuid,
    project: Uuid,
    review: Uuid,
    objective: Uuid,
    task: Uuid,
}

fn payload() -> (String, Ids) {
    let ids = Ids {
        role: Uuid::new_v4(),
        alice: Uuid::new_v4(),
        bob: Uuid::new_v4(),
        project: Uuid::new_v4(),
        review: Uuid::new_v4(),
        objective: Uuid::new_v4(),
        task: Uuid::new_v4(),
    };
    // Parents precede the records they reference, so every list is a forward reference.
    let text = json!([
        {
            "@type": "Project",
            "id": ids.project,
            "projectName": "Envision",
            "createdOn": 1_700_000_000_000_i64,
            "participants": [ids.alice, ids.bob],
            "reviews": [ids.review]
        },
        {
            "@type": "Review",
            "id": ids.review,
            "title": "Mission",
            "reviewNumber": 1,
            "createdOn": 1_700_000_000_000_i64,
            "author": ids.alice,
            "reviewObjectives": [ids.objective]
        },
        {
            "@type": "ReviewObjective",
            "id": ids.objective,
            "title": "Budget",
            "reviewObjectiveNumber": 1,
            "createdOn": 1_700_000_000_000_i64,
            "author": ids.alice,
            "reviewTasks": [ids.task]
        },
        {
            "@type": "ReviewTask",
            "id": ids.task,
            "title": "Check margins",
            "taskNumber": 1,
            "createdOn": 1_700_000_000_000_i64,
            "author": ids.alice,
            "isAssignedTo": [ids.bob, ids.alice]
        },
        { "@type": "Participant", "id": ids.alice, "userName": "alice", "role": ids.role },
        { "@type": "Participant", "id": ids.bob, "userName": "bob", "role": ids.role },
        { "@type": "Role", "id": ids.role, "roleName": "Reviewer", "accessRights": ["ReviewTask"] }
    ])
    .to_string();
    (text, ids)
}

fn assembled() -> (EntityGraph, Ids) {
    let (text, ids) = payload();
    let records = decode_str(&text, DispatchTable::global()).unwrap();
    let (graph, report) = EntityGraph::from_records(records);
    assert!(report.is_complete(), "dangling: {:?}", report.dangling);
    assert_eq!(report.inserted, 7);
    (graph, ids)
}

#[test]
fn forward_references_resolve_after_assembly() {
    let (graph, ids) = assembled();

    let participants: Vec<&str> = graph
        .participants_of(ids.project)
        .into_iter()
        .map(|participant| participant.user_name.as_str())
        .collect();
    assert_eq!(participants, vec!["alice", "bob"]);

    assert_eq!(graph.role_of(ids.bob).unwrap().role_name, "Reviewer");
    assert_eq!(graph.author_of(ids.task).unwrap().id, ids.alice);
    assert_eq!(graph.reviews_of(ids.project)[0].id, ids.review);
    assert_eq!(graph.objectives_of(ids.review)[0].id, ids.objective);
    assert_eq!(graph.tasks_of(ids.objective)[0].id, ids.task);

    let assignees: Vec<Uuid> = graph
        .assignees_of(ids.task)
        .into_iter()
        .map(|participant| participant.id)
        .collect();
    assert_eq!(assignees, vec![ids.bob, ids.alice]);
}

#[test]
fn referrers_report_the_referencing_field() {
    let (graph, ids) = assembled();

    let mut fields: Vec<&str> = graph
        .referrers_of(ids.bob)
        .into_iter()
        .map(|(_, field)| field)
        .collect();
    fields.sort_unstable();
    assert_eq!(fields, vec!["isAssignedTo", "participants"]);
}

#[test]
fn missing_targets_are_reported_and_later_payloads_resolve_them() {
    let role_id = Uuid::new_v4();
    let participant = Participant::new("carol", role_id);
    let (mut graph, report) = EntityGraph::from_records(vec![EntityDto::from(participant.clone())]);

    assert_eq!(report.dangling.len(), 1);
    assert_eq!(report.dangling[0].field, "role");
    assert_eq!(report.dangling[0].target, role_id);

    let mut role = Role::new("Reviewer", Vec::new());
    role.id = role_id;
    let second = graph.absorb(vec![EntityDto::from(role)]);
    assert!(second.is_complete());
    assert!(graph.dangling_references().is_empty());
    assert_eq!(graph.role_of(participant.id).unwrap().id, role_id);
}

#[test]
fn removing_a_project_cascades_to_owned_records_only() {
    let (mut graph, ids) = assembled();

    let removed = graph.remove(ids.project);
    let kinds: Vec<EntityKind> = removed.iter().map(|record| record.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            EntityKind::Project,
            EntityKind::Participant,
            EntityKind::Participant,
            EntityKind::Review,
            EntityKind::ReviewObjective,
            EntityKind::ReviewTask,
        ]
    );

    assert_eq!(graph.len(), 1);
    assert!(graph.get_as::<Role>(ids.role).is_some());
    assert!(graph.get_as::<Project>(ids.project).is_none());
}

#[test]
fn removing_a_task_strips_it_from_its_objective() {
    let (mut graph, ids) = assembled();

    graph.remove(ids.task);

    let objective = graph.get_as::<ReviewObjective>(ids.objective).unwrap();
    assert!(objective.review_tasks.is_empty());
    assert!(graph.get_as::<ReviewTask>(ids.task).is_none());
    assert_eq!(graph.get_as::<Review>(ids.review).unwrap().review_number, 1);
}

#[test]
fn duplicate_ids_keep_the_last_record_and_first_position() {
    let role = Role::new("Reviewer", Vec::new());
    let mut renamed = role.clone();
    renamed.role_name = "Lead reviewer".to_string();
    let other = Role::new("Observer", Vec::new());

    let (graph, report) =
        EntityGraph::from_records(vec![EntityDto::from(role), other.into(), renamed.into()]);

    assert_eq!((report.inserted, report.replaced), (2, 1));
    let names: Vec<&str> = graph
        .all_of::<Role>()
        .into_iter()
        .map(|role| role.role_name.as_str())
        .collect();
    assert_eq!(names, vec!["Lead reviewer", "Observer"]);
    assert_eq!(graph.to_records().len(), 2);
}
