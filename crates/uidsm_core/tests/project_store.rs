use uidsm_core::db::{open_db, open_db_in_memory, Connection};
use uidsm_core::repo::annotation_repo::SqliteAnnotationRepository;
use uidsm_core::repo::project_repo::SqliteProjectRepository;
use uidsm_core::repo::review_repo::{ReviewRepository, SqliteReviewRepository};
use uidsm_core::repo::role_repo::{RoleRepository, SqliteRoleRepository};
use uidsm_core::service::annotation_service::AnnotationService;
use uidsm_core::service::exchange_service::ExchangeService;
use uidsm_core::service::project_service::ProjectService;
use uidsm_core::service::review_service::ReviewService;
use uidsm_core::service::role_service::RoleService;
use uidsm_core::{
    AccessRight, EntityDto, EntityId, EntityKind, Participant, Project, Review, ReviewObjective,
};

struct Seeded {
    project: EntityId,
    role: EntityId,
}

fn seed(conn: &Connection) -> Seeded {
    let roles = RoleService::new(SqliteRoleRepository::try_new(conn).unwrap());
    let role = roles
        .create_role("Reviewer", vec![AccessRight::CreateReview, AccessRight::ReviewTask])
        .unwrap()
        .entity
        .unwrap();

    let projects = ProjectService::new(SqliteProjectRepository::try_new(conn).unwrap());
    let project = projects.create_project("Envision").unwrap().entity.unwrap();
    let alice = projects
        .add_participant(project.id, "alice", role.id)
        .unwrap()
        .entity
        .unwrap();
    let bob = projects
        .add_participant(project.id, "bob", role.id)
        .unwrap()
        .entity
        .unwrap();

    let reviews = ReviewService::new(SqliteReviewRepository::try_new(conn).unwrap());
    let review = reviews
        .create_review(project.id, "Mission", "Phase B", alice.id)
        .unwrap()
        .entity
        .unwrap();
    let objective = reviews
        .create_objective(review.id, "Budget", "", alice.id)
        .unwrap()
        .entity
        .unwrap();
    reviews
        .create_task(objective.id, "Check margins", "", alice.id, vec![bob.id, alice.id])
        .unwrap();
    reviews
        .create_task(objective.id, "Check power", "", bob.id, Vec::new())
        .unwrap();

    let annotations =
        AnnotationService::new(SqliteAnnotationRepository::try_new(conn).unwrap());
    let comment = annotations
        .add_comment(project.id, bob.id, "Margin too thin")
        .unwrap()
        .entity
        .unwrap();
    annotations.reply_to(comment.id, alice.id, "Agreed").unwrap();

    Seeded {
        project: project.id,
        role: role.id,
    }
}

fn count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| row.get(0))
        .unwrap()
}

#[test]
fn deleting_a_project_cascades_through_owned_tables() {
    let conn = open_db_in_memory().unwrap();
    let seeded = seed(&conn);
    assert_eq!(count(&conn, "review_tasks"), 2);

    let projects = ProjectService::new(SqliteProjectRepository::try_new(&conn).unwrap());
    assert!(projects.delete_project(seeded.project).unwrap().is_succeeded());

    for table in [
        "projects",
        "participants",
        "reviews",
        "review_objectives",
        "review_tasks",
        "review_task_assignees",
        "comments",
        "replies",
    ] {
        assert_eq!(count(&conn, table), 0, "{table} should be empty");
    }
    assert_eq!(count(&conn, "roles"), 1);
}

#[test]
fn role_held_by_a_participant_cannot_be_deleted() {
    let conn = open_db_in_memory().unwrap();
    let seeded = seed(&conn);

    let roles = RoleService::new(SqliteRoleRepository::try_new(&conn).unwrap());
    let outcome = roles.delete_role(seeded.role).unwrap();
    assert!(!outcome.is_succeeded());
    assert!(outcome.errors[0].contains("still referenced"));
}

#[test]
fn export_lists_roles_then_project_then_owned_records() {
    let conn = open_db_in_memory().unwrap();
    let seeded = seed(&conn);

    let records = ExchangeService::new(&conn)
        .export_project(seeded.project)
        .unwrap()
        .entity
        .unwrap();
    let kinds: Vec<EntityKind> = records.iter().map(EntityDto::kind).collect();
    assert_eq!(
        kinds,
        vec![
            EntityKind::Role,
            EntityKind::Project,
            EntityKind::Participant,
            EntityKind::Participant,
            EntityKind::Review,
            EntityKind::ReviewObjective,
            EntityKind::ReviewTask,
            EntityKind::ReviewTask,
            EntityKind::Comment,
            EntityKind::Reply,
        ]
    );
}

#[test]
fn export_then_import_into_a_fresh_store_reproduces_the_project() {
    let source = open_db_in_memory().unwrap();
    let seeded = seed(&source);
    let exported = ExchangeService::new(&source)
        .export_project(seeded.project)
        .unwrap()
        .entity
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let target = open_db(dir.path().join("copy.db")).unwrap();
    let summary = ExchangeService::new(&target)
        .import(exported.clone())
        .unwrap()
        .entity
        .unwrap();
    assert_eq!(summary.created, exported.len());
    assert_eq!(summary.updated, 0);

    let reexported = ExchangeService::new(&target)
        .export_project(seeded.project)
        .unwrap()
        .entity
        .unwrap();
    assert_eq!(reexported, exported);

    let again = ExchangeService::new(&target)
        .import(exported.clone())
        .unwrap()
        .entity
        .unwrap();
    assert_eq!((again.created, again.updated), (0, exported.len()));
}

#[test]
fn import_with_unknown_reference_writes_nothing() {
    let conn = open_db_in_memory().unwrap();
    let stray = Participant::new("mallory", uuid::Uuid::new_v4());

    let outcome = ExchangeService::new(&conn)
        .import(vec![EntityDto::from(stray)])
        .unwrap();

    assert!(!outcome.is_succeeded());
    assert!(outcome.errors[0].contains("`role`"));
    assert_eq!(count(&conn, "participants"), 0);
}

#[test]
fn import_rolls_back_when_an_owned_record_has_no_container() {
    let conn = open_db_in_memory().unwrap();
    let seeded = seed(&conn);
    let role = SqliteRoleRepository::try_new(&conn)
        .unwrap()
        .get_role(seeded.role)
        .unwrap()
        .unwrap();

    let mut renamed = role.clone();
    renamed.role_name = "Lead reviewer".to_string();
    let orphan = Participant::new("carol", role.id);

    let outcome = ExchangeService::new(&conn)
        .import(vec![EntityDto::from(renamed), EntityDto::from(orphan)])
        .unwrap();

    assert!(!outcome.is_succeeded());
    assert!(outcome.errors[0].contains("no owning container"));
    let stored = SqliteRoleRepository::try_new(&conn)
        .unwrap()
        .get_role(seeded.role)
        .unwrap()
        .unwrap();
    assert_eq!(stored.role_name, "Reviewer");
    assert_eq!(count(&conn, "participants"), 2);
}

#[test]
fn import_refuses_to_move_a_stored_record_to_another_owner() {
    let conn = open_db_in_memory().unwrap();
    let seeded = seed(&conn);
    let exported = ExchangeService::new(&conn)
        .export_project(seeded.project)
        .unwrap()
        .entity
        .unwrap();

    let mut project = exported
        .iter()
        .find_map(|record| record.as_record::<Project>())
        .unwrap()
        .clone();
    let mut review = exported
        .iter()
        .find_map(|record| record.as_record::<Review>())
        .unwrap()
        .clone();
    let objective = review.review_objectives.remove(0);
    let objective_record = exported
        .iter()
        .find_map(|record| record.as_record::<ReviewObjective>())
        .unwrap()
        .clone();
    assert_eq!(objective_record.id, objective);

    let mut second = Review::new("Power", "", review.author);
    second.review_number = 2;
    second.review_objectives = vec![objective];
    project.reviews.push(second.id);

    let outcome = ExchangeService::new(&conn)
        .import(vec![
            EntityDto::from(project),
            EntityDto::from(review.clone()),
            EntityDto::from(second),
            EntityDto::from(objective_record),
        ])
        .unwrap();

    assert!(!outcome.is_succeeded());
    assert!(outcome.errors[0].contains("does not move"));
    assert_eq!(count(&conn, "reviews"), 1);
    let stored = SqliteReviewRepository::try_new(&conn)
        .unwrap()
        .get_review(review.id)
        .unwrap()
        .unwrap();
    assert_eq!(stored.review_objectives, vec![objective]);
}
