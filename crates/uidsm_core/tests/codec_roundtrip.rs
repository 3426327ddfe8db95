use serde_json::{json, Value};
use uidsm_core::{
    decode_str, encode, encode_to_string, AccessRight, CodecError, CodecOptions, Comment,
    DispatchTable, EntityDto, Participant, Project, Reply, Review, ReviewObjective, ReviewTask,
    Role, StatusKind,
};

fn sample_set() -> Vec<EntityDto> {
    let role = Role::new("Reviewer", vec![AccessRight::CreateReview, AccessRight::ReviewTask]);
    let participant = Participant::new("alice", role.id);
    let mut task = ReviewTask::new("Check margins", "", participant.id);
    task.task_number = 1;
    task.is_assigned_to = vec![participant.id];
    let mut objective = ReviewObjective::new("Budget", "Mass budget", participant.id);
    objective.review_objective_number = 1;
    objective.review_tasks = vec![task.id];
    let mut review = Review::new("Mission", "Phase B", participant.id);
    review.review_number = 1;
    review.status = StatusKind::Closed;
    review.review_objectives = vec![objective.id];
    let reply = Reply::new("Agreed", participant.id);
    let mut comment = Comment::new("Margin too thin", participant.id);
    comment.replies = vec![reply.id];
    let mut project = Project::new("Envision");
    project.participants = vec![participant.id];
    project.reviews = vec![review.id];
    project.annotations = vec![comment.id];

    vec![
        EntityDto::from(project),
        EntityDto::from(role),
        EntityDto::from(participant),
        EntityDto::from(review),
        EntityDto::from(objective),
        EntityDto::from(task),
        EntityDto::from(comment),
        EntityDto::from(reply),
    ]
}

#[test]
fn heterogeneous_set_round_trips_in_order() {
    let records = sample_set();
    let table = DispatchTable::global();

    let text = encode_to_string(&records, &CodecOptions::default(), table).unwrap();
    let decoded = decode_str(&text, table).unwrap();

    assert_eq!(decoded, records);
    let tags: Vec<&str> = decoded.iter().map(EntityDto::type_tag).collect();
    assert_eq!(
        tags,
        vec![
            "Project",
            "Role",
            "Participant",
            "Review",
            "ReviewObjective",
            "ReviewTask",
            "Comment",
            "Reply"
        ]
    );
}

#[test]
fn every_object_starts_with_the_discriminator() {
    let text = encode_to_string(&sample_set(), &CodecOptions::default(), DispatchTable::global())
        .unwrap();
    let value: Value = serde_json::from_str(&text).unwrap();
    for object in value.as_array().unwrap() {
        let keys: Vec<&String> = object.as_object().unwrap().keys().collect();
        assert_eq!(keys[0], "@type");
        assert_eq!(keys[1], "id");
    }
}

#[test]
fn participant_references_role_by_id_only() {
    let role = Role::new("Project administrator", vec![AccessRight::ManageParticipant]);
    let participant = Participant::new("admin", role.id);
    let records = vec![
        EntityDto::from(role.clone()),
        EntityDto::from(participant.clone()),
    ];

    let text =
        encode_to_string(&records, &CodecOptions::default(), DispatchTable::global()).unwrap();
    let value: Value = serde_json::from_str(&text).unwrap();

    assert_eq!(value[1]["role"], json!(role.id.to_string()));
    assert!(!value[1]["role"].is_object());

    let decoded = decode_str(&text, DispatchTable::global()).unwrap();
    let decoded_participant = decoded[1].as_record::<Participant>().unwrap();
    assert_eq!(decoded_participant.role, decoded[0].id());
}

#[test]
fn unknown_discriminator_names_the_tag() {
    let input = json!([{ "@type": "Spaceship", "id": "4f0c3f4e-8d0e-4c1c-9a57-6b3e9d3f2a11" }])
        .to_string();
    let err = decode_str(&input, DispatchTable::global()).unwrap_err();

    assert!(matches!(
        &err,
        CodecError::UnknownDiscriminator { index: 0, tag } if tag == "Spaceship"
    ));
    assert!(err.to_string().contains("Spaceship"));
}

#[test]
fn missing_discriminator_fails_explicitly() {
    let input = json!({ "id": "4f0c3f4e-8d0e-4c1c-9a57-6b3e9d3f2a11", "roleName": "x" })
        .to_string();
    let err = decode_str(&input, DispatchTable::global()).unwrap_err();

    assert!(matches!(err, CodecError::MissingDiscriminator { index: 0 }));
    assert!(err
        .to_string()
        .contains("cannot deserialize without a type discriminator"));
}

#[test]
fn top_level_scalar_fails_explicitly() {
    for input in ["42", "\"Role\"", "true", "null"] {
        let err = decode_str(input, DispatchTable::global()).unwrap_err();
        assert!(
            matches!(err, CodecError::UnsupportedTopLevel(_)),
            "unexpected error for {input}: {err}"
        );
    }
}

#[test]
fn single_object_decodes_to_one_record() {
    let role = Role::new("Reviewer", Vec::new());
    let input = json!({
        "@type": "Role",
        "id": role.id,
        "roleName": "Reviewer",
        "accessRights": []
    })
    .to_string();

    let decoded = decode_str(&input, DispatchTable::global()).unwrap();
    assert_eq!(decoded, vec![EntityDto::from(role)]);
}

#[test]
fn concurrent_encodes_do_not_interfere() {
    let records = sample_set();
    let expected =
        encode_to_string(&records, &CodecOptions::default(), DispatchTable::global()).unwrap();

    let outputs: Vec<Vec<u8>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    let mut sink = Vec::new();
                    encode(
                        &records,
                        &mut sink,
                        &CodecOptions::default(),
                        DispatchTable::global(),
                    )
                    .unwrap();
                    sink
                })
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    for output in outputs {
        assert_eq!(String::from_utf8(output).unwrap(), expected);
    }
}

#[test]
fn custom_table_without_a_type_refuses_to_encode_it() {
    let mut table = DispatchTable::with_builtin_types();
    table.unregister("Reply");

    let reply = Reply::new("Agreed", uuid::Uuid::new_v4());
    let mut sink = Vec::new();
    let err = encode(
        &[EntityDto::from(reply)],
        &mut sink,
        &CodecOptions::default(),
        &table,
    )
    .unwrap_err();

    assert!(matches!(err, CodecError::UnregisteredType(tag) if tag == "Reply"));
    assert!(sink.is_empty());
}
