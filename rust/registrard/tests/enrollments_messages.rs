mod common;

use common::{admin, code, seed_campus, student, teacher, Sidecar};
use serde_json::json;

#[test]
fn enrollments_reject_duplicates_and_default_their_date() {
    let mut sc = Sidecar::with_workspace("registrard-enrollments");
    let campus = seed_campus(&mut sc);
    let admin = admin();
    let staff = teacher(campus.teacher_id);

    let first = sc.create(
        &staff,
        "enrollments",
        json!({ "studentId": campus.alice_id, "sectionId": campus.section_id }),
    );
    let row = sc.ok(Some(&staff), "enrollments.get", json!({ "id": first }));
    let date = row
        .pointer("/row/enrollmentDate")
        .and_then(|v| v.as_str())
        .expect("defaulted date");
    assert_eq!(date.len(), 10);
    assert_eq!(&date[4..5], "-");

    let e = sc.fail(
        Some(&staff),
        "enrollments.create",
        json!({ "record": { "studentId": campus.alice_id, "sectionId": campus.section_id } }),
    );
    assert_eq!(code(&e), "conflict");
    assert_eq!(
        e.get("message").and_then(|v| v.as_str()),
        Some("student already enrolled in this section")
    );

    let second_section = sc.create(
        &admin,
        "sections",
        json!({ "courseId": campus.course_id, "label": "B" }),
    );
    let bob = sc.create(
        &staff,
        "enrollments",
        json!({
            "studentId": campus.bob_id,
            "sectionId": campus.section_id,
            "enrollmentDate": "2024-09-16"
        }),
    );

    // Re-saving a row with its own values is not a duplicate.
    sc.ok(
        Some(&staff),
        "enrollments.update",
        json!({ "id": bob, "patch": { "sectionId": campus.section_id } }),
    );
    let e = sc.fail(
        Some(&staff),
        "enrollments.update",
        json!({ "id": bob, "patch": { "studentId": campus.alice_id } }),
    );
    assert_eq!(code(&e), "conflict");
    sc.ok(
        Some(&staff),
        "enrollments.update",
        json!({ "id": bob, "patch": { "sectionId": second_section } }),
    );
    let e = sc.fail(
        Some(&staff),
        "enrollments.update",
        json!({ "id": 9999, "patch": { "sectionId": second_section } }),
    );
    assert_eq!(code(&e), "not_found");

    let alice = student(campus.alice_id);
    let listed = sc.ok(Some(&alice), "enrollments.list", json!({}));
    let rows = listed.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("studentId").and_then(|v| v.as_i64()), Some(campus.alice_id));

    let mine = sc.ok(
        Some(&alice),
        "enrollments.forStudent",
        json!({ "studentId": campus.alice_id }),
    );
    let rows = mine.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("courseCode").and_then(|v| v.as_str()), Some("CS101"));
    assert_eq!(rows[0].get("sectionLabel").and_then(|v| v.as_str()), Some("A"));
    assert_eq!(rows[0].get("credits").and_then(|v| v.as_f64()), Some(4.0));

    let e = sc.fail(
        Some(&alice),
        "enrollments.forStudent",
        json!({ "studentId": campus.bob_id }),
    );
    assert_eq!(code(&e), "forbidden");

    sc.ok(Some(&staff), "enrollments.delete", json!({ "id": first }));
}

#[test]
fn messages_are_private_to_their_parties() {
    let mut sc = Sidecar::with_workspace("registrard-messages");
    let campus = seed_campus(&mut sc);
    let alice = student(campus.alice_id);
    let bob = student(campus.bob_id);
    let staff = teacher(campus.teacher_id);

    let first = sc.ok(
        Some(&alice),
        "messages.create",
        json!({ "receiverId": campus.teacher_id, "body": "Is the midterm open book?" }),
    );
    let first_id = first.get("id").and_then(|v| v.as_i64()).expect("id");
    assert_eq!(first.get("sentAt").and_then(|v| v.as_str()).map(|s| s.len()), Some(19));

    let reply = sc.ok(
        Some(&staff),
        "messages.create",
        json!({
            "receiverId": campus.alice_id,
            "body": "No, closed book.",
            "sectionId": campus.section_id
        }),
    );
    let reply_id = reply.get("id").and_then(|v| v.as_i64()).expect("id");

    let e = sc.fail(
        Some(&alice),
        "messages.create",
        json!({ "receiverId": campus.teacher_id, "body": "   " }),
    );
    assert_eq!(code(&e), "bad_params");

    let inbox = sc.ok(Some(&alice), "messages.list", json!({}));
    let rows = inbox.get("rows").and_then(|v| v.as_array()).expect("rows");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("id").and_then(|v| v.as_i64()), Some(reply_id));
    assert_eq!(rows[0].get("senderName").and_then(|v| v.as_str()), Some("Grace Hopper"));
    assert_eq!(rows[0].get("receiverName").and_then(|v| v.as_str()), Some("Alice Demir"));
    assert_eq!(rows[0].get("isRead").and_then(|v| v.as_bool()), Some(false));

    let other = sc.ok(Some(&bob), "messages.list", json!({}));
    assert_eq!(other.get("rows").and_then(|v| v.as_array()).map(|r| r.len()), Some(0));

    let e = sc.fail(Some(&bob), "messages.markRead", json!({ "id": reply_id }));
    assert_eq!(code(&e), "forbidden");
    sc.ok(Some(&alice), "messages.markRead", json!({ "id": reply_id }));
    let inbox = sc.ok(Some(&alice), "messages.list", json!({}));
    assert_eq!(inbox.pointer("/rows/0/isRead").and_then(|v| v.as_bool()), Some(true));

    let e = sc.fail(Some(&alice), "messages.delete", json!({ "id": reply_id }));
    assert_eq!(code(&e), "forbidden");
    sc.ok(Some(&alice), "messages.delete", json!({ "id": first_id }));
    let e = sc.fail(Some(&alice), "messages.markRead", json!({ "id": first_id }));
    assert_eq!(code(&e), "not_found");

    let all = sc.ok(Some(&staff), "messages.list", json!({}));
    assert_eq!(all.get("rows").and_then(|v| v.as_array()).map(|r| r.len()), Some(1));
}
