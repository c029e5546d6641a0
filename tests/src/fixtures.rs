//! Test fixtures: raw feed records and profile pages.

use invoice_core::RawSession;

/// Dashboard page of a student funded by a third party.
pub const FINANCED_PAGE: &str = r#"<html><body><div class="mentorshipStudent__details oc-typography-body1">
<p>
Financé par un tiers
</p></div></body></html>"#;

/// Dashboard page of a self-funded student.
pub const AUTO_FINANCED_PAGE: &str = r#"<html><body><div class="mentorshipStudent__details oc-typography-body1">
<p>
Auto-financé
</p></div></body></html>"#;

/// Page without the financing details node.
pub const BROKEN_PAGE: &str = "<html><body><h1>Maintenance</h1></body></html>";

/// A completed level 1 mentoring session.
pub fn session(id: u64, date: &str, student_id: u64, name: &str) -> serde_json::Value {
    session_with(id, date, student_id, name, 1, "completed")
}

/// A mentoring session with an explicit level and status.
pub fn session_with(
    id: u64,
    date: &str,
    student_id: u64,
    name: &str,
    level: u8,
    status: &str,
) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "sessionDate": date,
        "recipient": { "id": student_id, "displayableName": name },
        "projectLevel": level.to_string(),
        "status": status,
        "type": "mentoring"
    })
}

/// A final-defense session.
pub fn presentation(id: u64, date: &str, student_id: u64, name: &str, level: u8) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "sessionDate": date,
        "recipient": { "id": student_id, "displayableName": name },
        "projectLevel": level.to_string(),
        "status": "completed",
        "type": "presentation"
    })
}

/// A session whose recipient carries no display name.
pub fn anonymous_session(id: u64, date: &str, student_id: u64) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "sessionDate": date,
        "recipient": { "id": student_id },
        "projectLevel": "1",
        "status": "completed",
        "type": "mentoring"
    })
}

/// Decodes a fixture into the feed's wire type.
pub fn raw(value: serde_json::Value) -> RawSession {
    serde_json::from_value(value).expect("fixture must match the feed format")
}

/// A month of sessions for three students, plus its neighbours.
///
/// June 2021: Alice (1) has three level 1 sessions including an absence,
/// Bob (2) two level 2 sessions and a level 3 presentation, Chloe (3) one
/// pending level 3 session. May and July sessions sit on both sides.
pub fn june_history() -> Vec<serde_json::Value> {
    vec![
        session(100, "2021-05-28T09:00:00+0000", 1, "Alice Martin"),
        session(101, "2021-05-31T23:30:00+0000", 4, "Dan Old"),
        session(1, "2021-06-01T08:00:00+0000", 1, "Alice Martin"),
        session_with(2, "2021-06-03T14:30:00+0000", 2, "Bob Durand", 2, "completed"),
        session_with(3, "2021-06-08T10:00:00+0000", 1, "Alice Martin", 1, "marked as absent"),
        session_with(4, "2021-06-10T16:00:00+0000", 2, "Bob Durand", 2, "completed"),
        presentation(5, "2021-06-15T09:00:00+0000", 2, "Bob Durand", 3),
        session(6, "2021-06-22T11:00:00+0000", 1, "Alice Martin"),
        session_with(7, "2021-06-29T17:00:00+0000", 3, "Chloe Petit", 3, "pending"),
        session(200, "2021-07-01T00:00:00+0000", 1, "Alice Martin"),
        session(201, "2021-07-05T10:00:00+0000", 5, "Eve Future"),
    ]
}
