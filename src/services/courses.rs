use std::collections::HashSet;

use uuid::Uuid;

use crate::error::Result;
use crate::models::course::RosterSummary;
use crate::models::principal::{Principal, Role};
use crate::state::AppState;

/// Registers the professor as the course owner and replaces its roster.
pub async fn set_roster(
    state: &AppState,
    professor: &Principal,
    course_id: Uuid,
    students: HashSet<Uuid>,
) -> Result<RosterSummary> {
    professor.require(Role::Professor)?;

    let course = state
        .courses
        .upsert_roster(course_id, professor.user_id, students)
        .await?;

    tracing::info!(
        "✅ Roster for course {} set to {} students",
        course_id,
        course.students.len()
    );
    Ok(RosterSummary::from(&course))
}
