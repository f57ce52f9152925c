use std::collections::HashSet;

use serde::Serialize;
use uuid::Uuid;

/// A course's owner and enrolled students.
#[derive(Debug, Clone)]
pub struct Course {
    pub id: Uuid,
    /// The professor who teaches the course.
    pub professor_id: Uuid,
    /// Actively enrolled students.
    pub students: HashSet<Uuid>,
}

impl Course {
    pub fn is_enrolled(&self, student_id: Uuid) -> bool {
        self.students.contains(&student_id)
    }
}

/// A course roster as returned to clients.
#[derive(Debug, Clone, Serialize)]
pub struct RosterSummary {
    pub course_id: Uuid,
    pub professor_id: Uuid,
    pub total_students: usize,
}

impl From<&Course> for RosterSummary {
    fn from(course: &Course) -> Self {
        Self {
            course_id: course.id,
            professor_id: course.professor_id,
            total_students: course.students.len(),
        }
    }
}
