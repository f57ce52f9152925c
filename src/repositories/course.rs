use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::course::Course;

/// In-memory store of course ownership and enrollment.
#[derive(Clone, Default)]
pub struct CourseRepository {
    courses: Arc<RwLock<HashMap<Uuid, Course>>>,
}

impl CourseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the course or replaces its roster.
    ///
    /// A course already owned by another professor is left untouched.
    pub async fn upsert_roster(
        &self,
        course_id: Uuid,
        professor_id: Uuid,
        students: HashSet<Uuid>,
    ) -> Result<Course> {
        let mut courses = self.courses.write().await;

        if let Some(existing) = courses.get(&course_id) {
            if existing.professor_id != professor_id {
                return Err(AppError::Unauthorized);
            }
        }

        let course = Course {
            id: course_id,
            professor_id,
            students,
        };
        courses.insert(course_id, course.clone());
        Ok(course)
    }

    pub async fn get(&self, course_id: Uuid) -> Option<Course> {
        let courses = self.courses.read().await;
        courses.get(&course_id).cloned()
    }

    pub async fn is_enrolled(&self, course_id: Uuid, student_id: Uuid) -> bool {
        let courses = self.courses.read().await;
        courses
            .get(&course_id)
            .is_some_and(|c| c.is_enrolled(student_id))
    }
}
