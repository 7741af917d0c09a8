use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campus {
    pub id: String,
    pub name: String,
    pub city: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct College {
    pub id: String,
    pub name: String,
    pub campus_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: String,
    pub name: String,
    pub code: String,
    pub college_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub name: String,
    pub code: String,
    pub course_type: String,
    pub year: Option<i64>,
    pub college_id: String,
    pub department_id: String,
    pub instructor_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instructor {
    pub id: String,
    pub name: String,
    pub department_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentGroup {
    pub id: String,
    pub name: String,
    pub year: i64,
    pub department_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classroom {
    pub id: String,
    pub name: String,
    pub room_type: String,
    pub capacity: Option<i64>,
    pub campus_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Campus,
    College,
    Department,
    Course,
    Instructor,
    StudentGroup,
    Classroom,
}

impl EntityKind {
    pub fn table(self) -> &'static str {
        match self {
            EntityKind::Campus => "campuses",
            EntityKind::College => "colleges",
            EntityKind::Department => "departments",
            EntityKind::Course => "courses",
            EntityKind::Instructor => "instructors",
            EntityKind::StudentGroup => "student_groups",
            EntityKind::Classroom => "classrooms",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Campus => "campus",
            EntityKind::College => "college",
            EntityKind::Department => "department",
            EntityKind::Course => "course",
            EntityKind::Instructor => "instructor",
            EntityKind::StudentGroup => "student group",
            EntityKind::Classroom => "classroom",
        }
    }

    /// Foreign-key columns a filter or assignment may address on this kind.
    pub fn parent_fields(self) -> &'static [ParentField] {
        match self {
            EntityKind::Campus => &[],
            EntityKind::College => &[ParentField::CampusId],
            EntityKind::Department => &[ParentField::CollegeId],
            EntityKind::Course => &[ParentField::CollegeId, ParentField::DepartmentId],
            EntityKind::Instructor | EntityKind::StudentGroup => &[ParentField::DepartmentId],
            EntityKind::Classroom => &[ParentField::CampusId],
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParentField {
    CampusId,
    CollegeId,
    DepartmentId,
}

impl ParentField {
    pub fn column(self) -> &'static str {
        match self {
            ParentField::CampusId => "campus_id",
            ParentField::CollegeId => "college_id",
            ParentField::DepartmentId => "department_id",
        }
    }
}
