use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Text shown in place of an average when there is nothing to average.
pub const NO_DATA: &str = "-";

/// Class-scoped grading regime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GradingSystem {
    #[serde(alias = "five_point", alias = "fivePoint")]
    FivePoint,
    #[serde(alias = "cumulative")]
    Cumulative,
}

impl GradingSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            GradingSystem::FivePoint => "FIVE_POINT",
            GradingSystem::Cumulative => "CUMULATIVE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "FIVE_POINT" | "FIVEPOINT" => Some(GradingSystem::FivePoint),
            "CUMULATIVE" => Some(GradingSystem::Cumulative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LessonStatus {
    NotConducted,
    Conducted,
    Cancelled,
}

impl LessonStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LessonStatus::NotConducted => "not_conducted",
            LessonStatus::Conducted => "conducted",
            LessonStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "not_conducted" => Some(LessonStatus::NotConducted),
            "conducted" => Some(LessonStatus::Conducted),
            "cancelled" | "canceled" => Some(LessonStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentType {
    ControlWork,
    TestWork,
    CurrentWork,
    Homework,
    Classwork,
    ProjectWork,
    ClassAssignment,
}

impl AssignmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentType::ControlWork => "control_work",
            AssignmentType::TestWork => "test_work",
            AssignmentType::CurrentWork => "current_work",
            AssignmentType::Homework => "homework",
            AssignmentType::Classwork => "classwork",
            AssignmentType::ProjectWork => "project_work",
            AssignmentType::ClassAssignment => "class_assignment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "control_work" => Some(AssignmentType::ControlWork),
            "test_work" => Some(AssignmentType::TestWork),
            "current_work" => Some(AssignmentType::CurrentWork),
            "homework" => Some(AssignmentType::Homework),
            "classwork" => Some(AssignmentType::Classwork),
            "project_work" => Some(AssignmentType::ProjectWork),
            "class_assignment" => Some(AssignmentType::ClassAssignment),
            _ => None,
        }
    }
}

/// Label a teacher puts on a grade. Unknown labels are kept verbatim and
/// weighted like ordinary classwork.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum GradeType {
    Classwork,
    Homework,
    Test,
    Exam,
    Project,
    ControlWork,
    TestWork,
    CurrentWork,
    ProjectWork,
    ClassAssignment,
    Other(String),
}

impl GradeType {
    pub fn as_str(&self) -> &str {
        match self {
            GradeType::Classwork => "classwork",
            GradeType::Homework => "homework",
            GradeType::Test => "test",
            GradeType::Exam => "exam",
            GradeType::Project => "project",
            GradeType::ControlWork => "control_work",
            GradeType::TestWork => "test_work",
            GradeType::CurrentWork => "current_work",
            GradeType::ProjectWork => "project_work",
            GradeType::ClassAssignment => "class_assignment",
            GradeType::Other(s) => s.as_str(),
        }
    }
}

impl From<String> for GradeType {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "classwork" => GradeType::Classwork,
            "homework" => GradeType::Homework,
            "test" => GradeType::Test,
            "exam" => GradeType::Exam,
            "project" => GradeType::Project,
            "control_work" => GradeType::ControlWork,
            "test_work" => GradeType::TestWork,
            "current_work" => GradeType::CurrentWork,
            "project_work" => GradeType::ProjectWork,
            "class_assignment" => GradeType::ClassAssignment,
            _ => GradeType::Other(raw),
        }
    }
}

impl From<&str> for GradeType {
    fn from(raw: &str) -> Self {
        GradeType::from(raw.to_string())
    }
}

impl From<GradeType> for String {
    fn from(t: GradeType) -> Self {
        t.as_str().to_string()
    }
}

impl From<AssignmentType> for GradeType {
    fn from(t: AssignmentType) -> Self {
        GradeType::from(t.as_str())
    }
}

impl fmt::Display for GradeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grade {
    pub id: String,
    pub student_id: String,
    pub subject_id: String,
    pub class_id: String,
    pub teacher_id: String,
    pub score: f64,
    pub grade_type: GradeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgroup_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Grade {
    /// Calendar day the grade belongs to.
    pub fn day(&self) -> NaiveDate {
        self.created_at.date_naive()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: String,
    pub schedule_id: String,
    pub class_id: String,
    pub subject_id: String,
    pub teacher_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgroup_id: Option<String>,
    pub assignment_type: AssignmentType,
    #[serde(deserialize_with = "number_or_numeric_string")]
    pub max_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub planned_for: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSlot {
    pub id: String,
    pub class_id: String,
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgroup_id: Option<String>,
    pub schedule_date: NaiveDate,
    pub start_time: String,
    pub end_time: String,
    pub status: LessonStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassConfig {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub grading_system: GradingSystem,
}

/// Display-ready aggregate for one student in one subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAverage {
    pub average: String,
    pub percentage: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_score: Option<String>,
}

impl SubjectAverage {
    pub fn no_data() -> Self {
        Self {
            average: NO_DATA.to_string(),
            percentage: NO_DATA.to_string(),
            max_score: None,
        }
    }

    pub fn is_no_data(&self) -> bool {
        self.average == NO_DATA
    }
}

/// Inclusive calendar range; open ends are unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateRange {
    #[serde(default, rename = "fromDate")]
    pub from: Option<NaiveDate>,
    #[serde(default, rename = "toDate")]
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.from.map(|f| day >= f).unwrap_or(true) && self.to.map(|t| day <= t).unwrap_or(true)
    }
}

/// Accepts `5`, `5.5`, `"5"` or `" 5.5 "` for score ceilings that arrive
/// from stores mixing text and numeric columns.
pub fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .replace(',', ".")
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("maxScore is not numeric: {s:?}"))),
    }
}
