use crate::model::{Assignment, Grade, GradeType, GradingSystem};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const FIVE_POINT_MIN: f64 = 1.0;
pub const FIVE_POINT_MAX: f64 = 5.0;
pub const CUMULATIVE_MIN: f64 = 0.0;

/// 1-decimal rounding used for every displayed average:
/// `Int(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

pub fn cap_percent(x: f64) -> f64 {
    x.clamp(0.0, 100.0)
}

/// Scores print without a trailing `.0` and with at most two decimals.
pub fn format_score(v: f64) -> String {
    let r = (v * 100.0).round() / 100.0;
    if r.fract() == 0.0 {
        format!("{}", r as i64)
    } else {
        format!("{}", r)
    }
}

pub fn format_one_decimal(v: f64) -> String {
    format!("{:.1}", round_off_1_decimal(v))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayValue {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_score: Option<f64>,
    pub missing_max: bool,
}

/// How a single grade reads under the class's grading system.
pub fn classify(
    grading_system: GradingSystem,
    grade: &Grade,
    assignment: Option<&Assignment>,
) -> DisplayValue {
    match (grading_system, assignment) {
        (GradingSystem::Cumulative, Some(a)) => {
            let percentage = if a.max_score > 0.0 {
                round_off_1_decimal(cap_percent(grade.score / a.max_score * 100.0))
            } else {
                0.0
            };
            DisplayValue {
                text: format!("{}/{}", format_score(grade.score), format_score(a.max_score)),
                percentage: Some(percentage),
                max_score: Some(a.max_score),
                missing_max: false,
            }
        }
        (GradingSystem::Cumulative, None) => DisplayValue {
            text: format_score(grade.score),
            percentage: None,
            max_score: None,
            missing_max: true,
        },
        (GradingSystem::FivePoint, _) => DisplayValue {
            text: format_score(grade.score),
            percentage: None,
            max_score: None,
            missing_max: false,
        },
    }
}

/// Accepted score interval. `None` as the upper bound means the ceiling is
/// unknown (cumulative grade with no resolvable assignment).
pub fn score_bounds(
    grading_system: GradingSystem,
    assignment: Option<&Assignment>,
) -> (f64, Option<f64>) {
    match grading_system {
        GradingSystem::FivePoint => {
            let ceiling = assignment
                .map(|a| a.max_score.min(FIVE_POINT_MAX))
                .unwrap_or(FIVE_POINT_MAX);
            (FIVE_POINT_MIN, Some(ceiling))
        }
        GradingSystem::Cumulative => (CUMULATIVE_MIN, assignment.map(|a| a.max_score)),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FivePointMethod {
    #[default]
    Weighted,
    Simple,
}

/// Five-point averaging settings. `weights` overrides the built-in table per
/// grade-type label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FivePointSettings {
    #[serde(default)]
    pub method: FivePointMethod,
    #[serde(default)]
    pub weights: BTreeMap<String, f64>,
}

impl FivePointSettings {
    pub fn weight(&self, grade_type: &GradeType) -> f64 {
        if self.method == FivePointMethod::Simple {
            return 1.0;
        }
        if let Some(w) = self.weights.get(grade_type.as_str()) {
            return *w;
        }
        default_weight(grade_type)
    }
}

pub fn default_weight(grade_type: &GradeType) -> f64 {
    match grade_type {
        GradeType::Exam => 3.0,
        GradeType::Test | GradeType::TestWork | GradeType::ControlWork => 2.0,
        _ => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AssignmentType;
    use chrono::{TimeZone, Utc};

    fn grade(score: f64) -> Grade {
        Grade {
            id: "g1".into(),
            student_id: "s1".into(),
            subject_id: "math".into(),
            class_id: "c1".into(),
            teacher_id: "t1".into(),
            score,
            grade_type: GradeType::Classwork,
            comment: None,
            subgroup_id: None,
            schedule_id: Some("l1".into()),
            assignment_id: Some("a1".into()),
            created_at: Utc.with_ymd_and_hms(2024, 9, 2, 9, 0, 0).unwrap(),
        }
    }

    fn assignment(max_score: f64) -> Assignment {
        Assignment {
            id: "a1".into(),
            schedule_id: "l1".into(),
            class_id: "c1".into(),
            subject_id: "math".into(),
            teacher_id: "t1".into(),
            subgroup_id: None,
            assignment_type: AssignmentType::TestWork,
            max_score,
            description: None,
            planned_for: false,
        }
    }

    #[test]
    fn round_off_rounds_half_up() {
        assert_eq!(round_off_1_decimal(0.0), 0.0);
        assert_eq!(round_off_1_decimal(3.54), 3.5);
        assert_eq!(round_off_1_decimal(86.6666), 86.7);
        assert_eq!(round_off_1_decimal(35.6818), 35.7);
    }

    #[test]
    fn cumulative_with_assignment_shows_fraction() {
        let a = assignment(10.0);
        let v = classify(GradingSystem::Cumulative, &grade(9.0), Some(&a));
        assert_eq!(v.text, "9/10");
        assert_eq!(v.percentage, Some(90.0));
        assert!(!v.missing_max);
    }

    #[test]
    fn cumulative_percentage_is_capped() {
        let a = assignment(5.0);
        let v = classify(GradingSystem::Cumulative, &grade(7.0), Some(&a));
        assert_eq!(v.percentage, Some(100.0));
    }

    #[test]
    fn cumulative_without_assignment_flags_missing_max() {
        let v = classify(GradingSystem::Cumulative, &grade(4.5), None);
        assert_eq!(v.text, "4.5");
        assert_eq!(v.percentage, None);
        assert!(v.missing_max);
    }

    #[test]
    fn five_point_is_raw_score() {
        let a = assignment(10.0);
        let v = classify(GradingSystem::FivePoint, &grade(4.0), Some(&a));
        assert_eq!(v.text, "4");
        assert_eq!(v.percentage, None);
        assert!(!v.missing_max);
    }

    #[test]
    fn weights_follow_method_and_overrides() {
        let mut s = FivePointSettings::default();
        assert_eq!(s.weight(&GradeType::Exam), 3.0);
        assert_eq!(s.weight(&GradeType::Test), 2.0);
        assert_eq!(s.weight(&GradeType::Homework), 1.0);
        assert_eq!(s.weight(&GradeType::from("oral")), 1.0);

        s.weights.insert("homework".into(), 0.5);
        assert_eq!(s.weight(&GradeType::Homework), 0.5);

        s.method = FivePointMethod::Simple;
        assert_eq!(s.weight(&GradeType::Exam), 1.0);
    }

    #[test]
    fn bounds_per_system() {
        assert_eq!(score_bounds(GradingSystem::FivePoint, None), (1.0, Some(5.0)));
        let a = assignment(20.0);
        assert_eq!(score_bounds(GradingSystem::Cumulative, Some(&a)), (0.0, Some(20.0)));
        assert_eq!(score_bounds(GradingSystem::Cumulative, None), (0.0, None));
    }
}
