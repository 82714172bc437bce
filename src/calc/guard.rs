use super::binder::resolve_assignment;
use super::policy::{format_score, score_bounds};
use crate::model::{Assignment, Grade, GradingSystem};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub accepted: Grade,
    pub corrected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub submitted_score: f64,
}

/// Brings a candidate grade inside the accepted score interval before it is
/// stored. Out-of-range scores are moved to the nearest bound and reported;
/// the grade itself is always accepted.
pub fn submit_grade(
    candidate: Grade,
    grading_system: GradingSystem,
    assignments: &[Assignment],
) -> Submission {
    let assignment = resolve_assignment(&candidate, assignments);
    let (floor, ceiling) = score_bounds(grading_system, assignment);
    let submitted_score = candidate.score;
    let mut accepted = candidate;

    let notice = match ceiling {
        Some(max) if accepted.score > max => {
            accepted.score = max;
            Some(match assignment {
                Some(a) if grading_system == GradingSystem::Cumulative || a.max_score <= max => {
                    format!(
                        "score {} exceeds the maximum of {} for this assignment and was lowered to {}",
                        format_score(submitted_score),
                        format_score(a.max_score),
                        format_score(max)
                    )
                }
                _ => format!(
                    "score {} exceeds the {}-point scale and was lowered to {}",
                    format_score(submitted_score),
                    format_score(max),
                    format_score(max)
                ),
            })
        }
        _ if accepted.score < floor => {
            accepted.score = floor;
            Some(format!(
                "score {} is below the minimum of {} and was raised to {}",
                format_score(submitted_score),
                format_score(floor),
                format_score(floor)
            ))
        }
        _ => None,
    };

    Submission {
        accepted,
        corrected: notice.is_some(),
        notice,
        submitted_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AssignmentType, GradeType};
    use chrono::{TimeZone, Utc};

    fn candidate(score: f64, assignment_id: Option<&str>) -> Grade {
        Grade {
            id: "g1".into(),
            student_id: "s1".into(),
            subject_id: "math".into(),
            class_id: "c1".into(),
            teacher_id: "t1".into(),
            score,
            grade_type: GradeType::CurrentWork,
            comment: Some("late".into()),
            subgroup_id: None,
            schedule_id: Some("L1".into()),
            assignment_id: assignment_id.map(Into::into),
            created_at: Utc.with_ymd_and_hms(2024, 9, 2, 9, 0, 0).unwrap(),
        }
    }

    fn assignments() -> Vec<Assignment> {
        vec![Assignment {
            id: "A1".into(),
            schedule_id: "L1".into(),
            class_id: "c1".into(),
            subject_id: "math".into(),
            teacher_id: "t1".into(),
            subgroup_id: None,
            assignment_type: AssignmentType::ControlWork,
            max_score: 5.0,
            description: None,
            planned_for: false,
        }]
    }

    #[test]
    fn overflow_is_clamped_to_assignment_max() {
        let out = submit_grade(candidate(7.0, Some("A1")), GradingSystem::Cumulative, &assignments());
        assert_eq!(out.accepted.score, 5.0);
        assert!(out.corrected);
        assert_eq!(out.submitted_score, 7.0);
        assert!(out.notice.as_deref().unwrap_or_default().contains("maximum of 5"));
        assert_eq!(out.accepted.comment.as_deref(), Some("late"));
    }

    #[test]
    fn in_range_score_is_untouched() {
        let out = submit_grade(candidate(4.0, Some("A1")), GradingSystem::Cumulative, &assignments());
        assert_eq!(out.accepted.score, 4.0);
        assert!(!out.corrected);
        assert!(out.notice.is_none());
    }

    #[test]
    fn five_point_scale_is_enforced_without_assignment() {
        let out = submit_grade(candidate(6.0, None), GradingSystem::FivePoint, &[]);
        assert_eq!(out.accepted.score, 5.0);
        assert!(out.corrected);

        let low = submit_grade(candidate(0.0, None), GradingSystem::FivePoint, &[]);
        assert_eq!(low.accepted.score, 1.0);
        assert!(low.corrected);
    }

    #[test]
    fn cumulative_without_ceiling_is_accepted_as_is() {
        let out = submit_grade(candidate(42.0, None), GradingSystem::Cumulative, &[]);
        assert_eq!(out.accepted.score, 42.0);
        assert!(!out.corrected);

        let neg = submit_grade(candidate(-1.0, None), GradingSystem::Cumulative, &[]);
        assert_eq!(neg.accepted.score, 0.0);
        assert!(neg.corrected);
    }
}
