use crate::model::{Assignment, Grade, GradingSystem, LessonSlot, LessonStatus};
use serde::Serialize;
use std::collections::HashSet;

/// Finds the assignment a grade was earned against.
///
/// `assignmentId` is the precise link and always wins. Without it, the first
/// assignment on the grade's lesson slot is used; on slots carrying several
/// assignments that pick is arbitrary.
pub fn resolve_assignment<'a>(grade: &Grade, assignments: &'a [Assignment]) -> Option<&'a Assignment> {
    if let Some(assignment_id) = grade.assignment_id.as_deref() {
        if let Some(a) = assignments.iter().find(|a| a.id == assignment_id) {
            return Some(a);
        }
    }
    let schedule_id = grade.schedule_id.as_deref()?;
    assignments.iter().find(|a| a.schedule_id == schedule_id)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundSlot {
    #[serde(flatten)]
    pub slot: LessonSlot,
    pub assignments: Vec<Assignment>,
}

/// One entry per `(date, slot id)` for the subject, ordered by date then
/// start time, each carrying the assignments bound to it.
pub fn lesson_slots_with_assignments(
    schedules: &[LessonSlot],
    subject_id: &str,
    assignments: &[Assignment],
) -> Vec<BoundSlot> {
    let mut seen = HashSet::new();
    let mut out: Vec<BoundSlot> = schedules
        .iter()
        .filter(|s| s.subject_id == subject_id)
        .filter(|s| seen.insert((s.schedule_date, s.id.clone())))
        .map(|s| BoundSlot {
            slot: s.clone(),
            assignments: assignments
                .iter()
                .filter(|a| a.schedule_id == s.id)
                .cloned()
                .collect(),
        })
        .collect();
    out.sort_by(|a, b| {
        a.slot
            .schedule_date
            .cmp(&b.slot.schedule_date)
            .then_with(|| a.slot.start_time.cmp(&b.slot.start_time))
    });
    out
}

/// Whether a student can receive a new grade on this slot.
///
/// The lesson must be conducted. Under cumulative grading at least one of the
/// slot's assignments must still be ungraded for the student.
pub fn can_grade(
    slot: &BoundSlot,
    student_id: &str,
    existing_grades: &[Grade],
    grading_system: GradingSystem,
) -> bool {
    if slot.slot.status != LessonStatus::Conducted {
        return false;
    }
    if grading_system == GradingSystem::FivePoint {
        return true;
    }

    let graded: HashSet<&str> = existing_grades
        .iter()
        .filter(|g| g.student_id == student_id)
        .filter_map(|g| resolve_assignment(g, &slot.assignments))
        .map(|a| a.id.as_str())
        .collect();
    slot.assignments
        .iter()
        .any(|a| !graded.contains(a.id.as_str()))
}

/// Assignments go on conducted lessons; planned ones may be prepared on a
/// lesson that has not happened yet, but never on a cancelled one.
pub fn can_attach_assignment(slot: &LessonSlot, planned_for: bool) -> bool {
    match slot.status {
        LessonStatus::Conducted => true,
        LessonStatus::NotConducted => planned_for,
        LessonStatus::Cancelled => false,
    }
}
