//! Working-copy access for the records the engine consumes.

use crate::model::{
    Assignment, AssignmentType, ClassConfig, DateRange, Grade, GradeType, GradingSystem,
    LessonSlot, LessonStatus,
};
use rusqlite::types::{Type, Value};
use rusqlite::{params_from_iter, Connection, OptionalExtension, Row};

fn text_enum<T>(idx: usize, raw: String, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unrecognized value {:?}", raw).into(),
        )
    })
}

/// Appends `col = ?` for every present filter value.
fn push_eq(clauses: &mut Vec<String>, binds: &mut Vec<Value>, col: &str, v: Option<&str>) {
    if let Some(v) = v {
        clauses.push(format!("{} = ?", col));
        binds.push(Value::Text(v.to_string()));
    }
}

fn where_sql(clauses: &[String]) -> String {
    if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    }
}

pub fn upsert_class(conn: &Connection, class: &ClassConfig) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO classes(id, name, grading_system) VALUES(?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           name = excluded.name,
           grading_system = excluded.grading_system",
        (&class.id, &class.name, class.grading_system.as_str()),
    )?;
    Ok(())
}

fn class_from_row(r: &Row<'_>) -> rusqlite::Result<ClassConfig> {
    Ok(ClassConfig {
        id: r.get(0)?,
        name: r.get(1)?,
        grading_system: text_enum(2, r.get(2)?, GradingSystem::parse)?,
    })
}

pub fn get_class(conn: &Connection, id: &str) -> anyhow::Result<Option<ClassConfig>> {
    Ok(conn
        .query_row(
            "SELECT id, name, grading_system FROM classes WHERE id = ?",
            [id],
            class_from_row,
        )
        .optional()?)
}

pub fn list_classes(conn: &Connection) -> anyhow::Result<Vec<ClassConfig>> {
    let mut stmt = conn.prepare("SELECT id, name, grading_system FROM classes ORDER BY name, id")?;
    let rows = stmt
        .query_map([], class_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn upsert_slot(conn: &Connection, slot: &LessonSlot) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO lesson_slots(id, class_id, subject_id, subgroup_id, schedule_date, start_time, end_time, status)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           class_id = excluded.class_id,
           subject_id = excluded.subject_id,
           subgroup_id = excluded.subgroup_id,
           schedule_date = excluded.schedule_date,
           start_time = excluded.start_time,
           end_time = excluded.end_time,
           status = excluded.status",
        (
            &slot.id,
            &slot.class_id,
            &slot.subject_id,
            &slot.subgroup_id,
            slot.schedule_date,
            &slot.start_time,
            &slot.end_time,
            slot.status.as_str(),
        ),
    )?;
    Ok(())
}

const SLOT_COLUMNS: &str =
    "id, class_id, subject_id, subgroup_id, schedule_date, start_time, end_time, status";

fn slot_from_row(r: &Row<'_>) -> rusqlite::Result<LessonSlot> {
    Ok(LessonSlot {
        id: r.get(0)?,
        class_id: r.get(1)?,
        subject_id: r.get(2)?,
        subgroup_id: r.get(3)?,
        schedule_date: r.get(4)?,
        start_time: r.get(5)?,
        end_time: r.get(6)?,
        status: text_enum(7, r.get(7)?, LessonStatus::parse)?,
    })
}

pub fn get_slot(conn: &Connection, id: &str) -> anyhow::Result<Option<LessonSlot>> {
    let sql = format!("SELECT {} FROM lesson_slots WHERE id = ?", SLOT_COLUMNS);
    Ok(conn.query_row(&sql, [id], slot_from_row).optional()?)
}

#[derive(Debug, Clone, Default)]
pub struct SlotFilter {
    pub class_id: Option<String>,
    pub subject_id: Option<String>,
    pub subgroup_id: Option<String>,
    pub range: DateRange,
}

pub fn list_slots(conn: &Connection, filter: &SlotFilter) -> anyhow::Result<Vec<LessonSlot>> {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();
    push_eq(&mut clauses, &mut binds, "class_id", filter.class_id.as_deref());
    push_eq(&mut clauses, &mut binds, "subject_id", filter.subject_id.as_deref());
    push_eq(&mut clauses, &mut binds, "subgroup_id", filter.subgroup_id.as_deref());
    if let Some(from) = filter.range.from {
        clauses.push("schedule_date >= ?".to_string());
        binds.push(Value::Text(from.format("%Y-%m-%d").to_string()));
    }
    if let Some(to) = filter.range.to {
        clauses.push("schedule_date <= ?".to_string());
        binds.push(Value::Text(to.format("%Y-%m-%d").to_string()));
    }
    let sql = format!(
        "SELECT {} FROM lesson_slots{} ORDER BY schedule_date, start_time",
        SLOT_COLUMNS,
        where_sql(&clauses)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), slot_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn set_slot_status(conn: &Connection, id: &str, status: LessonStatus) -> anyhow::Result<bool> {
    let changed = conn.execute(
        "UPDATE lesson_slots SET status = ? WHERE id = ?",
        (status.as_str(), id),
    )?;
    Ok(changed > 0)
}

pub fn upsert_assignment(conn: &Connection, a: &Assignment) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO assignments(id, schedule_id, class_id, subject_id, teacher_id, subgroup_id,
                                 assignment_type, max_score, description, planned_for)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           schedule_id = excluded.schedule_id,
           class_id = excluded.class_id,
           subject_id = excluded.subject_id,
           teacher_id = excluded.teacher_id,
           subgroup_id = excluded.subgroup_id,
           assignment_type = excluded.assignment_type,
           max_score = excluded.max_score,
           description = excluded.description,
           planned_for = excluded.planned_for",
        (
            &a.id,
            &a.schedule_id,
            &a.class_id,
            &a.subject_id,
            &a.teacher_id,
            &a.subgroup_id,
            a.assignment_type.as_str(),
            a.max_score,
            &a.description,
            a.planned_for as i64,
        ),
    )?;
    Ok(())
}

const ASSIGNMENT_COLUMNS: &str = "id, schedule_id, class_id, subject_id, teacher_id, subgroup_id,
     assignment_type, max_score, description, planned_for";

fn assignment_from_row(r: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: r.get(0)?,
        schedule_id: r.get(1)?,
        class_id: r.get(2)?,
        subject_id: r.get(3)?,
        teacher_id: r.get(4)?,
        subgroup_id: r.get(5)?,
        assignment_type: text_enum(6, r.get(6)?, AssignmentType::parse)?,
        max_score: r.get(7)?,
        description: r.get(8)?,
        planned_for: r.get::<_, i64>(9)? != 0,
    })
}

pub fn get_assignment(conn: &Connection, id: &str) -> anyhow::Result<Option<Assignment>> {
    let sql = format!("SELECT {} FROM assignments WHERE id = ?", ASSIGNMENT_COLUMNS);
    Ok(conn.query_row(&sql, [id], assignment_from_row).optional()?)
}

#[derive(Debug, Clone, Default)]
pub struct AssignmentFilter {
    pub class_id: Option<String>,
    pub subject_id: Option<String>,
    pub subgroup_id: Option<String>,
    pub schedule_id: Option<String>,
}

pub fn list_assignments(conn: &Connection, filter: &AssignmentFilter) -> anyhow::Result<Vec<Assignment>> {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();
    push_eq(&mut clauses, &mut binds, "class_id", filter.class_id.as_deref());
    push_eq(&mut clauses, &mut binds, "subject_id", filter.subject_id.as_deref());
    push_eq(&mut clauses, &mut binds, "subgroup_id", filter.subgroup_id.as_deref());
    push_eq(&mut clauses, &mut binds, "schedule_id", filter.schedule_id.as_deref());
    // rowid keeps the slot fallback stable: first stored, first matched.
    let sql = format!(
        "SELECT {} FROM assignments{} ORDER BY rowid",
        ASSIGNMENT_COLUMNS,
        where_sql(&clauses)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), assignment_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_assignment(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    Ok(conn.execute("DELETE FROM assignments WHERE id = ?", [id])? > 0)
}

pub fn upsert_grade(conn: &Connection, g: &Grade) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO grades(id, student_id, subject_id, class_id, teacher_id, score, grade_type,
                            comment, subgroup_id, schedule_id, assignment_id, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
           student_id = excluded.student_id,
           subject_id = excluded.subject_id,
           class_id = excluded.class_id,
           teacher_id = excluded.teacher_id,
           score = excluded.score,
           grade_type = excluded.grade_type,
           comment = excluded.comment,
           subgroup_id = excluded.subgroup_id,
           schedule_id = excluded.schedule_id,
           assignment_id = excluded.assignment_id,
           created_at = excluded.created_at",
        (
            &g.id,
            &g.student_id,
            &g.subject_id,
            &g.class_id,
            &g.teacher_id,
            g.score,
            g.grade_type.as_str(),
            &g.comment,
            &g.subgroup_id,
            &g.schedule_id,
            &g.assignment_id,
            g.created_at,
        ),
    )?;
    Ok(())
}

const GRADE_COLUMNS: &str = "id, student_id, subject_id, class_id, teacher_id, score, grade_type,
     comment, subgroup_id, schedule_id, assignment_id, created_at";

fn grade_from_row(r: &Row<'_>) -> rusqlite::Result<Grade> {
    Ok(Grade {
        id: r.get(0)?,
        student_id: r.get(1)?,
        subject_id: r.get(2)?,
        class_id: r.get(3)?,
        teacher_id: r.get(4)?,
        score: r.get(5)?,
        grade_type: GradeType::from(r.get::<_, String>(6)?),
        comment: r.get(7)?,
        subgroup_id: r.get(8)?,
        schedule_id: r.get(9)?,
        assignment_id: r.get(10)?,
        created_at: r.get(11)?,
    })
}

pub fn get_grade(conn: &Connection, id: &str) -> anyhow::Result<Option<Grade>> {
    let sql = format!("SELECT {} FROM grades WHERE id = ?", GRADE_COLUMNS);
    Ok(conn.query_row(&sql, [id], grade_from_row).optional()?)
}

#[derive(Debug, Clone, Default)]
pub struct GradeFilter {
    pub student_id: Option<String>,
    pub subject_id: Option<String>,
    pub class_id: Option<String>,
    pub schedule_id: Option<String>,
}

pub fn list_grades(conn: &Connection, filter: &GradeFilter) -> anyhow::Result<Vec<Grade>> {
    let mut clauses = Vec::new();
    let mut binds = Vec::new();
    push_eq(&mut clauses, &mut binds, "student_id", filter.student_id.as_deref());
    push_eq(&mut clauses, &mut binds, "subject_id", filter.subject_id.as_deref());
    push_eq(&mut clauses, &mut binds, "class_id", filter.class_id.as_deref());
    push_eq(&mut clauses, &mut binds, "schedule_id", filter.schedule_id.as_deref());
    let sql = format!(
        "SELECT {} FROM grades{} ORDER BY created_at, rowid",
        GRADE_COLUMNS,
        where_sql(&clauses)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(binds), grade_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn delete_grade(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    Ok(conn.execute("DELETE FROM grades WHERE id = ?", [id])? > 0)
}

/// `(subject_id, class_id)` pairs a student holds grades in.
pub fn subjects_for_student(conn: &Connection, student_id: &str) -> anyhow::Result<Vec<(String, String)>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT subject_id, class_id FROM grades WHERE student_id = ? ORDER BY subject_id, class_id",
    )?;
    let rows = stmt
        .query_map([student_id], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn students_for_class_subject(
    conn: &Connection,
    class_id: &str,
    subject_id: &str,
) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT student_id FROM grades WHERE class_id = ? AND subject_id = ? ORDER BY student_id",
    )?;
    let rows = stmt
        .query_map((class_id, subject_id), |r| r.get(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
