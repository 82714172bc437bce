use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

pub const DB_FILE: &str = "gradebook.sqlite3";

/// Opens (creating if needed) the workspace working copy.
pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join(DB_FILE);
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS classes(
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            grading_system TEXT NOT NULL DEFAULT 'FIVE_POINT'
        )",
        [],
    )?;

    // Grades and assignments may point at slots the caller has not handed
    // over yet, so none of these tables carry foreign keys.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS lesson_slots(
            id TEXT PRIMARY KEY,
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            schedule_date TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'not_conducted'
        )",
        [],
    )?;
    ensure_lesson_slots_subgroup(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lesson_slots_class_subject ON lesson_slots(class_id, subject_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_lesson_slots_date ON lesson_slots(schedule_date, start_time)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS assignments(
            id TEXT PRIMARY KEY,
            schedule_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            subgroup_id TEXT,
            assignment_type TEXT NOT NULL,
            max_score REAL NOT NULL,
            description TEXT
        )",
        [],
    )?;
    ensure_assignments_planned_for(conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_schedule ON assignments(schedule_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_assignments_class_subject ON assignments(class_id, subject_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS grades(
            id TEXT PRIMARY KEY,
            student_id TEXT NOT NULL,
            subject_id TEXT NOT NULL,
            class_id TEXT NOT NULL,
            teacher_id TEXT NOT NULL,
            score REAL NOT NULL,
            grade_type TEXT NOT NULL,
            comment TEXT,
            subgroup_id TEXT,
            schedule_id TEXT,
            assignment_id TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_student_subject ON grades(student_id, subject_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_class_subject ON grades(class_id, subject_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_grades_schedule ON grades(schedule_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

fn ensure_lesson_slots_subgroup(conn: &Connection) -> anyhow::Result<()> {
    // Workspaces created before subgroup scheduling lack this column.
    if table_has_column(conn, "lesson_slots", "subgroup_id")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE lesson_slots ADD COLUMN subgroup_id TEXT", [])?;
    Ok(())
}

fn ensure_assignments_planned_for(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "assignments", "planned_for")? {
        return Ok(());
    }
    conn.execute(
        "ALTER TABLE assignments ADD COLUMN planned_for INTEGER NOT NULL DEFAULT 0",
        [],
    )?;
    Ok(())
}

pub fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}

pub fn settings_delete(conn: &Connection, key: &str) -> anyhow::Result<()> {
    conn.execute("DELETE FROM settings WHERE key = ?", [key])?;
    Ok(())
}
