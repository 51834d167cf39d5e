//! SQL schema for the Rollcall SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS departments (
    department_id TEXT PRIMARY KEY,
    code          TEXT NOT NULL UNIQUE,
    name          TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS academic_levels (
    level_id      TEXT PRIMARY KEY,
    department_id TEXT NOT NULL REFERENCES departments(department_id),
    code          TEXT NOT NULL,
    name          TEXT NOT NULL,
    UNIQUE (department_id, code)
);

CREATE TABLE IF NOT EXISTS courses (
    course_id     TEXT PRIMARY KEY,
    department_id TEXT NOT NULL REFERENCES departments(department_id),
    code          TEXT NOT NULL UNIQUE,
    title         TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS timetables (
    timetable_id  TEXT PRIMARY KEY,
    department_id TEXT NOT NULL REFERENCES departments(department_id),
    level_id      TEXT NOT NULL REFERENCES academic_levels(level_id),
    name          TEXT NOT NULL,
    is_published  INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL
);

-- department_id and level_id are copied from the owning timetable.
CREATE TABLE IF NOT EXISTS timetable_slots (
    slot_id       TEXT PRIMARY KEY,
    timetable_id  TEXT NOT NULL REFERENCES timetables(timetable_id),
    department_id TEXT NOT NULL,
    level_id      TEXT NOT NULL,
    course_id     TEXT NOT NULL REFERENCES courses(course_id),
    instructor    TEXT,
    day_of_week   TEXT NOT NULL,   -- 'MON' .. 'SUN'
    start_time    TEXT NOT NULL,   -- HH:MM:SS, local
    end_time      TEXT NOT NULL,
    venue         TEXT NOT NULL,
    created_at    TEXT NOT NULL,
    CHECK (start_time < end_time)
);

CREATE TABLE IF NOT EXISTS students (
    student_id    TEXT PRIMARY KEY,
    matric_number TEXT NOT NULL UNIQUE,
    full_name     TEXT NOT NULL,
    department_id TEXT NOT NULL REFERENCES departments(department_id),
    created_at    TEXT NOT NULL
);

-- One level per student.
CREATE TABLE IF NOT EXISTS level_selections (
    student_id  TEXT PRIMARY KEY REFERENCES students(student_id),
    level_id    TEXT NOT NULL REFERENCES academic_levels(level_id),
    selected_at TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

-- No row means offered by default.
CREATE TABLE IF NOT EXISTS course_selections (
    selection_id  TEXT PRIMARY KEY,
    student_id    TEXT NOT NULL REFERENCES students(student_id),
    department_id TEXT NOT NULL,
    level_id      TEXT NOT NULL,
    course_id     TEXT NOT NULL REFERENCES courses(course_id),
    is_offered    INTEGER NOT NULL,
    is_approved   INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    UNIQUE (student_id, course_id, level_id),
    CHECK  (NOT (is_offered = 0 AND is_approved = 1))
);

-- Append-only. No foreign keys: entries outlive the rows they describe.
CREATE TABLE IF NOT EXISTS audit_log (
    entry_id       TEXT PRIMARY KEY,
    student_id     TEXT NOT NULL,
    course_id      TEXT NOT NULL,
    level_id       TEXT NOT NULL,
    department_id  TEXT NOT NULL,
    action         TEXT NOT NULL,  -- 'CREATE' | 'UPDATE' | 'DELETE'
    old_is_offered INTEGER,
    new_is_offered INTEGER NOT NULL,
    recorded_at    TEXT NOT NULL,
    ip_address     TEXT,
    user_agent     TEXT,
    session_key    TEXT,
    reason         TEXT NOT NULL DEFAULT '',
    batch_id       TEXT
);

CREATE TRIGGER IF NOT EXISTS audit_log_no_update
BEFORE UPDATE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END;

CREATE TRIGGER IF NOT EXISTS audit_log_no_delete
BEFORE DELETE ON audit_log
BEGIN
    SELECT RAISE(ABORT, 'audit_log is append-only');
END;

CREATE TABLE IF NOT EXISTS class_sessions (
    session_id           TEXT PRIMARY KEY,
    slot_id              TEXT NOT NULL REFERENCES timetable_slots(slot_id),
    date                 TEXT NOT NULL,   -- YYYY-MM-DD, local
    state                TEXT NOT NULL,
    attendance_threshold REAL NOT NULL,
    opened_at            TEXT,
    activated_at         TEXT,
    closed_at            TEXT,
    cancelled_at         TEXT,
    cancel_reason        TEXT,
    created_at           TEXT NOT NULL,
    UNIQUE (slot_id, date)
);

CREATE TABLE IF NOT EXISTS attendance_records (
    record_id         TEXT PRIMARY KEY,
    student_id        TEXT NOT NULL REFERENCES students(student_id),
    slot_id           TEXT NOT NULL REFERENCES timetable_slots(slot_id),
    date              TEXT NOT NULL,
    status            TEXT NOT NULL,
    source            TEXT NOT NULL,
    recorded_at       TEXT NOT NULL,
    detection_count   INTEGER NOT NULL DEFAULT 0,
    first_detected_at TEXT,
    last_detected_at  TEXT,
    presence_secs     INTEGER,
    class_secs        INTEGER,
    UNIQUE (student_id, slot_id, date)
);

CREATE INDEX IF NOT EXISTS slots_scope_idx      ON timetable_slots(department_id, level_id, day_of_week);
CREATE INDEX IF NOT EXISTS selections_level_idx ON course_selections(course_id, level_id);
CREATE INDEX IF NOT EXISTS audit_student_idx    ON audit_log(student_id, recorded_at);
CREATE INDEX IF NOT EXISTS attendance_slot_idx  ON attendance_records(slot_id, date);

PRAGMA user_version = 1;
";
