use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("assess.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password TEXT NOT NULL,
            name TEXT NOT NULL,
            email TEXT NOT NULL UNIQUE,
            role TEXT NOT NULL DEFAULT 'student',
            avatar TEXT,
            class TEXT,
            subject TEXT,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_users_role ON users(role)", [])?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS tests(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title TEXT NOT NULL,
            description TEXT,
            subject TEXT NOT NULL,
            class TEXT NOT NULL,
            teacher_id INTEGER NOT NULL,
            total_marks INTEGER NOT NULL DEFAULT 100,
            duration INTEGER NOT NULL DEFAULT 60,
            test_date TEXT,
            created_at TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'draft',
            FOREIGN KEY(teacher_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tests_teacher ON tests(teacher_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tests_class_status ON tests(class, status)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS questions(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            test_id INTEGER NOT NULL,
            type TEXT NOT NULL,
            text TEXT NOT NULL,
            options TEXT,
            correct_answer TEXT,
            marks INTEGER NOT NULL DEFAULT 1,
            ord INTEGER NOT NULL,
            ai_rubric TEXT,
            tolerance REAL,
            FOREIGN KEY(test_id) REFERENCES tests(id),
            UNIQUE(test_id, ord)
        )",
        [],
    )?;
    ensure_questions_tolerance(&conn)?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_questions_test ON questions(test_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_questions_test_ord ON questions(test_id, ord)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS test_attempts(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            test_id INTEGER NOT NULL,
            student_id INTEGER NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT,
            score REAL,
            status TEXT NOT NULL DEFAULT 'in_progress',
            FOREIGN KEY(test_id) REFERENCES tests(id),
            FOREIGN KEY(student_id) REFERENCES users(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attempts_test ON test_attempts(test_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attempts_student ON test_attempts(student_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS answers(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            attempt_id INTEGER NOT NULL,
            question_id INTEGER NOT NULL,
            text TEXT,
            selected_option INTEGER,
            image_url TEXT,
            ocr_text TEXT,
            score REAL,
            ai_confidence REAL,
            ai_feedback TEXT,
            is_correct INTEGER,
            FOREIGN KEY(attempt_id) REFERENCES test_attempts(id),
            FOREIGN KEY(question_id) REFERENCES questions(id),
            UNIQUE(attempt_id, question_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_answers_attempt ON answers(attempt_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_answers_question ON answers(question_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS analytics(
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            test_id INTEGER NOT NULL,
            weak_topics TEXT NOT NULL,
            strong_topics TEXT NOT NULL,
            recommended_resources TEXT NOT NULL,
            insight_date TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(test_id) REFERENCES tests(id),
            UNIQUE(user_id, test_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_analytics_test ON analytics(test_id)",
        [],
    )?;

    Ok(conn)
}

fn ensure_questions_tolerance(conn: &Connection) -> anyhow::Result<()> {
    // Early workspaces predate per-question numeric tolerance.
    if table_has_column(conn, "questions", "tolerance")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE questions ADD COLUMN tolerance REAL", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
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
