use rusqlite::{Connection, OptionalExtension, Row};
use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, now_rfc3339, optional_str, required_i64, required_str, require_role};
use crate::ipc::types::{AppState, Request};
use crate::model::Role;

fn user_json(row: &Row) -> rusqlite::Result<serde_json::Value> {
    let id: i64 = row.get(0)?;
    let username: String = row.get(1)?;
    let name: String = row.get(2)?;
    let email: String = row.get(3)?;
    let role: String = row.get(4)?;
    let avatar: Option<String> = row.get(5)?;
    let class: Option<String> = row.get(6)?;
    let subject: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;
    Ok(json!({
        "id": id,
        "username": username,
        "name": name,
        "email": email,
        "role": role,
        "avatar": avatar,
        "class": class,
        "subject": subject,
        "createdAt": created_at,
    }))
}

const USER_COLUMNS: &str =
    "id, username, name, email, role, avatar, class, subject, created_at";

fn handle_users_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let username = match required_str(req, "username") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    let password = match required_str(req, "password") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let email = match required_str(req, "email") {
        Ok(v) => v.trim().to_string(),
        Err(e) => return e,
    };
    if username.is_empty() || email.is_empty() {
        return err(&req.id, "bad_params", "username and email must not be empty", None);
    }

    // Role is fixed at creation; an unknown role never reaches the table.
    let role_str = optional_str(req, "role").unwrap_or_else(|| "student".to_string());
    let Some(role) = Role::parse(&role_str) else {
        return err(
            &req.id,
            "bad_params",
            format!("unknown role: {}", role_str),
            None,
        );
    };

    let taken: Option<i64> = match conn
        .query_row(
            "SELECT 1 FROM users WHERE username = ? OR email = ?",
            (&username, &email),
            |r| r.get(0),
        )
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if taken.is_some() {
        return err(&req.id, "conflict", "username or email already registered", None);
    }

    let avatar = optional_str(req, "avatar");
    let class = optional_str(req, "class");
    let subject = optional_str(req, "subject");
    if let Err(e) = conn.execute(
        "INSERT INTO users(username, password, name, email, role, avatar, class, subject, created_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?)",
        (
            &username,
            &password,
            &name,
            &email,
            role.as_str(),
            &avatar,
            &class,
            &subject,
            now_rfc3339(),
        ),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "users" })),
        );
    }

    let user_id = conn.last_insert_rowid();
    ok(
        &req.id,
        json!({ "userId": user_id, "username": username, "role": role.as_str() }),
    )
}

fn handle_users_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    if let Err(e) = require_role(req, &[Role::Teacher, Role::Principal, Role::Admin]) {
        return e;
    }
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };

    let role_filter = optional_str(req, "role");
    let class_filter = optional_str(req, "class");

    let mut sql = format!("SELECT {} FROM users WHERE 1=1", USER_COLUMNS);
    let mut params: Vec<String> = Vec::new();
    if let Some(r) = &role_filter {
        sql.push_str(" AND role = ?");
        params.push(r.clone());
    }
    if let Some(c) = &class_filter {
        sql.push_str(" AND class = ?");
        params.push(c.clone());
    }
    sql.push_str(" ORDER BY name");

    let users = query_users(conn, &sql, &params);
    match users {
        Ok(users) => ok(&req.id, json!({ "users": users })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn query_users(
    conn: &Connection,
    sql: &str,
    params: &[String],
) -> rusqlite::Result<Vec<serde_json::Value>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params.iter()), user_json)?;
    rows.collect()
}

fn handle_users_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let user_id = match required_i64(req, "userId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
    match conn.query_row(&sql, [user_id], user_json).optional() {
        Ok(Some(user)) => ok(&req.id, json!({ "user": user })),
        Ok(None) => err(&req.id, "not_found", "user not found", None),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "users.register" => Some(handle_users_register(state, req)),
        "users.list" => Some(handle_users_list(state, req)),
        "users.get" => Some(handle_users_get(state, req)),
        _ => None,
    }
}
