//! Database query implementations

use crate::error::{Error, Result, StorageError};
use crate::types::{CapabilityToken, Grant};
use rusqlite::{params, Connection, OptionalExtension};

// ===== Grant Queries =====

type GrantRow = (String, String, String, String);

fn read_grant_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<GrantRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn grant_from_row((id, display_name, token, created_at): GrantRow) -> Result<Grant> {
    let created_at = chrono::DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| {
            Error::Storage(StorageError::CorruptRecord {
                id: id.clone(),
                reason: format!("bad created_at: {}", e),
            })
        })?
        .with_timezone(&chrono::Utc);

    Ok(Grant {
        id,
        display_name,
        capability_token: CapabilityToken::new(token),
        created_at,
    })
}

/// Insert or replace a grant
pub fn upsert_grant(conn: &Connection, grant: &Grant) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO grants (id, display_name, capability_token, created_at)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            display_name = excluded.display_name,
            capability_token = excluded.capability_token
        "#,
        params![
            grant.id,
            grant.display_name,
            grant.capability_token.as_str(),
            grant.created_at.to_rfc3339(),
        ],
    )?;

    Ok(())
}

/// Get grant by ID
pub fn get_grant(conn: &Connection, grant_id: &str) -> Result<Option<Grant>> {
    let row = conn
        .query_row(
            "SELECT id, display_name, capability_token, created_at FROM grants WHERE id = ?",
            params![grant_id],
            read_grant_row,
        )
        .optional()?;

    row.map(grant_from_row).transpose()
}

/// List all grants, oldest first
pub fn list_grants(conn: &Connection) -> Result<Vec<Grant>> {
    let mut stmt = conn.prepare(
        r#"
        SELECT id, display_name, capability_token, created_at
        FROM grants
        ORDER BY created_at, id
        "#,
    )?;

    let rows = stmt
        .query_map([], read_grant_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter().map(grant_from_row).collect()
}

/// Delete a grant, returning how many rows went away
pub fn delete_grant(conn: &Connection, grant_id: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM grants WHERE id = ?", params![grant_id])?)
}

/// Delete every grant
pub fn clear_grants(conn: &Connection) -> Result<usize> {
    Ok(conn.execute("DELETE FROM grants", [])?)
}

// ===== Settings Queries =====

/// Get a setting value
pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>> {
    let result = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?",
            params![key],
            |row| row.get(0),
        )
        .optional()?;

    Ok(result)
}

/// Set a setting value
pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO settings (key, value, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP)
        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
        "#,
        params![key, value],
    )?;

    Ok(())
}

/// Remove a setting
pub fn delete_setting(conn: &Connection, key: &str) -> Result<()> {
    conn.execute("DELETE FROM settings WHERE key = ?", params![key])?;
    Ok(())
}
