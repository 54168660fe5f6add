use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::types::{EmergencyContact, Prescription, Scan, ScanStatus, UserProfile};

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    // Pragmas for better durability/performance
    if let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(pool).await {
        tracing::warn!("Failed to set WAL journal mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA synchronous=NORMAL;").execute(pool).await {
        tracing::warn!("Failed to set synchronous mode: {}", e);
    }
    // Foreign keys are critical - fail if this doesn't work
    sqlx::query("PRAGMA foreign_keys=ON;").execute(pool).await?;

    // Additional tuning (best-effort)
    if let Err(e) = sqlx::query("PRAGMA busy_timeout=10000;").execute(pool).await {
        tracing::warn!("Failed to set busy_timeout: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA cache_size=-65536;").execute(pool).await {
        tracing::warn!("Failed to set cache_size: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA temp_store=MEMORY;").execute(pool).await {
        tracing::warn!("Failed to set temp_store: {}", e);
    }

    // users table (credentials + confirmation state)
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            email_confirmed_at TEXT NULL,
            confirmation_token TEXT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
        )"#,
    )
    .execute(pool)
    .await?;

    // user_profiles table (1:1 with users, list fields stored as JSON text)
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS user_profiles (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            first_name TEXT NULL,
            last_name TEXT NULL,
            full_name TEXT NULL,
            avatar_url TEXT NULL,
            phone TEXT NULL,
            date_of_birth TEXT NULL,
            gender TEXT NULL,
            medical_history TEXT NULL,
            allergies TEXT NULL,
            current_medications TEXT NULL,
            emergency_contact TEXT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            FOREIGN KEY(id) REFERENCES users(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    // scans table (upload metadata + analysis outcome)
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS scans (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            scan_type TEXT NOT NULL,
            file_name TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            upload_date TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            status TEXT NOT NULL,
            diagnosis TEXT NULL,
            confidence REAL NULL,
            severity TEXT NULL,
            findings TEXT NULL,
            recommendations TEXT NULL,
            prescription TEXT NULL,
            image_url TEXT NULL,
            thumbnail_url TEXT NULL,
            metadata TEXT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    // Columns added after the initial schema (migrations)
    for (table, column, decl) in [
        ("user_profiles", "avatar_url", "TEXT NULL"),
        ("scans", "thumbnail_url", "TEXT NULL"),
        ("scans", "metadata", "TEXT NULL"),
    ] {
        let query = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl);
        if let Err(e) = sqlx::query(&query).execute(pool).await {
            // Check if it's a benign "column already exists" error
            match &e {
                sqlx::Error::Database(db_err) => {
                    let msg = db_err.message().to_lowercase();
                    if !msg.contains("duplicate") && !msg.contains("already exists") {
                        tracing::error!("Failed to add {} column to {}: {}", column, table, e);
                        return Err(anyhow::anyhow!("Migration failed: {}", e));
                    }
                }
                _ => {
                    tracing::error!("Unexpected error adding {} to {}: {}", column, table, e);
                    return Err(anyhow::anyhow!("Migration failed: {}", e));
                }
            }
        }
    }

    let indexes = [
        (
            "idx_users_confirmation",
            "CREATE INDEX IF NOT EXISTS idx_users_confirmation ON users(confirmation_token)",
        ),
        (
            "idx_scans_user_upload",
            "CREATE INDEX IF NOT EXISTS idx_scans_user_upload ON scans(user_id, upload_date DESC)",
        ),
        (
            "idx_scans_user_status",
            "CREATE INDEX IF NOT EXISTS idx_scans_user_status ON scans(user_id, status)",
        ),
        ("idx_scans_status", "CREATE INDEX IF NOT EXISTS idx_scans_status ON scans(status)"),
    ];

    for (name, query) in indexes {
        if let Err(e) = sqlx::query(query).execute(pool).await {
            match &e {
                sqlx::Error::Database(db_err) => {
                    let msg = db_err.message().to_lowercase();
                    if msg.contains("already exists") || msg.contains("duplicate") {
                        tracing::debug!("Index {} already exists, skipping", name);
                    } else {
                        tracing::warn!("Failed to create index {}: {}", name, e);
                    }
                }
                _ => {
                    tracing::warn!("Failed to create index {}: {}", name, e);
                }
            }
        }
    }

    Ok(())
}

/// Current UTC timestamp in RFC 3339 with millisecond resolution.
///
/// Millisecond resolution keeps list ordering stable when several scans land
/// within the same second.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn parse_uuid(value: &str, column: &str) -> AppResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid {} in database: {}", column, e)))
}

fn decode_json<T: serde::de::DeserializeOwned>(raw: Option<String>, column: &str) -> AppResult<Option<T>> {
    match raw {
        Some(s) if !s.is_empty() => serde_json::from_str(&s)
            .map(Some)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid JSON in column {}: {}", column, e))),
        _ => Ok(None),
    }
}

/// Maps a `scans` row onto the DTO, decoding the JSON text columns.
pub fn scan_from_row(r: &SqliteRow) -> AppResult<Scan> {
    let id_str: String = r.get("id");
    let user_id_str: String = r.get("user_id");
    let status_str: String = r.get("status");
    let status = status_str
        .parse::<ScanStatus>()
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid status in database: {}", e)))?;

    Ok(Scan {
        id: parse_uuid(&id_str, "scan id")?,
        user_id: parse_uuid(&user_id_str, "user id")?,
        name: r.get("name"),
        scan_type: r.get("scan_type"),
        file_name: r.get("file_name"),
        file_size: r.get("file_size"),
        upload_date: r.get("upload_date"),
        status,
        diagnosis: r.get("diagnosis"),
        confidence: r.get("confidence"),
        severity: r.get("severity"),
        findings: decode_json::<Vec<String>>(r.get("findings"), "findings")?,
        recommendations: decode_json::<Vec<String>>(r.get("recommendations"), "recommendations")?,
        prescription: decode_json::<Prescription>(r.get("prescription"), "prescription")?,
        image_url: r.get("image_url"),
        thumbnail_url: r.get("thumbnail_url"),
        metadata: decode_json::<serde_json::Value>(r.get("metadata"), "metadata")?,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

pub fn profile_from_row(r: &SqliteRow) -> AppResult<UserProfile> {
    let id_str: String = r.get("id");
    Ok(UserProfile {
        id: parse_uuid(&id_str, "profile id")?,
        email: r.get("email"),
        first_name: r.get("first_name"),
        last_name: r.get("last_name"),
        full_name: r.get("full_name"),
        avatar_url: r.get("avatar_url"),
        phone: r.get("phone"),
        date_of_birth: r.get("date_of_birth"),
        gender: r.get("gender"),
        medical_history: decode_json::<Vec<String>>(r.get("medical_history"), "medical_history")?,
        allergies: decode_json::<Vec<String>>(r.get("allergies"), "allergies")?,
        current_medications: decode_json::<Vec<String>>(r.get("current_medications"), "current_medications")?,
        emergency_contact: decode_json::<EmergencyContact>(r.get("emergency_contact"), "emergency_contact")?,
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    })
}

/// All scans of one user, newest upload first.
pub async fn list_scans(pool: &SqlitePool, user_id: Uuid) -> AppResult<Vec<Scan>> {
    let rows = sqlx::query("SELECT * FROM scans WHERE user_id = ?1 ORDER BY upload_date DESC")
        .bind(user_id.to_string())
        .fetch_all(pool)
        .await?;
    rows.iter().map(scan_from_row).collect()
}

/// One scan, scoped to its owner. Returns `None` for other users' scans.
pub async fn fetch_scan(pool: &SqlitePool, id: Uuid, user_id: Uuid) -> AppResult<Option<Scan>> {
    let row = sqlx::query("SELECT * FROM scans WHERE id = ?1 AND user_id = ?2")
        .bind(id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(scan_from_row).transpose()
}

pub async fn fetch_profile(pool: &SqlitePool, user_id: Uuid) -> AppResult<Option<UserProfile>> {
    let row = sqlx::query("SELECT * FROM user_profiles WHERE id = ?1")
        .bind(user_id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(profile_from_row).transpose()
}
