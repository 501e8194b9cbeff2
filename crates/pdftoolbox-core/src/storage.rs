use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use uuid::Uuid;

use crate::normalize::{NormalizedDocument, NormalizedRecord};
use crate::{Error, Result};

const INIT_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    stem TEXT PRIMARY KEY,
    run_id TEXT NOT NULL,
    schema_version TEXT NOT NULL,
    element_count INTEGER NOT NULL,
    normalized_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS elements (
    document TEXT NOT NULL,
    position INTEGER NOT NULL,
    kind TEXT NOT NULL,
    path TEXT,
    text TEXT,
    page INTEGER,
    attributes TEXT NOT NULL,
    PRIMARY KEY (document, position)
);

CREATE INDEX IF NOT EXISTS idx_elements_kind ON elements(kind);
CREATE INDEX IF NOT EXISTS idx_elements_page ON elements(document, page);
"#;

/// A row of the `documents` table.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub stem: String,
    pub run_id: Uuid,
    pub schema_version: String,
    pub element_count: i64,
    pub normalized_at: DateTime<Utc>,
}

pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    pub async fn open_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::query(INIT_SQL).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Replace every stored row of `document.stem` with `document.records`.
    pub async fn replace_document(
        &self,
        document: &NormalizedDocument,
        run_id: Uuid,
        schema_version: &str,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM elements WHERE document = ?")
            .bind(&document.stem)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO documents (stem, run_id, schema_version, element_count, normalized_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(stem) DO UPDATE SET
                run_id = excluded.run_id,
                schema_version = excluded.schema_version,
                element_count = excluded.element_count,
                normalized_at = excluded.normalized_at
            "#,
        )
        .bind(&document.stem)
        .bind(run_id.to_string())
        .bind(schema_version)
        .bind(i64::try_from(document.element_count).unwrap_or(i64::MAX))
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?;

        for record in &document.records {
            let attributes = serde_json::to_string(&record.attributes)?;

            sqlx::query(
                r#"
                INSERT INTO elements (document, position, kind, path, text, page, attributes)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&record.document)
            .bind(i64::from(record.position))
            .bind(record.kind.as_str())
            .bind(&record.path)
            .bind(&record.text)
            .bind(record.page.map(i64::from))
            .bind(attributes)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn list_documents(&self) -> Result<Vec<StoredDocument>> {
        let rows: Vec<(String, String, String, i64, String)> = sqlx::query_as(
            r#"
            SELECT stem, run_id, schema_version, element_count, normalized_at
            FROM documents ORDER BY stem
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_document_row).collect()
    }

    pub async fn elements_for(&self, stem: &str) -> Result<Vec<NormalizedRecord>> {
        let rows: Vec<ElementRow> = sqlx::query_as(
            r#"
            SELECT document, position, kind, path, text, page, attributes
            FROM elements WHERE document = ? ORDER BY position
            "#,
        )
        .bind(stem)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_element_row).collect()
    }

    pub async fn count_elements(&self, stem: &str) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM elements WHERE document = ?")
            .bind(stem)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

type ElementRow = (String, i64, String, Option<String>, Option<String>, Option<i64>, String);

fn decode_error(e: impl std::error::Error + Send + Sync + 'static) -> Error {
    Error::Database(sqlx::Error::Decode(Box::new(e)))
}

fn parse_document_row(row: (String, String, String, i64, String)) -> Result<StoredDocument> {
    let (stem, run_id, schema_version, element_count, normalized_at) = row;

    Ok(StoredDocument {
        stem,
        run_id: run_id.parse().map_err(decode_error)?,
        schema_version,
        element_count,
        normalized_at: DateTime::parse_from_rfc3339(&normalized_at)
            .map_err(decode_error)?
            .with_timezone(&Utc),
    })
}

fn parse_element_row(row: ElementRow) -> Result<NormalizedRecord> {
    let (document, position, kind, path, text, page, attributes) = row;

    Ok(NormalizedRecord {
        document,
        position: u32::try_from(position).map_err(decode_error)?,
        kind: kind.parse()?,
        path,
        text,
        page: page.map(u32::try_from).transpose().map_err(decode_error)?,
        attributes: serde_json::from_str(&attributes)?,
    })
}
