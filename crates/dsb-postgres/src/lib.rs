//! PostgreSQL implementation of the [`FileStore`] port.
//!
//! Two tables: `files` (append-only ingestion log) and `domains` (global
//! unique set). Uniqueness is enforced by the `UNIQUE` constraint, so
//! concurrent ingestions racing on the same domain resolve inside Postgres.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::FromRow;

use dsb_core::{
    domain::{DomainEntry, FileRecord, Provenance},
    errors::Error,
    store::{clamp_limit, FileStore, NewFileRecord, StoreStats},
    Result,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS files (
        id             BIGSERIAL PRIMARY KEY,
        name           TEXT NOT NULL,
        size           BIGINT NOT NULL CHECK (size >= 0),
        provenance     TEXT NOT NULL,
        provenance_ref TEXT NOT NULL,
        ingested_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS domains (
        id          BIGSERIAL PRIMARY KEY,
        domain      TEXT NOT NULL UNIQUE,
        source_file TEXT,
        indexed_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    // Serves prefix lookups only; substring search is a sequential scan.
    "CREATE INDEX IF NOT EXISTS idx_domains_domain_pattern ON domains (domain text_pattern_ops)",
];

pub struct PgFileStore {
    pool: PgPool,
}

impl PgFileStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(storage)?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage(e: sqlx::Error) -> Error {
    Error::Storage(e.to_string())
}

const INSERT_FILE: &str = r#"
    INSERT INTO files (name, size, provenance, provenance_ref)
    VALUES ($1, $2, $3, $4)
    RETURNING id, name, size, provenance, provenance_ref, ingested_at
"#;

const INSERT_DOMAIN: &str = r#"
    INSERT INTO domains (domain, source_file)
    VALUES ($1, $2)
    ON CONFLICT (domain) DO NOTHING
"#;

fn db_size(file: &NewFileRecord) -> Result<i64> {
    i64::try_from(file.size)
        .map_err(|_| Error::Validation(format!("file too large to record: {}", file.size)))
}

#[derive(FromRow)]
struct FileRow {
    id: i64,
    name: String,
    size: i64,
    provenance: String,
    provenance_ref: String,
    ingested_at: DateTime<Utc>,
}

impl TryFrom<FileRow> for FileRecord {
    type Error = Error;

    fn try_from(row: FileRow) -> Result<Self> {
        let provenance = Provenance::parse(&row.provenance).ok_or_else(|| {
            Error::Storage(format!(
                "file {} has unknown provenance {:?}",
                row.id, row.provenance
            ))
        })?;
        Ok(FileRecord {
            id: row.id,
            name: row.name,
            size: u64::try_from(row.size).unwrap_or(0),
            provenance,
            provenance_ref: row.provenance_ref,
            ingested_at: row.ingested_at,
        })
    }
}

#[derive(FromRow)]
struct DomainRow {
    domain: String,
    source_file: Option<String>,
    indexed_at: DateTime<Utc>,
}

impl From<DomainRow> for DomainEntry {
    fn from(row: DomainRow) -> Self {
        DomainEntry {
            domain: row.domain,
            source_file: row.source_file,
            indexed_at: row.indexed_at,
        }
    }
}

#[async_trait]
impl FileStore for PgFileStore {
    async fn init_schema(&self) -> Result<()> {
        for stmt in SCHEMA {
            sqlx::query(*stmt)
                .execute(&self.pool)
                .await
                .map_err(storage)?;
        }
        tracing::info!("database schema ready");
        Ok(())
    }

    async fn record_file(&self, file: NewFileRecord) -> Result<FileRecord> {
        let row: FileRow = sqlx::query_as(INSERT_FILE)
            .bind(&file.name)
            .bind(db_size(&file)?)
            .bind(file.provenance.as_str())
            .bind(&file.provenance_ref)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        row.try_into()
    }

    async fn insert_domain_if_absent(&self, domain: &str, source_file: &str) -> Result<bool> {
        let result = sqlx::query(INSERT_DOMAIN)
            .bind(domain.to_ascii_lowercase())
            .bind(source_file)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_ingestion(
        &self,
        file: NewFileRecord,
        domains: &BTreeSet<String>,
    ) -> Result<(FileRecord, usize)> {
        let size = db_size(&file)?;
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let row: FileRow = sqlx::query_as(INSERT_FILE)
            .bind(&file.name)
            .bind(size)
            .bind(file.provenance.as_str())
            .bind(&file.provenance_ref)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage)?;

        // Sorted insert order keeps concurrent ingestions from deadlocking on
        // each other's uncommitted rows.
        let mut new = 0usize;
        for domain in domains {
            let result = sqlx::query(INSERT_DOMAIN)
                .bind(domain.to_ascii_lowercase())
                .bind(&row.name)
                .execute(&mut *tx)
                .await
                .map_err(storage)?;
            if result.rows_affected() > 0 {
                new += 1;
            }
        }

        tx.commit().await.map_err(storage)?;
        Ok((row.try_into()?, new))
    }

    async fn list_all_files(&self) -> Result<Vec<FileRecord>> {
        let rows: Vec<FileRow> = sqlx::query_as(
            "SELECT id, name, size, provenance, provenance_ref, ingested_at FROM files ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.into_iter().map(FileRecord::try_from).collect()
    }

    async fn search_domains(&self, substring: &str, limit: usize) -> Result<Vec<DomainEntry>> {
        // strpos avoids LIKE wildcard escaping for user-supplied `%` and `_`.
        let rows: Vec<DomainRow> = sqlx::query_as(
            r#"
            SELECT domain, source_file, indexed_at
            FROM domains
            WHERE strpos(domain, $1) > 0
            LIMIT $2
            "#,
        )
        .bind(substring.to_lowercase())
        .bind(clamp_limit(limit) as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        Ok(rows.into_iter().map(DomainEntry::from).collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let (files, domains): (i64, i64) = sqlx::query_as(
            "SELECT (SELECT count(*) FROM files), (SELECT count(*) FROM domains)",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        Ok(StoreStats {
            files: files.max(0) as u64,
            domains: domains.max(0) as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Runs only when TEST_DATABASE_URL points at a disposable database.
    async fn test_store() -> Option<PgFileStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let store = PgFileStore::connect(&url, 2).await.ok()?;
        store.init_schema().await.ok()?;
        Some(store)
    }

    #[tokio::test]
    async fn round_trips_files_and_domains() {
        let Some(store) = test_store().await else {
            return;
        };

        let tag = format!("pgtest{}", Utc::now().timestamp_nanos_opt().unwrap_or(0));
        let rec = store
            .record_file(NewFileRecord {
                name: format!("{tag}.txt"),
                size: 42,
                provenance: Provenance::HostedLink,
                provenance_ref: "https://example.com/list.txt".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(rec.size, 42);
        assert_eq!(rec.provenance, Provenance::HostedLink);

        let domain = format!("{tag}.example.com");
        assert!(store.insert_domain_if_absent(&domain, &rec.name).await.unwrap());
        assert!(!store.insert_domain_if_absent(&domain.to_uppercase(), "other.txt").await.unwrap());

        let hits = store.search_domains(&tag.to_uppercase(), 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].domain, domain);
        assert_eq!(hits[0].source_file.as_deref(), Some(rec.name.as_str()));

        let files = store.list_all_files().await.unwrap();
        assert!(files.iter().any(|f| f.id == rec.id));
        assert!(files.windows(2).all(|w| w[0].id < w[1].id));

        let stats = store.stats().await.unwrap();
        assert!(stats.files >= 1 && stats.domains >= 1);
    }

    #[tokio::test]
    async fn wildcard_characters_match_literally() {
        let Some(store) = test_store().await else {
            return;
        };
        let hits = store.search_domains("%_%", 10).await.unwrap();
        assert!(hits.iter().all(|h| h.domain.contains("%_%")));
    }

    #[tokio::test]
    async fn ingestion_commits_file_and_domains_together() {
        let Some(store) = test_store().await else {
            return;
        };

        let tag = format!("pgingest{}", Utc::now().timestamp_nanos_opt().unwrap_or(0));
        let domains: BTreeSet<String> = [format!("{tag}.one.com"), format!("{tag}.two.org")]
            .into_iter()
            .collect();
        let (record, new) = store
            .record_ingestion(
                NewFileRecord {
                    name: format!("{tag}.txt"),
                    size: 7,
                    provenance: Provenance::DirectUpload,
                    provenance_ref: "file-id".to_string(),
                },
                &domains,
            )
            .await
            .unwrap();
        assert_eq!(new, 2);

        let hits = store.search_domains(&tag, 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits
            .iter()
            .all(|h| h.source_file.as_deref() == Some(record.name.as_str())));

        let (_, again) = store
            .record_ingestion(
                NewFileRecord {
                    name: format!("{tag}-again.txt"),
                    size: 7,
                    provenance: Provenance::DirectUpload,
                    provenance_ref: "file-id-2".to_string(),
                },
                &domains,
            )
            .await
            .unwrap();
        assert_eq!(again, 0);
    }
}
