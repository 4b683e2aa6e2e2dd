use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use super::FindingStore;
use crate::core::Finding;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS vulnerabilities (
    id           BIGSERIAL PRIMARY KEY,
    project_name TEXT NOT NULL,
    request_id   TEXT NOT NULL,
    vuln_type    TEXT NOT NULL,
    url          TEXT NOT NULL,
    method       TEXT NOT NULL,
    parameter    TEXT,
    payload      TEXT,
    evidence     TEXT NOT NULL,
    severity     TEXT NOT NULL,
    full_request TEXT NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT now()
)
"#;

/// Postgres sink for confirmed findings, one row per finding.
pub struct PostgresFindingStore {
    pool: PgPool,
}

impl PostgresFindingStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .context("failed to connect to Postgres")?;
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .context("failed to create vulnerabilities table")?;
        Ok(())
    }
}

#[async_trait]
impl FindingStore for PostgresFindingStore {
    async fn save_vulnerability(&self, project_name: &str, finding: &Finding) -> Result<()> {
        let full_request = serde_json::to_string(&finding.full_request)
            .context("failed to encode full request")?;
        sqlx::query(
            "INSERT INTO vulnerabilities \
             (project_name, request_id, vuln_type, url, method, parameter, payload, evidence, severity, full_request) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(project_name)
        .bind(&finding.request_id)
        .bind(&finding.vuln_type)
        .bind(&finding.url)
        .bind(&finding.method)
        .bind(&finding.parameter)
        .bind(&finding.payload)
        .bind(&finding.evidence)
        .bind(&finding.severity)
        .bind(full_request)
        .execute(&self.pool)
        .await
        .context("failed to insert finding")?;
        Ok(())
    }
}
