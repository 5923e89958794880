//! Canvas Store
//!
//! Owner-scoped persistence for canvases. Each canvas is one document: the
//! node list, edge list and viewport are stored as JSON columns of a single
//! row keyed by `(owner, id)`. A canvas owned by someone else is reported as
//! not found.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqliteConnection};
use std::str::FromStr;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::bug_report::{BugReport, BugReportStore, ReportStatus, Severity};
use crate::document::{Canvas, CanvasEdge, CanvasNode, CanvasPatch, CanvasSummary, NewCanvas};
use crate::error::{Error, Result};

/// Owner-scoped canvas persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CanvasStore: Send + Sync {
    /// Summaries of the owner's canvases, most recently updated first
    async fn list_canvases(&self, owner: &str) -> Result<Vec<CanvasSummary>>;

    /// Create a canvas with a client-supplied ID
    async fn create_canvas(&self, canvas: NewCanvas, owner: &str) -> Result<Canvas>;

    /// Load a canvas
    async fn get_canvas(&self, id: &str, owner: &str) -> Result<Canvas>;

    /// Apply a partial update and return the updated canvas
    async fn update_canvas(&self, id: &str, patch: CanvasPatch, owner: &str) -> Result<Canvas>;

    /// Delete a canvas
    async fn delete_canvas(&self, id: &str, owner: &str) -> Result<()>;

    /// Add a node to a canvas
    async fn add_node(&self, canvas_id: &str, node: CanvasNode, owner: &str)
        -> Result<CanvasNode>;

    /// Replace a node
    async fn update_node(
        &self,
        canvas_id: &str,
        node: CanvasNode,
        owner: &str,
    ) -> Result<CanvasNode>;

    /// Remove a node and its attached edges
    async fn remove_node(&self, canvas_id: &str, node_id: &str, owner: &str)
        -> Result<CanvasNode>;

    /// Add an edge to a canvas
    async fn add_edge(&self, canvas_id: &str, edge: CanvasEdge, owner: &str)
        -> Result<CanvasEdge>;

    /// Replace an edge
    async fn update_edge(
        &self,
        canvas_id: &str,
        edge: CanvasEdge,
        owner: &str,
    ) -> Result<CanvasEdge>;

    /// Remove an edge
    async fn remove_edge(&self, canvas_id: &str, edge_id: &str, owner: &str)
        -> Result<CanvasEdge>;
}

/// SQLite-based canvas store
pub struct SqliteCanvasStore {
    pool: SqlitePool,
    // load-mutate-save cycles must not interleave
    write_lock: Mutex<()>,
}

impl SqliteCanvasStore {
    /// Create a new store with the given database pool
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Mutex::new(()),
        }
    }

    /// Open (creating if missing) the database at `url`
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let pool = if url.contains(":memory:") {
            // every connection would see its own empty database
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        info!(url = %url, "Connected to canvas database");
        Ok(Self::new(pool))
    }

    /// Initialize the database schema
    pub async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS canvases (
                owner TEXT NOT NULL,
                id TEXT NOT NULL,
                title TEXT NOT NULL,
                nodes_json TEXT NOT NULL DEFAULT '[]',
                edges_json TEXT NOT NULL DEFAULT '[]',
                viewport_json TEXT NOT NULL,
                note TEXT NOT NULL DEFAULT '',
                revision INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (owner, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_canvases_owner_updated ON canvases(owner, updated_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bug_reports (
                id TEXT PRIMARY KEY,
                reporter TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT NOT NULL,
                severity TEXT NOT NULL,
                canvas_id TEXT,
                context_json TEXT NOT NULL DEFAULT 'null',
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_bug_reports_reporter ON bug_reports(reporter, created_at)",
        )
        .execute(&self.pool)
        .await?;

        debug!("Canvas schema initialized");
        Ok(())
    }

    /// Check that the database answers queries
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn modify<T, F>(&self, id: &str, owner: &str, f: F) -> Result<(Canvas, T)>
    where
        F: FnOnce(&mut Canvas) -> Result<T> + Send,
        T: Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let mut canvas = load(&mut tx, id, owner).await?;
        let output = f(&mut canvas)?;
        save(&mut tx, &canvas).await?;

        tx.commit().await?;
        Ok((canvas, output))
    }
}

async fn load(conn: &mut SqliteConnection, id: &str, owner: &str) -> Result<Canvas> {
    let row = sqlx::query(
        r#"
        SELECT owner, id, title, nodes_json, edges_json, viewport_json, note, revision,
               created_at, updated_at
        FROM canvases
        WHERE owner = ? AND id = ?
        "#,
    )
    .bind(owner)
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match row {
        Some(row) => row_to_canvas(&row),
        None => Err(Error::CanvasNotFound(id.to_string())),
    }
}

async fn save(conn: &mut SqliteConnection, canvas: &Canvas) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE canvases
        SET title = ?, nodes_json = ?, edges_json = ?, viewport_json = ?, note = ?,
            revision = ?, updated_at = ?
        WHERE owner = ? AND id = ?
        "#,
    )
    .bind(&canvas.title)
    .bind(serde_json::to_string(&canvas.nodes)?)
    .bind(serde_json::to_string(&canvas.edges)?)
    .bind(serde_json::to_string(&canvas.viewport)?)
    .bind(&canvas.note)
    .bind(revision_to_db(canvas.revision))
    .bind(timestamp(&canvas.updated_at))
    .bind(&canvas.owner)
    .bind(&canvas.id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

fn row_to_canvas(row: &SqliteRow) -> Result<Canvas> {
    let nodes_json: String = row.try_get("nodes_json")?;
    let edges_json: String = row.try_get("edges_json")?;
    let viewport_json: String = row.try_get("viewport_json")?;
    let revision: i64 = row.try_get("revision")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(Canvas {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        title: row.try_get("title")?,
        nodes: serde_json::from_str(&nodes_json)?,
        edges: serde_json::from_str(&edges_json)?,
        viewport: serde_json::from_str(&viewport_json)?,
        note: row.try_get("note")?,
        revision: u64::try_from(revision).unwrap_or_default(),
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn row_to_bug_report(row: &SqliteRow) -> Result<BugReport> {
    let id: String = row.try_get("id")?;
    let severity: String = row.try_get("severity")?;
    let status: String = row.try_get("status")?;
    let context_json: String = row.try_get("context_json")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(BugReport {
        id: Uuid::parse_str(&id).map_err(|e| Error::Serialization(e.to_string()))?,
        reporter: row.try_get("reporter")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        severity: Severity::parse(&severity)
            .ok_or_else(|| Error::Serialization(format!("unknown severity {}", severity)))?,
        canvas_id: row.try_get("canvas_id")?,
        context: serde_json::from_str(&context_json)?,
        status: ReportStatus::parse(&status)
            .ok_or_else(|| Error::Serialization(format!("unknown status {}", status)))?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn timestamp(at: &DateTime<Utc>) -> String {
    // fixed width keeps lexical order equal to time order
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Serialization(format!("invalid timestamp {}: {}", value, e)))
}

fn revision_to_db(revision: u64) -> i64 {
    i64::try_from(revision).unwrap_or(i64::MAX)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

#[async_trait]
impl CanvasStore for SqliteCanvasStore {
    async fn list_canvases(&self, owner: &str) -> Result<Vec<CanvasSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title,
                   json_array_length(nodes_json) AS node_count,
                   json_array_length(edges_json) AS edge_count,
                   created_at, updated_at
            FROM canvases
            WHERE owner = ?
            ORDER BY updated_at DESC
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let node_count: i64 = row.try_get("node_count")?;
                let edge_count: i64 = row.try_get("edge_count")?;
                let created_at: String = row.try_get("created_at")?;
                let updated_at: String = row.try_get("updated_at")?;

                Ok(CanvasSummary {
                    id: row.try_get("id")?,
                    title: row.try_get("title")?,
                    node_count: usize::try_from(node_count).unwrap_or_default(),
                    edge_count: usize::try_from(edge_count).unwrap_or_default(),
                    created_at: parse_timestamp(&created_at)?,
                    updated_at: parse_timestamp(&updated_at)?,
                })
            })
            .collect()
    }

    async fn create_canvas(&self, canvas: NewCanvas, owner: &str) -> Result<Canvas> {
        let canvas = Canvas::from_new(canvas, owner)?;

        let result = sqlx::query(
            r#"
            INSERT INTO canvases
            (owner, id, title, nodes_json, edges_json, viewport_json, note, revision,
             created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&canvas.owner)
        .bind(&canvas.id)
        .bind(&canvas.title)
        .bind(serde_json::to_string(&canvas.nodes)?)
        .bind(serde_json::to_string(&canvas.edges)?)
        .bind(serde_json::to_string(&canvas.viewport)?)
        .bind(&canvas.note)
        .bind(revision_to_db(canvas.revision))
        .bind(timestamp(&canvas.created_at))
        .bind(timestamp(&canvas.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => {
                debug!(canvas_id = %canvas.id, owner = %owner, "Created canvas");
                Ok(canvas)
            }
            Err(e) if is_unique_violation(&e) => Err(Error::conflict(format!(
                "canvas {} already exists",
                canvas.id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_canvas(&self, id: &str, owner: &str) -> Result<Canvas> {
        let mut conn = self.pool.acquire().await?;
        load(&mut conn, id, owner).await
    }

    async fn update_canvas(&self, id: &str, patch: CanvasPatch, owner: &str) -> Result<Canvas> {
        let (canvas, ()) = self.modify(id, owner, |c| c.apply_patch(patch)).await?;
        Ok(canvas)
    }

    async fn delete_canvas(&self, id: &str, owner: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM canvases WHERE owner = ? AND id = ?")
            .bind(owner)
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(Error::CanvasNotFound(id.to_string()));
        }
        debug!(canvas_id = %id, owner = %owner, "Deleted canvas");
        Ok(())
    }

    async fn add_node(
        &self,
        canvas_id: &str,
        node: CanvasNode,
        owner: &str,
    ) -> Result<CanvasNode> {
        let (_, node) = self.modify(canvas_id, owner, |c| c.add_node(node)).await?;
        Ok(node)
    }

    async fn update_node(
        &self,
        canvas_id: &str,
        node: CanvasNode,
        owner: &str,
    ) -> Result<CanvasNode> {
        let (_, node) = self.modify(canvas_id, owner, |c| c.update_node(node)).await?;
        Ok(node)
    }

    async fn remove_node(
        &self,
        canvas_id: &str,
        node_id: &str,
        owner: &str,
    ) -> Result<CanvasNode> {
        let (_, node) = self
            .modify(canvas_id, owner, |c| c.remove_node(node_id))
            .await?;
        Ok(node)
    }

    async fn add_edge(
        &self,
        canvas_id: &str,
        edge: CanvasEdge,
        owner: &str,
    ) -> Result<CanvasEdge> {
        let (_, edge) = self.modify(canvas_id, owner, |c| c.add_edge(edge)).await?;
        Ok(edge)
    }

    async fn update_edge(
        &self,
        canvas_id: &str,
        edge: CanvasEdge,
        owner: &str,
    ) -> Result<CanvasEdge> {
        let (_, edge) = self.modify(canvas_id, owner, |c| c.update_edge(edge)).await?;
        Ok(edge)
    }

    async fn remove_edge(
        &self,
        canvas_id: &str,
        edge_id: &str,
        owner: &str,
    ) -> Result<CanvasEdge> {
        let (_, edge) = self
            .modify(canvas_id, owner, |c| c.remove_edge(edge_id))
            .await?;
        Ok(edge)
    }
}

#[async_trait]
impl BugReportStore for SqliteCanvasStore {
    async fn create_bug_report(&self, report: BugReport) -> Result<BugReport> {
        sqlx::query(
            r#"
            INSERT INTO bug_reports
            (id, reporter, title, description, severity, canvas_id, context_json, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(report.id.to_string())
        .bind(&report.reporter)
        .bind(&report.title)
        .bind(&report.description)
        .bind(report.severity.as_str())
        .bind(&report.canvas_id)
        .bind(serde_json::to_string(&report.context)?)
        .bind(report.status.as_str())
        .bind(timestamp(&report.created_at))
        .execute(&self.pool)
        .await?;

        Ok(report)
    }

    async fn list_bug_reports(&self, reporter: &str) -> Result<Vec<BugReport>> {
        let rows = sqlx::query(
            r#"
            SELECT id, reporter, title, description, severity, canvas_id, context_json,
                   status, created_at
            FROM bug_reports
            WHERE reporter = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(reporter)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_bug_report).collect()
    }
}
