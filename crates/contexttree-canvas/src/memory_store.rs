//! In-memory canvas store
//!
//! Keeps canvases in a process-local map. Used when no database is
//! configured and by tests that don't need SQLite.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::bug_report::{BugReport, BugReportStore};
use crate::document::{Canvas, CanvasEdge, CanvasNode, CanvasPatch, CanvasSummary, NewCanvas};
use crate::error::{Error, Result};
use crate::store::CanvasStore;

type CanvasKey = (String, String);

/// Process-local canvas store
#[derive(Default)]
pub struct MemoryCanvasStore {
    canvases: RwLock<HashMap<CanvasKey, Canvas>>,
    bug_reports: RwLock<Vec<BugReport>>,
}

impl MemoryCanvasStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored canvases across all owners
    pub async fn len(&self) -> usize {
        self.canvases.read().await.len()
    }

    /// Whether no canvases are stored
    pub async fn is_empty(&self) -> bool {
        self.canvases.read().await.is_empty()
    }

    async fn modify<T>(
        &self,
        id: &str,
        owner: &str,
        f: impl FnOnce(&mut Canvas) -> Result<T> + Send,
    ) -> Result<T> {
        let mut canvases = self.canvases.write().await;
        let canvas = canvases
            .get_mut(&key(owner, id))
            .ok_or_else(|| Error::CanvasNotFound(id.to_string()))?;

        // mutate a copy so a failed operation leaves the stored canvas intact
        let mut updated = canvas.clone();
        let output = f(&mut updated)?;
        *canvas = updated;
        Ok(output)
    }
}

fn key(owner: &str, id: &str) -> CanvasKey {
    (owner.to_string(), id.to_string())
}

#[async_trait]
impl CanvasStore for MemoryCanvasStore {
    async fn list_canvases(&self, owner: &str) -> Result<Vec<CanvasSummary>> {
        let canvases = self.canvases.read().await;
        let mut summaries: Vec<CanvasSummary> = canvases
            .values()
            .filter(|c| c.owner == owner)
            .map(Canvas::summary)
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    async fn create_canvas(&self, canvas: NewCanvas, owner: &str) -> Result<Canvas> {
        let canvas = Canvas::from_new(canvas, owner)?;
        let mut canvases = self.canvases.write().await;

        let key = key(owner, &canvas.id);
        if canvases.contains_key(&key) {
            return Err(Error::conflict(format!("canvas {} already exists", canvas.id)));
        }
        canvases.insert(key, canvas.clone());
        Ok(canvas)
    }

    async fn get_canvas(&self, id: &str, owner: &str) -> Result<Canvas> {
        self.canvases
            .read()
            .await
            .get(&key(owner, id))
            .cloned()
            .ok_or_else(|| Error::CanvasNotFound(id.to_string()))
    }

    async fn update_canvas(&self, id: &str, patch: CanvasPatch, owner: &str) -> Result<Canvas> {
        self.modify(id, owner, |c| {
            c.apply_patch(patch)?;
            Ok(c.clone())
        })
        .await
    }

    async fn delete_canvas(&self, id: &str, owner: &str) -> Result<()> {
        self.canvases
            .write()
            .await
            .remove(&key(owner, id))
            .map(|_| ())
            .ok_or_else(|| Error::CanvasNotFound(id.to_string()))
    }

    async fn add_node(
        &self,
        canvas_id: &str,
        node: CanvasNode,
        owner: &str,
    ) -> Result<CanvasNode> {
        self.modify(canvas_id, owner, |c| c.add_node(node)).await
    }

    async fn update_node(
        &self,
        canvas_id: &str,
        node: CanvasNode,
        owner: &str,
    ) -> Result<CanvasNode> {
        self.modify(canvas_id, owner, |c| c.update_node(node)).await
    }

    async fn remove_node(
        &self,
        canvas_id: &str,
        node_id: &str,
        owner: &str,
    ) -> Result<CanvasNode> {
        self.modify(canvas_id, owner, |c| c.remove_node(node_id)).await
    }

    async fn add_edge(
        &self,
        canvas_id: &str,
        edge: CanvasEdge,
        owner: &str,
    ) -> Result<CanvasEdge> {
        self.modify(canvas_id, owner, |c| c.add_edge(edge)).await
    }

    async fn update_edge(
        &self,
        canvas_id: &str,
        edge: CanvasEdge,
        owner: &str,
    ) -> Result<CanvasEdge> {
        self.modify(canvas_id, owner, |c| c.update_edge(edge)).await
    }

    async fn remove_edge(
        &self,
        canvas_id: &str,
        edge_id: &str,
        owner: &str,
    ) -> Result<CanvasEdge> {
        self.modify(canvas_id, owner, |c| c.remove_edge(edge_id)).await
    }
}

#[async_trait]
impl BugReportStore for MemoryCanvasStore {
    async fn create_bug_report(&self, report: BugReport) -> Result<BugReport> {
        self.bug_reports.write().await.push(report.clone());
        Ok(report)
    }

    async fn list_bug_reports(&self, reporter: &str) -> Result<Vec<BugReport>> {
        let reports = self.bug_reports.read().await;
        Ok(reports
            .iter()
            .rev()
            .filter(|r| r.reporter == reporter)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{NodeKind, Position};

    fn entry() -> CanvasNode {
        CanvasNode::new("entry", NodeKind::Entry, Position::default()).primary()
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let store = MemoryCanvasStore::new();
        assert!(store.is_empty().await);

        store.create_canvas(NewCanvas::empty("c1", "t"), "ada").await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get_canvas("c1", "ada").await.unwrap().title, "t");

        let err = store
            .create_canvas(NewCanvas::empty("c1", "t"), "ada")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CONFLICT");

        store.delete_canvas("c1", "ada").await.unwrap();
        assert!(store.get_canvas("c1", "ada").await.is_err());
    }

    #[tokio::test]
    async fn test_failed_operation_keeps_canvas() {
        let store = MemoryCanvasStore::new();
        store.create_canvas(NewCanvas::empty("c1", "t"), "ada").await.unwrap();
        store.add_node("c1", entry(), "ada").await.unwrap();

        let before = store.get_canvas("c1", "ada").await.unwrap();
        assert!(store.add_node("c1", entry(), "ada").await.is_err());
        let after = store.get_canvas("c1", "ada").await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_other_owner_sees_nothing() {
        let store = MemoryCanvasStore::new();
        store.create_canvas(NewCanvas::empty("c1", "t"), "ada").await.unwrap();

        assert!(store.list_canvases("bob").await.unwrap().is_empty());
        let err = store
            .update_canvas("c1", CanvasPatch::default(), "bob")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
