//! ContextTree Canvas
//!
//! This crate provides the canvas side of ContextTree:
//! - Document: canvases, conversation nodes, edges and viewport
//! - Store: owner-scoped persistence (SQLite documents or in-memory)
//! - AutoSave: debounced persistence of full canvas state
//! - BugReport: user-filed bug reports
//! - Error: error types for canvas operations
//!
//! ## Usage
//!
//! ```ignore
//! use contexttree_canvas::{AutoSaveCoordinator, CanvasStore, SqliteCanvasStore};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let store = SqliteCanvasStore::connect("sqlite://data/contexttree.db").await?;
//! store.init().await?;
//! let store: Arc<dyn CanvasStore> = Arc::new(store);
//!
//! let autosave = AutoSaveCoordinator::new(store.clone(), Duration::from_secs(10));
//! autosave.schedule("ada@example.com", "canvas-1", 7, nodes, edges).await;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod autosave;
pub mod bug_report;
pub mod document;
pub mod error;
pub mod memory_store;
pub mod store;

pub use autosave::{AutoSaveConfig, AutoSaveCoordinator, AutoSaveStatus, SaveOutcome, ScheduleOutcome};
pub use bug_report::{BugReport, BugReportStore, NewBugReport, ReportStatus, Severity};
pub use document::{
    Canvas, CanvasEdge, CanvasNode, CanvasPatch, CanvasSummary, NewCanvas, NodeKind, Position,
    Viewport,
};
pub use error::{Error, Result};
pub use memory_store::MemoryCanvasStore;
pub use store::{CanvasStore, SqliteCanvasStore};
