//! Canvas Document Types
//!
//! A canvas is one user's graph of conversation nodes and the edges linking
//! them, together with the viewport and a free-text note. Identifiers of
//! canvases, nodes and edges are opaque strings chosen by the client.
//!
//! Every mutation in this module validates its input first, so both store
//! implementations share one write boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Error, Result};

/// Title given to canvases created without one
pub const DEFAULT_TITLE: &str = "Untitled Canvas";

const MAX_TITLE_CHARS: usize = 200;

/// A user's saved graph of conversation nodes and edges
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Canvas {
    /// Client-supplied identifier
    pub id: String,

    /// Owning user identity
    pub owner: String,

    /// Display title
    pub title: String,

    /// Ordered list of nodes
    #[serde(default)]
    pub nodes: Vec<CanvasNode>,

    /// Ordered list of edges
    #[serde(default)]
    pub edges: Vec<CanvasEdge>,

    /// Pan/zoom state
    #[serde(default)]
    pub viewport: Viewport,

    /// Free-text note
    #[serde(default)]
    pub note: String,

    /// Last editor revision persisted through auto-save
    #[serde(default)]
    pub revision: u64,

    /// When the canvas was created
    pub created_at: DateTime<Utc>,

    /// When the canvas was last modified
    pub updated_at: DateTime<Utc>,
}

impl Canvas {
    /// Create an empty canvas
    #[must_use]
    pub fn new(id: impl Into<String>, owner: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            owner: owner.into(),
            title: title.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            viewport: Viewport::default(),
            note: String::new(),
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Build a validated canvas from a creation request
    pub fn from_new(request: NewCanvas, owner: &str) -> Result<Self> {
        validate_id("canvas", &request.id)?;
        let title = match request.title {
            Some(title) => validate_title(&title)?,
            None => DEFAULT_TITLE.to_string(),
        };
        validate_nodes(&request.nodes)?;
        validate_edges(&request.edges)?;

        let mut canvas = Self::new(request.id, owner, title);
        canvas.nodes = request.nodes;
        canvas.edges = request.edges;
        canvas.viewport = request.viewport.unwrap_or_default();
        canvas.note = request.note.unwrap_or_default();
        Ok(canvas)
    }

    /// Listing view of this canvas
    #[must_use]
    pub fn summary(&self) -> CanvasSummary {
        CanvasSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Apply a partial update. Nothing changes if any part is invalid.
    pub fn apply_patch(&mut self, patch: CanvasPatch) -> Result<()> {
        let title = patch.title.as_deref().map(validate_title).transpose()?;
        if let Some(nodes) = &patch.nodes {
            validate_nodes(nodes)?;
        }
        if let Some(edges) = &patch.edges {
            validate_edges(edges)?;
        }

        if let Some(title) = title {
            self.title = title;
        }
        if let Some(nodes) = patch.nodes {
            self.nodes = nodes;
        }
        if let Some(edges) = patch.edges {
            self.edges = edges;
        }
        if let Some(viewport) = patch.viewport {
            self.viewport = viewport;
        }
        if let Some(note) = patch.note {
            self.note = note;
        }
        if let Some(revision) = patch.revision {
            self.revision = self.revision.max(revision);
        }
        self.touch();
        Ok(())
    }

    /// Get a node by ID
    #[must_use]
    pub fn node(&self, node_id: &str) -> Option<&CanvasNode> {
        self.nodes.iter().find(|n| n.id == node_id)
    }

    /// Get an edge by ID
    #[must_use]
    pub fn edge(&self, edge_id: &str) -> Option<&CanvasEdge> {
        self.edges.iter().find(|e| e.id == edge_id)
    }

    /// Append a node; its ID must be unused in this canvas
    pub fn add_node(&mut self, node: CanvasNode) -> Result<CanvasNode> {
        node.validate()?;
        if self.node(&node.id).is_some() {
            return Err(Error::conflict(format!(
                "node {} already exists in canvas {}",
                node.id, self.id
            )));
        }
        self.nodes.push(node.clone());
        self.touch();
        Ok(node)
    }

    /// Replace the node with the same ID
    pub fn update_node(&mut self, node: CanvasNode) -> Result<CanvasNode> {
        node.validate()?;
        let slot = self
            .nodes
            .iter_mut()
            .find(|n| n.id == node.id)
            .ok_or_else(|| Error::NodeNotFound {
                canvas_id: self.id.clone(),
                node_id: node.id.clone(),
            })?;
        *slot = node.clone();
        self.touch();
        Ok(node)
    }

    /// Remove a node together with every edge attached to it
    pub fn remove_node(&mut self, node_id: &str) -> Result<CanvasNode> {
        let pos = self
            .nodes
            .iter()
            .position(|n| n.id == node_id)
            .ok_or_else(|| Error::NodeNotFound {
                canvas_id: self.id.clone(),
                node_id: node_id.to_string(),
            })?;
        let removed = self.nodes.remove(pos);
        self.edges.retain(|e| !e.touches(node_id));
        self.touch();
        Ok(removed)
    }

    /// Append an edge; its ID must be unused in this canvas
    pub fn add_edge(&mut self, edge: CanvasEdge) -> Result<CanvasEdge> {
        edge.validate()?;
        if self.edge(&edge.id).is_some() {
            return Err(Error::conflict(format!(
                "edge {} already exists in canvas {}",
                edge.id, self.id
            )));
        }
        self.edges.push(edge.clone());
        self.touch();
        Ok(edge)
    }

    /// Replace the edge with the same ID
    pub fn update_edge(&mut self, edge: CanvasEdge) -> Result<CanvasEdge> {
        edge.validate()?;
        let slot = self
            .edges
            .iter_mut()
            .find(|e| e.id == edge.id)
            .ok_or_else(|| Error::EdgeNotFound {
                canvas_id: self.id.clone(),
                edge_id: edge.id.clone(),
            })?;
        *slot = edge.clone();
        self.touch();
        Ok(edge)
    }

    /// Remove an edge
    pub fn remove_edge(&mut self, edge_id: &str) -> Result<CanvasEdge> {
        let pos = self
            .edges
            .iter()
            .position(|e| e.id == edge_id)
            .ok_or_else(|| Error::EdgeNotFound {
                canvas_id: self.id.clone(),
                edge_id: edge_id.to_string(),
            })?;
        let removed = self.edges.remove(pos);
        self.touch();
        Ok(removed)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Conversation node types
///
/// Tags this server does not know are kept verbatim in [`NodeKind::Other`]
/// so newer clients can store their own node types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    /// Conversation entry point
    Entry,
    /// Fork of a conversation at a given message
    Branch,
    /// Single chat message
    Message,
    /// Saved point in a conversation
    Checkpoint,
    /// Visual container for other nodes
    Group,
    /// Free-standing note
    Note,
    /// Shared context attached to a conversation
    Context,
    /// Any other client-defined tag
    Other(String),
}

impl NodeKind {
    /// Wire name of the type tag
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Entry => "entry",
            Self::Branch => "branch",
            Self::Message => "message",
            Self::Checkpoint => "checkpoint",
            Self::Group => "group",
            Self::Note => "note",
            Self::Context => "context",
            Self::Other(tag) => tag,
        }
    }
}

impl From<String> for NodeKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "entry" => Self::Entry,
            "branch" => Self::Branch,
            "message" => Self::Message,
            "checkpoint" => Self::Checkpoint,
            "group" => Self::Group,
            "note" => Self::Note,
            "context" => Self::Context,
            _ => Self::Other(tag),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        match kind {
            NodeKind::Other(tag) => tag,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canvas coordinates
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Horizontal coordinate
    pub x: f64,
    /// Vertical coordinate
    pub y: f64,
}

/// Pan and zoom state of the canvas view
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    /// Horizontal pan
    #[serde(default)]
    pub x: f64,
    /// Vertical pan
    #[serde(default)]
    pub y: f64,
    /// Zoom factor
    #[serde(default = "default_zoom")]
    pub zoom: f64,
}

fn default_zoom() -> f64 {
    1.0
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: default_zoom(),
        }
    }
}

/// A vertex on the canvas representing a conversation turn or grouping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasNode {
    /// Identifier, unique within the canvas
    pub id: String,

    /// Type tag
    #[serde(rename = "type")]
    pub kind: NodeKind,

    /// Position on the canvas
    #[serde(default)]
    pub position: Position,

    /// Type-specific payload
    #[serde(default)]
    pub data: serde_json::Value,

    /// Primary (root) conversation node
    #[serde(default)]
    pub primary: bool,

    /// Node this one was branched from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_node_id: Option<String>,

    /// Message this node was forked from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forked_from_message_id: Option<String>,

    /// Group node containing this node
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_group_id: Option<String>,
}

impl CanvasNode {
    /// Create a node without lineage
    #[must_use]
    pub fn new(id: impl Into<String>, kind: NodeKind, position: Position) -> Self {
        Self {
            id: id.into(),
            kind,
            position,
            data: serde_json::Value::Null,
            primary: false,
            parent_node_id: None,
            forked_from_message_id: None,
            parent_group_id: None,
        }
    }

    /// Mark as the primary node
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Set lineage fields
    #[must_use]
    pub fn forked_from(
        mut self,
        parent_node_id: impl Into<String>,
        message_id: impl Into<String>,
    ) -> Self {
        self.parent_node_id = Some(parent_node_id.into());
        self.forked_from_message_id = Some(message_id.into());
        self
    }

    /// Set the payload
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Non-primary, non-group nodes must record where they were forked from
    #[must_use]
    pub fn requires_lineage(&self) -> bool {
        !self.primary && self.kind != NodeKind::Group
    }

    /// Check the write-boundary invariants of a single node
    pub fn validate(&self) -> Result<()> {
        validate_id("node", &self.id)?;

        if self.requires_lineage() {
            let has_parent = self.parent_node_id.as_deref().is_some_and(|s| !s.trim().is_empty());
            let has_message = self
                .forked_from_message_id
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty());

            if !has_parent || !has_message {
                return Err(Error::validation(format!(
                    "{} node {} must carry parentNodeId and forkedFromMessageId unless it is primary",
                    self.kind, self.id
                )));
            }
        }
        Ok(())
    }
}

/// A connection between two nodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasEdge {
    /// Identifier, unique within the canvas
    pub id: String,

    /// Source node ID
    pub source: String,

    /// Target node ID
    pub target: String,

    /// Type tag understood by the graph renderer
    #[serde(rename = "type", default = "default_edge_type")]
    pub kind: String,

    /// Renderer style
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub style: serde_json::Value,

    /// Edge payload
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

fn default_edge_type() -> String {
    "default".to_string()
}

impl CanvasEdge {
    /// Create a default-typed edge
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            kind: default_edge_type(),
            style: serde_json::Value::Null,
            data: serde_json::Value::Null,
        }
    }

    /// Whether this edge starts or ends at `node_id`
    #[must_use]
    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }

    /// Check the write-boundary invariants of a single edge
    pub fn validate(&self) -> Result<()> {
        validate_id("edge", &self.id)?;
        if self.source.trim().is_empty() || self.target.trim().is_empty() {
            return Err(Error::validation(format!(
                "edge {} must name both source and target",
                self.id
            )));
        }
        Ok(())
    }
}

/// Request to create a canvas
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCanvas {
    /// Client-supplied identifier
    pub id: String,
    /// Display title
    #[serde(default)]
    pub title: Option<String>,
    /// Initial nodes
    #[serde(default)]
    pub nodes: Vec<CanvasNode>,
    /// Initial edges
    #[serde(default)]
    pub edges: Vec<CanvasEdge>,
    /// Initial viewport
    #[serde(default)]
    pub viewport: Option<Viewport>,
    /// Initial note
    #[serde(default)]
    pub note: Option<String>,
}

impl NewCanvas {
    /// Creation request for an empty canvas
    #[must_use]
    pub fn empty(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: Some(title.into()),
            nodes: Vec::new(),
            edges: Vec::new(),
            viewport: None,
            note: None,
        }
    }
}

/// Partial canvas update; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasPatch {
    /// New title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Full replacement node list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<CanvasNode>>,
    /// Full replacement edge list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges: Option<Vec<CanvasEdge>>,
    /// New viewport
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport: Option<Viewport>,
    /// New note
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Editor revision the contents correspond to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<u64>,
}

impl CanvasPatch {
    /// Patch replacing the full node and edge lists, as written by auto-save
    #[must_use]
    pub fn contents(revision: u64, nodes: Vec<CanvasNode>, edges: Vec<CanvasEdge>) -> Self {
        Self {
            nodes: Some(nodes),
            edges: Some(edges),
            revision: Some(revision),
            ..Self::default()
        }
    }

    /// Whether the patch changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Listing view of a canvas
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasSummary {
    /// Canvas ID
    pub id: String,
    /// Display title
    pub title: String,
    /// Number of nodes
    pub node_count: usize,
    /// Number of edges
    pub edge_count: usize,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

fn validate_id(what: &str, id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(Error::validation(format!("{} id must not be empty", what)));
    }
    Ok(())
}

fn validate_title(title: &str) -> Result<String> {
    let title = title.trim();
    if title.is_empty() {
        return Err(Error::validation("title must not be empty"));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(Error::validation(format!(
            "title must be at most {} characters",
            MAX_TITLE_CHARS
        )));
    }
    Ok(title.to_string())
}

/// Validate a full node list: every node valid, IDs unique
pub fn validate_nodes(nodes: &[CanvasNode]) -> Result<()> {
    let mut seen = HashSet::with_capacity(nodes.len());
    for node in nodes {
        node.validate()?;
        if !seen.insert(node.id.as_str()) {
            return Err(Error::validation(format!("duplicate node id {}", node.id)));
        }
    }
    Ok(())
}

/// Validate a full edge list: every edge valid, IDs unique
pub fn validate_edges(edges: &[CanvasEdge]) -> Result<()> {
    let mut seen = HashSet::with_capacity(edges.len());
    for edge in edges {
        edge.validate()?;
        if !seen.insert(edge.id.as_str()) {
            return Err(Error::validation(format!("duplicate edge id {}", edge.id)));
        }
    }
    Ok(())
}
