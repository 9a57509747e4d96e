// Manifest node tree: wire types and the arena the pipeline walks.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

use crate::error::{SyncError, SyncResult};

/// Index of a node inside a `ManifestDocument` arena.
pub type NodeIdx = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    Document,
    Canvas,
    Frame,
    Group,
    Section,
    Vector,
    BooleanOperation,
    Star,
    Line,
    Ellipse,
    RegularPolygon,
    Rectangle,
    Text,
    Slice,
    Component,
    ComponentSet,
    Instance,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaintType {
    Solid,
    GradientLinear,
    GradientRadial,
    GradientAngular,
    GradientDiamond,
    Image,
    Emoji,
    Video,
    #[serde(other)]
    Other,
}

impl PaintType {
    pub fn is_gradient(self) -> bool {
        matches!(
            self,
            Self::GradientLinear | Self::GradientRadial | Self::GradientAngular | Self::GradientDiamond
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Vector2 {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Color {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    #[serde(default = "one")]
    pub a: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ColorStop {
    pub position: f64,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paint {
    #[serde(rename = "type")]
    pub kind: PaintType,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default)]
    pub image_ref: Option<String>,
    #[serde(default)]
    pub gradient_handle_positions: Vec<Vector2>,
    #[serde(default)]
    pub gradient_stops: Vec<ColorStop>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExportFormat {
    Png,
    Jpg,
    Svg,
    Pdf,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExportSetting {
    pub format: ExportFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Style {
    pub key: String,
    pub name: String,
    pub style_type: String,
}

/// A node as it appears on the wire. Unknown fields are skipped by serde.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawNode {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default = "yes")]
    pub visible: bool,
    #[serde(default)]
    pub children: Vec<RawNode>,
    #[serde(default)]
    pub fills: Vec<Paint>,
    #[serde(default)]
    pub export_settings: Vec<ExportSetting>,
    #[serde(default)]
    pub absolute_bounding_box: Option<Rect>,
    #[serde(default)]
    pub component_id: Option<String>,
}

/// Body of `GET /files/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFile {
    #[serde(default)]
    pub name: String,
    pub document: RawNode,
    #[serde(default)]
    pub styles: BTreeMap<String, Style>,
}

fn yes() -> bool {
    true
}

fn one() -> f64 {
    1.0
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    pub visible: bool,
    pub parent: Option<NodeIdx>,
    pub children: Vec<NodeIdx>,
    pub fills: Vec<Paint>,
    pub export_settings: Vec<ExportSetting>,
    pub bounding_box: Option<Rect>,
    pub component_id: Option<String>,
}

/// The parsed manifest: nodes live in one arena and refer to each other by index.
#[derive(Debug, Clone)]
pub struct ManifestDocument {
    pub name: String,
    nodes: Vec<Node>,
    index: HashMap<String, NodeIdx>,
    root: NodeIdx,
    /// Roots of component subtrees fetched after the main document.
    spliced: Vec<NodeIdx>,
    styles: BTreeMap<String, Style>,
}

impl ManifestDocument {
    /// Parse an already-filtered manifest body.
    pub fn parse(json: &str) -> SyncResult<Self> {
        let raw: RawFile = serde_json::from_str(json)
            .map_err(|e| SyncError::MalformedManifest(e.to_string()))?;
        Ok(Self::from_raw(raw))
    }

    pub fn from_raw(raw: RawFile) -> Self {
        let mut doc = Self {
            name: raw.name,
            nodes: Vec::new(),
            index: HashMap::new(),
            root: 0,
            spliced: Vec::new(),
            styles: raw.styles,
        };
        doc.root = doc.insert_subtree(raw.document, None);
        doc
    }

    fn insert_subtree(&mut self, raw: RawNode, parent: Option<NodeIdx>) -> NodeIdx {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            id: raw.id.clone(),
            name: raw.name,
            kind: raw.kind,
            visible: raw.visible,
            parent,
            children: Vec::with_capacity(raw.children.len()),
            fills: raw.fills,
            export_settings: raw.export_settings,
            bounding_box: raw.absolute_bounding_box,
            component_id: raw.component_id,
        });
        self.index.entry(raw.id).or_insert(idx);

        for child in raw.children {
            let child_idx = self.insert_subtree(child, Some(idx));
            self.nodes[idx].children.push(child_idx);
        }
        idx
    }

    /// Attach a separately fetched component under the document root and merge
    /// its style table. Returns false when the id is already present.
    pub fn splice_component(&mut self, raw: RawNode, styles: BTreeMap<String, Style>) -> bool {
        if self.index.contains_key(&raw.id) {
            return false;
        }
        let root = self.root;
        let idx = self.insert_subtree(raw, Some(root));
        self.spliced.push(idx);
        for (id, style) in styles {
            self.styles.entry(id).or_insert(style);
        }
        true
    }

    pub fn root(&self) -> NodeIdx {
        self.root
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        &self.nodes[idx]
    }

    pub fn find(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn styles(&self) -> &BTreeMap<String, Style> {
        &self.styles
    }

    pub fn spliced(&self) -> &[NodeIdx] {
        &self.spliced
    }

    /// Pre-order walk over the main tree followed by every spliced component.
    pub fn walk(&self) -> Vec<NodeIdx> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeIdx> = Vec::new();
        for &start in std::iter::once(&self.root).chain(self.spliced.iter()) {
            stack.push(start);
            while let Some(idx) = stack.pop() {
                order.push(idx);
                stack.extend(self.nodes[idx].children.iter().rev());
            }
        }
        order
    }
}
