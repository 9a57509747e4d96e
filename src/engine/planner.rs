// Asset requirement planning: which nodes need which local file, and where it lives.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use tracing::{debug, warn};

use super::gradient::GradientSpec;
use super::storage::AssetStorage;
use crate::error::SyncResult;
use crate::manifest::document::{ExportFormat, ManifestDocument, Node, NodeIdx, NodeKind, PaintType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    ImageFill,
    RasterExport,
    VectorExport,
    Gradient,
}

impl AssetKind {
    pub fn extension(self) -> &'static str {
        match self {
            Self::ImageFill | Self::RasterExport => "png",
            Self::VectorExport | Self::Gradient => "svg",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetRequirement {
    /// Join key into the remap table: image reference for fills, node id otherwise.
    pub id: String,
    pub kind: AssetKind,
    pub local_path: String,
    pub absolute_path: PathBuf,
    pub expected_width: Option<u32>,
    pub expected_height: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct AssetPlan {
    pub image_fills: Vec<AssetRequirement>,
    pub raster: Vec<AssetRequirement>,
    pub vector: Vec<AssetRequirement>,
    pub gradients: Vec<(AssetRequirement, GradientSpec)>,
}

impl AssetPlan {
    pub fn requirements(&self) -> impl Iterator<Item = &AssetRequirement> {
        self.image_fills
            .iter()
            .chain(&self.raster)
            .chain(&self.vector)
            .chain(self.gradients.iter().map(|(r, _)| r))
    }

    pub fn len(&self) -> usize {
        self.image_fills.len() + self.raster.len() + self.vector.len() + self.gradients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Requirement id to the path markup should reference.
    pub fn local_paths(&self) -> BTreeMap<String, String> {
        self.requirements()
            .map(|r| (r.id.clone(), r.local_path.clone()))
            .collect()
    }
}

/// Component ids referenced by instances whose definition is not in the tree.
pub fn discover_missing(document: &ManifestDocument) -> BTreeSet<String> {
    document
        .walk()
        .into_iter()
        .map(|idx| document.node(idx))
        .filter(|node| node.kind == NodeKind::Instance)
        .filter_map(|node| node.component_id.as_ref())
        .filter(|id| !document.contains(id))
        .cloned()
        .collect()
}

enum Classified {
    ImageFill(String),
    Raster,
    Vector,
    Gradient(GradientSpec),
}

pub struct Planner<'a> {
    storage: &'a dyn AssetStorage,
}

impl<'a> Planner<'a> {
    pub fn new(storage: &'a dyn AssetStorage) -> Self {
        Self { storage }
    }

    /// Classify every visible node into at most one requirement. Output is
    /// ordered by id within each kind, so identical input gives identical plans.
    pub fn plan(&self, document: &ManifestDocument) -> SyncResult<AssetPlan> {
        let mut fills = BTreeMap::new();
        let mut raster = BTreeMap::new();
        let mut vector = BTreeMap::new();
        let mut gradients = BTreeMap::new();

        for idx in visible_nodes(document) {
            let node = document.node(idx);
            let classified = match classify(node) {
                Ok(Some(c)) => c,
                Ok(None) => continue,
                Err(e) => {
                    warn!("skipping node {} ({}): {}", node.id, node.name, e);
                    continue;
                }
            };

            match classified {
                Classified::ImageFill(image_ref) => {
                    if !fills.contains_key(&image_ref) {
                        let req = self.image_fill(&image_ref)?;
                        fills.insert(image_ref, req);
                    }
                }
                Classified::Raster => {
                    let req = self.export(node, AssetKind::RasterExport)?;
                    raster.entry(node.id.clone()).or_insert(req);
                }
                Classified::Vector => {
                    let req = self.export(node, AssetKind::VectorExport)?;
                    vector.entry(node.id.clone()).or_insert(req);
                }
                Classified::Gradient(spec) => {
                    let req = self.requirement(&node.id, AssetKind::Gradient, None)?;
                    gradients.entry(node.id.clone()).or_insert((req, spec));
                }
            }
        }

        let plan = AssetPlan {
            image_fills: fills.into_values().collect(),
            raster: raster.into_values().collect(),
            vector: vector.into_values().collect(),
            gradients: gradients.into_values().collect(),
        };
        debug!(
            "planned {} requirements: fills={} raster={} vector={} gradients={}",
            plan.len(),
            plan.image_fills.len(),
            plan.raster.len(),
            plan.vector.len(),
            plan.gradients.len()
        );
        Ok(plan)
    }

    fn requirement(
        &self,
        id: &str,
        kind: AssetKind,
        size: Option<(u32, u32)>,
    ) -> SyncResult<AssetRequirement> {
        let resolved = self.storage.resolve_asset_path(id, kind.extension())?;
        Ok(AssetRequirement {
            id: id.to_string(),
            kind,
            local_path: resolved.relative,
            absolute_path: resolved.absolute,
            expected_width: size.map(|(w, _)| w),
            expected_height: size.map(|(_, h)| h),
        })
    }

    fn image_fill(&self, image_ref: &str) -> SyncResult<AssetRequirement> {
        let size = self.storage.resolve_asset_size(image_ref, "png")?;
        let dims = match (size.width, size.height) {
            (Some(w), Some(h)) if size.exists => Some((w, h)),
            _ => None,
        };
        self.requirement(image_ref, AssetKind::ImageFill, dims)
    }

    fn export(&self, node: &Node, kind: AssetKind) -> SyncResult<AssetRequirement> {
        let dims = node
            .bounding_box
            .map(|b| (b.width.max(0.0).ceil() as u32, b.height.max(0.0).ceil() as u32));
        self.requirement(&node.id, kind, dims)
    }
}

/// Precedence: vector export, raster export, image fill, gradient.
fn classify(node: &Node) -> SyncResult<Option<Classified>> {
    if let Some(setting) = node.export_settings.first() {
        match setting.format {
            ExportFormat::Svg => return Ok(Some(Classified::Vector)),
            ExportFormat::Png | ExportFormat::Jpg => return Ok(Some(Classified::Raster)),
            ExportFormat::Pdf | ExportFormat::Other => {}
        }
    }

    let visible = || node.fills.iter().filter(|p| p.visible);
    if let Some(image_ref) = visible()
        .filter(|p| p.kind == PaintType::Image)
        .find_map(|p| p.image_ref.clone())
    {
        return Ok(Some(Classified::ImageFill(image_ref)));
    }

    match visible().find(|p| p.kind.is_gradient()) {
        Some(paint) => GradientSpec::from_paint(paint).map(|spec| Some(Classified::Gradient(spec))),
        None => Ok(None),
    }
}

/// Pre-order over visible nodes only; a hidden node hides its subtree.
fn visible_nodes(document: &ManifestDocument) -> Vec<NodeIdx> {
    let mut order = Vec::new();
    let mut stack: Vec<NodeIdx> = Vec::new();
    for &start in std::iter::once(&document.root()).chain(document.spliced()) {
        stack.push(start);
        while let Some(idx) = stack.pop() {
            let node = document.node(idx);
            if !node.visible {
                continue;
            }
            order.push(idx);
            stack.extend(node.children.iter().rev());
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::storage::{ResolvedPath, ResolvedSize};

    struct FlatStorage;

    impl AssetStorage for FlatStorage {
        fn resolve_asset_path(&self, name: &str, extension: &str) -> SyncResult<ResolvedPath> {
            let relative = format!("Images/{}.{}", name, extension);
            Ok(ResolvedPath {
                exists: false,
                absolute: PathBuf::from("/assets").join(&relative),
                relative,
            })
        }

        fn resolve_asset_size(&self, _name: &str, _extension: &str) -> SyncResult<ResolvedSize> {
            Ok(ResolvedSize {
                exists: false,
                width: None,
                height: None,
            })
        }

        fn images_dir(&self) -> PathBuf {
            PathBuf::from("/assets/Images")
        }
    }

    const TREE: &str = r#"{
        "document": {"id": "0:0", "type": "DOCUMENT", "children": [
            {"id": "1:1", "type": "CANVAS", "children": [
                {"id": "2:1", "type": "RECTANGLE", "fills": [{"type": "IMAGE", "imageRef": "ref-a"}]},
                {"id": "2:2", "type": "RECTANGLE", "fills": [{"type": "IMAGE", "imageRef": "ref-a"}]},
                {"id": "2:3", "type": "VECTOR",
                 "exportSettings": [{"format": "SVG"}],
                 "fills": [{"type": "IMAGE", "imageRef": "ref-b"}],
                 "absoluteBoundingBox": {"x": 0, "y": 0, "width": 10.2, "height": 4}},
                {"id": "2:4", "type": "FRAME", "exportSettings": [{"format": "PNG"}]},
                {"id": "2:5", "type": "ELLIPSE", "fills": [
                    {"type": "SOLID", "color": {"r": 1, "g": 1, "b": 1, "a": 1}},
                    {"type": "GRADIENT_LINEAR",
                     "gradientHandlePositions": [{"x": 0, "y": 0}, {"x": 1, "y": 1}],
                     "gradientStops": [{"position": 0, "color": {"r": 1, "g": 0, "b": 0, "a": 1}}]}
                ]},
                {"id": "2:6", "type": "ELLIPSE", "fills": [
                    {"type": "GRADIENT_ANGULAR",
                     "gradientHandlePositions": [{"x": 0, "y": 0}, {"x": 1, "y": 1}]}
                ]},
                {"id": "2:7", "type": "FRAME", "visible": false, "children": [
                    {"id": "2:8", "type": "RECTANGLE", "fills": [{"type": "IMAGE", "imageRef": "ref-hidden"}]}
                ]},
                {"id": "2:9", "type": "RECTANGLE", "fills": [{"type": "IMAGE", "visible": false, "imageRef": "ref-off"}]},
                {"id": "3:1", "type": "INSTANCE", "componentId": "9:1"},
                {"id": "3:2", "type": "INSTANCE", "componentId": "9:1"},
                {"id": "3:3", "type": "INSTANCE", "componentId": "2:4"}
            ]}
        ]}
    }"#;

    #[test]
    fn test_classification_and_precedence() {
        let doc = ManifestDocument::parse(TREE).unwrap();
        let plan = Planner::new(&FlatStorage).plan(&doc).unwrap();

        let ids = |reqs: &[AssetRequirement]| reqs.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&plan.image_fills), vec!["ref-a"]);
        assert_eq!(ids(&plan.vector), vec!["2:3"]);
        assert_eq!(ids(&plan.raster), vec!["2:4"]);
        assert_eq!(plan.gradients.len(), 1);
        assert_eq!(plan.gradients[0].0.id, "2:5");
        assert_eq!(plan.gradients[0].0.local_path, "Images/2:5.svg");
        assert_eq!(plan.len(), 4);

        let vector = &plan.vector[0];
        assert_eq!(vector.local_path, "Images/2:3.svg");
        assert_eq!((vector.expected_width, vector.expected_height), (Some(11), Some(4)));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let doc = ManifestDocument::parse(TREE).unwrap();
        let first = Planner::new(&FlatStorage).plan(&doc).unwrap();
        let second = Planner::new(&FlatStorage).plan(&doc).unwrap();
        assert_eq!(first.local_paths(), second.local_paths());
        assert_eq!(
            first.requirements().collect::<Vec<_>>(),
            second.requirements().collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_discover_missing_components() {
        let mut doc = ManifestDocument::parse(TREE).unwrap();
        let missing = discover_missing(&doc);
        assert_eq!(missing, BTreeSet::from(["9:1".to_string()]));

        let raw = serde_json::from_str(
            r#"{"id": "9:1", "type": "COMPONENT", "exportSettings": [{"format": "SVG"}]}"#,
        )
        .unwrap();
        doc.splice_component(raw, Default::default());
        assert!(discover_missing(&doc).is_empty());

        let plan = Planner::new(&FlatStorage).plan(&doc).unwrap();
        assert!(plan.vector.iter().any(|r| r.id == "9:1"));
    }
}
