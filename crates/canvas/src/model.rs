use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt};
use uuid::Uuid;

pub type Timestamp = DateTime<Utc>;

/// Open per-type property bag. Shape checks live in [`crate::PropSchemaRegistry`].
pub type Props = serde_json::Map<String, serde_json::Value>;

pub type NodeMap = HashMap<NodeId, CanvasNode>;

/// Wall-clock time at the millisecond precision the wire format carries.
pub fn now() -> Timestamp {
    Utc::now().trunc_subsecs(3)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeType {
    Image,
    Video,
    Audio,
    Text,
    Shape,
    StickyNote,
    Frame,
    Group,
    Connector,
    #[serde(rename = "model-3d")]
    Model3d,
    Generator,
    Upscale,
    RemoveBg,
    Vectorize,
    Expand,
    NextScene,
    Compare,
    Mask,
    Prompt,
    Reference,
    Storyboard,
    Script,
    Music,
    VideoEditor,
    Embed,
}

impl NodeType {
    pub const ALL: [NodeType; 25] = [
        NodeType::Image,
        NodeType::Video,
        NodeType::Audio,
        NodeType::Text,
        NodeType::Shape,
        NodeType::StickyNote,
        NodeType::Frame,
        NodeType::Group,
        NodeType::Connector,
        NodeType::Model3d,
        NodeType::Generator,
        NodeType::Upscale,
        NodeType::RemoveBg,
        NodeType::Vectorize,
        NodeType::Expand,
        NodeType::NextScene,
        NodeType::Compare,
        NodeType::Mask,
        NodeType::Prompt,
        NodeType::Reference,
        NodeType::Storyboard,
        NodeType::Script,
        NodeType::Music,
        NodeType::VideoEditor,
        NodeType::Embed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Image => "image",
            NodeType::Video => "video",
            NodeType::Audio => "audio",
            NodeType::Text => "text",
            NodeType::Shape => "shape",
            NodeType::StickyNote => "sticky-note",
            NodeType::Frame => "frame",
            NodeType::Group => "group",
            NodeType::Connector => "connector",
            NodeType::Model3d => "model-3d",
            NodeType::Generator => "generator",
            NodeType::Upscale => "upscale",
            NodeType::RemoveBg => "remove-bg",
            NodeType::Vectorize => "vectorize",
            NodeType::Expand => "expand",
            NodeType::NextScene => "next-scene",
            NodeType::Compare => "compare",
            NodeType::Mask => "mask",
            NodeType::Prompt => "prompt",
            NodeType::Reference => "reference",
            NodeType::Storyboard => "storyboard",
            NodeType::Script => "script",
            NodeType::Music => "music",
            NodeType::VideoEditor => "video-editor",
            NodeType::Embed => "embed",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasNode {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeType,
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub width: f64,
    #[serde(default)]
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub z_index: i64,
    #[serde(default)]
    pub props: Props,
}

impl CanvasNode {
    pub fn new(id: impl Into<NodeId>, kind: NodeType) -> Self {
        Self {
            id: id.into(),
            kind,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            rotation: 0.0,
            z_index: 0,
            props: Props::new(),
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn sized(mut self, width: f64, height: f64) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_z_index(mut self, z_index: i64) -> Self {
        self.z_index = z_index;
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/// Versioned canvas state. Only [`crate::apply_operation`] produces new versions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanvasDocument {
    pub id: String,
    pub version: u64,
    #[serde(default)]
    pub nodes: NodeMap,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: Timestamp,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub updated_at: Timestamp,
}

impl CanvasDocument {
    pub fn new(id: impl Into<String>) -> Self {
        let created = now();
        Self {
            id: id.into(),
            version: 0,
            nodes: NodeMap::new(),
            created_at: created,
            updated_at: created,
        }
    }

    /// Empty document with a random id, as created at store start-up.
    pub fn empty() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn node(&self, id: &NodeId) -> Option<&CanvasNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Render order: ascending z-index, ties broken by id.
    pub fn sorted_by_z(&self) -> Vec<&CanvasNode> {
        let mut nodes: Vec<&CanvasNode> = self.nodes.values().collect();
        nodes.sort_by(|a, b| a.z_index.cmp(&b.z_index).then_with(|| a.id.cmp(&b.id)));
        nodes
    }
}

/// Keys a node list by id, last occurrence wins.
pub fn node_map(nodes: impl IntoIterator<Item = CanvasNode>) -> NodeMap {
    nodes.into_iter().map(|n| (n.id.clone(), n)).collect()
}
