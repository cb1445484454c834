use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::HashMap, fmt};

use crate::{CanvasDocument, CanvasError, CanvasNode, NodeType, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropKind {
    String,
    Number,
    Bool,
    Array,
    Object,
    Any,
}

impl PropKind {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            PropKind::String => value.is_string(),
            PropKind::Number => value.is_number(),
            PropKind::Bool => value.is_boolean(),
            PropKind::Array => value.is_array(),
            PropKind::Object => value.is_object(),
            PropKind::Any => true,
        }
    }
}

impl fmt::Display for PropKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropKind::String => "a string",
            PropKind::Number => "a number",
            PropKind::Bool => "a boolean",
            PropKind::Array => "an array",
            PropKind::Object => "an object",
            PropKind::Any => "any value",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropRule {
    pub name: String,
    pub kind: PropKind,
    pub required: bool,
}

impl PropRule {
    pub fn required(name: impl Into<String>, kind: PropKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: PropKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Per-type shape rules for `CanvasNode::props`.
///
/// The reducer never consults the registry; callers validate at the edges
/// (before issuing a command, after a resync) as they see fit. Keys without a
/// rule are always accepted.
#[derive(Debug, Clone, Default)]
pub struct PropSchemaRegistry {
    rules: HashMap<NodeType, Vec<PropRule>>,
}

impl PropSchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for media in [NodeType::Image, NodeType::Video, NodeType::Audio, NodeType::Model3d] {
            registry.register(media, PropRule::required("src", PropKind::String));
        }
        registry
            .register(NodeType::Text, PropRule::required("text", PropKind::String))
            .register(NodeType::StickyNote, PropRule::optional("text", PropKind::String))
            .register(NodeType::StickyNote, PropRule::optional("color", PropKind::String))
            .register(NodeType::Shape, PropRule::optional("shape", PropKind::String))
            .register(NodeType::Connector, PropRule::required("from", PropKind::String))
            .register(NodeType::Connector, PropRule::required("to", PropKind::String))
            .register(NodeType::Group, PropRule::optional("children", PropKind::Array))
            .register(NodeType::Prompt, PropRule::required("prompt", PropKind::String))
            .register(NodeType::Embed, PropRule::required("url", PropKind::String))
            .register(NodeType::Compare, PropRule::optional("left", PropKind::String))
            .register(NodeType::Compare, PropRule::optional("right", PropKind::String));
        registry
    }

    pub fn register(&mut self, kind: NodeType, rule: PropRule) -> &mut Self {
        let rules = self.rules.entry(kind).or_default();
        rules.retain(|r| r.name != rule.name);
        rules.push(rule);
        self
    }

    pub fn rules(&self, kind: NodeType) -> &[PropRule] {
        self.rules.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn validate(&self, node: &CanvasNode) -> Result<()> {
        for rule in self.rules(node.kind) {
            match node.props.get(&rule.name) {
                None | Some(Value::Null) if rule.required => {
                    return Err(CanvasError::MissingProp {
                        node: node.id.clone(),
                        kind: node.kind,
                        prop: rule.name.clone(),
                    });
                }
                None | Some(Value::Null) => {}
                Some(value) if !rule.kind.matches(value) => {
                    return Err(CanvasError::InvalidProp {
                        node: node.id.clone(),
                        prop: rule.name.clone(),
                        expected: rule.kind,
                    });
                }
                Some(_) => {}
            }
        }
        Ok(())
    }

    /// Every violation in the document, in render order.
    pub fn validate_document(&self, doc: &CanvasDocument) -> Vec<CanvasError> {
        doc.sorted_by_z()
            .into_iter()
            .filter_map(|node| self.validate(node).err())
            .collect()
    }
}
