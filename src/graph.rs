//! Shader graph document model and JSON loading.
//!
//! A document holds typed nodes, connections between node ports, material
//! output bindings and nested subgraph documents. Documents are produced by
//! the graph editor and consumed by the evaluator; loading normalizes the
//! editor's connection list onto the per-node input slots.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::features::FeatureDef;
use crate::resources::{GradientDef, ParameterDef, SamplerDef, TextureDef};
use crate::types::{NodeResult, ResultType, fmt_float};

/// Reference to one output of one node.
///
/// Used both as the wire format for connections and as the evaluator's cache
/// key, so two references are the same value only if they agree on node,
/// output, owning subgraph document and the chain of call-site node ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputRef {
    pub node: String,
    pub output: String,
    /// Path of the subgraph document the referenced node lives in, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subgraph: Option<String>,
    /// Ids of the subgraph-call nodes leading to this reference, outermost
    /// first. Distinguishes the same interior node across call sites.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub call_chain: Vec<String>,
}

impl InputRef {
    /// Reference to a node output in the top-level document.
    pub fn local(node: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            output: output.into(),
            subgraph: None,
            call_chain: Vec::new(),
        }
    }

    /// References with an empty node id mean "left unconnected".
    pub fn is_unset(&self) -> bool {
        self.node.is_empty()
    }
}

/// Literal value carried by constants, input defaults and parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParamValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Color([f32; 4]),
}

impl ParamValue {
    pub fn ty(&self) -> ResultType {
        match self {
            ParamValue::Bool(_) => ResultType::Bool,
            ParamValue::Int(_) => ResultType::Int,
            ParamValue::Float(_) => ResultType::Float,
            ParamValue::Vec2(_) => ResultType::Vector2,
            ParamValue::Vec3(_) => ResultType::Vector3,
            ParamValue::Vec4(_) => ResultType::Vector4,
            ParamValue::Color(_) => ResultType::Color,
        }
    }

    /// GLSL literal text for this value.
    pub fn literal(&self) -> String {
        fn join(values: &[f32]) -> String {
            values.iter().map(|v| fmt_float(*v)).collect::<Vec<_>>().join(", ")
        }
        match self {
            ParamValue::Bool(b) => b.to_string(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(v) => fmt_float(*v),
            ParamValue::Vec2(v) => format!("vec2({})", join(v)),
            ParamValue::Vec3(v) => format!("vec3({})", join(v)),
            ParamValue::Vec4(v) | ParamValue::Color(v) => format!("vec4({})", join(v)),
        }
    }

    /// The value as a constant node result.
    pub fn constant_result(&self) -> NodeResult {
        NodeResult::constant(self.ty(), self.literal())
    }
}

/// Stage-provided input read by graph nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StageInput {
    Position,
    Normal,
    TexCoord,
    VertexColor,
    ScreenPosition,
    Time,
}

/// Binary arithmetic ops sharing one promotion and emission path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Min,
    Max,
    Power,
    Step,
}

/// Single-argument ops sharing one emission path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UnaryOp {
    Abs,
    Floor,
    Frac,
    Saturate,
    Negate,
    OneMinus,
    Sin,
    Cos,
    SquareRoot,
}

/// The closed set of ordinary node operations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Op {
    Constant(ParamValue),
    StageInput(StageInput),
    Binary(BinaryOp),
    Unary(UnaryOp),
    Lerp,
    Clamp,
    Dot,
    Cross,
    Normalize,
    Length,
    Swizzle { pattern: String },
    Combine,
    TextureObject(TextureDef),
    SampleTexture2D { #[serde(default)] sampler: SamplerDef },
    SampleTextureCube { #[serde(default)] sampler: SamplerDef },
    GradientObject(GradientDef),
    SampleGradient,
    Switch(FeatureDef),
}

/// Input or output port of a subgraph document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryDef {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ResultType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
}

/// Hand-written function invoked through a generated call statement.
///
/// `call` is the statement template; `$name` placeholders are replaced with
/// resolved input expressions and generated output slot names.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCallDef {
    pub name: String,
    pub source: String,
    pub call: String,
}

/// What a node is; drives dispatch in the evaluator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Op(Op),
    Parameter(ParameterDef),
    SubgraphCall { path: String },
    BoundaryInput(BoundaryDef),
    BoundaryOutput(BoundaryDef),
    FunctionCall(FunctionCallDef),
}

/// Declared input port of a node, optionally connected or defaulted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSlot {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<InputRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<ParamValue>,
}

/// Declared output port of a node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSlot {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ResultType,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
    #[serde(default)]
    pub inputs: Vec<InputSlot>,
    #[serde(default)]
    pub outputs: Vec<OutputSlot>,
}

impl Node {
    pub fn input(&self, name: &str) -> Option<&InputSlot> {
        self.inputs.iter().find(|s| s.name == name)
    }

    pub fn output(&self, name: &str) -> Option<&OutputSlot> {
        self.outputs.iter().find(|s| s.name == name)
    }
}

/// One editor wire between two node ports.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub from_node: String,
    pub from_output: String,
    pub to_node: String,
    pub to_input: String,
}

/// Binding of a material template field to a node output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputBinding {
    pub field: String,
    pub node: String,
    pub output: String,
}

impl OutputBinding {
    pub fn source(&self) -> InputRef {
        InputRef::local(self.node.clone(), self.output.clone())
    }
}

/// A shader graph document, possibly with nested subgraph documents.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShaderGraph {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_subgraph: bool,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub connections: Vec<Connection>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputBinding>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub subgraphs: BTreeMap<String, ShaderGraph>,
}

impl ShaderGraph {
    pub fn node(&self, id: &str) -> Result<&Node> {
        self.nodes
            .iter()
            .find(|n| n.id == id)
            .ok_or_else(|| anyhow!("unknown node id `{id}` in graph `{}`", self.name))
    }

    /// Look up a nested subgraph document by path, searching depth-first.
    pub fn find_subgraph(&self, path: &str) -> Option<&ShaderGraph> {
        if let Some(doc) = self.subgraphs.get(path) {
            return Some(doc);
        }
        self.subgraphs.values().find_map(|doc| doc.find_subgraph(path))
    }

    /// Fold the editor's connection list onto the per-node input slots.
    ///
    /// Connections to slots the node does not declare create the slot;
    /// connections to unknown nodes are dropped with a warning.
    pub fn bind_connections(&mut self) {
        let connections = std::mem::take(&mut self.connections);
        for conn in connections {
            let source = InputRef::local(conn.from_node.clone(), conn.from_output.clone());
            let Some(node) = self.nodes.iter_mut().find(|n| n.id == conn.to_node) else {
                log::warn!(
                    "dropping connection to unknown node `{}` in graph `{}`",
                    conn.to_node,
                    self.name
                );
                continue;
            };
            match node.inputs.iter_mut().find(|s| s.name == conn.to_input) {
                Some(slot) => slot.source = Some(source),
                None => node.inputs.push(InputSlot {
                    name: conn.to_input,
                    source: Some(source),
                    default: None,
                }),
            }
        }
        for doc in self.subgraphs.values_mut() {
            doc.bind_connections();
        }
    }
}

/// Parse a graph document from JSON and normalize its connections.
pub fn load_graph_from_str(s: &str) -> Result<ShaderGraph> {
    let mut graph: ShaderGraph =
        serde_json::from_str(s).context("failed to parse shader graph JSON")?;
    graph.bind_connections();
    Ok(graph)
}

/// Load a graph document from a JSON file.
pub fn load_graph_from_path(path: impl AsRef<Path>) -> Result<ShaderGraph> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read graph file {}", path.display()))?;
    load_graph_from_str(&text)
        .with_context(|| format!("failed to load graph from {}", path.display()))
}
