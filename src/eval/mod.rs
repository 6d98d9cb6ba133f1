//! Memoized recursive evaluation of shader graphs.
//!
//! The evaluator walks input references depth first, turning each visited
//! node into a [`NodeResult`] exactly once per evaluation context. Failures
//! are recorded as diagnostics against the failing node and propagate as
//! invalid sentinels; resolution itself never aborts, so a broken subtree
//! still leaves the rest of the graph evaluated. Consumers of a failed
//! result are marked as skipped at warning severity, not re-reported as
//! errors of their own.

pub mod block;
mod subgraph;

use std::collections::HashMap;

use anyhow::{Result, anyhow, bail};

use crate::diagnostics::{Diagnostics, NodeErrorKind};
use crate::features::FeatureRegistrar;
use crate::graph::{FunctionCallDef, InputRef, Node, NodeKind, Op, ShaderGraph};
use crate::ops;
use crate::resources::{FunctionLibrary, ParameterDef, ResourceTables, TexturePipeline};
use crate::types::{
    self, CompileMode, NodeResult, ResultPayload, ResultType, Stage, sanitize_ident,
};

pub use block::Block;

use subgraph::Frame;

/// One stage's evaluation state for one compilation.
pub struct Evaluator<'a> {
    graph: &'a ShaderGraph,
    mode: CompileMode,
    stage: Stage,
    /// Resources registered while evaluating this stage.
    pub resources: ResourceTables,
    pub(crate) features: &'a mut FeatureRegistrar,
    pub(crate) diags: &'a mut Diagnostics,
    functions: &'a FunctionLibrary,
    pipeline: &'a dyn TexturePipeline,
    frames: Vec<Frame<'a>>,
    in_flight: Vec<InputRef>,
    next_local: usize,
    next_preview: u32,
    preview_ids: HashMap<String, u32>,
}

/// What a finished stage hands back to the compile driver.
pub struct StageOutcome {
    pub resources: ResourceTables,
    pub preview_ids: HashMap<String, u32>,
    pub next_preview_id: u32,
}

impl<'a> Evaluator<'a> {
    pub fn new(
        graph: &'a ShaderGraph,
        mode: CompileMode,
        stage: Stage,
        features: &'a mut FeatureRegistrar,
        diags: &'a mut Diagnostics,
        functions: &'a FunctionLibrary,
        pipeline: &'a dyn TexturePipeline,
    ) -> Self {
        Self {
            graph,
            mode,
            stage,
            resources: ResourceTables::new(),
            features,
            diags,
            functions,
            pipeline,
            frames: Vec::new(),
            in_flight: Vec::new(),
            next_local: 0,
            next_preview: 0,
            preview_ids: HashMap::new(),
        }
    }

    /// Continue preview-id numbering from an earlier stage.
    pub fn with_preview_base(mut self, base: u32) -> Self {
        self.next_preview = base;
        self
    }

    pub fn finish(self) -> StageOutcome {
        StageOutcome {
            resources: self.resources,
            preview_ids: self.preview_ids,
            next_preview_id: self.next_preview,
        }
    }

    pub(crate) fn mode(&self) -> CompileMode {
        self.mode
    }

    pub(crate) fn stage(&self) -> Stage {
        self.stage
    }

    pub(crate) fn pipeline(&self) -> &'a dyn TexturePipeline {
        self.pipeline
    }

    /// Resolve a reference to a node result, memoized per block.
    ///
    /// This is the only entry point into evaluation; it never returns an
    /// error. Failures are recorded against the referenced node and come
    /// back as the invalid sentinel.
    pub fn resolve(&mut self, block: &mut Block, input: &InputRef) -> NodeResult {
        if input.is_unset() {
            return NodeResult::invalid();
        }
        if let Some(hit) = block.cached(input) {
            return hit;
        }
        if self.in_flight.contains(input) {
            let chain = self.cycle_chain(input);
            self.diags
                .node_error(&input.node, NodeErrorKind::CircularReference(chain));
            return NodeResult::invalid();
        }
        self.in_flight.push(input.clone());
        let result = match self.resolve_uncached(block, input) {
            Ok(result) => result,
            Err(err) => {
                match NodeErrorKind::from_anyhow(err) {
                    skip @ NodeErrorKind::UpstreamFailed(_) => {
                        self.diags.node_warning(&input.node, skip);
                    }
                    kind => self.diags.node_error(&input.node, kind),
                }
                NodeResult::invalid()
            }
        };
        self.in_flight.pop();
        block.insert_cache(input.clone(), result.clone());
        result
    }

    fn cycle_chain(&self, input: &InputRef) -> String {
        let mut parts: Vec<String> = self
            .in_flight
            .iter()
            .skip_while(|r| *r != input)
            .map(|r| format!("{}.{}", r.node, r.output))
            .collect();
        parts.push(format!("{}.{}", input.node, input.output));
        parts.join(" -> ")
    }

    fn resolve_uncached(&mut self, block: &mut Block, input: &InputRef) -> Result<NodeResult> {
        let doc = self.document_for(input)?;
        let node = doc
            .nodes
            .iter()
            .find(|n| n.id == input.node)
            .ok_or_else(|| anyhow!(NodeErrorKind::UnknownNode(input.node.clone())))?;
        match &node.kind {
            NodeKind::Op(Op::Switch(def)) => self.resolve_switch(block, node, def),
            NodeKind::Op(op) => self.resolve_ordinary(block, node, op),
            NodeKind::Parameter(def) => self.resolve_parameter(def),
            NodeKind::FunctionCall(def) => {
                self.resolve_function_call(block, node, def, &input.output)
            }
            NodeKind::SubgraphCall { path } => {
                self.resolve_subgraph_call(block, node, path, &input.output)
            }
            NodeKind::BoundaryInput(def) => self.resolve_boundary_input(block, def),
            NodeKind::BoundaryOutput(def) => self.resolve_boundary_output(block, node, def),
        }
    }

    /// Document a reference points into: the root unless the reference names
    /// a subgraph path.
    fn document_for(&self, input: &InputRef) -> Result<&'a ShaderGraph> {
        match &input.subgraph {
            None => Ok(self.graph),
            Some(path) => self
                .graph
                .find_subgraph(path)
                .ok_or_else(|| anyhow!("unknown subgraph document `{path}`")),
        }
    }

    /// Ordinary nodes: run the op, then materialize non-constant expression
    /// results as fresh locals so repeated uses share one computation.
    fn resolve_ordinary(&mut self, block: &mut Block, node: &'a Node, op: &Op) -> Result<NodeResult> {
        let result = ops::emit(self, block, node, op)?;
        if !result.is_valid() {
            bail!(NodeErrorKind::Other("node produced no value".to_string()));
        }
        if result.constant {
            return Ok(result);
        }
        match &result.payload {
            ResultPayload::Code(_) if result.ty.glsl().is_some() && result.ty != ResultType::Void => {
                Ok(self.materialize(block, &node.id, result))
            }
            _ => Ok(result),
        }
    }

    fn resolve_parameter(&mut self, def: &ParameterDef) -> Result<NodeResult> {
        let name = match self.mode {
            CompileMode::Final => self.resources.register_parameter(def, None).0,
            CompileMode::Preview => {
                let attr = format!("attr_{}", sanitize_ident(&def.name));
                self.resources.register_parameter(def, Some(&attr)).0
            }
        };
        Ok(NodeResult::expr(def.default.ty(), name))
    }

    /// Function-call nodes: emit the call statement once, then serve every
    /// output from the recorded slot bundle.
    fn resolve_function_call(
        &mut self,
        block: &mut Block,
        node: &'a Node,
        def: &FunctionCallDef,
        output: &str,
    ) -> Result<NodeResult> {
        if let Some(bundle) = block.deferred(&node.id) {
            return slot_from_bundle(&bundle, output);
        }
        if node.outputs.is_empty() {
            bail!(NodeErrorKind::Other(format!(
                "function call `{}` declares no outputs",
                def.name
            )));
        }

        let mut substitutions: Vec<(String, String)> = Vec::new();
        for slot in &node.inputs {
            let r = self.require_input(block, node, &slot.name)?;
            let value = match &r.payload {
                ResultPayload::Code(code) => code.clone(),
                ResultPayload::Resource(name) => name.clone(),
                ResultPayload::Bundle(_) => bail!(NodeErrorKind::Other(format!(
                    "input `{}` carries no expression",
                    slot.name
                ))),
            };
            substitutions.push((format!("${}", slot.name), value));
        }

        let mut slots: Vec<(String, NodeResult)> = Vec::new();
        for out in &node.outputs {
            if out.ty.glsl().is_none() || out.ty == ResultType::Void {
                bail!(NodeErrorKind::Other(format!(
                    "function output `{}` has unsupported type {:?}",
                    out.name, out.ty
                )));
            }
            let Some(zero) = out.ty.default_literal() else {
                bail!(NodeErrorKind::Other(format!(
                    "function output `{}` has no default literal",
                    out.name
                )));
            };
            let slot_name = self.alloc_local();
            block.push_local(
                NodeResult::expr(out.ty, slot_name.clone()),
                NodeResult::expr(out.ty, zero),
            );
            substitutions.push((format!("${}", out.name), slot_name.clone()));
            let mut slot_result = NodeResult::expr(out.ty, slot_name);
            slot_result.deferred_target = Some(node.id.clone());
            if self.mode == CompileMode::Preview {
                slot_result.preview_id = Some(self.preview_id_for(&node.id));
            }
            slots.push((out.name.clone(), slot_result));
        }

        // Longest placeholders first so `$uv` never clobbers `$uv_scale`.
        substitutions.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
        let mut call = def.call.clone();
        for (placeholder, value) in &substitutions {
            call = call.replace(placeholder.as_str(), value);
        }

        if self.functions.register(&def.name, &def.source) {
            log::debug!("registered custom function `{}`", def.name);
        }
        self.resources.use_function(&def.name);
        block.push_statement(call);

        let bundle = NodeResult {
            ty: ResultType::Bundle,
            payload: ResultPayload::Bundle(slots),
            constant: false,
            components: 0,
            preview_id: None,
            deferred_target: Some(node.id.clone()),
        };
        block.record_deferred(node.id.clone(), bundle.clone());
        slot_from_bundle(&bundle, output)
    }

    /// Allocate a fresh local name; unique within one stage.
    pub(crate) fn alloc_local(&mut self) -> String {
        let name = format!("l_{}", self.next_local);
        self.next_local += 1;
        name
    }

    pub(crate) fn preview_id_for(&mut self, node_id: &str) -> u32 {
        if let Some(&id) = self.preview_ids.get(node_id) {
            return id;
        }
        let id = self.next_preview;
        self.next_preview += 1;
        self.preview_ids.insert(node_id.to_string(), id);
        id
    }

    /// Turn an expression result into a named local and return the
    /// reference; the declaration lands at the end of the block.
    pub(crate) fn materialize(
        &mut self,
        block: &mut Block,
        node_id: &str,
        result: NodeResult,
    ) -> NodeResult {
        let name = self.alloc_local();
        let mut reference = NodeResult::expr(result.ty, name.clone());
        reference.components = result.components;
        reference.deferred_target = result.deferred_target.clone();
        if self.mode == CompileMode::Preview {
            reference.preview_id = Some(self.preview_id_for(node_id));
        }
        let mut local = NodeResult::expr(result.ty, name);
        local.components = result.components;
        block.push_local(local, result);
        reference
    }

    /// Resolve a named input slot: connected source, else literal default,
    /// else invalid.
    pub(crate) fn input(&mut self, block: &mut Block, node: &Node, name: &str) -> NodeResult {
        let Some(slot) = node.input(name) else {
            return NodeResult::invalid();
        };
        if let Some(src) = &slot.source {
            let target = self.contextualize(src);
            return self.resolve(block, &target);
        }
        match &slot.default {
            Some(value) => value.constant_result(),
            None => NodeResult::invalid(),
        }
    }

    /// Like [`Self::input`] but failing when the slot yields no value.
    ///
    /// An absent or unconnected slot is a missing-input error on this node.
    /// A connected slot whose source resolved to the invalid sentinel only
    /// marks this node as skipped: the failure is already recorded on the
    /// upstream node, and repeating it per consumer would bury the node
    /// that actually broke.
    pub(crate) fn require_input(
        &mut self,
        block: &mut Block,
        node: &Node,
        name: &str,
    ) -> Result<NodeResult> {
        let r = self.input(block, node, name);
        if r.is_valid() {
            return Ok(r);
        }
        let connected = matches!(
            node.input(name).and_then(|slot| slot.source.as_ref()),
            Some(src) if !src.is_unset()
        );
        if connected {
            bail!(NodeErrorKind::UpstreamFailed(name.to_string()));
        }
        bail!(NodeErrorKind::MissingInput(name.to_string()))
    }

    /// Cast with the node-error taxonomy applied.
    pub(crate) fn cast_input(
        &mut self,
        result: &NodeResult,
        components: u8,
        fill: f32,
    ) -> Result<NodeResult> {
        types::cast(result, components, fill)
            .map_err(|e| anyhow!(NodeErrorKind::IllegalCast(e.to_string())))
    }

    /// Binary promotion with the node-error taxonomy applied.
    pub(crate) fn promote_inputs(
        &mut self,
        a: &NodeResult,
        b: &NodeResult,
    ) -> Result<(NodeResult, NodeResult, ResultType)> {
        types::promote_binary(a, b).map_err(|e| anyhow!(NodeErrorKind::IllegalCast(e.to_string())))
    }
}

fn slot_from_bundle(bundle: &NodeResult, output: &str) -> Result<NodeResult> {
    let ResultPayload::Bundle(slots) = &bundle.payload else {
        bail!(NodeErrorKind::Other("not a slot bundle".to_string()));
    };
    slots
        .iter()
        .find(|(name, _)| name == output)
        .map(|(_, r)| r.clone())
        .ok_or_else(|| anyhow!(NodeErrorKind::UnknownOutput(output.to_string())))
}
