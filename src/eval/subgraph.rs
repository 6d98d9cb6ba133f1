//! Subgraph call frames and boundary-port resolution.
//!
//! Entering a subgraph pushes a frame recording the call node and callee
//! document. Interior references are stamped with the callee path and the
//! chain of call-site ids, so the same subgraph called twice caches and
//! emits independently per call site.

use anyhow::{Result, anyhow, bail};

use crate::diagnostics::NodeErrorKind;
use crate::graph::{BoundaryDef, InputRef, Node, NodeKind, ShaderGraph};
use crate::resources::{SamplerDef, TextureDef};
use crate::types::{NodeResult, ResultType};

use super::{Block, Evaluator};

/// Depth cap for call recursion. Cache keys grow with the call chain, so
/// a self-referential subgraph would otherwise recurse forever.
const MAX_CALL_DEPTH: usize = 32;

/// One entry of the subgraph stack.
pub(crate) struct Frame<'a> {
    pub call_node: &'a Node,
    pub callee: &'a ShaderGraph,
    pub path: String,
}

impl<'a> Evaluator<'a> {
    /// Document currently being evaluated.
    pub(crate) fn current_graph(&self) -> &'a ShaderGraph {
        self.frames.last().map(|f| f.callee).unwrap_or(self.graph)
    }

    fn current_path(&self) -> Option<String> {
        self.frames.last().map(|f| f.path.clone())
    }

    fn call_chain(&self) -> Vec<String> {
        self.frames.iter().map(|f| f.call_node.id.clone()).collect()
    }

    /// Stamp the current evaluation context onto a stored reference.
    ///
    /// References serialized in a document carry at most a node, output and
    /// explicit subgraph path; the call chain always comes from where the
    /// evaluator currently stands.
    pub(crate) fn contextualize(&self, src: &InputRef) -> InputRef {
        let mut out = src.clone();
        if out.subgraph.is_none() {
            out.subgraph = self.current_path();
        }
        out.call_chain = self.call_chain();
        out
    }

    fn interior_ref(&self, node: &str, output: &str) -> InputRef {
        InputRef {
            node: node.to_string(),
            output: output.to_string(),
            subgraph: self.current_path(),
            call_chain: self.call_chain(),
        }
    }

    /// Resolve one output of a subgraph call by recursing into the callee's
    /// matching boundary-output node.
    pub(super) fn resolve_subgraph_call(
        &mut self,
        block: &mut Block,
        node: &'a Node,
        path: &str,
        output: &str,
    ) -> Result<NodeResult> {
        let callee = self
            .graph
            .find_subgraph(path)
            .ok_or_else(|| anyhow!("unknown subgraph document `{path}`"))?;
        let boundary = callee
            .nodes
            .iter()
            .find(|n| matches!(&n.kind, NodeKind::BoundaryOutput(def) if def.name == output))
            .ok_or_else(|| anyhow!(NodeErrorKind::UnknownOutput(output.to_string())))?;
        if self.frames.len() >= MAX_CALL_DEPTH {
            bail!("subgraph call depth exceeded at `{path}` (recursive subgraph?)");
        }
        self.frames.push(Frame {
            call_node: node,
            callee,
            path: path.to_string(),
        });
        let target = self.interior_ref(&boundary.id, "value");
        let result = self.resolve(block, &target);
        self.frames.pop();
        Ok(result)
    }

    /// A callee-side output port: follow its `value` input, or fall back to
    /// the declared default.
    pub(super) fn resolve_boundary_output(
        &mut self,
        block: &mut Block,
        node: &'a Node,
        def: &BoundaryDef,
    ) -> Result<NodeResult> {
        if let Some(slot) = node.input("value") {
            if let Some(src) = &slot.source {
                let target = self.contextualize(src);
                return Ok(self.resolve(block, &target));
            }
            if let Some(value) = &slot.default {
                return Ok(value.constant_result());
            }
        }
        let enclosing = self.current_graph().is_subgraph;
        self.boundary_default(def, enclosing)
    }

    /// A callee-side input port: resolve whatever the call site connected
    /// to the matching slot, evaluated in the caller's context.
    pub(super) fn resolve_boundary_input(
        &mut self,
        block: &mut Block,
        def: &BoundaryDef,
    ) -> Result<NodeResult> {
        let Some(call_node) = self.frames.last().map(|f| f.call_node) else {
            // A subgraph document evaluated on its own, e.g. for its preview.
            let enclosing = self.current_graph().is_subgraph;
            return self.boundary_default(def, enclosing);
        };
        let slot = call_node.input(&def.name);
        if let Some(src) = slot.and_then(|s| s.source.as_ref()) {
            let popped = self.frames.pop();
            let target = self.contextualize(src);
            let result = self.resolve(block, &target);
            if let Some(frame) = popped {
                self.frames.push(frame);
            }
            return Ok(result);
        }
        if let Some(value) = slot.and_then(|s| s.default.as_ref()) {
            return Ok(value.constant_result());
        }
        let caller_is_subgraph = self
            .frames
            .iter()
            .rev()
            .nth(1)
            .map(|f| f.callee.is_subgraph)
            .unwrap_or(self.graph.is_subgraph);
        self.boundary_default(def, caller_is_subgraph)
    }

    /// Synthesize the value of an unconnected boundary port.
    ///
    /// Numeric ports use the declared default or a zero literal. Opaque
    /// resource ports can only be synthesized at the top level, where the
    /// registrar can materialize a default resource; inside a subgraph they
    /// must be connected.
    fn boundary_default(
        &mut self,
        def: &BoundaryDef,
        enclosing_is_subgraph: bool,
    ) -> Result<NodeResult> {
        match def.ty {
            ResultType::Texture2D | ResultType::TextureCube | ResultType::Sampler => {
                if enclosing_is_subgraph {
                    bail!(NodeErrorKind::RequiredInSubgraph(def.name.clone()));
                }
                if def.ty == ResultType::Sampler {
                    let name = self.resources.register_sampler(&SamplerDef::default());
                    return Ok(NodeResult::resource(ResultType::Sampler, name));
                }
                let tex = TextureDef {
                    name: def.name.clone(),
                    default_image: None,
                    srgb: true,
                    is_attribute: false,
                };
                let pipeline = self.pipeline;
                let name = self.resources.register_texture(
                    &tex,
                    def.ty == ResultType::TextureCube,
                    pipeline,
                )?;
                Ok(NodeResult::resource(def.ty, name))
            }
            _ => {
                if let Some(value) = &def.default {
                    return Ok(value.constant_result());
                }
                match def.ty.default_literal() {
                    Some(zero) => Ok(NodeResult::constant(def.ty, zero)),
                    None => bail!(NodeErrorKind::MissingInput(def.name.clone())),
                }
            }
        }
    }
}
