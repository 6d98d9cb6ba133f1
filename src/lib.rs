//! Compiles shader graphs into GLSL vertex/pixel stage source.
//!
//! A [`ShaderGraph`] is a directed graph of typed shading nodes, possibly
//! nesting further graph documents invoked as subgraphs. [`ShaderCompiler`]
//! evaluates the graph once per stage, memoizing every resolved node output,
//! then assembles deterministic GLSL 450 source: feature declarations,
//! resource globals, generated helper functions and the stage procedures.
//!
//! Two compile modes exist. `Final` refuses to emit while any node error is
//! on record. `Preview` always emits, substitutes defaults for broken
//! subtrees, binds parameters to live-editable attributes and assigns every
//! materialized local a preview id so an editor can inspect intermediates.
//!
//! ```no_run
//! use shader_graph_compiler::{CompileMode, ShaderCompiler, load_graph_from_path};
//!
//! # fn main() -> anyhow::Result<()> {
//! let graph = load_graph_from_path("material.json")?;
//! let shader = ShaderCompiler::new(&graph)
//!     .mode(CompileMode::Preview)
//!     .compile()?;
//! println!("{}", shader.pixel_source);
//! # Ok(())
//! # }
//! ```

pub mod codegen;
pub mod diagnostics;
pub mod eval;
pub mod features;
pub mod graph;
mod ops;
pub mod resources;
pub mod types;

use std::collections::HashMap;

use thiserror::Error;

use codegen::{FieldValue, StagePlan};

pub use codegen::{ShaderTemplate, TemplateField};
pub use diagnostics::{Diagnostic, Diagnostics, NodeErrorKind, Severity};
pub use eval::{Block, Evaluator, StageOutcome};
pub use features::{FeatureDef, FeatureKind, FeatureRegistrar};
pub use graph::{
    InputRef, Node, NodeKind, Op, ParamValue, ShaderGraph, StageInput, load_graph_from_path,
    load_graph_from_str,
};
pub use resources::{
    FilterMode, FunctionLibrary, GradientDef, GradientStop, InMemoryTexturePipeline, ParameterDef,
    ResourceTables, SamplerDef, TextureDef, TexturePipeline, WrapMode,
};
pub use types::{CompileMode, NodeResult, ResultType, Stage};

/// A finished compilation.
#[derive(Debug)]
pub struct GeneratedShader {
    pub name: String,
    /// Annotated listing of both stages; for inspection, not compilation.
    pub source: String,
    pub vertex_source: String,
    pub pixel_source: String,
    /// Preview-mode attribute bindings the caller pushes into the live
    /// material: attribute name to current value.
    pub attributes: Vec<(String, ParamValue)>,
    /// Node id to preview slot, assigned across both stages.
    pub preview_ids: HashMap<String, u32>,
    /// Every feature the graph's switches registered.
    pub features: Vec<FeatureDef>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Final-mode compilation refused to emit.
#[derive(Debug, Error)]
#[error("shader graph compilation failed with {} diagnostic(s)", .diagnostics.len())]
pub struct CompileError {
    pub diagnostics: Vec<Diagnostic>,
}

/// One-shot compiler for a single graph document.
///
/// Borrowed collaborators default to in-process instances: a fresh
/// [`FunctionLibrary`] and an [`InMemoryTexturePipeline`]. Callers wanting
/// cross-compile function dedup or real texture baking pass their own.
pub struct ShaderCompiler<'a> {
    graph: &'a ShaderGraph,
    template: &'static ShaderTemplate,
    mode: CompileMode,
    features: Vec<FeatureDef>,
    functions: Option<&'a FunctionLibrary>,
    pipeline: Option<&'a dyn TexturePipeline>,
    default_functions: FunctionLibrary,
    default_pipeline: InMemoryTexturePipeline,
}

impl<'a> ShaderCompiler<'a> {
    pub fn new(graph: &'a ShaderGraph) -> Self {
        Self {
            graph,
            template: ShaderTemplate::standard(),
            mode: CompileMode::Final,
            features: Vec::new(),
            functions: None,
            pipeline: None,
            default_functions: FunctionLibrary::new(),
            default_pipeline: InMemoryTexturePipeline::new(),
        }
    }

    pub fn mode(mut self, mode: CompileMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn template(mut self, template: &'static ShaderTemplate) -> Self {
        self.template = template;
        self
    }

    /// Seed the feature table before any switch registers.
    pub fn with_features(mut self, features: impl IntoIterator<Item = FeatureDef>) -> Self {
        self.features.extend(features);
        self
    }

    pub fn with_function_library(mut self, functions: &'a FunctionLibrary) -> Self {
        self.functions = Some(functions);
        self
    }

    pub fn with_texture_pipeline(mut self, pipeline: &'a dyn TexturePipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Evaluate both stages and assemble the source.
    ///
    /// Never panics on malformed graphs: everything wrong with the document
    /// lands in the diagnostics. In `Final` mode any error diagnostic turns
    /// the whole compile into [`CompileError`]; in `Preview` mode the shader
    /// is emitted regardless, with defaults standing in for broken parts.
    pub fn compile(&self) -> Result<GeneratedShader, CompileError> {
        log::info!(
            "compiling shader graph `{}` ({} nodes, {:?} mode)",
            self.graph.name,
            self.graph.nodes.len(),
            self.mode
        );
        let functions = self.functions.unwrap_or(&self.default_functions);
        let pipeline: &dyn TexturePipeline = match self.pipeline {
            Some(p) => p,
            None => &self.default_pipeline,
        };
        let mut features = FeatureRegistrar::seeded(self.features.iter().cloned());
        let mut diags = Diagnostics::new();

        let (vertex_plan, vertex_outcome) =
            self.run_stage(Stage::Vertex, 0, &mut features, &mut diags, functions, pipeline);
        let (pixel_plan, pixel_outcome) = self.run_stage(
            Stage::Pixel,
            vertex_outcome.next_preview_id,
            &mut features,
            &mut diags,
            functions,
            pipeline,
        );

        let mut merged = vertex_outcome.resources;
        merged.merge(pixel_outcome.resources);
        let mut preview_ids = vertex_outcome.preview_ids;
        preview_ids.extend(pixel_outcome.preview_ids);

        let source = codegen::generate(
            &self.graph.name,
            self.template,
            &features,
            &merged,
            functions,
            &vertex_plan,
            &pixel_plan,
            &mut diags,
        );

        if self.mode == CompileMode::Final && diags.has_errors() {
            log::debug!(
                "refusing final emission of `{}` with {} errors",
                self.graph.name,
                diags.error_count()
            );
            return Err(CompileError {
                diagnostics: diags.into_vec(),
            });
        }
        if diags.has_errors() {
            log::warn!(
                "emitting preview shader for `{}` with {} errors",
                self.graph.name,
                diags.error_count()
            );
        }

        let attributes: Vec<(String, ParamValue)> = merged
            .parameters
            .iter()
            .filter(|entry| entry.is_attribute)
            .map(|entry| (entry.name.clone(), entry.value.clone()))
            .collect();

        Ok(GeneratedShader {
            name: self.graph.name.clone(),
            source: source.combined,
            vertex_source: source.vertex,
            pixel_source: source.pixel,
            attributes,
            preview_ids,
            features: features.iter().cloned().collect(),
            diagnostics: diags.into_vec(),
        })
    }

    /// Run one stage's evaluation: resolve every template field binding into
    /// a fresh block, collecting resources and preview ids on the way.
    fn run_stage(
        &self,
        stage: Stage,
        preview_base: u32,
        features: &mut FeatureRegistrar,
        diags: &mut Diagnostics,
        functions: &FunctionLibrary,
        pipeline: &dyn TexturePipeline,
    ) -> (StagePlan, StageOutcome) {
        let mut ev = Evaluator::new(
            self.graph,
            self.mode,
            stage,
            features,
            diags,
            functions,
            pipeline,
        )
        .with_preview_base(preview_base);
        let mut block = Block::new();
        let mut fields = Vec::new();
        for field in self.template.fields(stage) {
            let bound = self
                .graph
                .outputs
                .iter()
                .find(|binding| binding.field == field.name)
                .map(|binding| {
                    let result = ev.resolve(&mut block, &binding.source());
                    (binding.node.clone(), result)
                });
            fields.push(FieldValue { field, bound });
        }
        let outcome = ev.finish();
        log::debug!(
            "{} stage of `{}`: {} statements, {} diagnostics so far",
            stage.label(),
            self.graph.name,
            block.len(),
            diags.iter().count()
        );
        let plan = StagePlan {
            stage,
            block,
            fields,
            stage_inputs: outcome.resources.stage_inputs.clone(),
        };
        (plan, outcome)
    }
}
