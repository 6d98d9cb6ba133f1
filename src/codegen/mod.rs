//! Deterministic GLSL assembly from evaluated stages.
//!
//! Pure text construction: everything variable was decided during
//! evaluation, so the same plans always produce byte-identical source.
//! Assembly order is fixed: feature declarations, shared constants, stage
//! io, globals, generated functions, then the stage procedures.

pub mod templates;

use std::collections::BTreeSet;

use anyhow::Result;

use crate::diagnostics::{Diagnostics, NodeErrorKind};
use crate::eval::Block;
use crate::features::FeatureRegistrar;
use crate::graph::StageInput;
use crate::ops::stage_input_info;
use crate::resources::{FunctionLibrary, ResourceTables};
use crate::types::{self, NodeResult, Stage};

pub use templates::{ShaderTemplate, TemplateField};

/// One evaluated stage ready for assembly.
pub(crate) struct StagePlan {
    pub stage: Stage,
    pub block: Block,
    pub fields: Vec<FieldValue>,
    pub stage_inputs: BTreeSet<StageInput>,
}

/// A template field with whatever the graph bound to it.
pub(crate) struct FieldValue {
    pub field: &'static TemplateField,
    /// Binding node id and its resolved result, when bound.
    pub bound: Option<(String, NodeResult)>,
}

pub(crate) struct GeneratedSource {
    /// Both stages in one annotated listing; not compilable as-is.
    pub combined: String,
    pub vertex: String,
    pub pixel: String,
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn generate(
    name: &str,
    template: &ShaderTemplate,
    features: &FeatureRegistrar,
    merged: &ResourceTables,
    functions: &FunctionLibrary,
    vertex: &StagePlan,
    pixel: &StagePlan,
    diags: &mut Diagnostics,
) -> GeneratedSource {
    let feature_block = features.declarations();
    let constants = constants_block(template);
    let vertex_io = vertex_io_block(vertex, pixel);
    let pixel_io = pixel_io_block(pixel);
    let globals = globals_block(merged);
    let generated_fns = functions_block(merged, functions);
    let vertex_main = stage_main(vertex, template, &passthrough_block(pixel), diags);
    let pixel_main = stage_main(pixel, template, "", diags);

    let vertex_source = join_sections([
        "#version 450".to_string(),
        feature_block.clone(),
        constants.clone(),
        vertex_io.clone(),
        globals.clone(),
        generated_fns.clone(),
        vertex_main.clone(),
    ]);
    let pixel_source = join_sections([
        "#version 450".to_string(),
        feature_block.clone(),
        constants.clone(),
        pixel_io.clone(),
        globals.clone(),
        generated_fns.clone(),
        pixel_main.clone(),
    ]);
    let combined = join_sections([
        "#version 450".to_string(),
        format!("// {name} ({} template), generated", template.name),
        feature_block,
        constants,
        fenced("vertex stage io", &vertex_io),
        fenced("pixel stage io", &pixel_io),
        fenced("globals", &globals),
        fenced("generated functions", &generated_fns),
        fenced("vertex stage", &vertex_main),
        fenced("pixel stage", &pixel_main),
    ]);
    GeneratedSource {
        combined,
        vertex: vertex_source,
        pixel: pixel_source,
    }
}

fn constants_block(template: &ShaderTemplate) -> String {
    let mut out = String::new();
    for (name, value) in template.constants {
        out.push_str(&format!("const float {name} = {value};\n"));
    }
    out
}

/// Vertex-stage io: every attribute either stage reads plus the position
/// the epilogue needs, then an `out` varying for each pixel-read input.
fn vertex_io_block(vertex: &StagePlan, pixel: &StagePlan) -> String {
    let mut attributes: BTreeSet<StageInput> = BTreeSet::new();
    attributes.insert(StageInput::Position);
    for &input in vertex.stage_inputs.iter().chain(pixel.stage_inputs.iter()) {
        attributes.insert(input);
    }
    let mut out = String::new();
    for &input in &attributes {
        let Some(info) = stage_input_info(input) else {
            continue;
        };
        let Some(glsl) = info.ty.glsl() else {
            continue;
        };
        out.push_str(&format!(
            "layout(location = {}) in {glsl} {};\n",
            info.location, info.attribute
        ));
    }
    for &input in &pixel.stage_inputs {
        let Some(info) = stage_input_info(input) else {
            continue;
        };
        let Some(glsl) = info.ty.glsl() else {
            continue;
        };
        out.push_str(&format!(
            "layout(location = {}) out {glsl} {};\n",
            info.location, info.varying
        ));
    }
    out
}

fn pixel_io_block(pixel: &StagePlan) -> String {
    let mut out = String::new();
    for &input in &pixel.stage_inputs {
        let Some(info) = stage_input_info(input) else {
            continue;
        };
        let Some(glsl) = info.ty.glsl() else {
            continue;
        };
        out.push_str(&format!(
            "layout(location = {}) in {glsl} {};\n",
            info.location, info.varying
        ));
    }
    out.push_str("layout(location = 0) out vec4 out_color;\n");
    out
}

/// Copies every pixel-read attribute into its varying; runs first in the
/// vertex procedure.
fn passthrough_block(pixel: &StagePlan) -> String {
    let mut out = String::new();
    for &input in &pixel.stage_inputs {
        let Some(info) = stage_input_info(input) else {
            continue;
        };
        out.push_str(&format!("    {} = {};\n", info.varying, info.attribute));
    }
    out
}

fn globals_block(merged: &ResourceTables) -> String {
    let mut out = String::new();
    for entry in &merged.parameters {
        out.push_str(&entry.declaration);
        out.push('\n');
    }
    for entry in &merged.textures {
        out.push_str(&entry.declaration);
        out.push('\n');
    }
    for entry in &merged.samplers {
        out.push_str(&entry.declaration);
        out.push('\n');
    }
    for entry in &merged.globals {
        out.push_str(&entry.declaration);
        out.push('\n');
    }
    out
}

fn functions_block(merged: &ResourceTables, functions: &FunctionLibrary) -> String {
    let mut parts: Vec<String> = Vec::new();
    for entry in &merged.gradients {
        parts.push(entry.source.trim_end().to_string());
    }
    for (_, source) in functions.sources_for(&merged.functions_used) {
        parts.push(source.trim_end().to_string());
    }
    let mut out = parts.join("\n\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn stage_main(
    plan: &StagePlan,
    template: &ShaderTemplate,
    passthroughs: &str,
    diags: &mut Diagnostics,
) -> String {
    let mut out = String::from("void main() {\n");
    out.push_str(passthroughs);
    out.push_str(&plan.block.assemble("    "));
    for value in &plan.fields {
        out.push_str(&field_local(diags, value));
    }
    for line in template.epilogue(plan.stage).lines() {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("}\n");
    out
}

/// Initialize one `mat_{field}` local, casting the bound result to the
/// field's width. Invalid bindings fall back to the template default; the
/// upstream failure is already on record.
fn field_local(diags: &mut Diagnostics, value: &FieldValue) -> String {
    let field = value.field;
    let Some(glsl) = field.ty.glsl() else {
        return String::new();
    };
    let code = match &value.bound {
        Some((node, result)) if result.is_valid() => match field_cast(result, field) {
            Ok(code) => code,
            Err(err) => {
                diags.node_error(node, NodeErrorKind::IllegalCast(err.to_string()));
                field.default.to_string()
            }
        },
        _ => field.default.to_string(),
    };
    format!("    {glsl} mat_{} = {code};\n", field.name)
}

fn field_cast(result: &NodeResult, field: &TemplateField) -> Result<String> {
    let cast = types::cast(result, field.ty.components(), 0.0)?;
    Ok(cast.code()?.to_string())
}

fn fenced(label: &str, content: &str) -> String {
    if content.trim().is_empty() {
        String::new()
    } else {
        format!("//---- {label}\n{content}")
    }
}

fn join_sections<I>(sections: I) -> String
where
    I: IntoIterator<Item = String>,
{
    let mut out = String::new();
    for section in sections {
        let trimmed = section.trim_end();
        if trimmed.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(trimmed);
        out.push('\n');
    }
    out
}
