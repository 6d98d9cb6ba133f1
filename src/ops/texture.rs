//! Texture, sampler and gradient nodes.

use anyhow::{Result, bail};

use crate::diagnostics::NodeErrorKind;
use crate::eval::{Block, Evaluator};
use crate::graph::{Node, StageInput};
use crate::resources::{GradientDef, SamplerDef, TextureDef};
use crate::types::{NodeResult, ResultType};

use super::inputs;

/// Register the texture and hand back a metadata reference to its global.
/// Declaring an output of type `textureCube` makes the object a cube map.
pub(crate) fn texture_object(
    ev: &mut Evaluator<'_>,
    node: &Node,
    def: &TextureDef,
) -> Result<NodeResult> {
    let cube = node
        .outputs
        .first()
        .map(|o| o.ty == ResultType::TextureCube)
        .unwrap_or(false);
    let pipeline = ev.pipeline();
    let name = ev.resources.register_texture(def, cube, pipeline)?;
    let ty = if cube {
        ResultType::TextureCube
    } else {
        ResultType::Texture2D
    };
    Ok(NodeResult::resource(ty, name))
}

pub(crate) fn gradient_object(ev: &mut Evaluator<'_>, def: &GradientDef) -> Result<NodeResult> {
    let function = ev.resources.register_gradient(def);
    Ok(NodeResult::resource(ResultType::Gradient, function))
}

pub(crate) fn sample_2d(
    ev: &mut Evaluator<'_>,
    block: &mut Block,
    node: &Node,
    sampler: &SamplerDef,
) -> Result<NodeResult> {
    let tex = ev.require_input(block, node, "texture")?;
    if tex.ty != ResultType::Texture2D {
        bail!(NodeErrorKind::IllegalCast(format!(
            "sample expects a 2d texture, got {:?}",
            tex.ty
        )));
    }
    let tex_name = tex.resource_name()?.to_string();
    // Unconnected uv falls back to the mesh texcoord.
    let uv = ev.input(block, node, "uv");
    let uv = if uv.is_valid() {
        ev.cast_input(&uv, 2, 0.0)?
    } else {
        inputs::stage_input(ev, StageInput::TexCoord)?
    };
    ev.resources.register_sampler(sampler);
    Ok(NodeResult::expr(
        ResultType::Color,
        format!("texture({tex_name}, {})", uv.code()?),
    ))
}

pub(crate) fn sample_cube(
    ev: &mut Evaluator<'_>,
    block: &mut Block,
    node: &Node,
    sampler: &SamplerDef,
) -> Result<NodeResult> {
    let tex = ev.require_input(block, node, "texture")?;
    if tex.ty != ResultType::TextureCube {
        bail!(NodeErrorKind::IllegalCast(format!(
            "sample expects a cube texture, got {:?}",
            tex.ty
        )));
    }
    let tex_name = tex.resource_name()?.to_string();
    let direction = ev.require_input(block, node, "direction")?;
    let direction = ev.cast_input(&direction, 3, 0.0)?;
    ev.resources.register_sampler(sampler);
    Ok(NodeResult::expr(
        ResultType::Color,
        format!("texture({tex_name}, {})", direction.code()?),
    ))
}

pub(crate) fn sample_gradient(
    ev: &mut Evaluator<'_>,
    block: &mut Block,
    node: &Node,
) -> Result<NodeResult> {
    let gradient = ev.require_input(block, node, "gradient")?;
    if gradient.ty != ResultType::Gradient {
        bail!(NodeErrorKind::IllegalCast(format!(
            "sample expects a gradient, got {:?}",
            gradient.ty
        )));
    }
    let function = gradient.resource_name()?.to_string();
    let t = ev.require_input(block, node, "t")?;
    let t = ev.cast_input(&t, 1, 0.0)?;
    Ok(NodeResult::expr(
        ResultType::Color,
        format!("{function}({})", t.code()?),
    ))
}
