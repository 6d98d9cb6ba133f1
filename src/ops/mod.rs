//! Emission of operation nodes.
//!
//! Each function turns one resolved node into GLSL expression text. None of
//! them materialize locals themselves; the evaluator decides what becomes a
//! named local after emission.

mod inputs;
mod math;
mod texture;
mod vector;

pub(crate) use inputs::stage_input_info;

use anyhow::Result;

use crate::eval::{Block, Evaluator};
use crate::graph::{Node, Op};
use crate::types::NodeResult;

pub(crate) fn emit<'a>(
    ev: &mut Evaluator<'a>,
    block: &mut Block,
    node: &'a Node,
    op: &Op,
) -> Result<NodeResult> {
    match op {
        Op::Constant(value) => Ok(value.constant_result()),
        Op::StageInput(input) => inputs::stage_input(ev, *input),
        Op::Binary(op) => math::binary(ev, block, node, *op),
        Op::Unary(op) => math::unary(ev, block, node, *op),
        Op::Lerp => math::lerp(ev, block, node),
        Op::Clamp => math::clamp(ev, block, node),
        Op::Dot => vector::dot(ev, block, node),
        Op::Cross => vector::cross(ev, block, node),
        Op::Normalize => vector::normalize(ev, block, node),
        Op::Length => vector::length(ev, block, node),
        Op::Swizzle { pattern } => vector::swizzle(ev, block, node, pattern),
        Op::Combine => vector::combine(ev, block, node),
        Op::TextureObject(def) => texture::texture_object(ev, node, def),
        Op::SampleTexture2D { sampler } => texture::sample_2d(ev, block, node, sampler),
        Op::SampleTextureCube { sampler } => texture::sample_cube(ev, block, node, sampler),
        Op::GradientObject(def) => texture::gradient_object(ev, def),
        Op::SampleGradient => texture::sample_gradient(ev, block, node),
        Op::Switch(def) => ev.resolve_switch(block, node, def),
    }
}
