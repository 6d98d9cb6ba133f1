//! Arithmetic and interpolation nodes.

use anyhow::{Result, bail};

use crate::diagnostics::NodeErrorKind;
use crate::eval::{Block, Evaluator};
use crate::graph::{BinaryOp, Node, UnaryOp};
use crate::types::{NodeResult, ResultType};

pub(crate) fn binary(
    ev: &mut Evaluator<'_>,
    block: &mut Block,
    node: &Node,
    op: BinaryOp,
) -> Result<NodeResult> {
    let a = ev.require_input(block, node, "a")?;
    let b = ev.require_input(block, node, "b")?;
    let (a, b, ty) = ev.promote_inputs(&a, &b)?;
    let (lhs, rhs) = (a.code()?, b.code()?);
    let text = match op {
        BinaryOp::Add => format!("({lhs} + {rhs})"),
        BinaryOp::Subtract => format!("({lhs} - {rhs})"),
        BinaryOp::Multiply => format!("({lhs} * {rhs})"),
        BinaryOp::Divide => format!("({lhs} / {rhs})"),
        BinaryOp::Min => format!("min({lhs}, {rhs})"),
        BinaryOp::Max => format!("max({lhs}, {rhs})"),
        BinaryOp::Power => format!("pow({lhs}, {rhs})"),
        BinaryOp::Step => format!("step({lhs}, {rhs})"),
    };
    let mut out = NodeResult::expr(ty, text);
    out.constant = a.constant && b.constant;
    Ok(out)
}

pub(crate) fn unary(
    ev: &mut Evaluator<'_>,
    block: &mut Block,
    node: &Node,
    op: UnaryOp,
) -> Result<NodeResult> {
    let x = ev.require_input(block, node, "x")?;
    if !x.ty.is_castable() {
        bail!(NodeErrorKind::IllegalCast(format!(
            "cannot apply {op:?} to {:?}",
            x.ty
        )));
    }
    let code = x.code()?;
    let text = match op {
        UnaryOp::Abs => format!("abs({code})"),
        UnaryOp::Floor => format!("floor({code})"),
        UnaryOp::Frac => format!("fract({code})"),
        UnaryOp::Saturate => format!("clamp({code}, 0.0, 1.0)"),
        UnaryOp::Negate => format!("(-{code})"),
        UnaryOp::OneMinus => format!("(1.0 - {code})"),
        UnaryOp::Sin => format!("sin({code})"),
        UnaryOp::Cos => format!("cos({code})"),
        UnaryOp::SquareRoot => format!("sqrt({code})"),
    };
    let mut out = NodeResult::expr(x.ty, text);
    out.components = x.components;
    out.constant = x.constant;
    Ok(out)
}

pub(crate) fn lerp(ev: &mut Evaluator<'_>, block: &mut Block, node: &Node) -> Result<NodeResult> {
    let a = ev.require_input(block, node, "a")?;
    let b = ev.require_input(block, node, "b")?;
    let t = ev.require_input(block, node, "t")?;
    let (a, b, ty) = ev.promote_inputs(&a, &b)?;
    if !ty.is_castable() {
        bail!(NodeErrorKind::IllegalCast(format!("cannot lerp {ty:?}")));
    }
    // mix accepts a scalar blend factor for vector operands.
    let factor = if t.components == 1 {
        t.clone()
    } else {
        ev.cast_input(&t, ty.components(), 0.0)?
    };
    let text = format!("mix({}, {}, {})", a.code()?, b.code()?, factor.code()?);
    let mut out = NodeResult::expr(ty, text);
    out.constant = a.constant && b.constant && t.constant;
    Ok(out)
}

pub(crate) fn clamp(ev: &mut Evaluator<'_>, block: &mut Block, node: &Node) -> Result<NodeResult> {
    let x = ev.require_input(block, node, "x")?;
    if !x.ty.is_castable() {
        bail!(NodeErrorKind::IllegalCast(format!(
            "cannot clamp {:?}",
            x.ty
        )));
    }
    let min = some_or_scalar(ev.input(block, node, "min"), "0.0");
    let max = some_or_scalar(ev.input(block, node, "max"), "1.0");
    // Bounds are either both scalar or both cast to the operand's width;
    // GLSL has no mixed form.
    let (lo, hi) = if min.components == 1 && max.components == 1 {
        (min.clone(), max.clone())
    } else {
        (
            ev.cast_input(&min, x.components, 0.0)?,
            ev.cast_input(&max, x.components, 1.0)?,
        )
    };
    let text = format!("clamp({}, {}, {})", x.code()?, lo.code()?, hi.code()?);
    let mut out = NodeResult::expr(x.ty, text);
    out.components = x.components;
    out.constant = x.constant && min.constant && max.constant;
    Ok(out)
}

fn some_or_scalar(result: NodeResult, fallback: &str) -> NodeResult {
    if result.is_valid() {
        result
    } else {
        NodeResult::constant(ResultType::Float, fallback)
    }
}
