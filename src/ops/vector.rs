//! Vector construction, decomposition and geometry nodes.

use anyhow::{Result, bail};

use crate::diagnostics::NodeErrorKind;
use crate::eval::{Block, Evaluator};
use crate::graph::Node;
use crate::types::{NodeResult, ResultType};

pub(crate) fn dot(ev: &mut Evaluator<'_>, block: &mut Block, node: &Node) -> Result<NodeResult> {
    let a = ev.require_input(block, node, "a")?;
    let b = ev.require_input(block, node, "b")?;
    let (a, b, ty) = ev.promote_inputs(&a, &b)?;
    if !ty.is_castable() {
        bail!(NodeErrorKind::IllegalCast(format!(
            "dot requires vector operands, got {ty:?}"
        )));
    }
    let text = if a.components == 1 {
        format!("({} * {})", a.code()?, b.code()?)
    } else {
        format!("dot({}, {})", a.code()?, b.code()?)
    };
    let mut out = NodeResult::expr(ResultType::Float, text);
    out.constant = a.constant && b.constant;
    Ok(out)
}

pub(crate) fn cross(ev: &mut Evaluator<'_>, block: &mut Block, node: &Node) -> Result<NodeResult> {
    let a = ev.require_input(block, node, "a")?;
    let b = ev.require_input(block, node, "b")?;
    let a3 = ev.cast_input(&a, 3, 0.0)?;
    let b3 = ev.cast_input(&b, 3, 0.0)?;
    let text = format!("cross({}, {})", a3.code()?, b3.code()?);
    let mut out = NodeResult::expr(ResultType::Vector3, text);
    out.constant = a.constant && b.constant;
    Ok(out)
}

pub(crate) fn normalize(
    ev: &mut Evaluator<'_>,
    block: &mut Block,
    node: &Node,
) -> Result<NodeResult> {
    let x = ev.require_input(block, node, "x")?;
    if !x.ty.is_castable() || x.components < 2 {
        bail!(NodeErrorKind::IllegalCast(format!(
            "normalize requires a vector, got {:?}",
            x.ty
        )));
    }
    let mut out = NodeResult::expr(x.ty, format!("normalize({})", x.code()?));
    out.components = x.components;
    out.constant = x.constant;
    Ok(out)
}

pub(crate) fn length(
    ev: &mut Evaluator<'_>,
    block: &mut Block,
    node: &Node,
) -> Result<NodeResult> {
    let x = ev.require_input(block, node, "x")?;
    if !x.ty.is_castable() {
        bail!(NodeErrorKind::IllegalCast(format!(
            "length requires a vector, got {:?}",
            x.ty
        )));
    }
    let text = if x.components == 1 {
        format!("abs({})", x.code()?)
    } else {
        format!("length({})", x.code()?)
    };
    let mut out = NodeResult::expr(ResultType::Float, text);
    out.constant = x.constant;
    Ok(out)
}

/// Extract components by pattern, e.g. `xy`, `zw` or `rgb`.
pub(crate) fn swizzle(
    ev: &mut Evaluator<'_>,
    block: &mut Block,
    node: &Node,
    pattern: &str,
) -> Result<NodeResult> {
    let x = ev.require_input(block, node, "x")?;
    if !x.ty.is_castable() || x.components < 2 {
        bail!(NodeErrorKind::IllegalCast(format!(
            "cannot swizzle {:?}",
            x.ty
        )));
    }
    if pattern.is_empty() || pattern.len() > 4 {
        bail!(NodeErrorKind::Other(format!(
            "swizzle pattern `{pattern}` must name 1 to 4 components"
        )));
    }
    let mut normalized = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        let index = match c {
            'x' | 'r' => 0,
            'y' | 'g' => 1,
            'z' | 'b' => 2,
            'w' | 'a' => 3,
            _ => bail!(NodeErrorKind::Other(format!(
                "swizzle pattern `{pattern}` has unknown component `{c}`"
            ))),
        };
        if index >= x.components {
            bail!(NodeErrorKind::IllegalCast(format!(
                "component `{c}` is out of range for {:?}",
                x.ty
            )));
        }
        normalized.push(['x', 'y', 'z', 'w'][index as usize]);
    }
    let ty = if normalized.len() == 1 {
        ResultType::Float
    } else {
        ResultType::vector_with(normalized.len() as u8)?
    };
    let mut out = NodeResult::expr(ty, format!("{}.{normalized}", x.code()?));
    out.constant = x.constant;
    Ok(out)
}

/// Build a vector from scalar inputs; `z` and `w` are optional and widen
/// the result when connected.
pub(crate) fn combine(
    ev: &mut Evaluator<'_>,
    block: &mut Block,
    node: &Node,
) -> Result<NodeResult> {
    let x = ev.require_input(block, node, "x")?;
    let y = ev.require_input(block, node, "y")?;
    let z = ev.input(block, node, "z");
    let w = ev.input(block, node, "w");

    let mut parts = vec![
        ev.cast_input(&x, 1, 0.0)?.code()?.to_string(),
        ev.cast_input(&y, 1, 0.0)?.code()?.to_string(),
    ];
    let mut constant = x.constant && y.constant;
    if z.is_valid() || w.is_valid() {
        if z.is_valid() {
            parts.push(ev.cast_input(&z, 1, 0.0)?.code()?.to_string());
            constant = constant && z.constant;
        } else {
            parts.push("0.0".to_string());
        }
    }
    if w.is_valid() {
        parts.push(ev.cast_input(&w, 1, 0.0)?.code()?.to_string());
        constant = constant && w.constant;
    }

    let ty = ResultType::vector_with(parts.len() as u8)?;
    let Some(ctor) = ty.glsl() else {
        bail!(NodeErrorKind::Other("combine produced no vector type".to_string()));
    };
    let mut out = NodeResult::expr(ty, format!("{ctor}({})", parts.join(", ")));
    out.constant = constant;
    Ok(out)
}
