//! Core value types shared by the evaluator and the code generator.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

/// Result type of a resolved graph value.
///
/// Declaration order matters: feature switches pick the branch type with the
/// highest discriminant, so reordering variants changes compiled output.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResultType {
    Bool,
    Int,
    Float,
    Vector2,
    Vector3,
    Vector4,
    Color,
    Float2x2,
    Float3x3,
    Float4x4,
    Sampler,
    Texture2D,
    TextureCube,
    Gradient,
    Void,
    Bundle,
    Invalid,
}

impl ResultType {
    /// Number of scalar components, or 0 for opaque/metadata types.
    pub fn components(self) -> u8 {
        match self {
            ResultType::Bool | ResultType::Int | ResultType::Float => 1,
            ResultType::Vector2 => 2,
            ResultType::Vector3 => 3,
            ResultType::Vector4 | ResultType::Color | ResultType::Float2x2 => 4,
            ResultType::Float3x3 => 9,
            ResultType::Float4x4 => 16,
            ResultType::Sampler
            | ResultType::Texture2D
            | ResultType::TextureCube
            | ResultType::Gradient
            | ResultType::Void
            | ResultType::Bundle
            | ResultType::Invalid => 0,
        }
    }

    /// Returns the GLSL type name, or None for types with no source-level spelling.
    pub fn glsl(self) -> Option<&'static str> {
        match self {
            ResultType::Bool => Some("bool"),
            ResultType::Int => Some("int"),
            ResultType::Float => Some("float"),
            ResultType::Vector2 => Some("vec2"),
            ResultType::Vector3 => Some("vec3"),
            ResultType::Vector4 | ResultType::Color => Some("vec4"),
            ResultType::Float2x2 => Some("mat2"),
            ResultType::Float3x3 => Some("mat3"),
            ResultType::Float4x4 => Some("mat4"),
            ResultType::Sampler => Some("sampler"),
            ResultType::Texture2D => Some("sampler2D"),
            ResultType::TextureCube => Some("samplerCube"),
            ResultType::Gradient | ResultType::Void | ResultType::Bundle | ResultType::Invalid => {
                None
            }
        }
    }

    /// Whether component casting applies to this type. Bools are excluded:
    /// there is no sensible fill for padding them into vectors.
    pub fn is_castable(self) -> bool {
        matches!(
            self,
            ResultType::Int
                | ResultType::Float
                | ResultType::Vector2
                | ResultType::Vector3
                | ResultType::Vector4
                | ResultType::Color
        )
    }

    /// The castable type with the given component count.
    pub fn vector_with(components: u8) -> Result<ResultType> {
        Ok(match components {
            1 => ResultType::Float,
            2 => ResultType::Vector2,
            3 => ResultType::Vector3,
            4 => ResultType::Vector4,
            n => bail!("no vector type with {n} components"),
        })
    }

    /// Zero literal used to seed switch accumulators and padded casts.
    pub fn default_literal(self) -> Option<String> {
        Some(match self {
            ResultType::Bool => "false".to_string(),
            ResultType::Int => "0".to_string(),
            ResultType::Float => "0.0".to_string(),
            ResultType::Vector2 => "vec2(0.0, 0.0)".to_string(),
            ResultType::Vector3 => "vec3(0.0, 0.0, 0.0)".to_string(),
            ResultType::Vector4 | ResultType::Color => "vec4(0.0, 0.0, 0.0, 0.0)".to_string(),
            ResultType::Float2x2 => "mat2(0.0)".to_string(),
            ResultType::Float3x3 => "mat3(0.0)".to_string(),
            ResultType::Float4x4 => "mat4(0.0)".to_string(),
            _ => return None,
        })
    }
}

/// Compilation mode selected by the caller.
///
/// Preview substitutes defaults for failed subtrees and always emits source;
/// final refuses to emit if any error was recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompileMode {
    Preview,
    Final,
}

/// Shader stage being evaluated. Each stage owns its resource tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Vertex,
    Pixel,
}

impl Stage {
    pub fn label(self) -> &'static str {
        match self {
            Stage::Vertex => "vertex",
            Stage::Pixel => "pixel",
        }
    }
}

/// Payload of a node result: either expression text or a metadata reference
/// that has no source-level spelling of its own.
#[derive(Clone, Debug, PartialEq)]
pub enum ResultPayload {
    /// GLSL expression text.
    Code(String),
    /// Name of a registered texture, sampler or gradient.
    Resource(String),
    /// Named output slots of a custom-function call, keyed by output name.
    Bundle(Vec<(String, NodeResult)>),
}

/// A resolved graph value: the unit the evaluator caches and the generator consumes.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeResult {
    pub ty: ResultType,
    pub payload: ResultPayload,
    /// Constant results are inlined at every use instead of becoming locals.
    pub constant: bool,
    /// Component count; tracked separately from `ty` because casting adjusts it.
    pub components: u8,
    /// Preview-mode inspection id assigned when the result is materialized.
    pub preview_id: Option<u32>,
    /// Id of the function-call node whose emitted statement fills this value.
    pub deferred_target: Option<String>,
}

impl NodeResult {
    /// A non-constant expression result.
    pub fn expr(ty: ResultType, code: impl Into<String>) -> Self {
        Self {
            ty,
            payload: ResultPayload::Code(code.into()),
            constant: false,
            components: ty.components(),
            preview_id: None,
            deferred_target: None,
        }
    }

    /// A constant expression result; never materialized as a local.
    pub fn constant(ty: ResultType, code: impl Into<String>) -> Self {
        Self {
            constant: true,
            ..Self::expr(ty, code)
        }
    }

    /// A metadata-only result referencing a registered resource by name.
    pub fn resource(ty: ResultType, name: impl Into<String>) -> Self {
        Self {
            ty,
            payload: ResultPayload::Resource(name.into()),
            constant: false,
            components: 0,
            preview_id: None,
            deferred_target: None,
        }
    }

    /// The invalid sentinel returned for every failed resolution.
    pub fn invalid() -> Self {
        Self {
            ty: ResultType::Invalid,
            payload: ResultPayload::Code(String::new()),
            constant: false,
            components: 0,
            preview_id: None,
            deferred_target: None,
        }
    }

    /// Valid results have a real type and either code text or a payload.
    pub fn is_valid(&self) -> bool {
        if self.ty == ResultType::Invalid {
            return false;
        }
        match &self.payload {
            ResultPayload::Code(code) => !code.is_empty() || self.ty == ResultType::Void,
            ResultPayload::Resource(name) => !name.is_empty(),
            ResultPayload::Bundle(slots) => !slots.is_empty(),
        }
    }

    /// Expression text, or an error for metadata-only results.
    pub fn code(&self) -> Result<&str> {
        match &self.payload {
            ResultPayload::Code(code) => Ok(code),
            other => bail!("result of type {:?} carries no code ({other:?})", self.ty),
        }
    }

    /// Registered resource name, or an error for expression results.
    pub fn resource_name(&self) -> Result<&str> {
        match &self.payload {
            ResultPayload::Resource(name) => Ok(name),
            _ => bail!("result of type {:?} is not a resource reference", self.ty),
        }
    }
}

/// Format a float as a GLSL literal, trimming trailing zeros but keeping a
/// decimal point so the literal stays a float.
pub fn fmt_float(v: f32) -> String {
    if !v.is_finite() {
        return "0.0".to_string();
    }
    let s = format!("{v:.9}");
    let trimmed = s.trim_end_matches('0');
    let trimmed = if trimmed.ends_with('.') {
        &s[..trimmed.len() + 1]
    } else {
        trimmed
    };
    trimmed.to_string()
}

/// Sanitize a string to be a valid GLSL identifier.
pub fn sanitize_ident(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Split a comma-separated argument list at the top nesting level.
fn split_top_level_args(s: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, ch) in s.char_indices() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                out.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(s[start..].trim());
    out
}

fn is_numeric_literal(s: &str) -> bool {
    s.parse::<f32>().is_ok()
}

/// If `code` is a vector constructor whose first argument covers exactly
/// `target` components and every remaining argument is a numeric literal,
/// return the first argument. Undoes padding introduced by [`cast`].
fn strip_padded_constructor(code: &str, total: u8, target: u8) -> Option<String> {
    let open = code.find('(')?;
    let head = &code[..open];
    if !matches!(head, "vec2" | "vec3" | "vec4") || !code.ends_with(')') {
        return None;
    }
    let args = split_top_level_args(&code[open + 1..code.len() - 1]);
    if args.len() < 2 {
        return None;
    }
    if !args[1..].iter().all(|a| is_numeric_literal(a)) {
        return None;
    }
    let pad = (args.len() - 1) as u8;
    if total.checked_sub(pad)? == target {
        Some(args[0].to_string())
    } else {
        None
    }
}

/// Cast a result to a target component count.
///
/// Equal widths pass through unchanged. Widening wraps the expression in a
/// constructor padded with `fill`; narrowing truncates with a swizzle, after
/// first unwinding any padding a previous widening introduced so that an
/// expand-then-slice round trip restores the original expression.
pub fn cast(result: &NodeResult, target: u8, fill: f32) -> Result<NodeResult> {
    let from = result.components;
    if from == target {
        return Ok(result.clone());
    }
    if !result.ty.is_castable() {
        bail!(
            "cannot cast {:?} to {target} component{}",
            result.ty,
            if target == 1 { "" } else { "s" }
        );
    }
    let code = result.code()?;
    let ty = if target == result.ty.components() {
        result.ty
    } else {
        ResultType::vector_with(target)?
    };
    let text = if from < target {
        let ctor = ty.glsl().unwrap_or("vec4");
        let mut args = vec![code.to_string()];
        for _ in from..target {
            args.push(fmt_float(fill));
        }
        format!("{ctor}({})", args.join(", "))
    } else {
        match strip_padded_constructor(code, from, target) {
            Some(inner) => inner,
            None => {
                let swizzle = &"xyzw"[..target as usize];
                format!("{code}.{swizzle}")
            }
        }
    };
    let mut out = NodeResult {
        ty,
        payload: ResultPayload::Code(text),
        components: target,
        ..result.clone()
    };
    out.preview_id = None;
    Ok(out)
}

/// Coerce two results for a binary operation, widening the narrower side.
///
/// Promotion pads with 0.0 and yields the wider operand's type.
pub fn promote_binary(a: &NodeResult, b: &NodeResult) -> Result<(NodeResult, NodeResult, ResultType)> {
    if !a.ty.is_castable() || !b.ty.is_castable() {
        bail!("incompatible types for binary op: {:?} and {:?}", a.ty, b.ty);
    }
    if a.components == b.components {
        let ty = a.ty.max(b.ty);
        return Ok((a.clone(), b.clone(), ty));
    }
    if a.components < b.components {
        let aa = cast(a, b.components, 0.0)?;
        return Ok((aa, b.clone(), b.ty));
    }
    let bb = cast(b, a.components, 0.0)?;
    let ty = a.ty;
    Ok((a.clone(), bb, ty))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fmt_float_trims_zeros_but_keeps_point() {
        assert_eq!(fmt_float(1.0), "1.0");
        assert_eq!(fmt_float(0.5), "0.5");
        assert_eq!(fmt_float(-2.25), "-2.25");
        assert_eq!(fmt_float(f32::NAN), "0.0");
    }

    #[test]
    fn sanitize_replaces_and_guards_leading_digit() {
        assert_eq!(sanitize_ident("My Color!"), "My_Color_");
        assert_eq!(sanitize_ident("2sided"), "_2sided");
        assert_eq!(sanitize_ident(""), "_");
    }

    #[test]
    fn cast_pass_through_on_equal_components() {
        let c = NodeResult::expr(ResultType::Color, "base_color");
        let out = cast(&c, 4, 0.0).unwrap();
        assert_eq!(out.ty, ResultType::Color);
        assert_eq!(out.code().unwrap(), "base_color");
    }

    #[test]
    fn cast_widens_with_fill() {
        let x = NodeResult::expr(ResultType::Float, "x");
        let out = cast(&x, 3, 0.0).unwrap();
        assert_eq!(out.ty, ResultType::Vector3);
        assert_eq!(out.code().unwrap(), "vec3(x, 0.0, 0.0)");
    }

    #[test]
    fn cast_narrow_swizzles() {
        let v = NodeResult::expr(ResultType::Vector4, "v");
        let out = cast(&v, 2, 0.0).unwrap();
        assert_eq!(out.code().unwrap(), "v.xy");
    }

    #[test]
    fn cast_round_trip_restores_original_text() {
        let x = NodeResult::expr(ResultType::Float, "x + y");
        let wide = cast(&x, 4, 0.0).unwrap();
        assert_eq!(wide.code().unwrap(), "vec4(x + y, 0.0, 0.0, 0.0)");
        let back = cast(&wide, 1, 0.0).unwrap();
        assert_eq!(back.code().unwrap(), "x + y");
    }

    #[test]
    fn cast_round_trip_with_nonzero_fill() {
        let v = NodeResult::expr(ResultType::Vector2, "uv");
        let wide = cast(&v, 4, 1.0).unwrap();
        assert_eq!(wide.code().unwrap(), "vec4(uv, 1.0, 1.0)");
        let back = cast(&wide, 2, 0.0).unwrap();
        assert_eq!(back.code().unwrap(), "uv");
    }

    #[test]
    fn cast_does_not_unwrap_genuine_constructors() {
        let v = NodeResult::expr(ResultType::Vector4, "vec4(a, b, c, d)");
        let out = cast(&v, 2, 0.0).unwrap();
        assert_eq!(out.code().unwrap(), "vec4(a, b, c, d).xy");
    }

    #[test]
    fn cast_rejects_matrices() {
        let m = NodeResult::expr(ResultType::Float3x3, "m");
        assert!(cast(&m, 4, 0.0).is_err());
    }

    #[test]
    fn promote_pads_scalar_operand() {
        let a = NodeResult::expr(ResultType::Float, "s");
        let b = NodeResult::expr(ResultType::Vector3, "v");
        let (aa, bb, ty) = promote_binary(&a, &b).unwrap();
        assert_eq!(aa.code().unwrap(), "vec3(s, 0.0, 0.0)");
        assert_eq!(bb.code().unwrap(), "v");
        assert_eq!(ty, ResultType::Vector3);
    }

    #[test]
    fn promote_equal_width_takes_higher_ordinal_type() {
        let a = NodeResult::expr(ResultType::Vector4, "v");
        let b = NodeResult::expr(ResultType::Color, "c");
        let (_, _, ty) = promote_binary(&a, &b).unwrap();
        assert_eq!(ty, ResultType::Color);
    }

    #[test]
    fn constant_flag_survives_cast() {
        let k = NodeResult::constant(ResultType::Float, "1.0");
        let out = cast(&k, 2, 0.0).unwrap();
        assert!(out.constant);
        assert_eq!(out.code().unwrap(), "vec2(1.0, 0.0)");
    }

    use proptest::prelude::*;

    proptest! {
        #[test]
        fn fmt_float_stays_a_float_literal(v in -1.0e6f32..1.0e6) {
            let s = fmt_float(v);
            prop_assert!(s.contains('.'), "{s:?} lost its decimal point");
            prop_assert!(s.parse::<f32>().is_ok(), "{s:?} does not parse");
        }

        #[test]
        fn sanitize_ident_is_idempotent(s in ".{0,24}") {
            let once = sanitize_ident(&s);
            prop_assert!(!once.is_empty());
            prop_assert!(once.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
            prop_assert!(!once.starts_with(|c: char| c.is_ascii_digit()));
            prop_assert_eq!(sanitize_ident(&once), once);
        }

        #[test]
        fn cast_expand_then_slice_restores_expression(
            name in "[a-z][a-z0-9_]{0,8}",
            from in 1u8..=3,
            extra in 1u8..=3,
            fill in -100.0f32..100.0,
        ) {
            let target = (from + extra).min(4);
            let source = NodeResult::expr(ResultType::vector_with(from).unwrap(), &name);
            let wide = cast(&source, target, fill).unwrap();
            let back = cast(&wide, from, fill).unwrap();
            prop_assert_eq!(back.code().unwrap(), name.as_str());
        }

        #[test]
        fn promote_is_symmetric_in_type(wa in 1u8..=4, wb in 1u8..=4) {
            let a = NodeResult::expr(ResultType::vector_with(wa).unwrap(), "a");
            let b = NodeResult::expr(ResultType::vector_with(wb).unwrap(), "b");
            let (pa, pb, ty) = promote_binary(&a, &b).unwrap();
            let (_, _, ty_rev) = promote_binary(&b, &a).unwrap();
            prop_assert_eq!(ty, ty_rev);
            prop_assert_eq!(pa.components, wa.max(wb));
            prop_assert_eq!(pb.components, wa.max(wb));
        }
    }
}
