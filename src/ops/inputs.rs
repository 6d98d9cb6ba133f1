//! Stage-provided inputs and their interpolant plumbing.

use anyhow::{Result, bail};

use crate::diagnostics::NodeErrorKind;
use crate::eval::Evaluator;
use crate::graph::StageInput;
use crate::types::{NodeResult, ResultType, Stage};

/// How a stage input maps onto vertex attributes and varyings.
pub(crate) struct StageInputInfo {
    pub ty: ResultType,
    pub attribute: &'static str,
    pub varying: &'static str,
    pub location: u32,
}

/// Interpolant mapping for inputs that originate as vertex attributes.
/// `ScreenPosition` and `Time` have no attribute and return `None`.
pub(crate) fn stage_input_info(input: StageInput) -> Option<StageInputInfo> {
    let info = match input {
        StageInput::Position => StageInputInfo {
            ty: ResultType::Vector3,
            attribute: "in_position",
            varying: "vs_position",
            location: 0,
        },
        StageInput::Normal => StageInputInfo {
            ty: ResultType::Vector3,
            attribute: "in_normal",
            varying: "vs_normal",
            location: 1,
        },
        StageInput::TexCoord => StageInputInfo {
            ty: ResultType::Vector2,
            attribute: "in_texcoord",
            varying: "vs_texcoord",
            location: 2,
        },
        StageInput::VertexColor => StageInputInfo {
            ty: ResultType::Color,
            attribute: "in_color",
            varying: "vs_color",
            location: 3,
        },
        StageInput::ScreenPosition | StageInput::Time => return None,
    };
    Some(info)
}

pub(crate) fn stage_input(ev: &mut Evaluator<'_>, input: StageInput) -> Result<NodeResult> {
    match input {
        StageInput::Time => {
            ev.resources
                .register_global("g_flTime", "uniform float g_flTime;");
            Ok(NodeResult::expr(ResultType::Float, "g_flTime"))
        }
        StageInput::ScreenPosition => {
            if ev.stage() != Stage::Pixel {
                bail!(NodeErrorKind::NotAvailableInStage {
                    input: "screenPosition".to_string(),
                    stage: ev.stage().label().to_string(),
                });
            }
            Ok(NodeResult::expr(ResultType::Vector4, "gl_FragCoord"))
        }
        _ => {
            let Some(info) = stage_input_info(input) else {
                bail!(NodeErrorKind::Other(format!(
                    "no interpolant mapping for {input:?}"
                )));
            };
            let name = match ev.stage() {
                Stage::Vertex => info.attribute,
                Stage::Pixel => info.varying,
            };
            ev.resources.use_stage_input(input);
            Ok(NodeResult::expr(info.ty, name))
        }
    }
}
