//! Builtin stage scaffolds the generated procedures are spliced into.

use crate::types::{ResultType, Stage};

/// One material field a template's epilogue consumes.
///
/// Every field becomes a `mat_{name}` local in its stage procedure,
/// initialized from the graph's output binding or the template default.
#[derive(Clone, Copy, Debug)]
pub struct TemplateField {
    pub name: &'static str,
    pub ty: ResultType,
    pub default: &'static str,
}

/// A fixed vertex/pixel scaffold.
#[derive(Clone, Copy, Debug)]
pub struct ShaderTemplate {
    pub name: &'static str,
    /// Shared constants emitted ahead of the global declarations.
    pub constants: &'static [(&'static str, &'static str)],
    pub vertex_fields: &'static [TemplateField],
    pub pixel_fields: &'static [TemplateField],
    pub vertex_epilogue: &'static str,
    pub pixel_epilogue: &'static str,
}

impl ShaderTemplate {
    /// Scaffold with the full material field set.
    pub fn standard() -> &'static ShaderTemplate {
        &STANDARD
    }

    /// Flat-color scaffold for UI and preview materials.
    pub fn unlit() -> &'static ShaderTemplate {
        &UNLIT
    }

    pub fn fields(&self, stage: Stage) -> &'static [TemplateField] {
        match stage {
            Stage::Vertex => self.vertex_fields,
            Stage::Pixel => self.pixel_fields,
        }
    }

    pub fn epilogue(&self, stage: Stage) -> &'static str {
        match stage {
            Stage::Vertex => self.vertex_epilogue,
            Stage::Pixel => self.pixel_epilogue,
        }
    }
}

static STANDARD: ShaderTemplate = ShaderTemplate {
    name: "standard",
    constants: &[("M_PI", "3.14159265359")],
    vertex_fields: &[TemplateField {
        name: "positionOffset",
        ty: ResultType::Vector3,
        default: "vec3(0.0, 0.0, 0.0)",
    }],
    pixel_fields: &[
        TemplateField {
            name: "albedo",
            ty: ResultType::Vector3,
            default: "vec3(1.0, 1.0, 1.0)",
        },
        TemplateField {
            name: "emission",
            ty: ResultType::Vector3,
            default: "vec3(0.0, 0.0, 0.0)",
        },
        TemplateField {
            name: "alpha",
            ty: ResultType::Float,
            default: "1.0",
        },
        TemplateField {
            name: "roughness",
            ty: ResultType::Float,
            default: "0.5",
        },
    ],
    vertex_epilogue: "gl_Position = vec4(in_position + mat_positionOffset, 1.0);",
    pixel_epilogue: "out_color = vec4(mat_albedo + mat_emission, mat_alpha);",
};

static UNLIT: ShaderTemplate = ShaderTemplate {
    name: "unlit",
    constants: &[("M_PI", "3.14159265359")],
    vertex_fields: &[TemplateField {
        name: "positionOffset",
        ty: ResultType::Vector3,
        default: "vec3(0.0, 0.0, 0.0)",
    }],
    pixel_fields: &[
        TemplateField {
            name: "albedo",
            ty: ResultType::Vector3,
            default: "vec3(1.0, 1.0, 1.0)",
        },
        TemplateField {
            name: "alpha",
            ty: ResultType::Float,
            default: "1.0",
        },
    ],
    vertex_epilogue: "gl_Position = vec4(in_position + mat_positionOffset, 1.0);",
    pixel_epilogue: "out_color = vec4(mat_albedo, mat_alpha);",
};
