//! Per-stage resource registration and the shared custom-function library.
//!
//! Every global the generated source declares goes through the tables here.
//! Registration is first-wins keyed by sanitized name: the first node to
//! claim a name decides the declaration, later registrations reuse it. Each
//! stage evaluates with its own tables; the generator merges them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::graph::{ParamValue, StageInput};
use crate::types::{fmt_float, sanitize_ident};

/// Texture declared by a graph node.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextureDef {
    pub name: String,
    /// Source image baked into the compiled default, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_image: Option<String>,
    #[serde(default = "default_true")]
    pub srgb: bool,
    /// Attribute textures skip default compilation and are bound externally.
    #[serde(default)]
    pub is_attribute: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilterMode {
    Point,
    #[default]
    Bilinear,
    Trilinear,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WrapMode {
    #[default]
    Repeat,
    Clamp,
    Mirror,
}

/// Sampler settings attached to texture-sampling nodes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplerDef {
    /// Explicit name; named samplers share one entry per name, anonymous
    /// samplers share one entry per settings combination.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub filter: FilterMode,
    #[serde(default)]
    pub wrap: WrapMode,
}

impl SamplerDef {
    pub fn global_name(&self) -> String {
        if let Some(name) = &self.name {
            return format!("g_s{}", sanitize_ident(name));
        }
        let filter = match self.filter {
            FilterMode::Point => "Point",
            FilterMode::Bilinear => "Bilinear",
            FilterMode::Trilinear => "Trilinear",
        };
        let wrap = match self.wrap {
            WrapMode::Repeat => "Repeat",
            WrapMode::Clamp => "Clamp",
            WrapMode::Mirror => "Mirror",
        };
        format!("g_s{filter}{wrap}")
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradientStop {
    pub time: f32,
    pub color: [f32; 4],
}

/// Color ramp baked into a generated lookup function.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradientDef {
    pub name: String,
    #[serde(default)]
    pub stops: Vec<GradientStop>,
}

/// User-editable material parameter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterDef {
    pub name: String,
    pub default: ParamValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f32>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextureEntry {
    pub name: String,
    pub declaration: String,
    /// Engine path of the compiled default image, if one was produced.
    pub resource_path: Option<String>,
    pub is_attribute: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SamplerEntry {
    pub name: String,
    pub declaration: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GradientEntry {
    pub name: String,
    /// Name of the generated lookup function.
    pub function: String,
    /// GLSL source of the lookup function.
    pub source: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParameterEntry {
    pub name: String,
    pub declaration: String,
    pub value: ParamValue,
    /// Attribute parameters are reported back to the caller with their value.
    pub is_attribute: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct GlobalEntry {
    pub name: String,
    pub declaration: String,
}

/// Compiles texture descriptors into engine resource paths.
///
/// The real engine bakes default images to disk; tests and headless use run
/// against [`InMemoryTexturePipeline`].
pub trait TexturePipeline {
    fn compile_image(&self, descriptor: &str) -> Result<String>;
}

/// Pipeline that assigns stable fake paths, deduplicated by descriptor text.
#[derive(Debug, Default)]
pub struct InMemoryTexturePipeline {
    state: Mutex<PipelineState>,
}

#[derive(Debug, Default)]
struct PipelineState {
    by_descriptor: HashMap<String, String>,
    compiled: Vec<(String, String)>,
}

impl InMemoryTexturePipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descriptor/path pairs in compilation order.
    pub fn compiled(&self) -> Vec<(String, String)> {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.compiled.clone()
    }
}

impl TexturePipeline for InMemoryTexturePipeline {
    fn compile_image(&self, descriptor: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(path) = state.by_descriptor.get(descriptor) {
            return Ok(path.clone());
        }
        let path = format!("generated/textures/tex_{:03}.vtex", state.compiled.len());
        state
            .by_descriptor
            .insert(descriptor.to_string(), path.clone());
        state.compiled.push((descriptor.to_string(), path.clone()));
        Ok(path)
    }
}

/// Append-only store of hand-written shader functions, shared across runs.
///
/// The first registration of a name wins; recompiling a graph that carries a
/// changed function body keeps the original until the library is rebuilt.
#[derive(Debug, Default)]
pub struct FunctionLibrary {
    inner: Mutex<BTreeMap<String, String>>,
}

impl FunctionLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the name was already taken.
    pub fn register(&self, name: &str, source: &str) -> bool {
        let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if map.contains_key(name) {
            return false;
        }
        map.insert(name.to_string(), source.to_string());
        true
    }

    pub fn get(&self, name: &str) -> Option<String> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.get(name).cloned()
    }

    /// Sources for the given names, sorted by name.
    pub fn sources_for(&self, used: &BTreeSet<String>) -> Vec<(String, String)> {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        used.iter()
            .filter_map(|name| map.get(name).map(|src| (name.clone(), src.clone())))
            .collect()
    }
}

/// Resource tables for one stage of one compilation.
#[derive(Debug, Default)]
pub struct ResourceTables {
    pub textures: Vec<TextureEntry>,
    texture_index: HashMap<String, usize>,
    pub samplers: Vec<SamplerEntry>,
    sampler_index: HashMap<String, usize>,
    pub gradients: Vec<GradientEntry>,
    gradient_index: HashMap<String, usize>,
    pub parameters: Vec<ParameterEntry>,
    parameter_index: HashMap<String, usize>,
    pub globals: Vec<GlobalEntry>,
    global_index: HashMap<String, usize>,
    pub functions_used: BTreeSet<String>,
    pub stage_inputs: BTreeSet<StageInput>,
}

impl ResourceTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a texture and return its global name.
    ///
    /// Non-attribute textures have their descriptor compiled through the
    /// pipeline so the declaration can carry the default resource path.
    pub fn register_texture(
        &mut self,
        def: &TextureDef,
        cube: bool,
        pipeline: &dyn TexturePipeline,
    ) -> Result<String> {
        let name = format!("g_t{}", sanitize_ident(&def.name));
        if self.texture_index.contains_key(&name) {
            return Ok(name);
        }
        let glsl_ty = if cube { "samplerCube" } else { "sampler2D" };
        let (resource_path, note) = if def.is_attribute {
            (None, "attribute".to_string())
        } else {
            let descriptor = serde_json::to_string(def)
                .with_context(|| format!("failed to encode texture descriptor for `{}`", def.name))?;
            let path = pipeline
                .compile_image(&descriptor)
                .with_context(|| format!("failed to compile default image for `{}`", def.name))?;
            (Some(path.clone()), format!("default: {path}"))
        };
        let entry = TextureEntry {
            name: name.clone(),
            declaration: format!("uniform {glsl_ty} {name}; // {note}"),
            resource_path,
            is_attribute: def.is_attribute,
        };
        self.texture_index.insert(name.clone(), self.textures.len());
        self.textures.push(entry);
        Ok(name)
    }

    /// Register a sampler and return its global name.
    pub fn register_sampler(&mut self, def: &SamplerDef) -> String {
        let name = def.global_name();
        if self.sampler_index.contains_key(&name) {
            return name;
        }
        let entry = SamplerEntry {
            name: name.clone(),
            declaration: format!(
                "// sampler {name}: filter={:?}, wrap={:?}",
                def.filter, def.wrap
            ),
        };
        self.sampler_index.insert(name.clone(), self.samplers.len());
        self.samplers.push(entry);
        name
    }

    /// Register a gradient and return the name of its lookup function.
    pub fn register_gradient(&mut self, def: &GradientDef) -> String {
        let name = format!("g_gr{}", sanitize_ident(&def.name));
        if let Some(&idx) = self.gradient_index.get(&name) {
            return self.gradients[idx].function.clone();
        }
        let function = format!("SampleGradient_{}", sanitize_ident(&def.name));
        let entry = GradientEntry {
            name: name.clone(),
            function: function.clone(),
            source: build_gradient_function(&function, def),
        };
        self.gradient_index.insert(name, self.gradients.len());
        self.gradients.push(entry);
        function
    }

    /// Register a material parameter and return its global name together
    /// with whether this call created the entry.
    pub fn register_parameter(
        &mut self,
        def: &ParameterDef,
        attribute_name: Option<&str>,
    ) -> (String, bool) {
        let name = match attribute_name {
            Some(attr) => attr.to_string(),
            None => parameter_global_name(&def.name, &def.default),
        };
        if self.parameter_index.contains_key(&name) {
            return (name, false);
        }
        let glsl_ty = def.default.ty().glsl().unwrap_or("float");
        let declaration = if attribute_name.is_some() {
            format!("uniform {glsl_ty} {name}; // attribute, default: {}", def.default.literal())
        } else {
            let mut notes = vec![format!("default: {}", def.default.literal())];
            if let Some(group) = &def.ui_group {
                notes.push(format!("group: {group}"));
            }
            if let (Some(min), Some(max)) = (def.min, def.max) {
                notes.push(format!("range: [{}, {}]", fmt_float(min), fmt_float(max)));
            }
            format!("uniform {glsl_ty} {name}; // {}", notes.join(", "))
        };
        let entry = ParameterEntry {
            name: name.clone(),
            declaration,
            value: def.default.clone(),
            is_attribute: attribute_name.is_some(),
        };
        self.parameter_index.insert(name.clone(), self.parameters.len());
        self.parameters.push(entry);
        (name, true)
    }

    /// Register an engine-provided global by exact declaration.
    pub fn register_global(&mut self, name: &str, declaration: &str) -> String {
        if self.global_index.contains_key(name) {
            return name.to_string();
        }
        self.global_index.insert(name.to_string(), self.globals.len());
        self.globals.push(GlobalEntry {
            name: name.to_string(),
            declaration: declaration.to_string(),
        });
        name.to_string()
    }

    pub fn use_function(&mut self, name: &str) {
        self.functions_used.insert(name.to_string());
    }

    pub fn use_stage_input(&mut self, input: StageInput) {
        self.stage_inputs.insert(input);
    }

    /// Fold `other` into `self`, keeping existing entries on name clashes.
    pub fn merge(&mut self, other: ResourceTables) {
        for entry in other.textures {
            if !self.texture_index.contains_key(&entry.name) {
                self.texture_index.insert(entry.name.clone(), self.textures.len());
                self.textures.push(entry);
            }
        }
        for entry in other.samplers {
            if !self.sampler_index.contains_key(&entry.name) {
                self.sampler_index.insert(entry.name.clone(), self.samplers.len());
                self.samplers.push(entry);
            }
        }
        for entry in other.gradients {
            if !self.gradient_index.contains_key(&entry.name) {
                self.gradient_index.insert(entry.name.clone(), self.gradients.len());
                self.gradients.push(entry);
            }
        }
        for entry in other.parameters {
            if !self.parameter_index.contains_key(&entry.name) {
                self.parameter_index.insert(entry.name.clone(), self.parameters.len());
                self.parameters.push(entry);
            }
        }
        for entry in other.globals {
            if !self.global_index.contains_key(&entry.name) {
                self.global_index.insert(entry.name.clone(), self.globals.len());
                self.globals.push(entry);
            }
        }
        self.functions_used.extend(other.functions_used);
        self.stage_inputs.extend(other.stage_inputs);
    }
}

/// Type-prefixed global name for a material parameter.
pub fn parameter_global_name(name: &str, value: &ParamValue) -> String {
    let prefix = match value {
        ParamValue::Bool(_) => "g_b",
        ParamValue::Int(_) => "g_n",
        ParamValue::Float(_) => "g_fl",
        ParamValue::Vec2(_) | ParamValue::Vec3(_) | ParamValue::Vec4(_) => "g_v",
        ParamValue::Color(_) => "g_c",
    };
    format!("{prefix}{}", sanitize_ident(name))
}

fn fmt_color(color: [f32; 4]) -> String {
    let parts: Vec<String> = color.iter().map(|v| fmt_float(*v)).collect();
    format!("vec4({})", parts.join(", "))
}

/// Build a piecewise-linear lookup function for a gradient.
///
/// Stops are evaluated as a chain of mixes, so unsorted stop lists reproduce
/// the editor's behavior instead of being silently reordered.
fn build_gradient_function(name: &str, def: &GradientDef) -> String {
    let mut body = String::new();
    match def.stops.as_slice() {
        [] => body.push_str("    return vec4(0.0, 0.0, 0.0, 0.0);\n"),
        [only] => {
            body.push_str(&format!("    return {};\n", fmt_color(only.color)));
        }
        stops => {
            body.push_str(&format!("    vec4 color = {};\n", fmt_color(stops[0].color)));
            for pair in stops.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                let span = (b.time - a.time).max(1e-5);
                body.push_str(&format!(
                    "    color = mix(color, {}, clamp((t - {}) / {}, 0.0, 1.0));\n",
                    fmt_color(b.color),
                    fmt_float(a.time),
                    fmt_float(span),
                ));
            }
            body.push_str("    return color;\n");
        }
    }
    format!("vec4 {name}(float t) {{\n{body}}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float_param(name: &str, v: f32) -> ParameterDef {
        ParameterDef {
            name: name.to_string(),
            default: ParamValue::Float(v),
            ui_group: None,
            min: None,
            max: None,
        }
    }

    #[test]
    fn texture_registration_is_first_wins() {
        let pipeline = InMemoryTexturePipeline::new();
        let mut tables = ResourceTables::new();
        let def_a = TextureDef {
            name: "Base Color".to_string(),
            default_image: Some("materials/default/white.png".to_string()),
            srgb: true,
            is_attribute: false,
        };
        let def_b = TextureDef {
            default_image: None,
            ..def_a.clone()
        };
        let first = tables.register_texture(&def_a, false, &pipeline).unwrap();
        let second = tables.register_texture(&def_b, false, &pipeline).unwrap();
        assert_eq!(first, "g_tBase_Color");
        assert_eq!(second, first);
        assert_eq!(tables.textures.len(), 1);
        // The first registration's declaration sticks.
        assert!(tables.textures[0].declaration.contains("default: generated/"));
        assert_eq!(pipeline.compiled().len(), 1);
    }

    #[test]
    fn attribute_textures_skip_the_pipeline() {
        let pipeline = InMemoryTexturePipeline::new();
        let mut tables = ResourceTables::new();
        let def = TextureDef {
            name: "Mask".to_string(),
            default_image: None,
            srgb: false,
            is_attribute: true,
        };
        let name = tables.register_texture(&def, false, &pipeline).unwrap();
        assert_eq!(name, "g_tMask");
        assert!(tables.textures[0].declaration.ends_with("// attribute"));
        assert!(pipeline.compiled().is_empty());
    }

    #[test]
    fn pipeline_dedups_by_descriptor_text() {
        let pipeline = InMemoryTexturePipeline::new();
        let a = pipeline.compile_image("{\"name\":\"a\"}").unwrap();
        let b = pipeline.compile_image("{\"name\":\"b\"}").unwrap();
        let a2 = pipeline.compile_image("{\"name\":\"a\"}").unwrap();
        assert_eq!(a, a2);
        assert_ne!(a, b);
    }

    #[test]
    fn sampler_names_derive_from_settings() {
        let mut tables = ResourceTables::new();
        let linear = SamplerDef::default();
        let point = SamplerDef {
            filter: FilterMode::Point,
            wrap: WrapMode::Clamp,
            ..SamplerDef::default()
        };
        assert_eq!(tables.register_sampler(&linear), "g_sBilinearRepeat");
        assert_eq!(tables.register_sampler(&point), "g_sPointClamp");
        assert_eq!(tables.register_sampler(&linear), "g_sBilinearRepeat");
        assert_eq!(tables.samplers.len(), 2);
    }

    #[test]
    fn named_sampler_keeps_first_settings() {
        let mut tables = ResourceTables::new();
        let first = SamplerDef {
            name: Some("Main Sampler".to_string()),
            ..SamplerDef::default()
        };
        let second = SamplerDef {
            name: Some("Main Sampler".to_string()),
            filter: FilterMode::Point,
            wrap: WrapMode::Mirror,
        };
        assert_eq!(tables.register_sampler(&first), "g_sMain_Sampler");
        assert_eq!(tables.register_sampler(&second), "g_sMain_Sampler");
        assert_eq!(tables.samplers.len(), 1);
        assert!(tables.samplers[0].declaration.contains("Bilinear"));
    }

    #[test]
    fn parameter_registration_reports_insertion() {
        let mut tables = ResourceTables::new();
        let (name, inserted) = tables.register_parameter(&float_param("Scale", 2.0), None);
        assert_eq!(name, "g_flScale");
        assert!(inserted);
        let (again, inserted) = tables.register_parameter(&float_param("Scale", 5.0), None);
        assert_eq!(again, name);
        assert!(!inserted);
        assert_eq!(tables.parameters.len(), 1);
        assert!(tables.parameters[0].declaration.contains("default: 2.0"));
    }

    #[test]
    fn merge_keeps_existing_entries() {
        let mut a = ResourceTables::new();
        let mut b = ResourceTables::new();
        a.register_parameter(&float_param("Scale", 1.0), None);
        b.register_parameter(&float_param("Scale", 9.0), None);
        b.register_parameter(&float_param("Other", 3.0), None);
        b.use_stage_input(StageInput::TexCoord);
        a.merge(b);
        assert_eq!(a.parameters.len(), 2);
        assert!(a.parameters[0].declaration.contains("default: 1.0"));
        assert!(a.stage_inputs.contains(&StageInput::TexCoord));
    }

    #[test]
    fn gradient_function_chains_mixes() {
        let mut tables = ResourceTables::new();
        let def = GradientDef {
            name: "Heat".to_string(),
            stops: vec![
                GradientStop { time: 0.0, color: [0.0, 0.0, 0.0, 1.0] },
                GradientStop { time: 0.5, color: [1.0, 0.0, 0.0, 1.0] },
                GradientStop { time: 1.0, color: [1.0, 1.0, 0.0, 1.0] },
            ],
        };
        let function = tables.register_gradient(&def);
        assert_eq!(function, "SampleGradient_Heat");
        let source = &tables.gradients[0].source;
        assert!(source.starts_with("vec4 SampleGradient_Heat(float t) {"));
        assert_eq!(source.matches("mix(").count(), 2);
        assert!(source.contains("clamp((t - 0.5) / 0.5, 0.0, 1.0)"));
    }

    #[test]
    fn function_library_is_first_writer_wins() {
        let library = FunctionLibrary::new();
        assert!(library.register("Noise2D", "float Noise2D(vec2 p) { return 0.0; }"));
        assert!(!library.register("Noise2D", "float Noise2D(vec2 p) { return 1.0; }"));
        assert!(library.get("Noise2D").unwrap().contains("return 0.0;"));
        let mut used = BTreeSet::new();
        used.insert("Noise2D".to_string());
        used.insert("Missing".to_string());
        assert_eq!(library.sources_for(&used).len(), 1);
    }
}
