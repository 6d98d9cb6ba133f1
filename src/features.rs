//! Feature switches and their conditional-compilation declarations.
//!
//! Switch nodes register the features they branch on; the registrar collects
//! them across both stages and emits one preprocessor declaration block. A
//! feature registered twice with identical options is deduplicated, a
//! divergent re-registration is an error but keeps the first definition.

use std::collections::HashMap;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::diagnostics::{Diagnostics, NodeErrorKind};
use crate::eval::{Block, Evaluator};
use crate::graph::Node;
use crate::types::{CompileMode, NodeResult, ResultType, sanitize_ident};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeatureKind {
    /// Two-way switch; compiles to an `#if`/`#else` pair.
    #[default]
    Boolean,
    /// N-way switch; compiles to an `#if`/`#elif` chain over option ordinals.
    Enum { options: Vec<String> },
}

/// A compile-time switch exposed to the material system.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureDef {
    pub name: String,
    #[serde(default)]
    pub kind: FeatureKind,
    /// Option selected when the material does not set the feature.
    #[serde(default)]
    pub default_option: u32,
}

impl FeatureDef {
    pub fn boolean(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FeatureKind::Boolean,
            default_option: 0,
        }
    }

    /// Preprocessor symbol the material system defines to select an option.
    pub fn symbol(&self) -> String {
        format!("F_{}", sanitize_ident(&self.name).to_uppercase())
    }

    pub fn option_count(&self) -> usize {
        match &self.kind {
            FeatureKind::Boolean => 2,
            FeatureKind::Enum { options } => options.len(),
        }
    }

    /// Input slot names a switch node exposes, one per option.
    pub fn branch_slots(&self) -> Vec<String> {
        match &self.kind {
            FeatureKind::Boolean => vec!["false".to_string(), "true".to_string()],
            FeatureKind::Enum { options } => options.clone(),
        }
    }
}

/// Collects the features used by one compilation, in registration order.
#[derive(Debug, Default)]
pub struct FeatureRegistrar {
    features: Vec<FeatureDef>,
    index: HashMap<String, usize>,
}

impl FeatureRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registrar pre-populated with the caller's known feature table.
    pub fn seeded(defs: impl IntoIterator<Item = FeatureDef>) -> Self {
        let mut registrar = Self::new();
        for def in defs {
            if !registrar.index.contains_key(&def.name) {
                registrar.index.insert(def.name.clone(), registrar.features.len());
                registrar.features.push(def);
            }
        }
        registrar
    }

    /// Register a feature, returning the canonical definition for its name.
    ///
    /// The first definition wins. A later registration that disagrees on
    /// kind, options or default records a conflict and is otherwise ignored.
    pub fn register(&mut self, def: &FeatureDef, diags: &mut Diagnostics) -> FeatureDef {
        if let Some(&idx) = self.index.get(&def.name) {
            let existing = &self.features[idx];
            if existing != def {
                diags.feature_conflict(
                    &def.name,
                    format!("already registered as {existing:?}, now registered as {def:?}"),
                );
            }
            return existing.clone();
        }
        self.index.insert(def.name.clone(), self.features.len());
        self.features.push(def.clone());
        def.clone()
    }

    pub fn get(&self, name: &str) -> Option<&FeatureDef> {
        self.index.get(name).map(|&idx| &self.features[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureDef> {
        self.features.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// The preprocessor block declaring every registered feature.
    ///
    /// Each symbol is guarded so material systems that predefine it keep
    /// their value; undefined symbols fall back to the feature's default.
    pub fn declarations(&self) -> String {
        let mut out = String::new();
        for def in &self.features {
            let symbol = def.symbol();
            let default = (def.default_option as usize).min(def.option_count().saturating_sub(1));
            out.push_str(&format!("#ifndef {symbol}\n"));
            match &def.kind {
                FeatureKind::Boolean => {
                    out.push_str(&format!("#define {symbol} {default}\n"));
                }
                FeatureKind::Enum { options } => {
                    out.push_str(&format!(
                        "#define {symbol} {default} // options: {}\n",
                        options.join(", ")
                    ));
                }
            }
            out.push_str("#endif\n");
        }
        out
    }
}

impl<'a> Evaluator<'a> {
    /// Lower a switch node into a preprocessor-guarded assignment.
    ///
    /// Every connected branch is evaluated into its own scope so that all
    /// compiled combinations stay buildable; the branches then assign one
    /// shared local inside `#if`/`#elif` arms keyed on the feature symbol.
    /// The shared local takes the highest-ordinal type among the branch
    /// results, and every branch is cast to that type's width.
    pub(crate) fn resolve_switch(
        &mut self,
        block: &mut Block,
        node: &'a Node,
        def: &FeatureDef,
    ) -> Result<NodeResult> {
        let canonical = self.features.register(def, self.diags);

        let mut branches: Vec<(usize, NodeResult, Block)> = Vec::new();
        let mut saw_slot = false;
        for (index, slot_name) in canonical.branch_slots().iter().enumerate() {
            let Some(slot) = node.input(slot_name) else {
                continue;
            };
            let mut scope = Block::new();
            let result = match (&slot.source, &slot.default) {
                (Some(src), _) => {
                    let target = self.contextualize(src);
                    self.resolve(&mut scope, &target)
                }
                (None, Some(value)) => value.constant_result(),
                (None, None) => continue,
            };
            saw_slot = true;
            if result.is_valid() {
                branches.push((index, result, scope));
            }
        }
        if !saw_slot {
            bail!(NodeErrorKind::MissingInput(canonical.name.clone()));
        }
        // Branches that failed already carry their own diagnostics.
        let Some(ty) = branches.iter().map(|(_, r, _)| r.ty).max() else {
            return Ok(NodeResult::invalid());
        };
        let Some(seed) = ty.default_literal() else {
            bail!(NodeErrorKind::Other(format!(
                "cannot switch between values of type {ty:?}"
            )));
        };

        let shared = self.alloc_local();
        block.push_local(
            NodeResult::expr(ty, shared.clone()),
            NodeResult::expr(ty, seed),
        );

        let symbol = canonical.symbol();
        let mut chunk = String::new();
        match &canonical.kind {
            FeatureKind::Boolean => {
                let true_arm = branches.iter().find(|(i, _, _)| *i == 1);
                let false_arm = branches.iter().find(|(i, _, _)| *i == 0);
                match (true_arm, false_arm) {
                    (Some(t), Some(f)) => {
                        chunk.push_str(&format!("#if {symbol}\n"));
                        chunk.push_str(&self.switch_branch_body(t, ty, &shared)?);
                        chunk.push_str("#else\n");
                        chunk.push_str(&self.switch_branch_body(f, ty, &shared)?);
                        chunk.push_str("#endif");
                    }
                    (Some(t), None) => {
                        chunk.push_str(&format!("#if {symbol}\n"));
                        chunk.push_str(&self.switch_branch_body(t, ty, &shared)?);
                        chunk.push_str("#endif");
                    }
                    (None, Some(f)) => {
                        chunk.push_str(&format!("#if !{symbol}\n"));
                        chunk.push_str(&self.switch_branch_body(f, ty, &shared)?);
                        chunk.push_str("#endif");
                    }
                    (None, None) => return Ok(NodeResult::invalid()),
                }
            }
            FeatureKind::Enum { .. } => {
                for (pos, branch) in branches.iter().enumerate() {
                    let keyword = if pos == 0 { "#if" } else { "#elif" };
                    chunk.push_str(&format!("{keyword} {symbol} == {}\n", branch.0));
                    chunk.push_str(&self.switch_branch_body(branch, ty, &shared)?);
                }
                chunk.push_str("#endif");
            }
        }
        block.push_statement(chunk);

        let mut out = NodeResult::expr(ty, shared);
        if self.mode() == CompileMode::Preview {
            out.preview_id = Some(self.preview_id_for(&node.id));
        }
        Ok(out)
    }

    /// One `#if` arm: the branch's own statements, then the assignment of
    /// its result cast to the shared type.
    fn switch_branch_body(
        &mut self,
        branch: &(usize, NodeResult, Block),
        ty: ResultType,
        shared: &str,
    ) -> Result<String> {
        let (_, result, scope) = branch;
        let cast = self.cast_input(result, ty.components(), 0.0)?;
        Ok(format!(
            "{}    {shared} = {};\n",
            scope.assemble("    "),
            cast.code()?
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enum_feature(name: &str, options: &[&str], default_option: u32) -> FeatureDef {
        FeatureDef {
            name: name.to_string(),
            kind: FeatureKind::Enum {
                options: options.iter().map(|s| s.to_string()).collect(),
            },
            default_option,
        }
    }

    #[test]
    fn symbols_are_upper_snake() {
        assert_eq!(FeatureDef::boolean("High Quality").symbol(), "F_HIGH_QUALITY");
        assert_eq!(FeatureDef::boolean("fresnel").symbol(), "F_FRESNEL");
    }

    #[test]
    fn duplicate_identical_registration_is_silent() {
        let mut registrar = FeatureRegistrar::new();
        let mut diags = Diagnostics::new();
        assert!(registrar.is_empty());
        let def = FeatureDef::boolean("Fresnel");
        registrar.register(&def, &mut diags);
        registrar.register(&def, &mut diags);
        assert!(diags.is_empty());
        assert!(!registrar.is_empty());
        assert_eq!(registrar.iter().count(), 1);
    }

    #[test]
    fn divergent_registration_keeps_first_and_records_conflict() {
        let mut registrar = FeatureRegistrar::new();
        let mut diags = Diagnostics::new();
        let first = enum_feature("Mode", &["a", "b"], 0);
        let second = enum_feature("Mode", &["a", "b", "c"], 0);
        registrar.register(&first, &mut diags);
        let canonical = registrar.register(&second, &mut diags);
        assert_eq!(canonical, first);
        assert!(diags.has_errors());
        assert_eq!(registrar.get("Mode"), Some(&first));
    }

    #[test]
    fn declarations_guard_predefined_symbols() {
        let mut registrar = FeatureRegistrar::new();
        let mut diags = Diagnostics::new();
        registrar.register(&FeatureDef::boolean("Fresnel"), &mut diags);
        registrar.register(&enum_feature("Blend Mode", &["mix", "add", "mul"], 1), &mut diags);
        let decls = registrar.declarations();
        assert_eq!(
            decls,
            "#ifndef F_FRESNEL\n\
             #define F_FRESNEL 0\n\
             #endif\n\
             #ifndef F_BLEND_MODE\n\
             #define F_BLEND_MODE 1 // options: mix, add, mul\n\
             #endif\n"
        );
    }

    #[test]
    fn out_of_range_default_is_clamped() {
        let mut registrar = FeatureRegistrar::new();
        let mut diags = Diagnostics::new();
        registrar.register(&enum_feature("Mode", &["a", "b"], 9), &mut diags);
        assert!(registrar.declarations().contains("#define F_MODE 1"));
    }

    #[test]
    fn seeded_table_wins_over_later_registration() {
        let mut registrar =
            FeatureRegistrar::seeded([enum_feature("Mode", &["a", "b"], 0)]);
        let mut diags = Diagnostics::new();
        let canonical = registrar.register(&enum_feature("Mode", &["a", "b"], 0), &mut diags);
        assert_eq!(canonical.option_count(), 2);
        assert!(diags.is_empty());
    }
}
