//! Ordered statement blocks produced by evaluation.
//!
//! A block is one evaluation context: a straight-line list of local
//! declarations and raw statements plus the memo cache for references
//! resolved inside it. Switch branches get their own nested blocks, so
//! nothing cached or declared in a branch can leak into the parent scope.

use std::collections::HashMap;

use crate::graph::InputRef;
use crate::types::{NodeResult, ResultType};

/// Declaration order is the emission order; replaying `locals` top to bottom
/// reproduces the procedure body.
#[derive(Debug, Default)]
pub struct Block {
    locals: Vec<(NodeResult, NodeResult)>,
    cache: HashMap<InputRef, NodeResult>,
    deferred: HashMap<String, NodeResult>,
}

impl Block {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn cached(&self, key: &InputRef) -> Option<NodeResult> {
        self.cache.get(key).cloned()
    }

    pub(crate) fn insert_cache(&mut self, key: InputRef, result: NodeResult) {
        self.cache.insert(key, result);
    }

    /// Bundle recorded for an already-emitted function-call node.
    pub(crate) fn deferred(&self, node_id: &str) -> Option<NodeResult> {
        self.deferred.get(node_id).cloned()
    }

    pub(crate) fn record_deferred(&mut self, node_id: String, bundle: NodeResult) {
        self.deferred.insert(node_id, bundle);
    }

    /// Append a local declaration: `local` names it, `expr` initializes it.
    pub(crate) fn push_local(&mut self, local: NodeResult, expr: NodeResult) {
        self.locals.push((local, expr));
    }

    /// Append a raw statement, emitted verbatim between declarations.
    pub(crate) fn push_statement(&mut self, text: String) {
        self.locals.push((
            NodeResult::expr(ResultType::Void, ""),
            NodeResult::expr(ResultType::Void, text),
        ));
    }

    pub fn locals(&self) -> &[(NodeResult, NodeResult)] {
        &self.locals
    }

    pub fn is_empty(&self) -> bool {
        self.locals.is_empty()
    }

    pub fn len(&self) -> usize {
        self.locals.len()
    }

    /// Render the block as GLSL statements, one per line.
    ///
    /// Preprocessor lines inside raw statements stay in column zero; all
    /// other lines get the indent prefix.
    pub fn assemble(&self, indent: &str) -> String {
        let mut out = String::new();
        for (local, expr) in &self.locals {
            let (Ok(name), Ok(code)) = (local.code(), expr.code()) else {
                continue;
            };
            if local.ty == ResultType::Void {
                for line in code.lines() {
                    if line.starts_with('#') {
                        out.push_str(line);
                    } else {
                        out.push_str(indent);
                        out.push_str(line);
                    }
                    out.push('\n');
                }
            } else if let Some(glsl) = local.ty.glsl() {
                out.push_str(&format!("{indent}{glsl} {name} = {code};\n"));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_interleaves_locals_and_statements() {
        let mut block = Block::new();
        block.push_local(
            NodeResult::expr(ResultType::Float, "l_0"),
            NodeResult::expr(ResultType::Float, "vs_texcoord.x"),
        );
        block.push_statement("MyFn(l_0, l_1);".to_string());
        block.push_local(
            NodeResult::expr(ResultType::Vector2, "l_2"),
            NodeResult::expr(ResultType::Vector2, "vec2(l_0, l_1)"),
        );
        assert_eq!(
            block.assemble("    "),
            "    float l_0 = vs_texcoord.x;\n\
             \x20   MyFn(l_0, l_1);\n\
             \x20   vec2 l_2 = vec2(l_0, l_1);\n"
        );
    }

    #[test]
    fn assemble_keeps_preprocessor_lines_unindented() {
        let mut block = Block::new();
        block.push_statement("#if F_X\n    l_0 = 1.0;\n#endif".to_string());
        assert_eq!(
            block.assemble("    "),
            "#if F_X\n        l_0 = 1.0;\n#endif\n"
        );
    }

    #[test]
    fn cache_round_trips() {
        let mut block = Block::new();
        let key = InputRef::local("a", "result");
        assert!(block.cached(&key).is_none());
        block.insert_cache(key.clone(), NodeResult::constant(ResultType::Float, "1.0"));
        assert_eq!(
            block.cached(&key).unwrap().code().unwrap(),
            "1.0"
        );
    }
}
