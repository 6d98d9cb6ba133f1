//! Error accumulation for graph compilation.
//!
//! Node failures never abort evaluation: they are recorded here against the
//! failing node and resolution continues with invalid sentinels, so one bad
//! subtree cannot hide errors elsewhere in the graph. Nodes downstream of a
//! failure get a warning-severity skip marker instead of repeating the
//! error, keeping the error count equal to the number of broken nodes.
//! Final emission refuses to produce source while this sink holds errors;
//! preview emission carries them alongside the generated text.

use std::fmt;

use thiserror::Error;

/// What went wrong at a single node.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum NodeErrorKind {
    #[error("missing required input `{0}`")]
    MissingInput(String),
    /// The slot is connected, but its source already failed; recorded at
    /// warning severity so the error stays on the node that caused it.
    #[error("input `{0}` skipped after an upstream failure")]
    UpstreamFailed(String),
    #[error("circular reference: {0}")]
    CircularReference(String),
    #[error("illegal cast: {0}")]
    IllegalCast(String),
    #[error("input `{0}` is required when used inside a subgraph")]
    RequiredInSubgraph(String),
    #[error("unknown node `{0}`")]
    UnknownNode(String),
    #[error("node has no output `{0}`")]
    UnknownOutput(String),
    #[error("`{input}` is not available in the {stage} stage")]
    NotAvailableInStage { input: String, stage: String },
    #[error("{0}")]
    Other(String),
}

impl NodeErrorKind {
    /// Recover the typed kind from an error crossing the resolve boundary,
    /// falling back to the rendered context chain.
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        match err.downcast::<NodeErrorKind>() {
            Ok(kind) => kind,
            Err(other) => NodeErrorKind::Other(format!("{other:#}")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

/// One recorded problem, attributed to a node where possible.
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    Node {
        node: String,
        error: NodeErrorKind,
        severity: Severity,
    },
    /// Two switch nodes registered the same feature with different options.
    FeatureConflict { feature: String, message: String },
    /// Free-form error appended by the caller after compilation.
    Downstream { message: String },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Diagnostic::Node { severity, .. } => *severity,
            Diagnostic::FeatureConflict { .. } | Diagnostic::Downstream { .. } => Severity::Error,
        }
    }

    /// Node id this diagnostic is attached to, if any.
    pub fn node(&self) -> Option<&str> {
        match self {
            Diagnostic::Node { node, .. } => Some(node),
            _ => None,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::Node {
                node,
                error,
                severity,
            } => {
                let tag = match severity {
                    Severity::Warning => "warning",
                    Severity::Error => "error",
                };
                write!(f, "{tag} at node `{node}`: {error}")
            }
            Diagnostic::FeatureConflict { feature, message } => {
                write!(f, "error: conflicting registrations of feature `{feature}`: {message}")
            }
            Diagnostic::Downstream { message } => write!(f, "error: {message}"),
        }
    }
}

/// Accumulated diagnostics for one compilation.
#[derive(Debug, Default)]
pub struct Diagnostics {
    items: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diag: Diagnostic) {
        log::debug!("recorded diagnostic: {diag}");
        self.items.push(diag);
    }

    pub fn node_error(&mut self, node: impl Into<String>, error: NodeErrorKind) {
        self.push(Diagnostic::Node {
            node: node.into(),
            error,
            severity: Severity::Error,
        });
    }

    pub fn node_warning(&mut self, node: impl Into<String>, error: NodeErrorKind) {
        self.push(Diagnostic::Node {
            node: node.into(),
            error,
            severity: Severity::Warning,
        });
    }

    pub fn feature_conflict(&mut self, feature: impl Into<String>, message: impl Into<String>) {
        let feature = feature.into();
        log::warn!("feature `{feature}` registered with divergent definitions");
        self.push(Diagnostic::FeatureConflict {
            feature,
            message: message.into(),
        });
    }

    /// Append an error reported by a downstream consumer of the output.
    pub fn downstream(&mut self, message: impl Into<String>) {
        self.push(Diagnostic::Downstream {
            message: message.into(),
        });
    }

    pub fn has_errors(&self) -> bool {
        self.items.iter().any(|d| d.severity() == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.items
            .iter()
            .filter(|d| d.severity() == Severity::Error)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.items.iter()
    }

    /// All diagnostics attached to the given node.
    pub fn for_node<'a>(&'a self, node: &'a str) -> impl Iterator<Item = &'a Diagnostic> {
        self.items.iter().filter(move |d| d.node() == Some(node))
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn display_includes_node_and_kind() {
        let mut diags = Diagnostics::new();
        diags.node_error("blend_7", NodeErrorKind::MissingInput("b".into()));
        let rendered = diags.iter().next().unwrap().to_string();
        assert_eq!(rendered, "error at node `blend_7`: missing required input `b`");
    }

    #[test]
    fn warnings_do_not_count_as_errors() {
        let mut diags = Diagnostics::new();
        diags.node_warning("n", NodeErrorKind::UpstreamFailed("a".into()));
        assert!(!diags.has_errors());
        diags.node_error("n", NodeErrorKind::Other("boom".into()));
        assert!(diags.has_errors());
        assert_eq!(diags.error_count(), 1);
    }

    /// The channel the material system uses to report errors from the real
    /// shading-language compiler; never attributed to a node.
    #[test]
    fn downstream_reports_carry_no_node() {
        let mut diags = Diagnostics::new();
        diags.downstream("0:12: 'mat_albedo' : undeclared identifier");
        let report = diags.iter().next().unwrap();
        assert_eq!(report.node(), None);
        assert_eq!(report.severity(), Severity::Error);
        assert_eq!(
            report.to_string(),
            "error: 0:12: 'mat_albedo' : undeclared identifier"
        );
        assert!(diags.has_errors());
    }

    #[test]
    fn typed_kind_survives_the_anyhow_boundary() {
        let err = anyhow!(NodeErrorKind::MissingInput("uv".into()));
        assert_eq!(
            NodeErrorKind::from_anyhow(err),
            NodeErrorKind::MissingInput("uv".into())
        );
        let plain = anyhow!("texture pipeline unavailable");
        assert_eq!(
            NodeErrorKind::from_anyhow(plain),
            NodeErrorKind::Other("texture pipeline unavailable".into())
        );
    }

    #[test]
    fn for_node_filters_by_id() {
        let mut diags = Diagnostics::new();
        diags.node_error("a", NodeErrorKind::MissingInput("x".into()));
        diags.node_error("b", NodeErrorKind::MissingInput("y".into()));
        diags.downstream("material system rejected output");
        assert_eq!(diags.for_node("a").count(), 1);
        assert_eq!(diags.for_node("b").count(), 1);
        assert_eq!(diags.iter().count(), 3);
    }
}
