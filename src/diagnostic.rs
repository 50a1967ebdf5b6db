//! Diagnostic records produced by the analysis stages.
//!
//! Each stage emits immutable `Diagnostic` values; the pipeline only
//! merges, deduplicates, and filters them. The kind taxonomy is a
//! closed enum so new checks can't silently bypass correlation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Severity of a diagnostic, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Hint,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Hint => "hint",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

/// Which stage produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticSource {
    /// Character-level delimiter/string scanner
    Scanner,
    /// Line/block structural checks
    Structure,
    /// Cross-line semantic heuristics
    Semantics,
    /// LLM advisor pass
    Advisor,
}

impl DiagnosticSource {
    /// Heuristic stages win position ties against the advisor.
    pub fn is_heuristic(&self) -> bool {
        !matches!(self, DiagnosticSource::Advisor)
    }
}

/// Closed taxonomy of everything the analyzers can flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiagnosticKind {
    // Delimiter scanner
    UnexpectedClosing,
    MismatchedDelimiter,
    UnclosedDelimiter,
    UnclosedString,
    // Structural analyzer
    MissingColon,
    InconsistentIndentation,
    MixedIndentation,
    ExpectedIndentedBlock,
    ImproperDedent,
    MalformedDefinition,
    EmptyCondition,
    MissingInClause,
    BareExceptOrder,
    // Semantic heuristics
    DuplicateDefinition,
    UnusedImport,
    ParameterConvention,
    UndefinedVariable,
    // LLM advisor, one per category in the reply protocol
    LlmSyntax,
    LlmSemantic,
    LlmLogical,
    LlmStructural,
}

/// Static metadata attached to each kind: stable rule id, default
/// severity/confidence, and the quick fixes a host UI can offer.
pub struct KindMetadata {
    pub rule_id: &'static str,
    pub default_severity: Severity,
    pub default_confidence: f64,
    pub quick_fixes: &'static [&'static str],
}

impl DiagnosticKind {
    pub fn metadata(&self) -> KindMetadata {
        use DiagnosticKind::*;
        match self {
            UnexpectedClosing => KindMetadata {
                rule_id: "unexpected-closing-delimiter",
                default_severity: Severity::Error,
                default_confidence: 0.9,
                quick_fixes: &["Remove delimiter"],
            },
            MismatchedDelimiter => KindMetadata {
                rule_id: "mismatched-delimiter",
                default_severity: Severity::Error,
                default_confidence: 0.9,
                quick_fixes: &["Replace with matching delimiter"],
            },
            UnclosedDelimiter => KindMetadata {
                rule_id: "unclosed-delimiter",
                default_severity: Severity::Error,
                default_confidence: 0.85,
                quick_fixes: &["Add closing delimiter"],
            },
            UnclosedString => KindMetadata {
                rule_id: "unclosed-string",
                default_severity: Severity::Error,
                default_confidence: 0.9,
                quick_fixes: &["Add closing quote"],
            },
            MissingColon => KindMetadata {
                rule_id: "missing-colon",
                default_severity: Severity::Error,
                default_confidence: 0.95,
                quick_fixes: &["Add ':'"],
            },
            InconsistentIndentation => KindMetadata {
                rule_id: "inconsistent-indentation",
                default_severity: Severity::Warning,
                default_confidence: 0.7,
                quick_fixes: &["Match file indentation style"],
            },
            MixedIndentation => KindMetadata {
                rule_id: "mixed-indentation",
                default_severity: Severity::Error,
                default_confidence: 0.9,
                quick_fixes: &["Convert tabs to spaces"],
            },
            ExpectedIndentedBlock => KindMetadata {
                rule_id: "expected-indented-block",
                default_severity: Severity::Error,
                default_confidence: 0.85,
                quick_fixes: &["Indent line"],
            },
            ImproperDedent => KindMetadata {
                rule_id: "improper-dedent",
                default_severity: Severity::Warning,
                default_confidence: 0.7,
                quick_fixes: &["Align with an enclosing block"],
            },
            MalformedDefinition => KindMetadata {
                rule_id: "malformed-definition",
                default_severity: Severity::Error,
                default_confidence: 0.85,
                quick_fixes: &[],
            },
            EmptyCondition => KindMetadata {
                rule_id: "empty-condition",
                default_severity: Severity::Error,
                default_confidence: 0.9,
                quick_fixes: &[],
            },
            MissingInClause => KindMetadata {
                rule_id: "for-missing-in",
                default_severity: Severity::Error,
                default_confidence: 0.9,
                quick_fixes: &["Add 'in' clause"],
            },
            BareExceptOrder => KindMetadata {
                rule_id: "bare-except-order",
                default_severity: Severity::Warning,
                default_confidence: 0.8,
                quick_fixes: &["Move bare except last"],
            },
            DuplicateDefinition => KindMetadata {
                rule_id: "duplicate-definition",
                default_severity: Severity::Warning,
                default_confidence: 0.8,
                quick_fixes: &["Rename or remove duplicate"],
            },
            UnusedImport => KindMetadata {
                rule_id: "unused-import",
                default_severity: Severity::Warning,
                default_confidence: 0.7,
                quick_fixes: &["Remove import"],
            },
            ParameterConvention => KindMetadata {
                rule_id: "first-parameter-convention",
                default_severity: Severity::Warning,
                default_confidence: 0.75,
                quick_fixes: &["Rename first parameter"],
            },
            UndefinedVariable => KindMetadata {
                rule_id: "undefined-variable",
                default_severity: Severity::Error,
                default_confidence: 0.85,
                quick_fixes: &[],
            },
            LlmSyntax => KindMetadata {
                rule_id: "llm-syntax",
                default_severity: Severity::Error,
                default_confidence: 0.9,
                quick_fixes: &[],
            },
            LlmSemantic => KindMetadata {
                rule_id: "llm-semantic",
                default_severity: Severity::Error,
                default_confidence: 0.9,
                quick_fixes: &[],
            },
            LlmLogical => KindMetadata {
                rule_id: "llm-logical",
                default_severity: Severity::Error,
                default_confidence: 0.9,
                quick_fixes: &[],
            },
            LlmStructural => KindMetadata {
                rule_id: "llm-structural",
                default_severity: Severity::Error,
                default_confidence: 0.9,
                quick_fixes: &[],
            },
        }
    }

    pub fn rule_id(&self) -> &'static str {
        self.metadata().rule_id
    }
}

/// A single finding. Immutable once built; positions are 0-based.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub id: Uuid,
    pub kind: DiagnosticKind,
    pub severity: Severity,
    pub message: String,
    pub line: usize,
    pub column: usize,
    pub end_line: usize,
    pub end_column: usize,
    /// Heuristic certainty in [0,1]; clamped at construction.
    pub confidence: f64,
    pub rule_id: &'static str,
    pub suggestion: Option<String>,
    pub quick_fixes: Vec<String>,
    /// Free-text snippet of the offending source, for tooltips.
    pub context: Option<String>,
    pub source: DiagnosticSource,
    pub created_at: DateTime<Utc>,
}

impl Diagnostic {
    pub fn new(
        kind: DiagnosticKind,
        source: DiagnosticSource,
        line: usize,
        column: usize,
        message: impl Into<String>,
    ) -> Self {
        let meta = kind.metadata();
        Self {
            id: Uuid::new_v4(),
            kind,
            severity: meta.default_severity,
            message: message.into(),
            line,
            column,
            end_line: line,
            end_column: column,
            confidence: meta.default_confidence,
            rule_id: meta.rule_id,
            suggestion: None,
            quick_fixes: meta.quick_fixes.iter().map(|s| s.to_string()).collect(),
            context: None,
            source,
            created_at: Utc::now(),
        }
    }

    pub fn with_span(mut self, end_line: usize, end_column: usize) -> Self {
        self.end_line = end_line;
        self.end_column = end_column;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Key used by correlation: no two output diagnostics share one.
    pub fn dedup_key(&self) -> (usize, usize, DiagnosticKind) {
        (self.line, self.column, self.kind)
    }

    pub fn position(&self) -> (usize, usize) {
        (self.line, self.column)
    }

    /// Clamp the span into the fragment's lines, given per-line
    /// character widths. Out-of-range positions are pulled back to the
    /// nearest valid location rather than dropped.
    pub fn clamped_to(mut self, line_widths: &[usize]) -> Self {
        if line_widths.is_empty() {
            self.line = 0;
            self.column = 0;
            self.end_line = 0;
            self.end_column = 0;
            return self;
        }
        let last = line_widths.len() - 1;
        self.line = self.line.min(last);
        self.column = self.column.min(line_widths[self.line]);
        self.end_line = self.end_line.clamp(self.line, last);
        self.end_column = self.end_column.min(line_widths[self.end_line]);
        if self.end_line == self.line && self.end_column < self.column {
            self.end_column = self.column;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Error);
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert!(Severity::Info > Severity::Hint);
    }

    #[test]
    fn test_confidence_clamped() {
        let d = Diagnostic::new(
            DiagnosticKind::MissingColon,
            DiagnosticSource::Structure,
            0,
            0,
            "missing colon",
        )
        .with_confidence(1.7);
        assert_eq!(d.confidence, 1.0);

        let d = d.with_confidence(-0.2);
        assert_eq!(d.confidence, 0.0);
    }

    #[test]
    fn test_kind_defaults_flow_into_diagnostic() {
        let d = Diagnostic::new(
            DiagnosticKind::MissingColon,
            DiagnosticSource::Structure,
            3,
            8,
            "missing colon",
        );
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.rule_id, "missing-colon");
        assert!(d.confidence >= 0.95);
        assert_eq!(d.quick_fixes, vec!["Add ':'".to_string()]);
    }

    #[test]
    fn test_clamped_to_pulls_positions_into_bounds() {
        let widths = vec![10, 4];
        let d = Diagnostic::new(
            DiagnosticKind::UnclosedDelimiter,
            DiagnosticSource::Scanner,
            9,
            99,
            "unclosed",
        )
        .with_span(12, 50)
        .clamped_to(&widths);
        assert_eq!(d.line, 1);
        assert_eq!(d.column, 4);
        assert_eq!(d.end_line, 1);
        assert_eq!(d.end_column, 4);
    }

    #[test]
    fn test_dedup_key_ignores_severity_and_message() {
        let a = Diagnostic::new(
            DiagnosticKind::UnusedImport,
            DiagnosticSource::Semantics,
            2,
            0,
            "unused import 'os'",
        );
        let b = Diagnostic::new(
            DiagnosticKind::UnusedImport,
            DiagnosticSource::Semantics,
            2,
            0,
            "different message",
        )
        .with_severity(Severity::Info);
        assert_eq!(a.dedup_key(), b.dedup_key());
    }
}
