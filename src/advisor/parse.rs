//! Parsing of the advisor's line-oriented reply protocol.
//!
//! One finding per line:
//! `ERROR|<line>|<col>|<category>|<severity>|<message>|<suggestion>|<confidence>`
//! Anything else — prose, markdown fences, the NO_ERRORS sentinel,
//! lines with the wrong field count — is ignored. The advisor is a
//! low-precision amplifier, so findings below the confidence
//! threshold are discarded outright.

use crate::advisor::prompts::ERROR_PREFIX;
use crate::diagnostic::{Diagnostic, DiagnosticKind, DiagnosticSource, Severity};

const FIELD_COUNT: usize = 8;

/// Category taxonomy the prompt asks the model to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Syntax,
    Semantic,
    Logical,
    Structural,
}

impl ErrorCategory {
    /// Unrecognized tokens default to Syntax.
    fn from_token(token: &str) -> Self {
        match token.trim().to_ascii_uppercase().as_str() {
            "SEMANTIC" => ErrorCategory::Semantic,
            "LOGICAL" => ErrorCategory::Logical,
            "STRUCTURAL" => ErrorCategory::Structural,
            _ => ErrorCategory::Syntax,
        }
    }

    fn kind(self) -> DiagnosticKind {
        match self {
            ErrorCategory::Syntax => DiagnosticKind::LlmSyntax,
            ErrorCategory::Semantic => DiagnosticKind::LlmSemantic,
            ErrorCategory::Logical => DiagnosticKind::LlmLogical,
            ErrorCategory::Structural => DiagnosticKind::LlmStructural,
        }
    }
}

/// Unrecognized severity tokens default to Error.
fn severity_from_token(token: &str) -> Severity {
    match token.trim().to_ascii_uppercase().as_str() {
        "CRITICAL" => Severity::Critical,
        "WARNING" => Severity::Warning,
        "INFO" => Severity::Info,
        "HINT" => Severity::Hint,
        _ => Severity::Error,
    }
}

/// Negative positions clamp to 0; unparseable ones drop the line.
fn parse_position(token: &str) -> Option<usize> {
    token.trim().parse::<i64>().ok().map(|n| n.max(0) as usize)
}

pub fn parse_reply(reply: &str, confidence_threshold: f64) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for raw_line in reply.lines() {
        let line = raw_line.trim();
        if !line.starts_with(ERROR_PREFIX) {
            continue;
        }
        let fields: Vec<&str> = line.split('|').collect();
        if fields.len() != FIELD_COUNT {
            continue;
        }

        let Some(line_no) = parse_position(fields[1]) else {
            continue;
        };
        let Some(col) = parse_position(fields[2]) else {
            continue;
        };
        let category = ErrorCategory::from_token(fields[3]);
        let severity = severity_from_token(fields[4]);
        let message = fields[5].trim();
        let suggestion = fields[6].trim();
        let Ok(confidence) = fields[7].trim().parse::<f64>() else {
            continue;
        };
        let confidence = confidence.clamp(0.0, 1.0);
        if confidence < confidence_threshold {
            continue;
        }
        if message.is_empty() {
            continue;
        }

        let mut diagnostic = Diagnostic::new(
            category.kind(),
            DiagnosticSource::Advisor,
            line_no,
            col,
            message.to_string(),
        )
        .with_severity(severity)
        .with_confidence(confidence);
        if !suggestion.is_empty() {
            diagnostic = diagnostic.with_suggestion(suggestion.to_string());
        }
        diagnostics.push(diagnostic);
    }
    diagnostics
}
