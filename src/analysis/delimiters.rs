//! Single-pass delimiter and string-literal scanner.
//!
//! Tracks a stack of open delimiters, single/double-quote string
//! state with escapes, and triple-quoted blocks (which span lines and
//! suspend bracket matching). Malformed input yields diagnostics and
//! recovery transitions, never an error; the scan always reaches the
//! end of the text.

use crate::diagnostic::{Diagnostic, DiagnosticKind, DiagnosticSource};

/// One open delimiter awaiting its closer. Lives only for the
/// duration of a single scan.
#[derive(Debug, Clone, Copy)]
struct DelimiterFrame {
    open: char,
    line: usize,
    col: usize,
    expected_closer: char,
}

fn expected_closer(open: char) -> char {
    match open {
        '(' => ')',
        '[' => ']',
        _ => '}',
    }
}

#[derive(Default)]
pub struct DelimiterScanner;

impl DelimiterScanner {
    pub fn new() -> Self {
        Self
    }

    pub fn scan(&self, text: &str) -> Vec<Diagnostic> {
        let chars: Vec<char> = text.chars().collect();
        let mut diagnostics = Vec::new();
        let mut stack: Vec<DelimiterFrame> = Vec::new();

        // String state: the active quote char and where it opened.
        let mut in_string: Option<char> = None;
        let mut string_start = (0usize, 0usize);
        let mut escaped = false;
        // Quote char of the active triple-quoted block, if any.
        let mut in_triple: Option<char> = None;
        let mut triple_start = (0usize, 0usize);

        let mut line = 0usize;
        let mut col = 0usize;
        let mut i = 0usize;

        while i < chars.len() {
            let ch = chars[i];
            let is_triple_run = (ch == '"' || ch == '\'')
                && chars.get(i + 1) == Some(&ch)
                && chars.get(i + 2) == Some(&ch);

            if let Some(quote) = in_triple {
                // Inside a triple-quoted block only its own closer
                // matters; brackets and single quotes are literal text.
                if ch == '\n' {
                    line += 1;
                    col = 0;
                    i += 1;
                    continue;
                }
                if is_triple_run && ch == quote {
                    in_triple = None;
                    col += 3;
                    i += 3;
                    continue;
                }
                col += 1;
                i += 1;
                continue;
            }

            if let Some(quote) = in_string {
                if escaped {
                    // A backslash escapes exactly the next character.
                    // An escaped newline is a line continuation and
                    // still advances the physical line counter.
                    escaped = false;
                    if ch == '\n' {
                        line += 1;
                        col = 0;
                    } else {
                        col += 1;
                    }
                    i += 1;
                    continue;
                }
                match ch {
                    '\\' => escaped = true,
                    '\n' => {
                        // Recovery: flag at the opening quote, reset
                        // string state, keep scanning.
                        diagnostics.push(
                            Diagnostic::new(
                                DiagnosticKind::UnclosedString,
                                DiagnosticSource::Scanner,
                                string_start.0,
                                string_start.1,
                                format!("String literal opened with {} is not closed before end of line", quote),
                            )
                            .with_suggestion(format!("Close the string with {}", quote)),
                        );
                        in_string = None;
                        line += 1;
                        col = 0;
                        i += 1;
                        continue;
                    }
                    c if c == quote => in_string = None,
                    _ => {}
                }
                col += 1;
                i += 1;
                continue;
            }

            match ch {
                '\n' => {
                    line += 1;
                    col = 0;
                    i += 1;
                    continue;
                }
                '#' => {
                    // Comment: skip to end of line so commented-out
                    // brackets don't trip the matcher.
                    while i < chars.len() && chars[i] != '\n' {
                        i += 1;
                    }
                    continue;
                }
                '"' | '\'' => {
                    if is_triple_run {
                        in_triple = Some(ch);
                        triple_start = (line, col);
                        col += 3;
                        i += 3;
                        continue;
                    }
                    in_string = Some(ch);
                    string_start = (line, col);
                }
                '(' | '[' | '{' => {
                    stack.push(DelimiterFrame {
                        open: ch,
                        line,
                        col,
                        expected_closer: expected_closer(ch),
                    });
                }
                ')' | ']' | '}' => match stack.pop() {
                    None => {
                        diagnostics.push(
                            Diagnostic::new(
                                DiagnosticKind::UnexpectedClosing,
                                DiagnosticSource::Scanner,
                                line,
                                col,
                                format!("Unexpected closing '{}' with no matching opener", ch),
                            )
                            .with_suggestion(format!("Remove '{}' or add its opener", ch)),
                        );
                    }
                    Some(frame) if frame.expected_closer != ch => {
                        // The frame stays popped: best-effort recovery
                        // so one bad closer doesn't cascade.
                        diagnostics.push(
                            Diagnostic::new(
                                DiagnosticKind::MismatchedDelimiter,
                                DiagnosticSource::Scanner,
                                line,
                                col,
                                format!(
                                    "Mismatched delimiter: '{}' closes '{}' opened at line {}",
                                    ch,
                                    frame.open,
                                    frame.line + 1
                                ),
                            )
                            .with_suggestion(format!("Replace with '{}'", frame.expected_closer)),
                        );
                    }
                    Some(_) => {}
                },
                _ => {}
            }
            col += 1;
            i += 1;
        }

        if in_string.is_some() {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::UnclosedString,
                    DiagnosticSource::Scanner,
                    string_start.0,
                    string_start.1,
                    "String literal is not closed before end of input".to_string(),
                )
                .with_suggestion("Close the string"),
            );
        }
        if let Some(quote) = in_triple {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::UnclosedString,
                    DiagnosticSource::Scanner,
                    triple_start.0,
                    triple_start.1,
                    "Triple-quoted string is not closed before end of input".to_string(),
                )
                .with_suggestion(format!("Close the string with {0}{0}{0}", quote)),
            );
        }

        // One diagnostic per leftover frame, anchored where it opened.
        for frame in stack {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::UnclosedDelimiter,
                    DiagnosticSource::Scanner,
                    frame.line,
                    frame.col,
                    format!("'{}' is never closed", frame.open),
                )
                .with_suggestion(format!("Add '{}'", frame.expected_closer)),
            );
        }

        diagnostics
    }
}
