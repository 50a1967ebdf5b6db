//! Line- and block-oriented structural checks.
//!
//! Everything here is regex/string heuristics on physical lines, not
//! parsing: the inputs this tool exists for are exactly the ones a
//! real parser rejects. Multi-line constructs are tolerated by
//! tracking a running parenthesis depth across lines.

use crate::analysis::patterns::{paren_balance, PatternLibrary};
use crate::diagnostic::{Diagnostic, DiagnosticKind, DiagnosticSource};

/// Classification of one line's leading whitespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndentStyle {
    None,
    Spaces,
    Tabs,
    Mixed,
}

fn classify_indent(leading: &str) -> IndentStyle {
    let has_space = leading.contains(' ');
    let has_tab = leading.contains('\t');
    match (has_space, has_tab) {
        (false, false) => IndentStyle::None,
        (true, false) => IndentStyle::Spaces,
        (false, true) => IndentStyle::Tabs,
        (true, true) => IndentStyle::Mixed,
    }
}

/// A colon check deferred while a multi-line head is still open.
struct PendingColon {
    keyword: String,
    start_line: usize,
}

pub struct StructuralAnalyzer {
    patterns: PatternLibrary,
}

impl StructuralAnalyzer {
    pub fn new() -> Self {
        Self {
            patterns: PatternLibrary::new(),
        }
    }

    pub fn analyze(&self, text: &str) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        let lines: Vec<&str> = text.lines().collect();

        let mut expected_style: Option<IndentStyle> = None;
        // Indent widths of currently open blocks; 0 is always live.
        let mut indent_stack: Vec<usize> = vec![0];
        // (indent width, ended with colon) of the last significant line.
        let mut prev_significant: Option<(usize, bool)> = None;
        let mut paren_depth: i32 = 0;
        let mut pending_colon: Option<PendingColon> = None;
        // Indent of the line that opened a still-unbalanced bracket
        // run; the balancing line closes a header at that indent.
        let mut open_head: Option<usize> = None;
        let mut in_triple: Option<char> = None;
        // Bare `except:` clauses awaiting an ordering violation:
        // (line, indent width, column of keyword).
        let mut bare_excepts: Vec<(usize, usize, usize)> = Vec::new();

        for (i, raw_line) in lines.iter().enumerate() {
            let (next_triple, started_inside) = advance_triple_state(raw_line, in_triple);
            let was_inside = started_inside || in_triple.is_some();
            in_triple = next_triple;
            if was_inside {
                continue;
            }

            let line = strip_comment(raw_line);
            let trimmed = line.trim();
            let leading: String = raw_line
                .chars()
                .take_while(|c| *c == ' ' || *c == '\t')
                .collect();
            let indent_width = leading.chars().count();

            if trimmed.is_empty() || raw_line.trim_start().starts_with('#') {
                continue;
            }

            let continuation = paren_depth > 0;
            let depth_before = paren_depth;
            paren_depth = (paren_depth + paren_balance(&line)).max(0);

            // Deferred colon check: once a multi-line head balances,
            // the balancing line must carry the colon.
            if let Some(pending) = pending_colon.take() {
                if paren_depth == 0 {
                    if !trimmed.trim_end().ends_with(':') && !trimmed.ends_with('\\') {
                        diagnostics.push(
                            Diagnostic::new(
                                DiagnosticKind::MissingColon,
                                DiagnosticSource::Structure,
                                i,
                                raw_line.trim_end().chars().count(),
                                format!(
                                    "'{}' statement starting at line {} is missing ':'",
                                    pending.keyword,
                                    pending.start_line + 1
                                ),
                            )
                            .with_suggestion(format!("Add ':' to end the '{}' header", pending.keyword))
                            .with_context(trimmed.to_string()),
                        );
                    }
                } else {
                    pending_colon = Some(pending);
                }
            }

            if continuation {
                // Indentation and statement checks don't apply inside
                // an open bracket expression, but the balancing line
                // ends the header that opened it: a trailing colon
                // there demands an indented block just like a
                // single-line header.
                if paren_depth == 0 {
                    prev_significant =
                        Some((open_head.take().unwrap_or(indent_width), trimmed.ends_with(':')));
                }
                continue;
            }

            // ── Indentation ────────────────────────────────────────
            let style = classify_indent(&leading);
            if style == IndentStyle::Mixed {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::MixedIndentation,
                        DiagnosticSource::Structure,
                        i,
                        0,
                        "Line mixes tabs and spaces in its indentation".to_string(),
                    )
                    .with_span(i, indent_width)
                    .with_context(trimmed.to_string()),
                );
            } else if style != IndentStyle::None {
                match expected_style {
                    None => expected_style = Some(style),
                    Some(expected) if expected != style => {
                        diagnostics.push(
                            Diagnostic::new(
                                DiagnosticKind::InconsistentIndentation,
                                DiagnosticSource::Structure,
                                i,
                                0,
                                format!(
                                    "Indentation uses {} but this file indents with {}",
                                    style_name(style),
                                    style_name(expected)
                                ),
                            )
                            .with_span(i, indent_width)
                            .with_context(trimmed.to_string()),
                        );
                    }
                    Some(_) => {}
                }
            }

            if let Some((prev_indent, prev_colon)) = prev_significant {
                if prev_colon && indent_width <= prev_indent {
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::ExpectedIndentedBlock,
                            DiagnosticSource::Structure,
                            i,
                            0,
                            "Expected an indented block after ':'".to_string(),
                        )
                        .with_context(trimmed.to_string()),
                    );
                }
            }

            let top = *indent_stack.last().unwrap_or(&0);
            if indent_width > top {
                indent_stack.push(indent_width);
            } else if indent_width < top {
                while indent_stack.last().is_some_and(|t| *t > indent_width) {
                    indent_stack.pop();
                }
                if indent_stack.last() != Some(&indent_width) {
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::ImproperDedent,
                            DiagnosticSource::Structure,
                            i,
                            0,
                            "Dedent does not match any enclosing block level".to_string(),
                        )
                        .with_context(trimmed.to_string()),
                    );
                    indent_stack.push(indent_width);
                }
            }

            // ── Statement-head checks ──────────────────────────────
            let ends_with_colon = trimmed.ends_with(':');
            if let Some(keyword) = self.patterns.control_keyword(&line) {
                self.check_statement_head(
                    keyword,
                    raw_line,
                    &line,
                    trimmed,
                    i,
                    indent_width,
                    depth_before,
                    paren_depth,
                    &mut pending_colon,
                    &mut bare_excepts,
                    &mut diagnostics,
                );
            }

            if paren_depth > 0 {
                open_head = Some(indent_width);
            }
            prev_significant = Some((indent_width, ends_with_colon && paren_depth == 0));
        }

        if let Some(pending) = pending_colon {
            // Head never balanced; the delimiter scanner reports the
            // unclosed bracket, so only note the missing colon when
            // the last line plainly lacks one.
            let last = lines.len().saturating_sub(1);
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::MissingColon,
                    DiagnosticSource::Structure,
                    last,
                    lines.last().map(|l| l.trim_end().chars().count()).unwrap_or(0),
                    format!(
                        "'{}' statement starting at line {} is missing ':'",
                        pending.keyword,
                        pending.start_line + 1
                    ),
                )
                .with_confidence(0.6),
            );
        }

        diagnostics
    }

    #[allow(clippy::too_many_arguments)]
    fn check_statement_head(
        &self,
        keyword: &str,
        raw_line: &str,
        line: &str,
        trimmed: &str,
        i: usize,
        indent_width: usize,
        depth_before: i32,
        depth_after: i32,
        pending_colon: &mut Option<PendingColon>,
        bare_excepts: &mut Vec<(usize, usize, usize)>,
        diagnostics: &mut Vec<Diagnostic>,
    ) {
        let ends_with_colon = trimmed.ends_with(':');
        let keyword_col = raw_line.find(keyword).map(|b| raw_line[..b].chars().count()).unwrap_or(0);
        let rest = trimmed
            .split_once(keyword)
            .map(|(_, r)| r)
            .unwrap_or("")
            .trim();

        // Soft keywords: `match(x)` / `case(x)` are ordinary calls.
        if matches!(keyword, "match" | "case") && rest.starts_with('(') {
            return;
        }

        // Missing colon. Assignment-bearing lines and explicit
        // continuations are excluded; unbalanced heads are deferred
        // until the bracket depth returns to zero.
        if !ends_with_colon
            && !trimmed.contains('=')
            && !trimmed.ends_with('\\')
            && depth_before == 0
        {
            if depth_after > 0 {
                *pending_colon = Some(PendingColon {
                    keyword: keyword.to_string(),
                    start_line: i,
                });
            } else {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::MissingColon,
                        DiagnosticSource::Structure,
                        i,
                        raw_line.trim_end().chars().count(),
                        format!("'{}' statement is missing ':'", keyword),
                    )
                    .with_suggestion(format!("Add ':' to end the '{}' statement", keyword))
                    .with_context(trimmed.to_string()),
                );
            }
        }

        match keyword {
            "def" => self.check_def(raw_line, line, i, diagnostics),
            "class" => {
                if let Some(name) = self.patterns.class_name(line) {
                    if name.is_none() {
                        diagnostics.push(
                            Diagnostic::new(
                                DiagnosticKind::MalformedDefinition,
                                DiagnosticSource::Structure,
                                i,
                                keyword_col,
                                "class definition is missing a valid name".to_string(),
                            )
                            .with_context(trimmed.to_string()),
                        );
                    }
                }
            }
            "if" | "elif" | "while" => {
                let condition = rest.trim_end_matches(':').trim();
                if condition.is_empty() && depth_after == 0 {
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::EmptyCondition,
                            DiagnosticSource::Structure,
                            i,
                            keyword_col + keyword.chars().count(),
                            format!("'{}' has an empty condition", keyword),
                        )
                        .with_context(trimmed.to_string()),
                    );
                }
            }
            "for" => {
                let clause = rest.trim_end_matches(':');
                let has_in = clause
                    .split_whitespace()
                    .any(|w| w == "in");
                if !has_in && depth_after == 0 {
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::MissingInClause,
                            DiagnosticSource::Structure,
                            i,
                            keyword_col,
                            "'for' statement has no 'in' clause".to_string(),
                        )
                        .with_context(trimmed.to_string()),
                    );
                }
            }
            "except" => {
                let is_bare = rest.trim_end_matches(':').trim().is_empty();
                if is_bare {
                    bare_excepts.push((i, indent_width, keyword_col));
                } else if let Some(&(bare_line, bare_indent, bare_col)) = bare_excepts
                    .iter()
                    .rev()
                    .find(|(_, ind, _)| *ind == indent_width)
                {
                    // A bare except earlier in the same handler chain
                    // swallows everything this clause would catch.
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::BareExceptOrder,
                            DiagnosticSource::Structure,
                            bare_line,
                            bare_col,
                            format!(
                                "bare 'except:' at line {} precedes a more specific except clause",
                                bare_line + 1
                            ),
                        )
                        .with_context(trimmed.to_string()),
                    );
                    bare_excepts.retain(|(l, ind, _)| !(*l == bare_line && *ind == bare_indent));
                }
            }
            "try" => {
                // A new try block resets handler ordering at this level.
                bare_excepts.retain(|(_, ind, _)| *ind != indent_width);
            }
            _ => {}
        }
    }

    fn check_def(&self, raw_line: &str, line: &str, i: usize, diagnostics: &mut Vec<Diagnostic>) {
        let Some((name, has_paren)) = self.patterns.def_parts(line) else {
            return;
        };
        let trimmed = line.trim();
        let def_col = raw_line.find("def").map(|b| raw_line[..b].chars().count()).unwrap_or(0);

        if name.is_none() {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::MalformedDefinition,
                    DiagnosticSource::Structure,
                    i,
                    def_col,
                    "function definition is missing a valid name".to_string(),
                )
                .with_context(trimmed.to_string()),
            );
            return;
        }

        if !has_paren && !line.contains('(') {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::MalformedDefinition,
                    DiagnosticSource::Structure,
                    i,
                    def_col,
                    format!("'def {}' is missing its parameter list", name.unwrap_or("")),
                )
                .with_suggestion("Add '()' after the function name")
                .with_context(trimmed.to_string()),
            );
            return;
        }

        // Validate the parameter list when it closes on this line.
        let Some(open) = line.find('(') else { return };
        let Some(close) = line.rfind(')') else { return };
        if close <= open {
            return;
        }
        let params = &line[open + 1..close];
        let open_col = raw_line[..open].chars().count();
        for param in params.split(',') {
            if !self.patterns.is_valid_parameter(param) {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::MalformedDefinition,
                        DiagnosticSource::Structure,
                        i,
                        open_col,
                        format!(
                            "invalid parameter '{}' in 'def {}' (missing comma?)",
                            param.trim(),
                            name.unwrap_or("")
                        ),
                    )
                    .with_suggestion("Separate parameters with commas")
                    .with_context(trimmed.to_string()),
                );
            }
        }
    }
}

impl Default for StructuralAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn style_name(style: IndentStyle) -> &'static str {
    match style {
        IndentStyle::Spaces => "spaces",
        IndentStyle::Tabs => "tabs",
        IndentStyle::Mixed => "mixed whitespace",
        IndentStyle::None => "no indentation",
    }
}

/// Remove a trailing comment, respecting single-line strings.
fn strip_comment(line: &str) -> String {
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        if let Some(quote) = in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == quote {
                in_string = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' => in_string = Some(ch),
            '#' => return line[..idx].trim_end().to_string(),
            _ => {}
        }
    }
    line.trim_end().to_string()
}

/// Walk one line's triple-quote transitions. Returns the state after
/// the line and whether any part of the line sat inside a block that
/// was already open when the line started.
fn advance_triple_state(line: &str, state: Option<char>) -> (Option<char>, bool) {
    let chars: Vec<char> = line.chars().collect();
    let started_inside = state.is_some();
    let mut state = state;
    let mut in_single: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        let triple = (ch == '"' || ch == '\'')
            && chars.get(i + 1) == Some(&ch)
            && chars.get(i + 2) == Some(&ch);
        match state {
            Some(quote) => {
                if triple && ch == quote {
                    state = None;
                    i += 3;
                    continue;
                }
            }
            None => {
                if let Some(quote) = in_single {
                    if ch == '\\' {
                        i += 2;
                        continue;
                    }
                    if ch == quote {
                        in_single = None;
                    }
                } else if triple {
                    state = Some(ch);
                    i += 3;
                    continue;
                } else if ch == '"' || ch == '\'' {
                    in_single = Some(ch);
                } else if ch == '#' {
                    break;
                }
            }
        }
        i += 1;
    }
    (state, started_inside)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(text: &str) -> Vec<Diagnostic> {
        StructuralAnalyzer::new().analyze(text)
    }

    fn kinds(diags: &[Diagnostic]) -> Vec<DiagnosticKind> {
        diags.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn test_missing_colon_flagged_at_end_of_line() {
        let diags = analyze("if x > 0");
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::MissingColon);
        assert_eq!(diags[0].line, 0);
        assert_eq!(diags[0].column, 8);
        assert!(diags[0].confidence >= 0.95);
        assert_eq!(diags[0].quick_fixes, vec!["Add ':'".to_string()]);
    }

    #[test]
    fn test_colon_present_is_clean() {
        assert!(analyze("if x > 0:\n    pass").is_empty());
    }

    #[test]
    fn test_assignment_line_not_flagged() {
        // `=` means this is not a statement head needing a colon.
        assert!(!kinds(&analyze("while_count = 3")).contains(&DiagnosticKind::MissingColon));
        assert!(!kinds(&analyze("for_result = f(x)")).contains(&DiagnosticKind::MissingColon));
    }

    #[test]
    fn test_multiline_def_header_deferred() {
        let text = "def long_name(a,\n              b):\n    pass";
        assert!(analyze(text).is_empty());

        let text = "def long_name(a,\n              b)\n    pass";
        let diags = analyze(text);
        assert!(kinds(&diags).contains(&DiagnosticKind::MissingColon));
        // Flagged on the line where the parens balanced.
        let colon = diags
            .iter()
            .find(|d| d.kind == DiagnosticKind::MissingColon)
            .unwrap();
        assert_eq!(colon.line, 1);
    }

    #[test]
    fn test_multiline_header_demands_indented_block() {
        // The colon lands on the balancing line, but the block is
        // measured against the header's own indent.
        let diags = analyze("def f(a,\n      b):\npass");
        assert!(kinds(&diags).contains(&DiagnosticKind::ExpectedIndentedBlock));

        assert!(analyze("def f(a,\n      b):\n    return a").is_empty());
    }

    #[test]
    fn test_line_continuation_not_flagged() {
        assert!(analyze("if x > 0 and \\\n   y < 2:\n    pass").is_empty());
    }

    #[test]
    fn test_mixed_indentation_spans_leading_whitespace() {
        let diags = analyze("if x:\n \tpass");
        let mixed = diags
            .iter()
            .find(|d| d.kind == DiagnosticKind::MixedIndentation)
            .unwrap();
        assert_eq!(mixed.line, 1);
        assert_eq!(mixed.column, 0);
        assert_eq!(mixed.end_column, 2);
        assert_eq!(mixed.severity, crate::diagnostic::Severity::Error);
    }

    #[test]
    fn test_inconsistent_indentation_style() {
        let text = "if a:\n    x = 1\nif b:\n\ty = 2";
        let diags = analyze(text);
        let inconsistent = diags
            .iter()
            .find(|d| d.kind == DiagnosticKind::InconsistentIndentation)
            .unwrap();
        assert_eq!(inconsistent.line, 3);
        assert_eq!(inconsistent.severity, crate::diagnostic::Severity::Warning);
    }

    #[test]
    fn test_expected_indented_block() {
        let diags = analyze("if x:\npass");
        assert!(kinds(&diags).contains(&DiagnosticKind::ExpectedIndentedBlock));
    }

    #[test]
    fn test_improper_dedent() {
        let text = "if a:\n    if b:\n        x = 1\n   y = 2";
        let diags = analyze(text);
        assert!(kinds(&diags).contains(&DiagnosticKind::ImproperDedent));
    }

    #[test]
    fn test_matching_dedent_is_clean() {
        let text = "if a:\n    if b:\n        x = 1\n    y = 2\nz = 3";
        assert!(analyze(text).is_empty());
    }

    #[test]
    fn test_def_missing_parens() {
        let diags = analyze("def foo:\n    pass");
        assert!(kinds(&diags).contains(&DiagnosticKind::MalformedDefinition));
    }

    #[test]
    fn test_def_missing_name() {
        let diags = analyze("def (x):\n    pass");
        assert!(kinds(&diags).contains(&DiagnosticKind::MalformedDefinition));
    }

    #[test]
    fn test_def_invalid_parameter_list() {
        let diags = analyze("def foo(x y):\n    return x");
        let malformed = diags
            .iter()
            .find(|d| d.kind == DiagnosticKind::MalformedDefinition)
            .unwrap();
        assert_eq!(malformed.line, 0);
        assert_eq!(malformed.column, 7);
        assert_eq!(malformed.severity, crate::diagnostic::Severity::Error);
    }

    #[test]
    fn test_well_formed_def_is_clean() {
        assert!(analyze("def foo(x, y=1, *args, **kwargs):\n    return x").is_empty());
    }

    #[test]
    fn test_empty_condition() {
        let diags = analyze("if :\n    pass");
        assert!(kinds(&diags).contains(&DiagnosticKind::EmptyCondition));
    }

    #[test]
    fn test_for_missing_in() {
        let diags = analyze("for item:\n    pass");
        assert!(kinds(&diags).contains(&DiagnosticKind::MissingInClause));
        assert!(analyze("for item in items:\n    pass").is_empty());
    }

    #[test]
    fn test_bare_except_before_specific() {
        let text = "try:\n    f()\nexcept:\n    pass\nexcept ValueError:\n    pass";
        let diags = analyze(text);
        let bare = diags
            .iter()
            .find(|d| d.kind == DiagnosticKind::BareExceptOrder)
            .unwrap();
        assert_eq!(bare.line, 2);
    }

    #[test]
    fn test_bare_except_last_is_clean() {
        let text = "try:\n    f()\nexcept ValueError:\n    pass\nexcept:\n    pass";
        assert!(analyze(text).is_empty());
    }

    #[test]
    fn test_docstring_lines_skipped() {
        let text = "def foo():\n    \"\"\"Docs with if x\n    and for y lines\n    \"\"\"\n    return 1";
        assert!(analyze(text).is_empty());
    }

    #[test]
    fn test_class_header_multiline_bases() {
        let text = "class Foo(\n    Base,\n    Mixin,\n):\n    pass";
        assert!(analyze(text).is_empty());

        let text = "class Foo(\n    Base,\n)\n";
        let diags = analyze(text);
        assert!(kinds(&diags).contains(&DiagnosticKind::MissingColon));
    }
}
