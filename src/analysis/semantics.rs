//! Cross-line semantic heuristics.
//!
//! The most speculative stage: no symbol table, just curated textual
//! checks. Confidence scores stay at or below 0.9 to reflect that,
//! and the undefined-name check is deliberately narrow (a small
//! placeholder watchlist) to keep recall low rather than spray false
//! positives.

use crate::analysis::patterns::{PatternLibrary, PLACEHOLDER_WATCHLIST};
use crate::diagnostic::{Diagnostic, DiagnosticKind, DiagnosticSource};
use regex::Regex;
use std::collections::HashMap;

pub struct SemanticHeuristics {
    patterns: PatternLibrary,
    def_name: Regex,
    watchlist: Vec<(String, Regex)>,
}

impl SemanticHeuristics {
    pub fn new() -> Self {
        let watchlist = PLACEHOLDER_WATCHLIST
            .iter()
            .map(|name| {
                (
                    name.to_string(),
                    Regex::new(&format!(r"\b{}\b", regex::escape(name))).unwrap(),
                )
            })
            .collect();
        Self {
            patterns: PatternLibrary::new(),
            def_name: Regex::new(r"^\s*(?:async\s+)?(?:def|class)\s+([A-Za-z_]\w*)").unwrap(),
            watchlist,
        }
    }

    /// `text` is the fragment under analysis; `whole_file` is the full
    /// containing document, used for use-counting and prefix checks.
    /// Line indexes in `text` are assumed to coincide with line
    /// indexes in `whole_file`, i.e. the fragment starts at line 0 of
    /// its document. The pipeline analyzes whole documents, so the two
    /// arguments are the same text today; a caller passing a sub-range
    /// fragment must pad it to keep line numbering aligned.
    pub fn analyze(&self, text: &str, whole_file: &str) -> Vec<Diagnostic> {
        let mut diagnostics = Vec::new();
        self.check_duplicate_definitions(text, &mut diagnostics);
        self.check_unused_imports(text, whole_file, &mut diagnostics);
        self.check_first_parameter(text, &mut diagnostics);
        self.check_placeholders(text, whole_file, &mut diagnostics);
        diagnostics
    }

    fn check_duplicate_definitions(&self, text: &str, diagnostics: &mut Vec<Diagnostic>) {
        let mut first_seen: HashMap<&str, usize> = HashMap::new();
        for (i, line) in text.lines().enumerate() {
            let Some(caps) = self.def_name.captures(line) else {
                continue;
            };
            let Some(m) = caps.get(1) else { continue };
            match first_seen.get(m.as_str()) {
                Some(first) => {
                    let col = line[..m.start()].chars().count();
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::DuplicateDefinition,
                            DiagnosticSource::Semantics,
                            i,
                            col,
                            format!(
                                "'{}' is defined again; first definition at line {}",
                                m.as_str(),
                                first + 1
                            ),
                        )
                        .with_span(i, col + m.as_str().chars().count())
                        .with_context(line.trim().to_string()),
                    );
                }
                None => {
                    first_seen.insert(m.as_str(), i);
                }
            }
        }
    }

    fn check_unused_imports(&self, text: &str, whole_file: &str, diagnostics: &mut Vec<Diagnostic>) {
        for (i, line) in text.lines().enumerate() {
            for (name, col) in self.patterns.imported_names(line) {
                // Count whole-word occurrences across the containing
                // file; the import line itself accounts for one.
                let pattern = Regex::new(&format!(r"\b{}\b", regex::escape(name)));
                let Ok(pattern) = pattern else { continue };
                let uses = pattern.find_iter(whole_file).count();
                if uses <= 1 {
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::UnusedImport,
                            DiagnosticSource::Semantics,
                            i,
                            col,
                            format!("'{}' is imported but never used", name),
                        )
                        .with_span(i, col + name.chars().count())
                        .with_suggestion(format!("Remove the unused import '{}'", name))
                        .with_context(line.trim().to_string()),
                    );
                }
            }
        }
    }

    fn check_first_parameter(&self, text: &str, diagnostics: &mut Vec<Diagnostic>) {
        let lines: Vec<&str> = text.lines().collect();
        for (i, line) in lines.iter().enumerate() {
            let indent = line.chars().take_while(|c| c.is_whitespace()).count();
            // Methods only: module-level functions take anything.
            if indent == 0 {
                continue;
            }
            let Some((Some(name), true)) = self.patterns.def_parts(line) else {
                continue;
            };
            let Some(open) = line.find('(') else { continue };
            let close = line.rfind(')').unwrap_or(line.len());
            if close <= open {
                continue;
            }
            let first_param = line[open + 1..close]
                .split(',')
                .next()
                .unwrap_or("")
                .trim()
                .split([':', '='])
                .next()
                .unwrap_or("")
                .trim()
                .to_string();

            let prev = (0..i)
                .rev()
                .map(|j| lines[j].trim())
                .find(|l| !l.is_empty());
            if prev.is_some_and(|l| l.contains("@staticmethod")) {
                continue;
            }
            let expected = if prev.is_some_and(|l| l.contains("classmethod")) {
                "cls"
            } else {
                "self"
            };
            if first_param != expected && first_param != "cls" && first_param != "self" {
                let col = line[..open].chars().count() + 1;
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::ParameterConvention,
                        DiagnosticSource::Semantics,
                        i,
                        col,
                        format!(
                            "first parameter of method '{}' should be '{}', found '{}'",
                            name,
                            expected,
                            if first_param.is_empty() { "(none)" } else { &first_param }
                        ),
                    )
                    .with_suggestion(format!("Make '{}' the first parameter", expected))
                    .with_context(line.trim().to_string()),
                );
            }
        }
    }

    fn check_placeholders(&self, text: &str, whole_file: &str, diagnostics: &mut Vec<Diagnostic>) {
        let file_lines: Vec<&str> = whole_file.lines().collect();
        for (i, line) in text.lines().enumerate() {
            let trimmed = line.trim_start();
            if trimmed.starts_with('#') {
                continue;
            }
            for (name, pattern) in &self.watchlist {
                let Some(m) = pattern.find(line) else { continue };
                // Assigning to the name defines it; only bare uses of
                // a never-defined placeholder are suspicious.
                if self.patterns.is_assignment(line)
                    && line.split('=').next().is_some_and(|lhs| lhs.contains(name))
                {
                    continue;
                }
                let defined_earlier = file_lines.iter().take(i).any(|prev| {
                    let Some(found) = pattern.find(prev) else {
                        return false;
                    };
                    let after = prev[found.end()..].trim_start();
                    let before = prev[..found.start()].trim_end();
                    after.starts_with('=') && !after.starts_with("==")
                        || before.ends_with("def")
                        || before.ends_with("class")
                        || before.ends_with("import")
                        || prev.trim_start().starts_with("for ")
                });
                if !defined_earlier {
                    let col = line[..m.start()].chars().count();
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticKind::UndefinedVariable,
                            DiagnosticSource::Semantics,
                            i,
                            col,
                            format!("'{}' is used but never assigned, defined, or imported", name),
                        )
                        .with_span(i, col + name.chars().count())
                        .with_confidence(0.85)
                        .with_context(line.trim().to_string()),
                    );
                }
            }
        }
    }
}

impl Default for SemanticHeuristics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(text: &str) -> Vec<Diagnostic> {
        SemanticHeuristics::new().analyze(text, text)
    }

    #[test]
    fn test_duplicate_definition_flags_second_site() {
        let text = "def foo():\n    pass\n\ndef foo():\n    pass\n";
        let diags = analyze(text);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::DuplicateDefinition);
        assert_eq!(diags[0].line, 3);
        assert_eq!(diags[0].severity, crate::diagnostic::Severity::Warning);
    }

    #[test]
    fn test_distinct_definitions_clean() {
        let text = "def foo():\n    pass\n\nclass Bar:\n    pass\n";
        assert!(analyze(text).is_empty());
    }

    #[test]
    fn test_unused_import() {
        let text = "import os\nimport sys\n\nprint(sys.argv)\n";
        let diags = analyze(text);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::UnusedImport);
        assert_eq!(diags[0].line, 0);
        assert!((diags[0].confidence - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_used_import_clean() {
        let text = "import os\n\nprint(os.getcwd())\n";
        assert!(analyze(text).is_empty());
    }

    #[test]
    fn test_unused_import_counts_whole_file() {
        let fragment = "import os\n";
        let whole = "import os\n\ndef f():\n    return os.sep\n";
        let diags = SemanticHeuristics::new().analyze(fragment, whole);
        assert!(diags.is_empty());
    }

    #[test]
    fn test_method_first_param_self() {
        let text = "class A:\n    def m(x):\n        pass\n";
        let diags = analyze(text);
        let conv = diags
            .iter()
            .find(|d| d.kind == DiagnosticKind::ParameterConvention)
            .unwrap();
        assert_eq!(conv.line, 1);
        assert!(conv.message.contains("self"));
    }

    #[test]
    fn test_classmethod_expects_cls() {
        let text = "class A:\n    @classmethod\n    def m(self):\n        pass\n";
        let clean = "class A:\n    @classmethod\n    def m(cls):\n        pass\n";
        // `self` on a classmethod is tolerated (both conventions are
        // accepted names); an arbitrary first name is not.
        assert!(analyze(clean).is_empty());
        assert!(analyze(text).is_empty());

        let bad = "class A:\n    @classmethod\n    def m(ctx):\n        pass\n";
        let diags = analyze(bad);
        assert!(diags
            .iter()
            .any(|d| d.kind == DiagnosticKind::ParameterConvention && d.message.contains("cls")));
    }

    #[test]
    fn test_staticmethod_skipped() {
        let text = "class A:\n    @staticmethod\n    def m(x):\n        pass\n";
        assert!(analyze(text).is_empty());
    }

    #[test]
    fn test_module_level_def_not_checked() {
        assert!(analyze("def f(x):\n    return x\n").is_empty());
    }

    #[test]
    fn test_placeholder_without_definition_flagged() {
        let text = "result = placeholder + 1\n";
        let diags = analyze(text);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::UndefinedVariable);
        assert_eq!(diags[0].severity, crate::diagnostic::Severity::Error);
        assert!(diags[0].confidence <= 0.9);
    }

    #[test]
    fn test_placeholder_assigned_earlier_clean() {
        let text = "placeholder = compute()\nresult = placeholder + 1\n";
        assert!(analyze(text).is_empty());
    }

    #[test]
    fn test_placeholder_in_comment_ignored() {
        assert!(analyze("# placeholder for future work\n").is_empty());
    }

    #[test]
    fn test_confidences_capped() {
        let text = "import os\nresult = placeholder\n\ndef foo():\n    pass\ndef foo():\n    pass\n";
        for d in analyze(text) {
            assert!(d.confidence <= 0.9, "{:?} too confident", d.kind);
        }
    }
}
