//! Prompt construction for the advisor pass.

use crate::diagnostic::Diagnostic;
use crate::fragment::SourceFragment;

/// Reply sentinel for a clean fragment.
pub const NO_ERRORS_SENTINEL: &str = "NO_ERRORS";

/// Per-finding reply prefix.
pub const ERROR_PREFIX: &str = "ERROR|";

/// Keep prompts bounded regardless of fragment size.
const MAX_PROMPT_CODE_CHARS: usize = 8_000;

pub fn build_prompt(fragment: &SourceFragment, existing: &[Diagnostic]) -> String {
    let code = truncate_content(fragment.text(), MAX_PROMPT_CODE_CHARS);

    let mut known = String::new();
    if !existing.is_empty() {
        known.push_str("\nAlready detected (do not repeat these):\n");
        for d in existing {
            known.push_str(&format!("- line {}: {} ({})\n", d.line, d.message, d.rule_id));
        }
    }

    format!(
        "You are a strict code reviewer. Find real defects in the {lang} code below.\n\
         \n\
         Categories: SYNTAX, SEMANTIC, LOGICAL, STRUCTURAL.\n\
         Severities: CRITICAL, ERROR, WARNING, INFO, HINT.\n\
         \n\
         Report one finding per line, exactly this format (0-based line and column):\n\
         {prefix}<line>|<col>|<category>|<severity>|<message>|<suggestion>|<confidence 0.0-1.0>\n\
         \n\
         Only report findings you are highly confident about. If the code has no\n\
         defects, reply with exactly: {sentinel}\n\
         {known}\n\
         Code:\n\
         ```{lang}\n\
         {code}\n\
         ```",
        lang = fragment.language(),
        prefix = ERROR_PREFIX,
        sentinel = NO_ERRORS_SENTINEL,
        known = known,
        code = code,
    )
}

/// Truncate file contents for prompt safety (keep beginning + end).
pub(crate) fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        content.to_string()
    } else {
        let head: String = content.chars().take(max_chars / 2).collect();
        let tail_rev: String = content.chars().rev().take(max_chars / 2).collect();
        let tail: String = tail_rev.chars().rev().collect();
        format!("{}\n\n... [truncated] ...\n\n{}", head, tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{DiagnosticKind, DiagnosticSource};

    #[test]
    fn test_prompt_embeds_code_and_protocol() {
        let fragment = SourceFragment::new("if x > 0\n    pass", "python", "a.py");
        let prompt = build_prompt(&fragment, &[]);
        assert!(prompt.contains("if x > 0"));
        assert!(prompt.contains("ERROR|<line>|<col>"));
        assert!(prompt.contains(NO_ERRORS_SENTINEL));
        assert!(prompt.contains("```python"));
    }

    #[test]
    fn test_prompt_lists_existing_findings() {
        let fragment = SourceFragment::new("foo(", "python", "a.py");
        let existing = vec![Diagnostic::new(
            DiagnosticKind::UnclosedDelimiter,
            DiagnosticSource::Scanner,
            0,
            3,
            "'(' is never closed",
        )];
        let prompt = build_prompt(&fragment, &existing);
        assert!(prompt.contains("do not repeat"));
        assert!(prompt.contains("unclosed-delimiter"));
    }

    #[test]
    fn test_truncate_content_keeps_ends() {
        let content = "start middle middle middle end";
        let t = truncate_content(content, 10);
        assert!(t.contains("truncated"));
        assert!(t.starts_with("start"));
        assert!(t.ends_with("end"));
    }
}
