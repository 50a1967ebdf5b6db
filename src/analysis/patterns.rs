//! Precompiled pattern catalogue shared by the line-oriented checks.
//!
//! All regexes are compiled once per analyzer instance; the patterns
//! are static literals so `Regex::new` cannot fail at runtime.

use regex::Regex;

/// Control-flow keywords whose statement head must end with a colon.
pub const CONTROL_KEYWORDS: &[&str] = &[
    "if", "elif", "else", "for", "while", "try", "except", "finally", "with", "def", "class",
    "match", "case",
];

/// Placeholder identifiers that usually mean "someone forgot to fill
/// this in". Kept deliberately short to stay low-recall.
pub const PLACEHOLDER_WATCHLIST: &[&str] = &[
    "undefined",
    "placeholder",
    "todo_value",
    "tbd",
    "changeme",
    "fill_me_in",
    "not_implemented_yet",
];

pub struct PatternLibrary {
    control_head: Regex,
    def_head: Regex,
    class_head: Regex,
    import_plain: Regex,
    from_import: Regex,
    identifier: Regex,
    parameter: Regex,
    assignment: Regex,
    call_line: Regex,
}

impl PatternLibrary {
    pub fn new() -> Self {
        Self {
            // Statement head: optional `async`, then a control keyword.
            control_head: Regex::new(
                r"^\s*(?:async\s+)?(if|elif|else|for|while|try|except|finally|with|def|class|match|case)\b",
            )
            .unwrap(),
            def_head: Regex::new(r"^\s*(?:async\s+)?def\b\s*([A-Za-z_]\w*)?\s*(\()?").unwrap(),
            class_head: Regex::new(r"^\s*class\b\s*([A-Za-z_]\w*)?").unwrap(),
            import_plain: Regex::new(r"^\s*import\s+(.+)$").unwrap(),
            from_import: Regex::new(r"^\s*from\s+[\w.]+\s+import\s+(.+)$").unwrap(),
            identifier: Regex::new(r"^[A-Za-z_]\w*$").unwrap(),
            // One formal parameter: *args/**kwargs prefixes, optional
            // annotation or default.
            parameter: Regex::new(r"^\*{0,2}[A-Za-z_]\w*(\s*[:=].*)?$").unwrap(),
            assignment: Regex::new(r"^\s*[A-Za-z_][\w.\[\]'\x22]*\s*=(?:[^=]|$)").unwrap(),
            call_line: Regex::new(r"^\s*[A-Za-z_][\w.]*\(.*\)\s*(#.*)?$").unwrap(),
        }
    }

    /// The control keyword heading this line, if any.
    pub fn control_keyword<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.control_head
            .captures(line)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
    }

    /// (name, has_open_paren) for a `def` head, if the line is one.
    pub fn def_parts<'a>(&self, line: &'a str) -> Option<(Option<&'a str>, bool)> {
        let caps = self.def_head.captures(line)?;
        Some((caps.get(1).map(|m| m.as_str()), caps.get(2).is_some()))
    }

    /// Class name for a `class` head, if the line is one.
    pub fn class_name<'a>(&self, line: &'a str) -> Option<Option<&'a str>> {
        self.class_head
            .captures(line)
            .map(|c| c.get(1).map(|m| m.as_str()))
    }

    pub fn is_valid_identifier(&self, name: &str) -> bool {
        self.identifier.is_match(name)
    }

    pub fn is_valid_parameter(&self, param: &str) -> bool {
        let trimmed = param.trim();
        trimmed.is_empty() || self.parameter.is_match(trimmed)
    }

    pub fn is_assignment(&self, line: &str) -> bool {
        self.assignment.is_match(line)
    }

    /// A line that is one complete, balanced call expression.
    pub fn is_complete_call(&self, line: &str) -> bool {
        self.call_line.is_match(line) && paren_balance(line) == 0
    }

    /// Names bound by an import line, with the column of each name.
    pub fn imported_names<'a>(&self, line: &'a str) -> Vec<(&'a str, usize)> {
        let clause = if let Some(caps) = self.from_import.captures(line) {
            caps.get(1)
        } else if let Some(caps) = self.import_plain.captures(line) {
            caps.get(1)
        } else {
            None
        };
        let Some(clause) = clause else {
            return Vec::new();
        };

        let mut names = Vec::new();
        let clause_start = clause.start();
        let mut offset = 0;
        for part in clause.as_str().split(',') {
            // `x as y` binds y; `a.b` binds the top-level a.
            let bound = match part.split_whitespace().collect::<Vec<_>>().as_slice() {
                [name] => name.split('.').next().unwrap_or(name),
                [_, "as", alias] => *alias,
                _ => {
                    offset += part.len() + 1;
                    continue;
                }
            };
            if self.is_valid_identifier(bound) {
                let col_in_part = part.find(bound).unwrap_or(0);
                names.push((bound, clause_start + offset + col_in_part));
            }
            offset += part.len() + 1;
        }
        names
    }
}

impl Default for PatternLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Net open-parenthesis count for one line, ignoring characters inside
/// single-line string literals and after a comment marker.
pub fn paren_balance(line: &str) -> i32 {
    let mut depth = 0;
    let mut in_string: Option<char> = None;
    let mut escaped = false;
    for ch in line.chars() {
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
            '#' => break,
            '\'' | '"' => in_string = Some(ch),
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    depth
}
