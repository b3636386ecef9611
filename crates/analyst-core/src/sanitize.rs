//! Formatting cleanup applied to generated code before validation.

const LANGUAGE_TAGS: &[&str] = &["python", "python3", "py"];

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

/// Strip surrounding code fences and comment out notebook magics.
///
/// Lines starting with `%` or `!` (after indentation) become comments with
/// their indentation kept, so line numbers in later diagnostics still match
/// the sanitized text.
pub fn sanitize(code: &str) -> String {
    let mut lines: Vec<&str> = code.lines().collect();

    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    if lines.first().is_some_and(|l| is_fence(l)) {
        lines.remove(0);
    } else if lines
        .first()
        .is_some_and(|l| LANGUAGE_TAGS.contains(&l.trim().to_ascii_lowercase().as_str()))
    {
        // A bare language tag left behind by a stripped fence.
        lines.remove(0);
    }
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }

    let mut out = String::with_capacity(code.len());
    for line in lines {
        let body = line.trim_start();
        if body.starts_with('%') || body.starts_with('!') {
            let indent = &line[..line.len() - body.len()];
            out.push_str(indent);
            out.push_str("# ");
            out.push_str(body);
        } else {
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_fences_and_tag() {
        let s = sanitize("```python\nprint(1)\n```\n");
        assert_eq!(s, "print(1)\n");
        let s = sanitize("\n\n```\nx = 1\n```");
        assert_eq!(s, "x = 1\n");
        let s = sanitize("python\nprint(2)");
        assert_eq!(s, "print(2)\n");
    }

    #[test]
    fn comments_out_magics_keeping_indent() {
        let s = sanitize("%matplotlib inline\nif True:\n    !pip install x\n    print(1)\n");
        assert_eq!(
            s,
            "# %matplotlib inline\nif True:\n    # !pip install x\n    print(1)\n"
        );
    }

    #[test]
    fn inequality_is_untouched() {
        let s = sanitize("print(1 != 2)\nx = 5 % 3\n");
        assert_eq!(s, "print(1 != 2)\nx = 5 % 3\n");
    }

    #[test]
    fn line_count_preserved_for_magics() {
        let src = "a = 1\n%time a\nb = 2\n";
        assert_eq!(sanitize(src).lines().count(), src.lines().count());
    }

    #[test]
    fn empty_input() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("```\n```"), "");
    }
}
