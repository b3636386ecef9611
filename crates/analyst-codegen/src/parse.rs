use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::types::GeneratedCode;

/// Minimal dataset summary substituted when a reply cannot be parsed.
/// Runs against whatever the harness bound to `df`.
pub const FALLBACK_SCRIPT: &str = r#"print("Fallback analysis: dataset summary")
try:
    print("shape:", df.shape)
    print("columns:", list(df.columns))
    print(df.head(5).to_string())
    print(df.describe(include="all").to_string())
except AttributeError:
    print("rows:", len(df))
    if len(df) > 0:
        print("columns:", list(df[0].keys()))
insights = {"fallback": True}
"#;

pub const FALLBACK_DESCRIPTION: &str = "Fallback dataset summary (service reply could not be parsed)";

const DEFAULT_DESCRIPTION: &str = "Generated analysis";
const MAX_DESCRIPTION_CHARS: usize = 200;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_+-]*)[^\n]*\n(.*?)```").expect("valid regex")
    })
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: String,
    #[serde(default)]
    description: Option<String>,
}

struct Fence<'a> {
    lang: String,
    body: &'a str,
}

fn fences(text: &str) -> Vec<Fence<'_>> {
    fence_re()
        .captures_iter(text)
        .filter_map(|c| {
            Some(Fence {
                lang: c.get(1)?.as_str().to_ascii_lowercase(),
                body: c.get(2)?.as_str(),
            })
        })
        .collect()
}

/// Turn a free-text service reply into [`GeneratedCode`].
///
/// Order of preference:
/// 1. a fenced code block (a `python`/`py` fence wins over untagged ones,
///    `json` fences are metadata, never code);
/// 2. a JSON envelope `{"code": ..., "description": ...}`, re-tried once
///    after [`repair_json_newlines`];
/// 3. [`FALLBACK_SCRIPT`], flagged with `fallback = true`.
///
/// Never fails.
pub fn parse_generated_code(reply: &str) -> GeneratedCode {
    let blocks = fences(reply);
    let code_block = blocks
        .iter()
        .find(|f| matches!(f.lang.as_str(), "python" | "py" | "python3"))
        .or_else(|| blocks.iter().find(|f| f.lang != "json"))
        .filter(|f| !f.body.trim().is_empty());

    if let Some(block) = code_block {
        let description = blocks
            .iter()
            .filter(|f| f.lang == "json")
            .find_map(|f| parse_envelope_description(f.body))
            .or_else(|| prose_description(reply))
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
        debug!(lang = %block.lang, "extracted fenced code block");
        return GeneratedCode::new(block.body.trim_end(), description);
    }

    if let Some(env) = parse_envelope(reply) {
        debug!("extracted code from JSON envelope");
        let description = env
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());
        return GeneratedCode::new(env.code, description);
    }

    warn!("service reply held no usable code, substituting fallback summary");
    GeneratedCode {
        fallback: true,
        ..GeneratedCode::new(FALLBACK_SCRIPT, FALLBACK_DESCRIPTION)
    }
}

fn parse_envelope(reply: &str) -> Option<Envelope> {
    let candidate = json_object_span(reply)?;
    let env = serde_json::from_str::<Envelope>(candidate)
        .or_else(|_| serde_json::from_str::<Envelope>(&repair_json_newlines(candidate)))
        .ok()?;
    (!env.code.trim().is_empty()).then_some(env)
}

fn parse_envelope_description(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body)
        .or_else(|_| serde_json::from_str(&repair_json_newlines(body)))
        .ok()?;
    value
        .get("description")?
        .as_str()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}

/// From the first `{` to the last `}`.
fn json_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// First non-empty prose line outside any fence, without markdown heading marks.
fn prose_description(reply: &str) -> Option<String> {
    let outside = fence_re().replace_all(reply, "\n");
    let line = outside
        .lines()
        .map(|l| l.trim().trim_start_matches('#').trim())
        .find(|l| !l.is_empty())?;
    Some(line.chars().take(MAX_DESCRIPTION_CHARS).collect())
}

/// Escape raw line breaks and tabs that appear inside JSON string literals.
///
/// Language models often emit `"code": "import x\nprint(1)"` with literal
/// newlines, which strict JSON rejects. Characters outside strings are left
/// untouched.
pub fn repair_json_newlines(json: &str) -> String {
    let mut out = String::with_capacity(json.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    for ch in json.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(ch);
                continue;
            }
            match ch {
                '\\' => {
                    escaped = true;
                    out.push(ch);
                }
                '"' => {
                    in_string = false;
                    out.push(ch);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(ch),
            }
        } else {
            if ch == '"' {
                in_string = true;
            }
            out.push(ch);
        }
    }
    out
}
