//! Post-processing: deterministic recovery of a JSON payload from raw model
//! output.
//!
//! ## Why is post-processing necessary?
//!
//! Even well-prompted models wrap the object they were asked for in
//! packaging:
//!
//! - ` ```json ... ``` ` fences despite the prompt saying "JSON only"
//! - a `<thinking>` preamble before the answer
//! - `<json_report>` tags (which the consolidation prompt asks for)
//! - Windows-style `\r\n` line endings, a BOM, zero-width spaces
//! - a trailing comma before a closing brace
//!
//! The rules below strip that packaging without touching content. Keeping
//! them here rather than in the prompt means the prompt stays focused on
//! *what to extract*. Each rule is independently testable.
//!
//! ## Rule Order
//!
//! Normalise characters first, then narrow to the tagged region, then drop
//! reasoning blocks and fences, and only then search for the object.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Recover the JSON object the model was asked to produce.
///
/// Rules (applied in order):
/// 1. Normalise line endings (CRLF → LF)
/// 2. Strip invisible Unicode (BOM, zero-width spaces, soft hyphens)
/// 3. Narrow to the `<json_report>` region when the tag is present
/// 4. Remove `<thinking>…</thinking>` blocks
/// 5. Strip outer code fences
/// 6. Parse; failing that, parse the first balanced `{…}` object
/// 7. Failing that, retry after removing trailing commas
pub fn extract_json(raw: &str) -> Result<Value, String> {
    let s = normalise_line_endings(raw);
    let s = remove_invisible_chars(&s);
    let s = narrow_to_report_tag(&s);
    let s = remove_thinking(&s);
    let s = strip_code_fences(&s);
    let s = s.trim();

    if s.is_empty() {
        return Err("model returned no content".into());
    }
    if let Ok(v) = serde_json::from_str::<Value>(s) {
        return Ok(v);
    }

    let candidate = first_balanced_object(s)
        .ok_or_else(|| format!("no JSON object in model output: {}", preview(s)))?;
    serde_json::from_str::<Value>(candidate)
        .or_else(|_| serde_json::from_str::<Value>(&remove_trailing_commas(candidate)))
        .map_err(|e| format!("malformed JSON in model output ({e}): {}", preview(candidate)))
}

/// [`extract_json`], keeping a `<thinking>` preamble as the answer's
/// `thinking` field when the object carries none of its own.
pub fn extract_answer(raw: &str) -> Result<Value, String> {
    let mut value = extract_json(raw)?;
    if let Value::Object(ref mut map) = value {
        let has_own = map
            .get("thinking")
            .and_then(Value::as_str)
            .is_some_and(|t| !t.trim().is_empty());
        if !has_own {
            if let Some(thinking) = extract_thinking(raw) {
                map.insert("thinking".into(), Value::String(thinking));
            }
        }
    }
    Ok(value)
}

/// The model's `<thinking>` text, if it wrote one.
pub fn extract_thinking(raw: &str) -> Option<String> {
    RE_THINKING
        .captures(raw)
        .map(|caps| caps[1].trim().to_string())
        .filter(|t| !t.is_empty())
}

fn preview(s: &str) -> String {
    let head: String = s.chars().take(120).collect();
    if head.len() < s.len() {
        format!("{head}…")
    } else {
        head
    }
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 3: Narrow to <json_report> ──────────────────────────────────────────
//
// A missing closing tag means the model ran out of tokens or forgot it; the
// text after the opening tag is still the best candidate.

static RE_REPORT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<json_report>(.*?)(?:</json_report>|$)").unwrap());

fn narrow_to_report_tag(input: &str) -> String {
    match RE_REPORT_TAG.captures(input) {
        Some(caps) => caps[1].to_string(),
        None => input.to_string(),
    }
}

// ── Rule 4: Remove <thinking> blocks ─────────────────────────────────────────

static RE_THINKING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<thinking>(.*?)</thinking>").unwrap());

fn remove_thinking(input: &str) -> String {
    RE_THINKING.replace_all(input, "").to_string()
}

// ── Rule 5: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[a-zA-Z]*\n(.*)\n```\s*$").unwrap());

fn strip_code_fences(input: &str) -> String {
    if let Some(caps) = RE_OUTER_FENCES.captures(input.trim()) {
        caps[1].to_string()
    } else {
        input.to_string()
    }
}

// ── Rule 6: First balanced object ────────────────────────────────────────────

/// Slice of the first `{ … }` whose braces balance, ignoring braces inside
/// string literals.
fn first_balanced_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in input[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&input[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Rule 7: Trailing commas ──────────────────────────────────────────────────

static RE_TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",\s*([}\]])").unwrap());

fn remove_trailing_commas(input: &str) -> String {
    RE_TRAILING_COMMA.replace_all(input, "$1").to_string()
}
