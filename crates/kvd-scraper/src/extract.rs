//! Embedded store blob extraction.
//!
//! Detail pages ship their render-time state as an object literal inside a
//! `<script>` body. The literal is isolated with a brace-depth scan starting
//! at the first `{`, then parsed with `serde_json`. Because the literal is
//! not always strict JSON, a rewrite pass can be applied when the strict
//! parse fails.

use serde_json::Value;

/// Isolates the first balanced `{ ... }` in `text`.
///
/// Braces inside double- or single-quoted strings and inside `//` or `/* */`
/// comments are ignored. Returns `None` when there is no `{` or when the text
/// ends before depth returns to zero.
#[must_use]
pub fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let s = &text[start..];
    let chars: Vec<(usize, char)> = s.char_indices().collect();

    let mut depth: usize = 0;
    let mut quote: Option<char> = None;
    let mut i = 0;
    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, n)| n);
        if let Some(q) = quote {
            match c {
                '\\' => i += 1,
                c if c == q => quote = None,
                _ => {}
            }
            i += 1;
            continue;
        }
        match (c, next) {
            ('/', Some('/')) => {
                while i < chars.len() && chars[i].1 != '\n' {
                    i += 1;
                }
                continue;
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len()
                    && !(chars[i].1 == '*' && chars.get(i + 1).map(|&(_, n)| n) == Some('/'))
                {
                    i += 1;
                }
                i += 2;
                continue;
            }
            ('"' | '\'', _) => quote = Some(c),
            ('{', _) => depth += 1,
            ('}', _) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&s[..=pos]);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Extracts and parses the first balanced object literal in `text`.
///
/// When the strict parse fails and `lenient` is set, the candidate is
/// rewritten with [`js_literal_to_json`] and parsed once more. Every failure
/// is logged and reported as `None`.
#[must_use]
pub fn extract(text: &str, lenient: bool) -> Option<Value> {
    if !text.contains('{') {
        return None;
    }
    let Some(candidate) = balanced_object(text) else {
        tracing::warn!("unbalanced braces in embedded store blob");
        return None;
    };

    match serde_json::from_str::<Value>(candidate) {
        Ok(value) => Some(value),
        Err(strict_err) if lenient => {
            let rewritten = js_literal_to_json(candidate);
            match serde_json::from_str::<Value>(&rewritten) {
                Ok(value) => {
                    tracing::debug!(error = %strict_err, "store blob parsed after JS literal rewrite");
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(error = %e, strict_error = %strict_err, "store blob is not parseable");
                    None
                }
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "store blob is not valid JSON");
            None
        }
    }
}

/// Rewrites common JS object-literal syntax into strict JSON.
///
/// Outside string literals: strips `//` and `/* */` comments, converts
/// single-quoted strings to double-quoted ones, quotes bare identifier keys,
/// maps `undefined` to `null`, and drops trailing commas before `}` or `]`.
#[must_use]
pub fn js_literal_to_json(src: &str) -> String {
    let chars: Vec<char> = src.chars().collect();
    let mut out = String::with_capacity(src.len() + 16);
    // Last non-whitespace char written; decides whether an identifier is a key.
    let mut last_sig: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' => {
                let end = copy_double_quoted(&chars, i, &mut out);
                last_sig = Some('"');
                i = end;
            }
            '\'' => {
                let end = convert_single_quoted(&chars, i, &mut out);
                last_sig = Some('"');
                i = end;
            }
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i = (i + 2).min(chars.len());
            }
            ',' => {
                if !matches!(next_significant(&chars, i + 1), Some('}' | ']')) {
                    out.push(',');
                    last_sig = Some(',');
                }
                i += 1;
            }
            c if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_ascii_alphanumeric() || chars[i] == '_' || chars[i] == '$')
                {
                    i += 1;
                }
                let ident: String = chars[start..i].iter().collect();
                let is_key = matches!(last_sig, Some('{' | ','))
                    && next_significant(&chars, i) == Some(':');
                if is_key {
                    out.push('"');
                    out.push_str(&ident);
                    out.push('"');
                } else if ident == "undefined" {
                    out.push_str("null");
                } else {
                    out.push_str(&ident);
                }
                last_sig = Some('a');
            }
            c => {
                out.push(c);
                if !c.is_whitespace() {
                    last_sig = Some(c);
                }
                i += 1;
            }
        }
    }
    out
}

fn next_significant(chars: &[char], from: usize) -> Option<char> {
    chars[from.min(chars.len())..]
        .iter()
        .copied()
        .find(|c| !c.is_whitespace())
}

/// Copies a double-quoted string starting at `start`; returns the index after it.
fn copy_double_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        out.push(c);
        if c == '\\' {
            if let Some(&next) = chars.get(i + 1) {
                out.push(next);
            }
            i += 2;
            continue;
        }
        i += 1;
        if c == '"' {
            break;
        }
    }
    i
}

/// Re-emits a single-quoted string as a double-quoted one.
fn convert_single_quoted(chars: &[char], start: usize, out: &mut String) -> usize {
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => match chars.get(i + 1) {
                Some('\'') => {
                    out.push('\'');
                    i += 2;
                }
                Some(&next) => {
                    out.push('\\');
                    out.push(next);
                    i += 2;
                }
                None => i += 1,
            },
            '\'' => {
                i += 1;
                break;
            }
            '"' => {
                out.push_str("\\\"");
                i += 1;
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    out.push('"');
    i
}
