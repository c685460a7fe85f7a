//! Source preprocessor
//!
//! Turns raw script text into ordered logical lines:
//! 1. Comments are stripped and blank lines dropped
//! 2. A line ending in `\` is folded into the following line(s), keeping the first line's number
//! 3. The call shorthand `@path.to.script(args)` expands to `call("path/to/script", args)`
//!
//! Nothing here raises errors; malformed input surfaces in the structural parser.

use std::collections::BTreeMap;

use super::tokenizer::{sanitize, SanitizeOps};

/// Line continuation marker
pub const CONTINUATION_SYMBOL: char = '\\';

/// Starts the call shorthand
pub const CALL_MACRO_SYMBOL: char = '@';

/// Replaces `.` in shorthand script paths
pub const PATH_SEPARATOR: char = '/';

/// Logical line number → processed text
pub type SourceLines = BTreeMap<u32, String>;

/* ===================== Public API ===================== */

/// Preprocess a complete script source.
pub fn preprocess(source: &str) -> SourceLines {
    let mut lines = SourceLines::new();
    let mut pending: Option<(u32, String)> = None;

    for (index, raw) in source.lines().enumerate() {
        let number = index as u32 + 1;
        let sanitized = sanitize(raw, SanitizeOps::COMMENTS);
        if sanitized.is_empty() {
            continue;
        }

        let continued = sanitized.ends_with(CONTINUATION_SYMBOL);
        let body = if continued {
            &sanitized[..sanitized.len() - CONTINUATION_SYMBOL.len_utf8()]
        } else {
            sanitized.as_str()
        };

        match pending.take() {
            Some((first_line, mut accum)) => {
                accum.push_str(body.trim_start());
                if continued {
                    pending = Some((first_line, accum));
                } else {
                    emit(&mut lines, first_line, &accum);
                }
            }
            None if continued => pending = Some((number, body.to_string())),
            None => emit(&mut lines, number, body),
        }
    }

    // Input ended mid-continuation
    if let Some((first_line, accum)) = pending {
        emit(&mut lines, first_line, &accum);
    }

    lines
}

fn emit(lines: &mut SourceLines, number: u32, text: &str) {
    if text.trim().is_empty() {
        return;
    }
    lines.insert(number, expand_call_macro(text));
}

/// Expand every `@a.b.c(args)` in `line` into `call("a/b/c", args)`.
///
/// The line is returned unmodified when a shorthand has no opening parenthesis, or no
/// closing parenthesis after it.
pub fn expand_call_macro(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut processed = String::with_capacity(line.len() + 8);
    let mut call: Option<String> = None;

    for (i, &c) in chars.iter().enumerate() {
        if let Some(current) = call.as_mut() {
            match c {
                '(' => {
                    if !chars[i + 1..].contains(&')') {
                        return line.to_string();
                    }
                    let has_args = chars.get(i + 1).is_some_and(|&next| next != ')');
                    current.push_str(if has_args { "\", " } else { "\"" });
                    processed.push_str(current);
                    call = None;
                }
                '.' => current.push(PATH_SEPARATOR),
                c if c.is_whitespace() => {}
                c => current.push(c),
            }
            continue;
        }

        if c == CALL_MACRO_SYMBOL {
            call = Some(String::from("call(\""));
        } else {
            processed.push(c);
        }
    }

    if call.is_some() {
        return line.to_string();
    }
    processed
}
