//! Best-effort parsing of incomplete JSON.
//!
//! Tool-call arguments stream in as arbitrary fragments. To show something
//! while they arrive, the buffer is repaired: an unterminated string is
//! closed, a dangling key, colon, comma or partial literal is cut, and every
//! open object and array is closed. The result is whatever `serde_json`
//! makes of that. Anything that still fails to parse yields `None`.

use serde_json::Value;

/// Parse a possibly incomplete JSON document.
pub fn parse_partial(buffer: &str) -> Option<Value> {
    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let repaired = repair(trimmed)?;
    serde_json::from_str(&repaired).ok()
}

#[derive(Clone, Copy, PartialEq)]
enum Container {
    Object,
    Array,
}

fn repair(input: &str) -> Option<String> {
    let mut stack: Vec<Container> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    // Byte offset of the last point where the document could be cut and
    // closed without leaving a dangling key or separator behind.
    let mut last_safe = 0;
    let mut safe_stack: Vec<Container> = Vec::new();

    for (index, ch) in input.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
                if !expects_key_next(input, index, &stack) {
                    last_safe = index + 1;
                    safe_stack = stack.clone();
                }
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => {
                stack.push(Container::Object);
                last_safe = index + 1;
                safe_stack = stack.clone();
            }
            '[' => {
                stack.push(Container::Array);
                last_safe = index + 1;
                safe_stack = stack.clone();
            }
            '}' | ']' => {
                stack.pop()?;
                last_safe = index + 1;
                safe_stack = stack.clone();
            }
            c if c.is_ascii_digit() || c == 'e' || c == 'l' => {
                // Ends of numbers and the literals true/false/null.
                if literal_complete(input, index) {
                    last_safe = index + 1;
                    safe_stack = stack.clone();
                }
            }
            _ => {}
        }
    }

    let mut out = String::with_capacity(input.len() + stack.len() + 1);

    if in_string && !escaped && !expects_key_at_open_string(input, &stack) {
        // Close the open string value and keep it.
        out.push_str(input);
        out.push('"');
        close_all(&mut out, &stack);
    } else {
        out.push_str(&input[..last_safe]);
        close_all(&mut out, &safe_stack);
    }

    Some(out)
}

fn close_all(out: &mut String, stack: &[Container]) {
    for container in stack.iter().rev() {
        match container {
            Container::Object => out.push('}'),
            Container::Array => out.push(']'),
        }
    }
}

/// True when the string that just closed at `quote_index` is an object key,
/// i.e. it is inside an object and preceded by `{` or `,`.
fn expects_key_next(input: &str, quote_index: usize, stack: &[Container]) -> bool {
    if stack.last() != Some(&Container::Object) {
        return false;
    }
    let start = match string_start(input, quote_index) {
        Some(start) => start,
        None => return false,
    };
    matches!(
        input[..start].trim_end().chars().last(),
        Some('{') | Some(',')
    )
}

/// True when the currently open string (at the end of input) is an object key.
fn expects_key_at_open_string(input: &str, stack: &[Container]) -> bool {
    if stack.last() != Some(&Container::Object) {
        return false;
    }
    match open_string_start(input) {
        Some(start) => matches!(
            input[..start].trim_end().chars().last(),
            Some('{') | Some(',')
        ),
        None => false,
    }
}

/// Byte index of the opening quote of the string closed at `quote_index`.
fn string_start(input: &str, quote_index: usize) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut i = quote_index;
    while i > 0 {
        i -= 1;
        if bytes[i] == b'"' && !is_escaped(bytes, i) {
            return Some(i);
        }
    }
    None
}

/// Byte index of the opening quote of the unterminated string at the end.
fn open_string_start(input: &str) -> Option<usize> {
    let bytes = input.as_bytes();
    let mut i = bytes.len();
    while i > 0 {
        i -= 1;
        if bytes[i] == b'"' && !is_escaped(bytes, i) {
            return Some(i);
        }
    }
    None
}

fn is_escaped(bytes: &[u8], index: usize) -> bool {
    let mut backslashes = 0;
    let mut i = index;
    while i > 0 && bytes[i - 1] == b'\\' {
        backslashes += 1;
        i -= 1;
    }
    backslashes % 2 == 1
}

/// True when the scalar ending at `index` is complete: a full `true`,
/// `false` or `null`, or a number followed by a delimiter.
fn literal_complete(input: &str, index: usize) -> bool {
    let head = &input[..=index];
    if head.ends_with("true") || head.ends_with("false") || head.ends_with("null") {
        return true;
    }
    match input[index + 1..].chars().next() {
        Some(next) => {
            input.as_bytes()[index].is_ascii_digit()
                && (next == ',' || next == '}' || next == ']' || next.is_whitespace())
        }
        None => false,
    }
}
