//! Line-oriented `key=value` property text: `#` and `!` comment lines,
//! backslash continuations, `\uXXXX` and single-character escapes. Keys are
//! trimmed; values keep embedded whitespace.

use std::collections::HashMap;

use utils::error::Result;

pub fn parse(text: &str) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    let mut lines = text.lines();

    while let Some(line) = lines.next() {
        let line = strip_leading_ws(line);
        if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
            continue;
        }

        let mut logical = line.to_string();
        while ends_with_odd_backslashes(&logical) {
            logical.pop();
            match lines.next() {
                Some(next) => logical.push_str(strip_leading_ws(next)),
                None => break,
            }
        }

        let (key, value) = split_key_value(&logical);
        let key = unescape(key)?;
        if key.is_empty() {
            continue;
        }
        map.insert(key, unescape(value)?);
    }

    Ok(map)
}

fn strip_leading_ws(line: &str) -> &str {
    line.trim_start_matches([' ', '\t', '\x0c'])
}

fn ends_with_odd_backslashes(s: &str) -> bool {
    s.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Key runs up to the first unescaped `=`, `:` or whitespace; the separator
/// and the whitespace around it belong to neither side.
fn split_key_value(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut split = None;
    for (idx, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\x0c' => {
                split = Some((idx, c));
                break;
            }
            _ => {}
        }
    }

    let Some((idx, sep)) = split else {
        return (line, "");
    };

    let key = &line[..idx];
    let mut rest = &line[idx + sep.len_utf8()..];
    rest = strip_leading_ws(rest);
    // `key   = value`: the whitespace was the separator we stopped at, but
    // the real separator is the `=` (or `:`) that follows
    if sep != '=' && sep != ':' {
        if let Some(stripped) = rest.strip_prefix(['=', ':']) {
            rest = strip_leading_ws(stripped);
        }
    }
    (key, rest)
}

fn unescape(s: &str) -> Result<String> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            None => break,
            Some('u') => {
                let mut code = 0u32;
                for _ in 0..4 {
                    let digit = chars
                        .next()
                        .and_then(|d| d.to_digit(16))
                        .ok_or("malformed \\uXXXX escape")?;
                    code = code * 16 + digit;
                }
                out.push(char::from_u32(code).ok_or("\\uXXXX escape is not a valid character")?);
            }
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\x0c'),
            Some(other) => out.push(other),
        }
    }
    Ok(out)
}
