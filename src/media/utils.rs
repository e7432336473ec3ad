use serde_json::Value;

/// Reads a non-blank string at a JSON pointer.
pub fn json_str(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// First non-blank string among several JSON pointers.
pub fn first_json_str(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|pointer| json_str(value, pointer))
}

/// Decodes the escapes found in JSON embedded inside inline scripts:
/// `\uXXXX` (including surrogate pairs), `\/` and `\\`.
pub fn decode_js_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('u') => {
                chars.next();
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16) {
                    Ok(high @ 0xD800..=0xDBFF) => {
                        let mut lookahead = chars.clone();
                        let low = match (lookahead.next(), lookahead.next()) {
                            (Some('\\'), Some('u')) => {
                                let hex: String = lookahead.by_ref().take(4).collect();
                                u32::from_str_radix(&hex, 16).ok()
                            }
                            _ => None,
                        };
                        match low {
                            Some(low @ 0xDC00..=0xDFFF) => {
                                let code = 0x10000 + ((high - 0xD800) << 10) + (low - 0xDC00);
                                out.extend(char::from_u32(code));
                                chars = lookahead;
                            }
                            _ => out.push(char::REPLACEMENT_CHARACTER),
                        }
                    }
                    Ok(code) => match char::from_u32(code) {
                        Some(ch) => out.push(ch),
                        None => out.push(char::REPLACEMENT_CHARACTER),
                    },
                    Err(_) => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            Some('/') => {
                chars.next();
                out.push('/');
            }
            Some('\\') => {
                chars.next();
                out.push('\\');
            }
            _ => out.push(c),
        }
    }

    out
}
