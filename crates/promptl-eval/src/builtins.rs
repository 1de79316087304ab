//! Built-in methods on strings and arrays.
//!
//! Looking up `"abc".toUpperCase` produces a [`Value::Function`] bound to
//! the receiver. None of the methods mutate their receiver.

use crate::value::Value;

/// Longest string, in characters, a built-in may produce.
const MAX_STRING_LENGTH: usize = 1 << 24;

fn check_length(length: f64) -> Result<(), String> {
    if length > MAX_STRING_LENGTH as f64 {
        return Err("Invalid string length".to_string());
    }
    Ok(())
}

fn arg(args: &[Value], index: usize) -> Value {
    args.get(index).cloned().unwrap_or_default()
}

fn arg_string(args: &[Value], index: usize) -> String {
    arg(args, index).to_js_string()
}

/// Clamp a relative (possibly negative) position into `0..=len`.
fn relative_index(value: &Value, len: usize, default: usize) -> usize {
    if matches!(value, Value::Undefined) {
        return default;
    }
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

/// `at(i)` indexing, counting from the end for negative `i`.
fn at_index(value: &Value, len: usize) -> Option<usize> {
    let n = value.to_number();
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let index = if n < 0.0 { len as f64 + n } else { n };
    (index >= 0.0 && index < len as f64).then_some(index as usize)
}

fn char_string(c: char) -> Value {
    Value::String(c.to_string())
}

/// Find `needle` in `haystack` at or after char position `from`, as a char
/// position.
fn find_chars(haystack: &[char], needle: &[char], from: usize) -> Option<usize> {
    if needle.is_empty() {
        return Some(from.min(haystack.len()));
    }
    if needle.len() > haystack.len() {
        return None;
    }
    (from..=haystack.len() - needle.len()).find(|&i| haystack[i..i + needle.len()] == *needle)
}

fn pad(s: &str, args: &[Value], at_start: bool) -> Result<Value, String> {
    let target = arg(args, 0).to_number();
    let filler = match arg(args, 1) {
        Value::Undefined => " ".to_string(),
        other => other.to_js_string(),
    };
    let len = s.chars().count();
    if target.is_nan() || target <= len as f64 || filler.is_empty() {
        return Ok(Value::String(s.to_string()));
    }
    check_length(target)?;
    let missing = target as usize - len;
    let padding: String = filler.chars().cycle().take(missing).collect();
    Ok(Value::String(if at_start { padding + s } else { s.to_string() + &padding }))
}

/// The string method `name` bound to `receiver`.
pub fn string_method(receiver: &str, name: &str) -> Option<Value> {
    let s = receiver.to_string();
    let method = match name {
        "toUpperCase" => Value::function(move |_| Ok(Value::String(s.to_uppercase()))),
        "toLowerCase" => Value::function(move |_| Ok(Value::String(s.to_lowercase()))),
        "trim" => Value::function(move |_| Ok(Value::String(s.trim().to_string()))),
        "trimStart" => Value::function(move |_| Ok(Value::String(s.trim_start().to_string()))),
        "trimEnd" => Value::function(move |_| Ok(Value::String(s.trim_end().to_string()))),
        "includes" => Value::function(move |args| {
            let chars: Vec<char> = s.chars().collect();
            let needle: Vec<char> = arg_string(args, 0).chars().collect();
            let from = relative_index(&arg(args, 1), chars.len(), 0);
            Ok(Value::Boolean(find_chars(&chars, &needle, from).is_some()))
        }),
        "startsWith" => Value::function(move |args| {
            let chars: Vec<char> = s.chars().collect();
            let from = relative_index(&arg(args, 1), chars.len(), 0);
            let rest: String = chars[from..].iter().collect();
            Ok(Value::Boolean(rest.starts_with(&arg_string(args, 0))))
        }),
        "endsWith" => Value::function(move |args| {
            let chars: Vec<char> = s.chars().collect();
            let until = relative_index(&arg(args, 1), chars.len(), chars.len());
            let head: String = chars[..until].iter().collect();
            Ok(Value::Boolean(head.ends_with(&arg_string(args, 0))))
        }),
        "indexOf" => Value::function(move |args| {
            let chars: Vec<char> = s.chars().collect();
            let needle: Vec<char> = arg_string(args, 0).chars().collect();
            let from = relative_index(&arg(args, 1), chars.len(), 0);
            Ok(Value::Number(
                find_chars(&chars, &needle, from).map_or(-1.0, |i| i as f64),
            ))
        }),
        "split" => Value::function(move |args| {
            let parts = match arg(args, 0) {
                Value::Undefined => vec![Value::String(s.clone())],
                separator => {
                    let separator = separator.to_js_string();
                    if separator.is_empty() {
                        s.chars().map(char_string).collect()
                    } else {
                        s.split(separator.as_str()).map(Value::from).collect()
                    }
                }
            };
            Ok(Value::Array(parts))
        }),
        "slice" => Value::function(move |args| {
            let chars: Vec<char> = s.chars().collect();
            let start = relative_index(&arg(args, 0), chars.len(), 0);
            let end = relative_index(&arg(args, 1), chars.len(), chars.len());
            let sliced: String = if start < end { chars[start..end].iter().collect() } else { String::new() };
            Ok(Value::String(sliced))
        }),
        "replace" => Value::function(move |args| {
            Ok(Value::String(s.replacen(&arg_string(args, 0), &arg_string(args, 1), 1)))
        }),
        "replaceAll" => Value::function(move |args| {
            let pattern = arg_string(args, 0);
            let replacement = arg_string(args, 1);
            let replacement_len = replacement.chars().count() as f64;
            if pattern.is_empty() {
                let len = s.chars().count() as f64;
                check_length(len + (len + 1.0) * replacement_len)?;
                let mut out = replacement.clone();
                for c in s.chars() {
                    out.push(c);
                    out.push_str(&replacement);
                }
                return Ok(Value::String(out));
            }
            let matches = s.matches(pattern.as_str()).count() as f64;
            check_length(s.chars().count() as f64 + matches * replacement_len)?;
            Ok(Value::String(s.replace(&pattern, &replacement)))
        }),
        "repeat" => Value::function(move |args| {
            let count = arg(args, 0).to_number();
            if count < 0.0 || count.is_infinite() {
                return Err(format!("Invalid count value: {}", count));
            }
            let count = if count.is_nan() { 0.0 } else { count.trunc() };
            check_length(count * s.chars().count() as f64)?;
            Ok(Value::String(s.repeat(count as usize)))
        }),
        "padStart" => Value::function(move |args| pad(&s, args, true)),
        "padEnd" => Value::function(move |args| pad(&s, args, false)),
        "charAt" => Value::function(move |args| {
            let n = arg(args, 0).to_number();
            let n = if n.is_nan() { 0.0 } else { n.trunc() };
            let c = (n >= 0.0).then(|| s.chars().nth(n as usize)).flatten();
            Ok(Value::String(c.map(String::from).unwrap_or_default()))
        }),
        "concat" => Value::function(move |args| {
            let mut out = s.clone();
            for value in args {
                out.push_str(&value.to_js_string());
            }
            Ok(Value::String(out))
        }),
        "at" => Value::function(move |args| {
            let chars: Vec<char> = s.chars().collect();
            Ok(at_index(&arg(args, 0), chars.len())
                .map(|i| char_string(chars[i]))
                .unwrap_or_default())
        }),
        _ => return None,
    };
    Some(method)
}

/// The array method `name` bound to `receiver`.
pub fn array_method(receiver: &[Value], name: &str) -> Option<Value> {
    let items = receiver.to_vec();
    let method = match name {
        "join" => Value::function(move |args| {
            let separator = match arg(args, 0) {
                Value::Undefined => ",".to_string(),
                other => other.to_js_string(),
            };
            let parts: Vec<String> = items
                .iter()
                .map(|item| if item.is_nullish() { String::new() } else { item.to_js_string() })
                .collect();
            Ok(Value::String(parts.join(&separator)))
        }),
        "includes" => Value::function(move |args| {
            let needle = arg(args, 0);
            let from = relative_index(&arg(args, 1), items.len(), 0);
            Ok(Value::Boolean(items[from..].iter().any(|item| item.same_value_zero(&needle))))
        }),
        "indexOf" => Value::function(move |args| {
            let needle = arg(args, 0);
            let from = relative_index(&arg(args, 1), items.len(), 0);
            let found = items[from..].iter().position(|item| item.strict_equals(&needle));
            Ok(Value::Number(found.map_or(-1.0, |i| (from + i) as f64)))
        }),
        "slice" => Value::function(move |args| {
            let start = relative_index(&arg(args, 0), items.len(), 0);
            let end = relative_index(&arg(args, 1), items.len(), items.len());
            Ok(Value::Array(if start < end { items[start..end].to_vec() } else { Vec::new() }))
        }),
        "concat" => Value::function(move |args| {
            let mut out = items.clone();
            for value in args {
                match value {
                    Value::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            Ok(Value::Array(out))
        }),
        "at" => Value::function(move |args| {
            Ok(at_index(&arg(args, 0), items.len())
                .map(|i| items[i].clone())
                .unwrap_or_default())
        }),
        "reverse" => Value::function(move |_| Ok(Value::Array(items.iter().rev().cloned().collect()))),
        _ => return None,
    };
    Some(method)
}
