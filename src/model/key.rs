//! Service key encoding
//!
//! Every service is addressed by a `(group, name)` pair. Storage needs a
//! single string, so both parts are escaped and joined with `_`:
//!
//! ```text
//! ("testing", "example.com")  →  "testing_example.com"
//! ("a_b",     "c")            →  "a%5Fb_c"
//! ```
//!
//! Only `%` and `_` are escaped, which keeps ordinary keys readable while
//! guaranteeing that the separator is the only literal `_` in a key.

/// Separator between the escaped group and the escaped name
const SEPARATOR: char = '_';

/// Build the storage key for a service in a group
pub fn convert_group_and_service_to_key(group: &str, name: &str) -> String {
    format!("{}{SEPARATOR}{}", escape(group), escape(name))
}

/// Split a storage key back into `(group, name)`
///
/// Returns `None` if the key was not produced by
/// [`convert_group_and_service_to_key`].
pub fn split_key(key: &str) -> Option<(String, String)> {
    let (group, name) = key.split_once(SEPARATOR)?;
    if name.contains(SEPARATOR) {
        return None;
    }
    Some((unescape(group)?, unescape(name)?))
}

fn escape(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for c in part.chars() {
        match c {
            '%' => escaped.push_str("%25"),
            '_' => escaped.push_str("%5F"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn unescape(part: &str) -> Option<String> {
    let mut unescaped = String::with_capacity(part.len());
    let mut rest = part;
    while let Some(idx) = rest.find('%') {
        unescaped.push_str(&rest[..idx]);
        let code = rest.get(idx + 1..idx + 3)?;
        match code {
            "25" => unescaped.push('%'),
            "5F" => unescaped.push('_'),
            _ => return None,
        }
        rest = &rest[idx + 3..];
    }
    unescaped.push_str(rest);
    Some(unescaped)
}
