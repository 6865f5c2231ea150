//! Character references as they appear in wikitext

use regex::{Captures, Regex};
use std::fmt::Write;
use std::sync::LazyLock;

/// A semicolon-terminated character reference candidate
pub static ENTITY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&[#0-9a-zA-Z]+;").expect("valid entity regex"));

const MAX_HEX_DIGITS: usize = 6; // 0x10FFFF
const MAX_DEC_DIGITS: usize = 7; // 1114111

fn named(name: &str) -> Option<char> {
    Some(match name {
        "amp" => '&',
        "lt" => '<',
        "gt" => '>',
        "quot" => '"',
        "apos" => '\'',
        "nbsp" => '\u{a0}',
        "shy" => '\u{ad}',
        "copy" => '©',
        "reg" => '®',
        "trade" => '™',
        "deg" => '°',
        "plusmn" => '±',
        "times" => '×',
        "divide" => '÷',
        "middot" => '·',
        "sect" => '§',
        "para" => '¶',
        "cent" => '¢',
        "pound" => '£',
        "euro" => '€',
        "yen" => '¥',
        "laquo" => '«',
        "raquo" => '»',
        "lsquo" => '\u{2018}',
        "rsquo" => '\u{2019}',
        "ldquo" => '\u{201c}',
        "rdquo" => '\u{201d}',
        "ndash" => '–',
        "mdash" => '—',
        "hellip" => '…',
        "bull" => '•',
        "iexcl" => '¡',
        "iquest" => '¿',
        "larr" => '←',
        "rarr" => '→',
        "thinsp" => '\u{2009}',
        "ensp" => '\u{2002}',
        "emsp" => '\u{2003}',
        "zwj" => '\u{200d}',
        "zwnj" => '\u{200c}',
        "lrm" => '\u{200e}',
        "rlm" => '\u{200f}',
        _ => return None,
    })
}

fn numeric(body: &str) -> Option<char> {
    let (digits, radix, max) = match body.strip_prefix(['x', 'X']) {
        Some(hex) => (hex, 16, MAX_HEX_DIGITS),
        None => (body, 10, MAX_DEC_DIGITS),
    };
    if digits.is_empty() || digits.len() > max {
        return None;
    }
    let value = u32::from_str_radix(digits, radix).ok()?;
    if value == 0 {
        return None;
    }
    char::from_u32(value)
}

/// Decode one reference such as `&amp;`, `&#60;` or `&#x3C;`.
///
/// Returns `None` for unknown names, malformed numerics, and code points
/// that are not Unicode scalar values.
pub fn decode_entity(token: &str) -> Option<char> {
    let inner = token.strip_prefix('&')?.strip_suffix(';')?;
    match inner.strip_prefix('#') {
        Some(num) => numeric(num),
        None => named(inner),
    }
}

/// Decode every well-formed reference in `s`; everything else is kept.
pub fn decode_wt_entities(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |caps: &Captures| {
            let token = &caps[0];
            match decode_entity(token) {
                Some(c) => c.to_string(),
                None => token.to_string(),
            }
        })
        .into_owned()
}

/// Encode every character as a numeric reference (`&nbsp;` for U+00A0),
/// so the text survives any wikitext context.
pub fn entity_encode_all(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 6);
    for c in s.chars() {
        if c == '\u{a0}' {
            out.push_str("&nbsp;");
        } else {
            // Writing to a String cannot fail
            let _ = write!(out, "&#x{:02X};", c as u32);
        }
    }
    out
}
