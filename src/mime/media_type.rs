//! RFC 2045 media types, e.g. `text/html; charset=iso-8859-1`.
//!
//! A media type is a lower-cased `type/subtype` (or a bare token) followed by `; name=value`
//! parameters. Values are either a token or a quoted string. RFC 2231 extended parameters
//! (`name*=utf-8''caf%C3%A9`) and continuations (`name*0=...; name*1=...`) are decoded while
//! parsing, and values that cannot be written as a token or quoted string are written in the
//! extended form when formatting.
//!
//! ```
//! use std::collections::BTreeMap;
//! use whois_mime::mime::{format_media_type, parse_media_type};
//!
//! let media_type = parse_media_type("Text/HTML; Charset=\"ISO-8859-1\"").unwrap();
//! assert_eq!(media_type.essence(), "text/html");
//! assert_eq!(media_type.param("charset"), Some("ISO-8859-1"));
//!
//! let params = BTreeMap::from([("charset".to_owned(), "utf-8".to_owned())]);
//! assert_eq!(
//!     format_media_type("text/plain", &params).as_deref(),
//!     Some("text/plain; charset=utf-8")
//! );
//! ```

use std::{collections::BTreeMap, fmt, fmt::Write as _, str::FromStr};

use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::char,
    combinator::{all_consuming, map, opt},
    error::{Error, ErrorKind},
    sequence::{delimited, pair, preceded, separated_pair, tuple},
    IResult,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    essence: String,
    params: BTreeMap<String, String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MediaTypeError {
    #[error("The media type {0:?} is not a token or a type/subtype pair of tokens")]
    InvalidType(String),
    #[error("The media type parameters are malformed starting at {0:?}")]
    InvalidParameter(String),
    #[error("The media type specified the parameter {0:?} more than once")]
    DuplicateParameter(String),
}

impl MediaType {
    /// The lower-cased `type/subtype` without any parameters.
    pub fn essence(&self) -> &str {
        &self.essence
    }

    /// Parameter lookup, `name` must be lower-case.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn charset(&self) -> Option<&str> {
        self.param("charset")
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_media_type(s)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formatted = format_media_type(&self.essence, &self.params).ok_or(fmt::Error)?;
        f.write_str(&formatted)
    }
}

pub(crate) const fn is_tspecial(c: char) -> bool {
    matches!(
        c,
        '(' | ')' | '<' | '>' | '@' | ',' | ';' | ':' | '\\' | '"' | '/' | '[' | ']' | '?' | '='
    )
}

pub(crate) const fn is_token_char(c: char) -> bool {
    c.is_ascii() && c > ' ' && c != '\x7f' && !is_tspecial(c)
}

pub(crate) fn is_token(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_token_char)
}

fn token(input: &str) -> IResult<&str, &str> {
    take_while1(is_token_char)(input)
}

fn whitespace(input: &str) -> IResult<&str, &str> {
    take_while(char::is_whitespace)(input)
}

fn quoted_string(input: &str) -> IResult<&str, String> {
    let fail = || nom::Err::Error(Error::new(input, ErrorKind::Char));
    let Some(rest) = input.strip_prefix('"') else {
        return Err(fail());
    };

    let mut value = String::new();
    let mut chars = rest.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((&rest[idx + 1..], value)),
            '\\' => match chars.next() {
                Some((_, escaped)) => value.push(escaped),
                None => break,
            },
            '\r' | '\n' => break,
            c => value.push(c),
        }
    }
    Err(fail())
}

fn value(input: &str) -> IResult<&str, String> {
    alt((map(token, str::to_owned), quoted_string))(input)
}

/// `; name = value` with the name lower-cased.
fn parameter(input: &str) -> IResult<&str, (String, String)> {
    preceded(
        tuple((whitespace, char(';'), whitespace)),
        separated_pair(
            map(token, str::to_ascii_lowercase),
            delimited(whitespace, char('='), whitespace),
            value,
        ),
    )(input)
}

fn essence(input: &str) -> IResult<&str, (&str, Option<&str>)> {
    all_consuming(pair(token, opt(preceded(char('/'), token))))(input)
}

/// Parses a media type and its parameters. Parameter names are lower-cased, values are kept
/// as written. A trailing `;` is tolerated, a parameter given twice with different values is
/// not.
pub fn parse_media_type(input: &str) -> Result<MediaType, MediaTypeError> {
    let (base, mut rest) = input.split_at(input.find(';').unwrap_or(input.len()));

    let base = base.trim().to_ascii_lowercase();
    if essence(&base).is_err() {
        return Err(MediaTypeError::InvalidType(base));
    }

    let mut params = BTreeMap::new();
    // Base name -> raw `name*...` pieces of RFC 2231 parameters.
    let mut extended: BTreeMap<String, BTreeMap<String, String>> = BTreeMap::new();

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }
        let (remaining, (name, value)) = match parameter(rest) {
            Ok(parsed) => parsed,
            Err(_) if rest.trim() == ";" => break,
            Err(_) => return Err(MediaTypeError::InvalidParameter(rest.to_owned())),
        };

        let pieces = match name.split_once('*') {
            Some((base_name, _)) => extended.entry(base_name.to_owned()).or_default(),
            None => &mut params,
        };
        if pieces.get(&name).is_some_and(|existing| *existing != value) {
            return Err(MediaTypeError::DuplicateParameter(name));
        }
        pieces.insert(name, value);
        rest = remaining;
    }

    for (name, pieces) in extended {
        if let Some(value) = pieces.get(&format!("{name}*")) {
            if let Some(decoded) = decode_extended(value) {
                params.insert(name, decoded);
            }
            continue;
        }

        let mut joined = String::new();
        let mut valid = false;
        for n in 0.. {
            let simple = format!("{name}*{n}");
            if let Some(value) = pieces.get(&simple) {
                valid = true;
                joined.push_str(value);
                continue;
            }
            let Some(value) = pieces.get(&format!("{simple}*")) else {
                break;
            };
            valid = true;
            let decoded = if n == 0 {
                decode_extended(value)
            } else {
                percent_decode(value)
            };
            if let Some(decoded) = decoded {
                joined.push_str(&decoded);
            }
        }
        if valid {
            params.insert(name, joined);
        }
    }

    Ok(MediaType {
        essence: base,
        params,
    })
}

/// Decodes `charset'language'percent-encoded` values. Only UTF-8 and US-ASCII are supported.
fn decode_extended(value: &str) -> Option<String> {
    let mut parts = value.splitn(3, '\'');
    let (Some(charset), Some(_language), Some(encoded)) = (parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    match charset.to_ascii_lowercase().as_str() {
        "us-ascii" | "utf-8" => percent_decode(encoded),
        _ => None,
    }
}

fn percent_decode(value: &str) -> Option<String> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut cursor = 0;
    while cursor < bytes.len() {
        match bytes[cursor] {
            b'%' => {
                let hex = bytes.get(cursor + 1..cursor + 3)?;
                let hex = std::str::from_utf8(hex).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                cursor += 3;
            }
            b => {
                out.push(b);
                cursor += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

fn needs_encoding(value: &str) -> bool {
    value.bytes().any(|b| (b < b' ' || b > b'~') && b != b'\t')
}

/// Formats a media type with parameters in name order. Returns `None` when the type or a
/// parameter name is not a token.
///
/// Empty values are not tokens and come out quoted, so `charset` set to `""` formats as
/// `charset=""`.
pub fn format_media_type(media_type: &str, params: &BTreeMap<String, String>) -> Option<String> {
    let mut out = String::new();
    match media_type.split_once('/') {
        None if is_token(media_type) => out.push_str(&media_type.to_ascii_lowercase()),
        Some((major, sub)) if is_token(major) && is_token(sub) => {
            out.push_str(&major.to_ascii_lowercase());
            out.push('/');
            out.push_str(&sub.to_ascii_lowercase());
        }
        _ => return None,
    }

    for (name, value) in params {
        if !is_token(name) {
            return None;
        }
        out.push_str("; ");
        out.push_str(&name.to_ascii_lowercase());

        if needs_encoding(value) {
            out.push_str("*=utf-8''");
            for b in value.bytes() {
                if b <= b' ' || b >= 0x7f || b == b'*' || b == b'\'' || b == b'%' || is_tspecial(b as char) {
                    let _ = write!(out, "%{b:02X}");
                } else {
                    out.push(b as char);
                }
            }
        } else if is_token(value) {
            out.push('=');
            out.push_str(value);
        } else {
            out.push_str("=\"");
            for c in value.chars() {
                if c == '"' || c == '\\' {
                    out.push('\\');
                }
                out.push(c);
            }
            out.push('"');
        }
    }
    Some(out)
}
