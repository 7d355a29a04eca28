use std::io::{self, Write};

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while1},
    character::complete::{char, not_line_ending, space0, space1},
    multi::many0,
    sequence::{pair, preceded, separated_pair, terminated},
    IResult,
};
use thiserror::Error;

/// Header fields in insertion order. Lookups ignore case, the stored names keep theirs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap(Vec<(String, String)>);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HeaderError {
    #[error("The header block has a malformed line at byte {0}")]
    Malformed(usize),
    #[error("The header block ended before the empty line separating it from the body")]
    Unterminated,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the value of an existing field in place, otherwise appends the field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.0.iter_mut().find(|(n, _)| n.eq_ignore_ascii_case(&name)) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Writes `Name: value\r\n` for every field. CR and LF inside a value become spaces so a
    /// value can never start a new field.
    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> io::Result<()> {
        for (name, value) in &self.0 {
            let value = value.replace(&['\r', '\n'][..], " ");
            let value = value.trim_matches(|c: char| c == ' ' || c == '\t');
            write!(w, "{name}: {value}\r\n")?;
        }
        Ok(())
    }

    /// Parses a header block up to and including the empty line that ends it, returning the
    /// fields and the untouched remainder.
    pub fn parse(input: &[u8]) -> Result<(Self, &[u8]), HeaderError> {
        match block(input) {
            Ok((rest, fields)) => {
                let fields = fields
                    .into_iter()
                    .map(|((name, first), folded)| {
                        let mut value = String::from_utf8_lossy(first).trim_end().to_owned();
                        for line in folded {
                            let line = String::from_utf8_lossy(line);
                            let line = line.trim();
                            if !line.is_empty() {
                                value.push(' ');
                                value.push_str(line);
                            }
                        }
                        (String::from_utf8_lossy(name).into_owned(), value)
                    })
                    .collect();
                Ok((Self(fields), rest))
            }
            Err(nom::Err::Error(err) | nom::Err::Failure(err)) if err.input.is_empty() => {
                Err(HeaderError::Unterminated)
            }
            Err(nom::Err::Error(err) | nom::Err::Failure(err)) => {
                Err(HeaderError::Malformed(input.len() - err.input.len()))
            }
            Err(nom::Err::Incomplete(_)) => Err(HeaderError::Unterminated),
        }
    }
}

type Field<'data> = ((&'data [u8], &'data [u8]), Vec<&'data [u8]>);

fn line_ending(input: &[u8]) -> IResult<&[u8], &[u8]> {
    alt((tag("\r\n"), tag("\n")))(input)
}

fn field_name(input: &[u8]) -> IResult<&[u8], &[u8]> {
    take_while1(|b: u8| b > b' ' && b < 0x7f && b != b':')(input)
}

fn field_line(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8])> {
    terminated(
        separated_pair(field_name, pair(char(':'), space0), not_line_ending),
        line_ending,
    )(input)
}

/// Obsolete line folding, a line starting with whitespace continues the previous value.
fn folded_line(input: &[u8]) -> IResult<&[u8], &[u8]> {
    preceded(space1, terminated(not_line_ending, line_ending))(input)
}

fn block(input: &[u8]) -> IResult<&[u8], Vec<Field<'_>>> {
    terminated(many0(pair(field_line, many0(folded_line))), line_ending)(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_in_place() {
        let mut header = HeaderMap::new();
        header.set("Query", "example.com");
        header.set("Host", "whois.iana.org");
        header.set("query", "example.net");
        assert_eq!(
            header.iter().collect::<Vec<_>>(),
            [("Query", "example.net"), ("Host", "whois.iana.org")]
        );
        assert_eq!(header.get("QUERY"), Some("example.net"));
        assert_eq!(header.get("Missing"), None);
    }

    #[test]
    fn writes_fields_in_order_with_crlf() {
        let mut header = HeaderMap::new();
        header.set("Host", "whois.iana.org");
        header.set("Content-Length", "5");
        let mut out = Vec::new();
        header.write_to(&mut out).unwrap();
        assert_eq!(out, b"Host: whois.iana.org\r\nContent-Length: 5\r\n");
    }

    #[test]
    fn newlines_in_values_cannot_inject_fields() {
        let mut header = HeaderMap::new();
        header.set("Query", "example.com\r\nHost: evil.example\n");
        let mut out = Vec::new();
        header.write_to(&mut out).unwrap();
        assert_eq!(out, b"Query: example.com  Host: evil.example\r\n");
    }

    #[test]
    fn parses_block_and_returns_body() {
        let input = b"MIME-Version: 1.0\r\nQuery:example.com\r\nHost:  whois.iana.org \r\n\r\nbody\r\n\r\nmore";
        let (header, rest) = HeaderMap::parse(input).unwrap();
        assert_eq!(
            header.iter().collect::<Vec<_>>(),
            [
                ("MIME-Version", "1.0"),
                ("Query", "example.com"),
                ("Host", "whois.iana.org")
            ]
        );
        assert_eq!(rest, b"body\r\n\r\nmore");
    }

    #[test]
    fn parses_bare_lf_and_folded_lines() {
        let input = b"Note: first\n  second\n\tthird\nHost: a\n\n";
        let (header, rest) = HeaderMap::parse(input).unwrap();
        assert_eq!(header.get("note"), Some("first second third"));
        assert_eq!(header.get("host"), Some("a"));
        assert!(rest.is_empty());
    }

    #[test]
    fn empty_block() {
        let (header, rest) = HeaderMap::parse(b"\r\nbody").unwrap();
        assert!(header.is_empty());
        assert_eq!(rest, b"body");
    }

    #[test]
    fn reports_malformed_and_unterminated_blocks() {
        assert_eq!(
            HeaderMap::parse(b"Query: a\r\nnot a header\r\n\r\n"),
            Err(HeaderError::Malformed(10))
        );
        assert_eq!(
            HeaderMap::parse(b"Query: a\r\nHost: b\r\n"),
            Err(HeaderError::Unterminated)
        );
    }
}
