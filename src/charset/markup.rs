use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8, WINDOWS_1252, X_USER_DEFINED};

use super::{MarkupDetector, MarkupGuess};
use crate::mime::parse_media_type;

/// How much of the body is searched for a BOM or `<meta>` declaration.
const PRESCAN_LEN: usize = 1024;

/// Detects the encoding from explicit markers in order of authority:
///
/// 1. a byte order mark (certain)
/// 2. a `charset` parameter on the content type (certain)
/// 3. an HTML `<meta charset>` or `<meta http-equiv="Content-Type">` declaration
/// 4. UTF-8 if the bytes have the high bit set somewhere and decode cleanly
/// 5. `windows-1252`
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaDetector;

impl MarkupDetector for MetaDetector {
    fn detect(&self, body: &[u8], content_type: &str) -> MarkupGuess {
        let content = &body[..body.len().min(PRESCAN_LEN)];

        if let Some((encoding, _)) = Encoding::for_bom(content) {
            return guess(encoding, true);
        }
        if let Ok(media_type) = parse_media_type(content_type) {
            if let Some(encoding) = media_type
                .charset()
                .and_then(|label| Encoding::for_label(label.as_bytes()))
            {
                return guess(encoding, true);
            }
        }
        if let Some(encoding) = prescan(content) {
            return guess(encoding, false);
        }

        let content = trim_partial_sequence(content);
        if !content.is_ascii() && std::str::from_utf8(content).is_ok() {
            return guess(UTF_8, false);
        }
        guess(WINDOWS_1252, false)
    }
}

fn guess(encoding: &'static Encoding, confident: bool) -> MarkupGuess {
    MarkupGuess {
        charset: encoding.name().to_ascii_lowercase(),
        confident,
    }
}

/// Drops a multi-byte sequence that may have been cut off at the end of the prescan window.
fn trim_partial_sequence(content: &[u8]) -> &[u8] {
    for idx in (content.len().saturating_sub(3)..content.len()).rev() {
        let b = content[idx];
        if b < 0x80 {
            break;
        }
        if b & 0xC0 != 0x80 {
            return &content[..idx];
        }
    }
    content
}

const fn is_space(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// A label from a `<meta>` declaration. UTF-16 cannot be declared from inside the document
/// and `x-user-defined` is read as windows-1252.
fn meta_encoding(label: &[u8]) -> Option<&'static Encoding> {
    let encoding = Encoding::for_label(label)?;
    Some(if encoding == UTF_16LE || encoding == UTF_16BE {
        UTF_8
    } else if encoding == X_USER_DEFINED {
        WINDOWS_1252
    } else {
        encoding
    })
}

/// The WHATWG prescan of a byte stream for a `<meta>` encoding declaration.
fn prescan(content: &[u8]) -> Option<&'static Encoding> {
    let mut pos = 0;
    while pos < content.len() {
        let rest = &content[pos..];

        if rest.starts_with(b"<!--") {
            // The dashes of `<!--` may close the comment, as in `<!-->`.
            pos += find(&rest[2..], b"-->").map_or(rest.len(), |idx| idx + 2 + 3);
            continue;
        }

        if rest.len() > 5
            && rest[..5].eq_ignore_ascii_case(b"<meta")
            && (is_space(rest[5]) || rest[5] == b'/')
        {
            pos += 6;
            if let Some(encoding) = meta_declaration(content, &mut pos) {
                return Some(encoding);
            }
            continue;
        }

        let starts_tag = rest.len() > 1
            && rest[0] == b'<'
            && (rest[1].is_ascii_alphabetic()
                || (rest[1] == b'/' && rest.get(2).is_some_and(u8::is_ascii_alphabetic)));
        if starts_tag {
            pos += rest
                .iter()
                .position(|&b| is_space(b) || b == b'>')
                .unwrap_or(rest.len());
            while attribute(content, &mut pos).is_some() {}
            continue;
        }

        if rest.starts_with(b"<!") || rest.starts_with(b"</") || rest.starts_with(b"<?") {
            pos += rest
                .iter()
                .position(|&b| b == b'>')
                .map_or(rest.len(), |idx| idx + 1);
            continue;
        }

        pos += 1;
    }
    None
}

/// Reads the attributes of a `<meta>` tag, `pos` pointing just past the tag name.
fn meta_declaration(content: &[u8], pos: &mut usize) -> Option<&'static Encoding> {
    let mut seen: Vec<Vec<u8>> = Vec::new();
    let mut got_pragma = false;
    let mut need_pragma = None;
    let mut charset = None;

    while let Some((name, value)) = attribute(content, pos) {
        if seen.contains(&name) {
            continue;
        }
        match name.as_slice() {
            b"http-equiv" if value == b"content-type" => got_pragma = true,
            b"content" if charset.is_none() => {
                if let Some(encoding) = charset_from_content(&value) {
                    charset = Some(encoding);
                    need_pragma = Some(true);
                }
            }
            b"charset" => {
                charset = meta_encoding(&value);
                need_pragma = Some(false);
            }
            _ => {}
        }
        seen.push(name);
    }

    match need_pragma {
        Some(true) if !got_pragma => None,
        Some(_) => charset,
        None => None,
    }
}

/// `charset=` inside the `content` attribute of `<meta http-equiv="Content-Type">`.
fn charset_from_content(value: &[u8]) -> Option<&'static Encoding> {
    let mut pos = 0;
    loop {
        pos += find(&value[pos..], b"charset")? + b"charset".len();
        while value.get(pos).copied().is_some_and(is_space) {
            pos += 1;
        }
        if value.get(pos) != Some(&b'=') {
            continue;
        }
        pos += 1;
        while value.get(pos).copied().is_some_and(is_space) {
            pos += 1;
        }

        return match value.get(pos) {
            Some(&quote) if quote == b'"' || quote == b'\'' => {
                let rest = &value[pos + 1..];
                let end = rest.iter().position(|&b| b == quote)?;
                meta_encoding(&rest[..end])
            }
            Some(_) => {
                let rest = &value[pos..];
                let end = rest
                    .iter()
                    .position(|&b| is_space(b) || b == b';')
                    .unwrap_or(rest.len());
                meta_encoding(&rest[..end])
            }
            None => None,
        };
    }
}

/// Reads one attribute starting at `pos`, lower-casing both name and value. Returns `None`
/// at the end of the tag or the input, leaving `pos` on the `>`.
fn attribute(content: &[u8], pos: &mut usize) -> Option<(Vec<u8>, Vec<u8>)> {
    while content
        .get(*pos)
        .is_some_and(|&b| is_space(b) || b == b'/')
    {
        *pos += 1;
    }
    if content.get(*pos).map_or(true, |&b| b == b'>') {
        return None;
    }

    let mut name = Vec::new();
    loop {
        let &b = content.get(*pos)?;
        match b {
            b'=' if !name.is_empty() => {
                *pos += 1;
                break;
            }
            b if is_space(b) => {
                while content.get(*pos).copied().is_some_and(is_space) {
                    *pos += 1;
                }
                if content.get(*pos) != Some(&b'=') {
                    return Some((name, Vec::new()));
                }
                *pos += 1;
                break;
            }
            b'/' | b'>' => return Some((name, Vec::new())),
            b => {
                name.push(b.to_ascii_lowercase());
                *pos += 1;
            }
        }
    }

    while content.get(*pos).copied().is_some_and(is_space) {
        *pos += 1;
    }
    let mut value = Vec::new();
    match content.get(*pos) {
        None | Some(b'>') => {}
        Some(&quote) if quote == b'"' || quote == b'\'' => {
            *pos += 1;
            while let Some(&b) = content.get(*pos) {
                *pos += 1;
                if b == quote {
                    break;
                }
                value.push(b.to_ascii_lowercase());
            }
        }
        Some(_) => {
            while let Some(&b) = content.get(*pos) {
                if is_space(b) || b == b'>' {
                    break;
                }
                value.push(b.to_ascii_lowercase());
                *pos += 1;
            }
        }
    }
    Some((name, value))
}
