//! Content sniffing for bodies that arrive without a Content-Type, following the WHATWG
//! MIME Sniffing order: markup first, then well-known binary signatures, and finally a text
//! check. At most [`SNIFF_LEN`] bytes are looked at.

use super::macros::define_signatures;

pub const SNIFF_LEN: usize = 512;

const FALLBACK: &str = "application/octet-stream";

struct Signature {
    matcher: Matcher,
    content_type: &'static str,
}

enum Matcher {
    Html(&'static [u8]),
    Exact(&'static [u8]),
    Masked {
        mask: &'static [u8],
        pat: &'static [u8],
        skip_ws: bool,
    },
    Mp4,
    Text,
}

define_signatures! {
    static SIGNATURES = [
        html(b"<!DOCTYPE HTML") => "text/html; charset=utf-8",
        html(b"<HTML") => "text/html; charset=utf-8",
        html(b"<HEAD") => "text/html; charset=utf-8",
        html(b"<SCRIPT") => "text/html; charset=utf-8",
        html(b"<IFRAME") => "text/html; charset=utf-8",
        html(b"<H1") => "text/html; charset=utf-8",
        html(b"<DIV") => "text/html; charset=utf-8",
        html(b"<FONT") => "text/html; charset=utf-8",
        html(b"<TABLE") => "text/html; charset=utf-8",
        html(b"<A") => "text/html; charset=utf-8",
        html(b"<STYLE") => "text/html; charset=utf-8",
        html(b"<TITLE") => "text/html; charset=utf-8",
        html(b"<B") => "text/html; charset=utf-8",
        html(b"<BODY") => "text/html; charset=utf-8",
        html(b"<BR") => "text/html; charset=utf-8",
        html(b"<P") => "text/html; charset=utf-8",
        html(b"<!--") => "text/html; charset=utf-8",
        masked_ws(b"\xFF\xFF\xFF\xFF\xFF", b"<?xml") => "text/xml; charset=utf-8",
        exact(b"%PDF-") => "application/pdf",
        exact(b"%!PS-Adobe-") => "application/postscript",

        // Byte order marks.
        masked(b"\xFF\xFF\x00\x00", b"\xFE\xFF\x00\x00") => "text/plain; charset=utf-16be",
        masked(b"\xFF\xFF\x00\x00", b"\xFF\xFE\x00\x00") => "text/plain; charset=utf-16le",
        masked(b"\xFF\xFF\xFF\x00", b"\xEF\xBB\xBF\x00") => "text/plain; charset=utf-8",

        exact(b"\x00\x00\x01\x00") => "image/x-icon",
        exact(b"\x00\x00\x02\x00") => "image/x-icon",
        exact(b"BM") => "image/bmp",
        exact(b"GIF87a") => "image/gif",
        exact(b"GIF89a") => "image/gif",
        masked(
            b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
            b"RIFF\x00\x00\x00\x00WEBPVP"
        ) => "image/webp",
        exact(b"\x89PNG\x0D\x0A\x1A\x0A") => "image/png",
        exact(b"\xFF\xD8\xFF") => "image/jpeg",

        masked(
            b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
            b"FORM\x00\x00\x00\x00AIFF"
        ) => "audio/aiff",
        masked(b"\xFF\xFF\xFF", b"ID3") => "audio/mpeg",
        masked(b"\xFF\xFF\xFF\xFF\xFF", b"OggS\x00") => "application/ogg",
        masked(b"\xFF\xFF\xFF\xFF\xFF\xFF\xFF\xFF", b"MThd\x00\x00\x00\x06") => "audio/midi",
        masked(
            b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
            b"RIFF\x00\x00\x00\x00AVI "
        ) => "video/avi",
        masked(
            b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
            b"RIFF\x00\x00\x00\x00WAVE"
        ) => "audio/wave",
        mp4() => "video/mp4",
        exact(b"\x1A\x45\xDF\xA3") => "video/webm",

        exact(b"wOFF") => "font/woff",
        exact(b"wOF2") => "font/woff2",
        exact(b"OTTO") => "font/otf",
        exact(b"ttcf") => "font/collection",
        exact(b"\x00\x01\x00\x00") => "font/ttf",

        exact(b"\x1F\x8B\x08") => "application/x-gzip",
        exact(b"PK\x03\x04") => "application/zip",
        exact(b"Rar!\x1A\x07\x00") => "application/x-rar-compressed",
        exact(b"Rar!\x1A\x07\x01\x00") => "application/x-rar-compressed",
        exact(b"\x00\x61\x73\x6D") => "application/wasm",

        text() => "text/plain; charset=utf-8",
    ];
}

const fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0c' | b'\r' | b' ')
}

const fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

impl Matcher {
    fn matches(&self, data: &[u8], first_non_ws: usize) -> bool {
        match *self {
            Matcher::Html(pat) => {
                let data = &data[first_non_ws..];
                data.len() > pat.len()
                    && data.iter().zip(pat).all(|(&d, &p)| {
                        if p.is_ascii_uppercase() {
                            d & 0xDF == p
                        } else {
                            d == p
                        }
                    })
                    && matches!(data[pat.len()], b' ' | b'>')
            }
            Matcher::Exact(pat) => data.starts_with(pat),
            Matcher::Masked { mask, pat, skip_ws } => {
                let data = if skip_ws { &data[first_non_ws..] } else { data };
                data.len() >= pat.len()
                    && data
                        .iter()
                        .zip(mask)
                        .zip(pat)
                        .all(|((&d, &m), &p)| d & m == p)
            }
            Matcher::Mp4 => is_mp4(data),
            Matcher::Text => !data[first_non_ws..].iter().copied().any(is_binary),
        }
    }
}

/// An `ftyp` box whose major or compatible brands start with `mp4`.
fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < box_size || box_size % 4 != 0 || &data[4..8] != b"ftyp" {
        return false;
    }
    (8..box_size)
        .step_by(4)
        .filter(|&offset| offset != 12)
        .any(|offset| &data[offset..offset + 3] == b"mp4")
}

/// Returns the sniffed `type/subtype` (with a charset for text types) of `data`, falling back
/// to `application/octet-stream`.
pub fn detect_content_type(data: &[u8]) -> &'static str {
    let data = &data[..data.len().min(SNIFF_LEN)];
    let first_non_ws = data
        .iter()
        .position(|&b| !is_whitespace(b))
        .unwrap_or(data.len());

    let content_type = SIGNATURES
        .iter()
        .find(|sig| sig.matcher.matches(data, first_non_ws))
        .map_or(FALLBACK, |sig| sig.content_type);
    tracing::trace!(content_type, len = data.len(), "sniffed content type");
    content_type
}
