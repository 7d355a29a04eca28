//! A WHOIS response as captured from a server, together with what could be worked out about
//! its content, and its MIME framing:
//!
//! ```text
//! MIME-Version: 1.0
//! Query: example.com
//! Host: whois.verisign-grs.com
//! Fetched-At: 2014-03-01T12:30:45Z
//! Content-Type: text/plain; charset=utf-8
//! Content-Length: 5
//! Content-Checksum: aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d
//!
//! hello
//! ```
//!
//! Every line ends in CRLF and the body follows the empty line byte for byte.

use std::{
    borrow::Cow,
    collections::BTreeMap,
    fmt,
    io::{self, Read, Write},
};

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use encoding_rs::Encoding;
use sha1::{Digest, Sha1};
use thiserror::Error;

use crate::{
    charset::{CharsetDetector, MarkupDetector, StatisticalDetector},
    mime::{self, HeaderError, HeaderMap, MediaTypeError},
};

const DEFAULT_MEDIA_TYPE: &str = "text/plain";
const MIME_VERSION: &str = "1.0";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    query: String,
    host: String,
    fetched_at: DateTime<Utc>,
    media_type: String,
    charset: String,
    body: Bytes,
}

#[derive(Debug, Error)]
pub enum ReadMimeError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Header(#[from] HeaderError),
    #[error("The record has MIME-Version {0:?}, expected 1.0")]
    Version(Option<String>),
    #[error("The record has no {0} field")]
    MissingField(&'static str),
    #[error("The Fetched-At value {0:?} is not an RFC 3339 timestamp")]
    FetchedAt(String),
    #[error(transparent)]
    ContentType(#[from] MediaTypeError),
    #[error("The Content-Length value {0:?} is not a byte count")]
    ContentLength(String),
    #[error("The Content-Length is {expected} but the body is {found} bytes")]
    LengthMismatch { expected: usize, found: usize },
    #[error("The Content-Checksum is {expected} but the body hashes to {found}")]
    ChecksumMismatch { expected: String, found: String },
}

impl Response {
    pub fn new(query: impl Into<String>, host: impl Into<String>) -> Self {
        Self::with_fetched_at(query, host, Utc::now())
    }

    pub fn with_fetched_at(
        query: impl Into<String>,
        host: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            query: query.into(),
            host: host.into(),
            fetched_at,
            media_type: String::new(),
            charset: String::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.set_body(body);
        self
    }

    pub fn set_body(&mut self, body: impl Into<Bytes>) {
        self.body = body.into();
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    pub fn media_type(&self) -> &str {
        &self.media_type
    }

    /// Lower-cased, empty when unknown.
    pub fn charset(&self) -> &str {
        &self.charset
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Sets the media type and charset from `content_type` as reported by the transport, or
    /// by sniffing the body when it is empty. Never fails: anything that cannot be parsed
    /// leaves `text/plain` with no charset.
    pub fn detect_content_type(&mut self, content_type: &str) {
        self.detect_content_type_with(content_type, &<CharsetDetector>::default());
    }

    pub fn detect_content_type_with<M, S>(
        &mut self,
        content_type: &str,
        detector: &CharsetDetector<M, S>,
    ) where
        M: MarkupDetector,
        S: StatisticalDetector,
    {
        self.media_type = DEFAULT_MEDIA_TYPE.to_owned();
        self.charset.clear();

        let content_type = if content_type.is_empty() {
            mime::detect_content_type(&self.body)
        } else {
            content_type
        };
        let parsed = match mime::parse_media_type(content_type) {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::debug!(content_type, %err, "unparseable content type, keeping defaults");
                return;
            }
        };

        self.media_type = parsed.essence().to_owned();
        if let Some(charset) = parsed.charset() {
            self.charset = charset.to_lowercase();
        }
        self.detect_charset_with(detector);
    }

    pub fn detect_charset(&mut self) {
        self.detect_charset_with(&<CharsetDetector>::default());
    }

    /// Replaces the charset with the reconciled verdict of both detectors. A charset that is
    /// already set is passed on as the declared one.
    ///
    /// The declared charset reaches the markup detector as part of its content type, so one
    /// that `encoding_rs` recognises makes the markup verdict certain and it is only
    /// overridden by a confident statistical candidate. Detection that looked at the media
    /// type alone would treat a declared charset as no evidence at all.
    pub fn detect_charset_with<M, S>(&mut self, detector: &CharsetDetector<M, S>)
    where
        M: MarkupDetector,
        S: StatisticalDetector,
    {
        self.charset = detector.detect(&self.body, &self.media_type, &self.charset);
    }

    /// Lower-case hex SHA-1 of the body.
    pub fn checksum(&self) -> String {
        hex::encode(Sha1::digest(&self.body))
    }

    /// The fields describing this response, always these six in this order.
    pub fn header(&self) -> HeaderMap {
        let mut header = HeaderMap::new();
        header.set("Query", self.query.as_str());
        header.set("Host", self.host.as_str());
        header.set(
            "Fetched-At",
            self.fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        );
        header.set("Content-Type", self.content_type());
        header.set("Content-Length", self.body.len().to_string());
        header.set("Content-Checksum", self.checksum());
        header
    }

    /// The media type with its `charset` parameter. An empty charset is written as
    /// `charset=""`, an invalid media type gives an empty string.
    pub fn content_type(&self) -> String {
        let params = BTreeMap::from([("charset".to_owned(), self.charset.clone())]);
        mime::format_media_type(&self.media_type, &params).unwrap_or_default()
    }

    /// Writes the MIME framing of the response. Stops at the first failed write, whatever was
    /// written before it stays written.
    ///
    /// Header values are written on a single line: CR and LF become spaces and surrounding
    /// spaces and tabs are dropped, so a query or host carrying them reads back normalized.
    pub fn write_mime<W: Write>(&self, mut w: W) -> io::Result<()> {
        write!(w, "MIME-Version: {MIME_VERSION}\r\n")?;
        self.header().write_to(&mut w)?;
        w.write_all(b"\r\n")?;
        w.write_all(&self.body)
    }

    pub fn read_mime<R: Read>(mut r: R) -> Result<Self, ReadMimeError> {
        let mut data = Vec::new();
        r.read_to_end(&mut data)?;
        Self::from_mime(Bytes::from(data))
    }

    /// Parses a record written by [`Response::write_mime`] and checks that the body still
    /// matches its Content-Length and Content-Checksum. The body shares `data`'s storage.
    ///
    /// Query and host come back as written, that is with the normalization applied by
    /// [`Response::write_mime`]. An empty Content-Type leaves media type and charset empty.
    pub fn from_mime(data: Bytes) -> Result<Self, ReadMimeError> {
        let (header, body_start) = {
            let (header, rest) = HeaderMap::parse(&data)?;
            (header, data.len() - rest.len())
        };
        let body = data.slice(body_start..);

        match header.get("MIME-Version") {
            Some(MIME_VERSION) => {}
            other => return Err(ReadMimeError::Version(other.map(str::to_owned))),
        }
        let field = |name: &'static str| header.get(name).ok_or(ReadMimeError::MissingField(name));

        let fetched_at = field("Fetched-At")?;
        let fetched_at = DateTime::parse_from_rfc3339(fetched_at)
            .map_err(|_| ReadMimeError::FetchedAt(fetched_at.to_owned()))?
            .with_timezone(&Utc);

        // Records written before detection carry an empty Content-Type.
        let (media_type, charset) = match field("Content-Type")? {
            "" => (String::new(), String::new()),
            value => {
                let content_type = mime::parse_media_type(value)?;
                let charset = content_type.charset().unwrap_or_default().to_lowercase();
                (content_type.essence().to_owned(), charset)
            }
        };

        let length = field("Content-Length")?;
        let length = length
            .parse::<usize>()
            .map_err(|_| ReadMimeError::ContentLength(length.to_owned()))?;
        if length != body.len() {
            return Err(ReadMimeError::LengthMismatch {
                expected: length,
                found: body.len(),
            });
        }

        let response = Self {
            query: field("Query")?.to_owned(),
            host: field("Host")?.to_owned(),
            fetched_at,
            media_type,
            charset,
            body,
        };

        let checksum = field("Content-Checksum")?;
        let found = response.checksum();
        if !checksum.eq_ignore_ascii_case(&found) {
            return Err(ReadMimeError::ChecksumMismatch {
                expected: checksum.to_owned(),
                found,
            });
        }
        Ok(response)
    }

    /// The body decoded with the detected charset, or as lossy UTF-8 when the charset is not
    /// a known encoding label.
    pub fn decoded_body(&self) -> Cow<'_, str> {
        match Encoding::for_label(self.charset.as_bytes()) {
            Some(encoding) => encoding.decode(&self.body).0,
            None => String::from_utf8_lossy(&self.body),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.body))
    }
}
