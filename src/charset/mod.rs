//! Character set detection for response bodies.
//!
//! Two independent detectors look at a body:
//!
//! - a [`MarkupDetector`] reads explicit signals: a byte order mark, a charset declared by the
//!   transport, or an HTML `<meta>` declaration. It reports whether its answer is certain.
//! - a [`StatisticalDetector`] scores the byte distribution against known encodings and
//!   returns ranked candidates with a 0-100 confidence.
//!
//! [`CharsetDetector`] reconciles the two. If the statistical detector is not confident and
//! the markup detector is, or the body is treated as HTML, the markup answer wins. Every
//! other case takes the statistical answer.

mod markup;
mod statistical;

use std::collections::BTreeMap;

pub use self::markup::MetaDetector;
pub use self::statistical::ChardetDetector;

use crate::mime::format_media_type;

/// Confidence a statistical candidate must exceed to be trusted over markup.
pub const CONFIDENCE_THRESHOLD: u8 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkupGuess {
    /// Lower-cased encoding name, empty when nothing was found.
    pub charset: String,
    pub confident: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub charset: String,
    /// 0 to 100.
    pub confidence: u8,
}

pub trait MarkupDetector {
    /// `content_type` is a media type, possibly carrying a declared `charset` parameter.
    fn detect(&self, body: &[u8], content_type: &str) -> MarkupGuess;
}

pub trait StatisticalDetector {
    /// Candidates ordered by descending confidence. `html` asks the detector to ignore markup.
    fn detect_all(&self, body: &[u8], html: bool) -> Vec<Candidate>;
}

/// When the statistical detector is run in HTML mode, which also makes the reconciliation
/// lean towards the markup detector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HtmlMode {
    /// Only media types containing `html`.
    #[default]
    MediaType,
    /// Every body, whatever its media type.
    Always,
}

impl HtmlMode {
    pub fn is_html(self, media_type: &str) -> bool {
        match self {
            HtmlMode::MediaType => media_type.contains("html"),
            HtmlMode::Always => true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CharsetDetector<M = MetaDetector, S = ChardetDetector> {
    markup: M,
    statistical: S,
    html_mode: HtmlMode,
}

impl Default for CharsetDetector {
    fn default() -> Self {
        Self::new(MetaDetector, ChardetDetector)
    }
}

impl<M: MarkupDetector, S: StatisticalDetector> CharsetDetector<M, S> {
    pub fn new(markup: M, statistical: S) -> Self {
        Self {
            markup,
            statistical,
            html_mode: HtmlMode::default(),
        }
    }

    pub fn with_html_mode(mut self, html_mode: HtmlMode) -> Self {
        self.html_mode = html_mode;
        self
    }

    pub fn html_mode(&self) -> HtmlMode {
        self.html_mode
    }

    /// Returns the lower-cased charset for `body`, or an empty string when neither detector
    /// produced one. `declared` is the charset the transport claimed, if any, and is handed
    /// to the markup detector.
    pub fn detect(&self, body: &[u8], media_type: &str, declared: &str) -> String {
        let content_type = if declared.is_empty() {
            media_type.to_owned()
        } else {
            let params = BTreeMap::from([("charset".to_owned(), declared.to_owned())]);
            format_media_type(media_type, &params).unwrap_or_else(|| media_type.to_owned())
        };
        let markup = self.markup.detect(body, &content_type);

        let html = self.html_mode.is_html(media_type);
        let (statistical, statistical_confident, confidence) =
            match self.statistical.detect_all(body, html).into_iter().next() {
                Some(top) => (
                    top.charset.to_lowercase(),
                    top.confidence > CONFIDENCE_THRESHOLD,
                    top.confidence,
                ),
                None => (String::new(), false, 0),
            };

        let charset = if !statistical_confident && (markup.confident || html) {
            markup.charset.to_lowercase()
        } else {
            statistical.clone()
        };
        tracing::debug!(
            media_type,
            declared,
            markup = %markup.charset,
            markup_confident = markup.confident,
            statistical = %statistical,
            confidence,
            html,
            charset = %charset,
            "detected charset"
        );
        charset
    }
}


#[cfg(test)]
mod tests {
    use super::stubs::*;
    use super::*;

    fn detect(markup: (&'static str, bool), statistical: &'static [(&'static str, u8)], media_type: &str) -> String {
        CharsetDetector::new(FixedMarkup(markup.0, markup.1), FixedStatistics(statistical))
            .detect(b"body", media_type, "")
    }

    #[test]
    fn confident_statistics_win() {
        assert_eq!(detect(("utf-8", true), &[("ISO-8859-1", 90)], "text/html"), "iso-8859-1");
        assert_eq!(detect(("utf-8", true), &[("ISO-8859-1", 51)], "text/plain"), "iso-8859-1");
    }

    #[test]
    fn threshold_is_exclusive() {
        assert_eq!(detect(("utf-8", true), &[("ISO-8859-1", 50)], "text/plain"), "utf-8");
    }

    #[test]
    fn confident_markup_beats_unsure_statistics() {
        assert_eq!(detect(("windows-1252", true), &[("UTF-8", 10)], "text/plain"), "windows-1252");
    }

    #[test]
    fn html_prefers_markup_when_statistics_are_unsure() {
        assert_eq!(detect(("shift_jis", false), &[("utf-8", 30)], "text/html"), "shift_jis");
    }

    #[test]
    fn plain_text_prefers_statistics_when_nobody_is_sure() {
        assert_eq!(detect(("windows-1252", false), &[("UTF-8", 30)], "text/plain"), "utf-8");
    }

    #[test]
    fn only_the_top_candidate_counts() {
        assert_eq!(
            detect(("windows-1252", false), &[("utf-8", 40), ("iso-8859-1", 99)], "text/plain"),
            "utf-8"
        );
    }

    #[test]
    fn no_candidates_falls_back_to_markup() {
        assert_eq!(detect(("utf-8", false), &[], "text/html"), "utf-8");
        assert_eq!(detect(("", false), &[], "text/html"), "");
        assert_eq!(detect(("windows-1252", true), &[], "text/plain"), "windows-1252");
    }

    #[test]
    fn no_candidates_and_unsure_markup_on_plain_text_is_empty() {
        assert_eq!(detect(("windows-1252", false), &[], "text/plain"), "");
    }

    #[test]
    fn always_html_mode_leans_on_markup() {
        let detector = CharsetDetector::new(
            FixedMarkup("windows-1252", false),
            FixedStatistics(&[("utf-8", 30)]),
        )
        .with_html_mode(HtmlMode::Always);
        assert_eq!(detector.html_mode(), HtmlMode::Always);
        assert_eq!(detector.detect(b"body", "text/plain", ""), "windows-1252");
    }

    #[test]
    fn declared_charset_reaches_markup_detector() {
        let detector = CharsetDetector::new(EchoMarkup, FixedStatistics(&[]));
        assert_eq!(
            detector.detect(b"body", "text/html", "ISO-8859-1"),
            "text/html; charset=iso-8859-1"
        );
        assert_eq!(detector.detect(b"body", "text/html", ""), "text/html");
    }

    #[test]
    fn html_mode_follows_media_type_by_default() {
        assert!(HtmlMode::default().is_html("text/html"));
        assert!(HtmlMode::default().is_html("application/xhtml+xml"));
        assert!(!HtmlMode::default().is_html("text/plain"));
        assert!(HtmlMode::Always.is_html("text/plain"));
    }
}
