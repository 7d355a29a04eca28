use super::{Candidate, StatisticalDetector};

/// Upper bound on how many bytes are fed to the detector.
const INPUT_LEN: usize = 8000;

/// Statistical detection through the `chardet` probers. In HTML mode the markup is stripped
/// first so that tag and attribute names, which are ASCII, do not drown the text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChardetDetector;

impl StatisticalDetector for ChardetDetector {
    fn detect_all(&self, body: &[u8], html: bool) -> Vec<Candidate> {
        let input = if html {
            strip_tags(body)
        } else {
            body[..body.len().min(INPUT_LEN)].to_vec()
        };
        if input.is_empty() {
            return Vec::new();
        }

        let (charset, confidence, _language) = chardet::detect(&input);
        if charset.is_empty() {
            return Vec::new();
        }
        vec![Candidate {
            charset: charset.to_lowercase(),
            confidence: (confidence.clamp(0.0, 1.0) * 100.0).round() as u8,
        }]
    }
}

/// Removes everything between `<` and `>`. Falls back to the raw bytes when the input does not
/// look like markup: fewer than 5 tags, more than one in five tags opened inside another, or
/// so little text left over that statistics would be meaningless.
fn strip_tags(raw: &[u8]) -> Vec<u8> {
    let mut stripped = Vec::with_capacity(raw.len().min(INPUT_LEN));
    let mut in_markup = false;
    let mut open_tags = 0usize;
    let mut bad_tags = 0usize;

    for &b in raw {
        if stripped.len() >= INPUT_LEN {
            break;
        }
        if b == b'<' {
            if in_markup {
                bad_tags += 1;
            }
            in_markup = true;
            open_tags += 1;
        }
        if !in_markup {
            stripped.push(b);
        }
        if b == b'>' {
            in_markup = false;
        }
    }

    if open_tags < 5 || open_tags / 5 < bad_tags || (stripped.len() < 100 && raw.len() > 600) {
        raw[..raw.len().min(INPUT_LEN)].to_vec()
    } else {
        stripped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup_from_html() {
        let html = b"<html><head><title>t</title></head><body><p>hello</p></body></html>";
        assert_eq!(strip_tags(html), b"thello");
    }

    #[test]
    fn keeps_raw_input_with_few_tags() {
        let text = b"<p>domain: example.com</p>";
        assert_eq!(strip_tags(text), text.to_vec());
    }

    #[test]
    fn keeps_raw_input_with_many_unclosed_tags() {
        let text = b"a < b < c < d < e < f < g < h < i < j < k";
        assert_eq!(strip_tags(text), text.to_vec());
    }

    #[test]
    fn keeps_raw_input_when_little_text_remains() {
        let mut html = Vec::new();
        for _ in 0..50 {
            html.extend_from_slice(b"<span class=\"x\"></span>");
        }
        html.extend_from_slice(b"short");
        assert_eq!(strip_tags(&html), html);
    }

    #[test]
    fn empty_body_has_no_candidates() {
        assert!(ChardetDetector.detect_all(b"", false).is_empty());
        assert!(ChardetDetector.detect_all(b"", true).is_empty());
    }

    #[test]
    fn candidates_are_lower_case_and_bounded() {
        let body = "Registrant Name: Zoë Müller\nRegistrant Street: Größenweg 12\nRegistrant City: Köln\n"
            .repeat(4);
        for html in [false, true] {
            for candidate in ChardetDetector.detect_all(body.as_bytes(), html) {
                assert_eq!(candidate.charset, candidate.charset.to_lowercase());
                assert!(candidate.confidence <= 100);
            }
        }
    }

    #[test]
    fn recognises_utf8_text() {
        let body = "Registrant Name: Zoë Müller\nRegistrant Street: Größenweg 12\nRegistrant City: Köln\n"
            .repeat(4);
        let candidates = ChardetDetector.detect_all(body.as_bytes(), false);
        assert_eq!(candidates[0].charset, "utf-8");
        assert!(candidates[0].confidence > 50);
    }
}
