//! Character encoding of fetched pages
//!
//! A page is decoded with the charset named by its Content-Type header,
//! then by a `<meta>` declaration near the top of the document, then as
//! UTF-8; a byte order mark overrides all three. The rewritten page is
//! written back in the charset its own `<meta>` declares, or as UTF-8 with a
//! byte order mark when that declaration is missing or wrong.

use encoding_rs::{Encoding, UTF_8};

/// How far into the document a `<meta>` charset declaration is looked for
const META_PRESCAN_BYTES: usize = 1024;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A page body as text, plus what is needed to write it back faithfully
#[derive(Debug, Clone)]
pub struct DecodedPage {
    pub text: String,
    /// Encoding the body was decoded with
    pub encoding: &'static Encoding,
    /// Encoding named by the document's own `<meta>`, if any
    pub meta: Option<&'static Encoding>,
}

impl DecodedPage {
    pub fn decode(body: &[u8], content_type: Option<&str>) -> Self {
        let meta = charset_from_meta(body);
        let declared = content_type
            .and_then(charset_from_content_type)
            .or(meta)
            .unwrap_or(UTF_8);

        let (text, encoding, had_errors) = declared.decode(body);
        if had_errors {
            tracing::debug!("Replaced malformed {} sequences in page body", encoding.name());
        }

        Self {
            text: text.into_owned(),
            encoding,
            meta,
        }
    }

    /// Encodes rewritten HTML so that a browser reading it from disk
    /// decodes the same text
    ///
    /// Characters the page's charset cannot represent become numeric
    /// character references.
    pub fn encode(&self, html: &str) -> Vec<u8> {
        match self.meta {
            Some(meta) if meta == self.encoding => self.encoding.encode(html).0.into_owned(),
            None if self.encoding == UTF_8 => html.as_bytes().to_vec(),
            _ => {
                let mut out = Vec::with_capacity(UTF8_BOM.len() + html.len());
                out.extend_from_slice(UTF8_BOM);
                out.extend_from_slice(html.as_bytes());
                out
            }
        }
    }
}

/// Reads the `charset` parameter of a Content-Type value
fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let label = value.trim().trim_matches(|c| c == '"' || c == '\'');
        Encoding::for_label(label.as_bytes())
    })
}

/// Finds `<meta charset=...>` or `<meta http-equiv ... content="...; charset=...">`
/// in the first bytes of the document
fn charset_from_meta(body: &[u8]) -> Option<&'static Encoding> {
    let head = body[..body.len().min(META_PRESCAN_BYTES)].to_ascii_lowercase();
    let mut pos = 0;

    while let Some(found) = find(&head[pos..], b"<meta") {
        let start = pos + found;
        let end = find(&head[start..], b">").map_or(head.len(), |len| start + len);
        let tag = &head[start..end];

        if let Some(at) = find(tag, b"charset=") {
            let label: Vec<u8> = tag[at + b"charset=".len()..]
                .iter()
                .copied()
                .skip_while(|b| matches!(b, b'"' | b'\'' | b' '))
                .take_while(|b| !matches!(b, b'"' | b'\'' | b';' | b' ' | b'/'))
                .collect();
            if let Some(encoding) = Encoding::for_label(&label) {
                // A document cannot declare itself UTF-16 from inside
                return Some(encoding.output_encoding());
            }
        }
        pos = end;
    }

    None
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{SHIFT_JIS, WINDOWS_1252};

    #[test]
    fn test_content_type_charset() {
        assert_eq!(
            charset_from_content_type("text/html; charset=ISO-8859-1"),
            Some(WINDOWS_1252)
        );
        assert_eq!(
            charset_from_content_type(r#"text/html;charset="shift_jis""#),
            Some(SHIFT_JIS)
        );
        assert_eq!(charset_from_content_type("text/html"), None);
        assert_eq!(charset_from_content_type("text/html; charset=nonsense"), None);
    }

    #[test]
    fn test_meta_charset() {
        assert_eq!(
            charset_from_meta(br#"<html><head><META CHARSET="iso-8859-1"></head>"#),
            Some(WINDOWS_1252)
        );
        assert_eq!(
            charset_from_meta(
                br#"<meta name="viewport" content="width=device-width"><meta http-equiv="Content-Type" content="text/html; charset=Shift_JIS">"#
            ),
            Some(SHIFT_JIS)
        );
        assert_eq!(charset_from_meta(br#"<meta charset=utf-16>"#), Some(UTF_8));
        assert_eq!(charset_from_meta(b"<html><body>no meta</body></html>"), None);
    }

    #[test]
    fn test_decode_latin1_from_header() {
        let page = DecodedPage::decode(b"<p>caf\xE9</p>", Some("text/html; charset=iso-8859-1"));
        assert_eq!(page.text, "<p>caf\u{e9}</p>");
        assert_eq!(page.encoding, WINDOWS_1252);
    }

    #[test]
    fn test_decode_falls_back_to_meta_then_utf8() {
        let page = DecodedPage::decode(b"<meta charset=latin1><p>caf\xE9</p>", Some("text/html"));
        assert!(page.text.contains("caf\u{e9}"));

        let page = DecodedPage::decode("<p>caf\u{e9}</p>".as_bytes(), None);
        assert_eq!(page.text, "<p>caf\u{e9}</p>");
        assert_eq!(page.encoding, UTF_8);
    }

    #[test]
    fn test_encode_back_to_declared_charset() {
        let body = b"<meta charset=\"iso-8859-1\"><p>caf\xE9</p>";
        let page = DecodedPage::decode(body, Some("text/html; charset=iso-8859-1"));

        let written = page.encode(&page.text);
        assert_eq!(written, body.to_vec());
    }

    #[test]
    fn test_encode_unrepresentable_as_reference() {
        let page = DecodedPage::decode(b"<meta charset=latin1>", None);
        let written = page.encode("\u{4e2d}");
        assert_eq!(written, b"&#20013;".to_vec());
    }

    #[test]
    fn test_encode_without_matching_meta_uses_utf8_bom() {
        let page = DecodedPage::decode(b"<p>caf\xE9</p>", Some("text/html; charset=iso-8859-1"));
        let written = page.encode(&page.text);

        assert!(written.starts_with(UTF8_BOM));
        assert_eq!(&written[UTF8_BOM.len()..], "<p>caf\u{e9}</p>".as_bytes());
    }

    #[test]
    fn test_plain_utf8_written_unchanged() {
        let page = DecodedPage::decode(b"<p>plain</p>", Some("text/html"));
        assert_eq!(page.encode(&page.text), b"<p>plain</p>".to_vec());
    }
}
