use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use tracing::{debug, warn};

/// Picks the encoding a compiled catalog's strings are stored in.
///
/// The charset declared in the header entry wins; without one the raw string
/// bytes are sniffed.
pub fn resolve(header: Option<&[u8]>, sample: &[u8]) -> &'static Encoding {
    if let Some(label) = header.and_then(declared_charset) {
        match Encoding::for_label(label.as_bytes()) {
            Some(encoding) => return encoding,
            None => warn!(charset = %label, "unknown catalog charset, detecting instead"),
        }
    }

    detect(sample)
}

fn detect(bytes: &[u8]) -> &'static Encoding {
    if std::str::from_utf8(bytes).is_ok() {
        return UTF_8;
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    debug!(encoding = encoding.name(), "catalog charset detected");
    encoding
}

/// `charset=` value of the header's `Content-Type` line.
fn declared_charset(header: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(header);

    text.lines()
        .find(|l| l.trim_start().to_ascii_lowercase().starts_with("content-type:"))
        .and_then(|l| {
            let lower = l.to_ascii_lowercase();
            let pos = lower.find("charset=")?;
            let value = l[pos + "charset=".len()..]
                .trim()
                .trim_end_matches(';')
                .trim();
            if value.is_empty() || value.eq_ignore_ascii_case("CHARSET") {
                None
            } else {
                Some(value.to_string())
            }
        })
}

pub fn decode(encoding: &'static Encoding, bytes: &[u8]) -> String {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        warn!(encoding = encoding.name(), "catalog string had undecodable bytes");
    }
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::{KOI8_R, WINDOWS_1251};
    use pretty_assertions::assert_eq;

    #[test]
    fn header_charset_wins() {
        let header = b"Project-Id-Version: x\nContent-Type: text/plain; charset=windows-1251\n";
        assert_eq!(resolve(Some(header), "привет".as_bytes()), WINDOWS_1251);

        let header = b"content-type: text/plain; CHARSET=koi8-r\n";
        assert_eq!(resolve(Some(header), b""), KOI8_R);
    }

    #[test]
    fn placeholder_charset_falls_back_to_detection() {
        let header = b"Content-Type: text/plain; charset=CHARSET\n";
        assert_eq!(resolve(Some(header), "привет".as_bytes()), UTF_8);
        assert_eq!(resolve(None, b"plain ascii"), UTF_8);
    }

    #[test]
    fn decodes_legacy_bytes() {
        let (bytes, _, _) = WINDOWS_1251.encode("Корабль");
        assert_eq!(decode(WINDOWS_1251, &bytes), "Корабль");
    }
}
