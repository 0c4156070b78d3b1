//! Best-effort mime type detection for bucket entries.

use mime_guess::mime::{self, Mime};

/// Number of leading bytes inspected when sniffing content.
pub const SNIFF_LEN: usize = 8 * 1024;

const TEXT_PLAIN: &str = "text/plain";
const OCTET_STREAM: &str = "application/octet-stream";

/// Detect the mime type of an entry from its name and leading bytes.
///
/// Content decides between text and binary. For text the extension may
/// refine the type only to another textual type (`text/*`, JSON, XML, ...);
/// otherwise it is `text/plain`. For binary content the extension is used
/// when known, `application/octet-stream` when not.
pub fn detect_mime_type(name: &str, head: &[u8]) -> String {
    let guess = mime_guess::from_path(name).first();

    if looks_like_text(head) {
        return match guess {
            Some(m) if is_textual(&m) => m.essence_str().to_string(),
            _ => TEXT_PLAIN.to_string(),
        };
    }

    guess
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| OCTET_STREAM.to_string())
}

/// Check a client-declared mime type.
///
/// Returns the normalized type, or `None` when the value is not a media
/// type or could not be sent back as a `Content-Type` header.
pub fn parse_declared(value: &str) -> Option<String> {
    if !value.bytes().all(|b| b == b' ' || b.is_ascii_graphic()) {
        return None;
    }
    value.parse::<Mime>().ok().map(|m| m.to_string())
}

fn is_textual(m: &Mime) -> bool {
    if m.type_() == mime::TEXT {
        return true;
    }
    if let Some(suffix) = m.suffix() {
        if suffix == mime::JSON || suffix == mime::XML {
            return true;
        }
    }
    matches!(
        m.subtype().as_str(),
        "json" | "xml" | "javascript" | "x-sh" | "toml" | "yaml" | "x-yaml"
    )
}

fn looks_like_text(head: &[u8]) -> bool {
    if head.is_empty() {
        return false;
    }

    let text = match std::str::from_utf8(head) {
        Ok(text) => text,
        // A multi-byte character cut off by the sniff window is still text.
        Err(e) if e.error_len().is_none() => match std::str::from_utf8(&head[..e.valid_up_to()]) {
            Ok(text) => text,
            Err(_) => return false,
        },
        Err(_) => return false,
    };

    text.chars()
        .all(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r' | '\x0c'))
}
