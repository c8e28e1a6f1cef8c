//! Pre-parse cleanup for feeds that are not quite well-formed XML.

use std::sync::LazyLock;

use regex::Regex;

static LINE_BREAK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<br\s*/?>").expect("valid regex"));
static ONERROR_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<[^>]*onerror=[^>]*>").expect("valid regex"));

const NAMED_ENTITIES: [&str; 5] = ["amp", "lt", "gt", "quot", "apos"];

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

/// Apply the full tolerance policy: escape bare ampersands and bare `<`,
/// flatten `<br>` markup to a space, and drop tags carrying an `onerror=`
/// handler.
pub fn sanitize(text: &str) -> String {
    let escaped = escape_bare_angles(&escape_bare_ampersands(text));
    let flattened = LINE_BREAK_RE.replace_all(&escaped, " ");
    ONERROR_TAG_RE.replace_all(&flattened, "").into_owned()
}

/// Rewrite every `&` that does not start a predefined XML entity or a
/// numeric character reference into `&amp;`.
pub fn escape_bare_ampersands(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];
        if starts_with_reference(tail) {
            out.push('&');
        } else {
            out.push_str("&amp;");
        }
        rest = tail;
    }
    out.push_str(rest);
    out
}

/// Rewrite every `<` that cannot open markup (as in `Salary < 50k`) into
/// `&lt;`. CDATA sections are copied through untouched.
pub fn escape_bare_angles(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(pos) = rest.find('<') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if tail.starts_with(CDATA_OPEN) {
            let end = tail
                .find(CDATA_CLOSE)
                .map_or(tail.len(), |i| i + CDATA_CLOSE.len());
            out.push_str(&tail[..end]);
            rest = &tail[end..];
            continue;
        }
        if opens_markup(&tail[1..]) {
            out.push('<');
        } else {
            out.push_str("&lt;");
        }
        rest = &tail[1..];
    }
    out.push_str(rest);
    out
}

/// A tag name, end tag, comment/CDATA/doctype or processing instruction.
fn opens_markup(after: &str) -> bool {
    after
        .chars()
        .next()
        .is_some_and(|c| matches!(c, '/' | '!' | '?' | '_' | ':') || c.is_alphabetic())
}

fn starts_with_reference(tail: &str) -> bool {
    let Some(end) = tail.find(';') else {
        return false;
    };
    let body = &tail[..end];
    if NAMED_ENTITIES.contains(&body) {
        return true;
    }
    if let Some(hex) = body.strip_prefix("#x").or_else(|| body.strip_prefix("#X")) {
        return !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit());
    }
    if let Some(dec) = body.strip_prefix('#') {
        return !dec.is_empty() && dec.chars().all(|c| c.is_ascii_digit());
    }
    false
}
