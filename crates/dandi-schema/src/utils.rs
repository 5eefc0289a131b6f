//! Small string helpers shared across modules.

use std::sync::LazyLock;

use regex::Regex;

static UNSAFE_CHARS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[_*\\/<>:|"'?%@;,\s]"#).expect("sanitize regex must compile")
});

/// Replace characters that are unsafe in BIDS-style `key-value` entity
/// labels with `replacement`.
///
/// `_` separates entities, so it is replaced too, as are `.` and whitespace.
/// This is not full BIDS sanitizing; alphanumerics outside ASCII survive.
pub fn sanitize_value(value: &str, replacement: &str) -> String {
    UNSAFE_CHARS_RE
        .replace_all(value, regex::NoExpand(replacement))
        .replace('.', replacement)
}
