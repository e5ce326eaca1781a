//! Locale-aware greeting templates.
//!
//! [`format_greeting`] takes the raw wire value of a [`Language`] rather than
//! the enum itself so that values outside the known range (sent by newer
//! clients or hand-crafted requests) still produce a greeting: anything that
//! is not a recognised non-English locale renders with the English template.

use crate::proto::Language;

/// Renders the greeting for `name` in the locale identified by `language`.
///
/// - `ENGLISH` -> `Hello, {name}!`
/// - `JAPANESE` -> `こんにちは、{name}！`
/// - anything else -> the English template
pub fn format_greeting(name: &str, language: i32) -> String {
    match Language::try_from(language) {
        Ok(Language::Japanese) => format!("こんにちは、{name}！"),
        Ok(Language::English) | Err(_) => format!("Hello, {name}!"),
    }
}
