//! Placeholder substitution for user-supplied templates.
//!
//! Placeholders take the form `{{.key}}`; whitespace inside the braces is
//! ignored. Keys missing from the data map are left in place untouched.

use std::collections::BTreeMap;

/// Flat mapping of template keys to literal values.
pub type DataMap = BTreeMap<&'static str, String>;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";

/// Substitute every known `{{.key}}` placeholder in `template`.
#[must_use]
pub fn format_string(template: &str, data: &DataMap) -> String {
    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find(OPEN) {
        output.push_str(&rest[..start]);
        let after_open = &rest[start + OPEN.len()..];
        let Some(end) = after_open.find(CLOSE) else {
            output.push_str(&rest[start..]);
            return output;
        };
        let placeholder = &rest[start..start + OPEN.len() + end + CLOSE.len()];
        match resolve(&after_open[..end], data) {
            Some(value) => output.push_str(value),
            None => output.push_str(placeholder),
        }
        rest = &after_open[end + CLOSE.len()..];
    }
    output.push_str(rest);
    output
}

fn resolve<'a>(inner: &str, data: &'a DataMap) -> Option<&'a str> {
    let key = inner.trim().strip_prefix('.')?;
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    data.get(key).map(String::as_str)
}
