// Output filename expansion. Patterns come straight from the configuration
// sheet, e.g. `Offer {{customer.name}} {{date:YYYY-MM-DD}}`.

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::placeholders::{display_value, resolve_path};

/// Expand a filename pattern against the payload and clock, strip path
/// separators, and guarantee a `.pdf` suffix.
pub fn build_filename(pattern: &str, payload: &Value, now: DateTime<Utc>) -> String {
    let expanded = expand_tokens(pattern, payload, now);

    // Drive treats the name as opaque, but anything downstream that saves the
    // file locally must not see separators.
    let sanitized = expanded.replace(['/', '\\'], "-");

    if sanitized.to_ascii_lowercase().ends_with(".pdf") {
        sanitized
    } else {
        format!("{}.pdf", sanitized)
    }
}

fn expand_tokens(pattern: &str, payload: &Value, now: DateTime<Utc>) -> String {
    let mut output = String::new();
    let mut rest = pattern;

    while let Some(start) = rest.find("{{") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        match after.find("}}") {
            Some(end) => {
                output.push_str(&expand_token(after[..end].trim(), payload, now));
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated token: keep the text as-is.
                output.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    output.push_str(rest);
    output
}

fn expand_token(token: &str, payload: &Value, now: DateTime<Utc>) -> String {
    if token == "today" {
        return now.format("%Y-%m-%d").to_string();
    }

    if let Some(format) = token.strip_prefix("date:") {
        return now.format(&translate_date_format(format)).to_string();
    }

    match resolve_path(payload, token).and_then(display_value) {
        Some(text) => text,
        None => {
            tracing::warn!("Filename token '{}' did not resolve; using empty text", token);
            String::new()
        }
    }
}

/// The sheet uses spreadsheet-style date letters (YYYY-MM-DD HH:mm:ss);
/// translate them to chrono specifiers.
fn translate_date_format(format: &str) -> String {
    format
        .replace("YYYY", "%Y")
        .replace("MM", "%m")
        .replace("DD", "%d")
        .replace("HH", "%H")
        .replace("mm", "%M")
        .replace("ss", "%S")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 30).unwrap()
    }

    #[test]
    fn expands_payload_and_date_tokens() {
        let payload = json!({"customer": {"name": "Ada"}});

        let name = build_filename(
            "Offer {{customer.name}} {{date:YYYY-MM-DD}}",
            &payload,
            fixed_now(),
        );

        assert_eq!(name, "Offer Ada 2024-03-09.pdf");
    }

    #[test]
    fn today_token_is_a_plain_date() {
        let name = build_filename("report-{{today}}", &json!({}), fixed_now());
        assert_eq!(name, "report-2024-03-09.pdf");
    }

    #[test]
    fn date_format_supports_time_letters() {
        let name = build_filename(
            "{{date:YYYYMMDD-HHmmss}}",
            &json!({}),
            fixed_now(),
        );
        assert_eq!(name, "20240309-140530.pdf");
    }

    #[test]
    fn unresolved_tokens_expand_to_nothing() {
        let name = build_filename("doc {{customer.name}}", &json!({}), fixed_now());
        assert_eq!(name, "doc .pdf");
    }

    #[test]
    fn path_separators_are_sanitized() {
        let payload = json!({"deal": {"title": "a/b\\c"}});
        let name = build_filename("{{deal.title}}", &payload, fixed_now());
        assert_eq!(name, "a-b-c.pdf");
    }

    #[test]
    fn existing_pdf_suffix_is_not_doubled() {
        assert_eq!(
            build_filename("fixed-name.pdf", &json!({}), fixed_now()),
            "fixed-name.pdf"
        );
        assert_eq!(
            build_filename("LOUD.PDF", &json!({}), fixed_now()),
            "LOUD.PDF"
        );
    }

    #[test]
    fn unterminated_token_is_kept_literally() {
        assert_eq!(
            build_filename("broken {{token", &json!({}), fixed_now()),
            "broken {{token.pdf"
        );
    }
}
