//! Content extraction from raw remote messages
//!
//! Turns a [`RawMessage`] into a normalized [`Message`] row: canonical
//! header lookup, recursive MIME part walk for plain/HTML bodies, sender
//! name/address split, and label-derived read state.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};

use crate::client::{RawMessage, RawPart};
use crate::models::{Address, Message};

/// Label id whose presence marks a message unread
const UNREAD_LABEL: &str = "UNREAD";

/// Build a normalized message row from a raw remote message.
///
/// Header names are matched case-sensitively against their canonical forms;
/// for single-valued headers the first match wins, while To/Cc/Bcc collect
/// every matching header instance.
pub fn extract_message(
    raw: &RawMessage,
    user_id: &str,
    account_id: &str,
    cursor: Option<&str>,
) -> Message {
    let mut message = Message::new(&raw.id, &raw.thread_id, user_id, account_id);

    message.subject = header(&raw.payload, "Subject").unwrap_or_default();

    let (from_name, from_email) = parse_sender(header(&raw.payload, "From").as_deref());
    message.from = from_name;
    message.from_email = from_email;

    message.to = parse_recipients(&raw.payload, "To");
    message.cc = parse_recipients(&raw.payload, "Cc");
    message.bcc = parse_recipients(&raw.payload, "Bcc");

    let (body, body_html) = extract_bodies(&raw.payload);
    message.body = body.unwrap_or_default();
    message.body_html = body_html;

    message.snippet = raw.snippet.clone().unwrap_or_default();
    message.label_ids = raw.label_ids.clone();
    message.is_unread = raw.label_ids.iter().any(|l| l == UNREAD_LABEL);
    message.internal_date = parse_internal_date(raw.internal_date.as_deref());
    message.last_known_cursor = cursor.map(str::to_string);

    message
}

/// First header with exactly this canonical name
fn header(payload: &RawPart, name: &str) -> Option<String> {
    payload
        .headers
        .iter()
        .find(|h| h.name == name)
        .map(|h| h.value.clone())
}

/// Every header instance with this name, comma-split into addresses
fn parse_recipients(payload: &RawPart, name: &str) -> Vec<Address> {
    payload
        .headers
        .iter()
        .filter(|h| h.name == name)
        .flat_map(|h| split_address_list(&h.value))
        .collect()
}

/// Split a recipient header on commas, honoring quoted display names
fn split_address_list(raw: &str) -> Vec<Address> {
    let mut addresses = Vec::new();
    let mut in_quotes = false;
    let mut current = String::new();

    for ch in raw.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ',' if !in_quotes => {
                if let Some(addr) = parse_address(current.trim()) {
                    addresses.push(addr);
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if let Some(addr) = parse_address(current.trim()) {
        addresses.push(addr);
    }

    addresses
}

/// Parse one `"Name" <email>` or bare-email entry
fn parse_address(entry: &str) -> Option<Address> {
    if entry.is_empty() {
        return None;
    }

    if let Some((name, email)) = split_name_and_email(entry) {
        if name.is_empty() {
            return Some(Address::new(email));
        }
        return Some(Address::with_name(name, email));
    }

    Some(Address::new(entry))
}

/// Sender split for the From header.
///
/// When the `"Name" <email>` pattern does not match, the raw string is used
/// as both the display name and the email fallback.
fn parse_sender(raw: Option<&str>) -> (String, String) {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return (String::new(), String::new());
    };

    match split_name_and_email(raw) {
        Some((name, email)) if name.is_empty() => (email.clone(), email),
        Some((name, email)) => (name, email),
        None => (raw.to_string(), raw.to_string()),
    }
}

/// Split `"Name" <email>` into (name, email); None if there is no angle pair
fn split_name_and_email(entry: &str) -> Option<(String, String)> {
    let start = entry.rfind('<')?;
    let end = entry.rfind('>')?;
    if end <= start {
        return None;
    }

    let email = entry[start + 1..end].trim().to_string();
    if email.is_empty() {
        return None;
    }

    let name = entry[..start].trim().trim_matches('"').trim().to_string();
    Some((name, email))
}

/// Extract (plain, html) bodies.
///
/// Prefers a direct body payload on the root part; otherwise walks the MIME
/// part tree, taking the first text/plain and the first text/html part and
/// recursing into nested multiparts.
fn extract_bodies(payload: &RawPart) -> (Option<String>, Option<String>) {
    let mut plain = None;
    let mut html = None;
    collect_bodies(payload, &mut plain, &mut html);
    (plain, html)
}

fn collect_bodies(part: &RawPart, plain: &mut Option<String>, html: &mut Option<String>) {
    let mime_type = part.mime_type.as_deref().unwrap_or("");

    if let Some(data) = part.body.as_ref().and_then(|b| b.data.as_deref()) {
        if !data.is_empty() {
            if let Some(decoded) = decode_body_data(data) {
                if mime_type == "text/plain" && plain.is_none() {
                    *plain = Some(decoded);
                } else if mime_type == "text/html" && html.is_none() {
                    *html = Some(decoded);
                } else if mime_type.is_empty() && plain.is_none() && part.parts.is_none() {
                    // Untyped direct payload counts as the plain body
                    *plain = Some(decoded);
                }
            }
        }
    }

    if let Some(parts) = &part.parts {
        for child in parts {
            collect_bodies(child, plain, html);
        }
    }
}

fn decode_body_data(data: &str) -> Option<String> {
    let bytes = URL_SAFE_NO_PAD.decode(data).ok()?;
    String::from_utf8(bytes).ok()
}

/// Millisecond epoch string → timestamp, now() when absent or malformed
fn parse_internal_date(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|ms| ms.parse::<i64>().ok())
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .unwrap_or_else(Utc::now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{RawBody, RawHeader, RawMessage, RawPart};

    fn encode(text: &str) -> String {
        URL_SAFE_NO_PAD.encode(text.as_bytes())
    }

    fn header_part(headers: Vec<(&str, &str)>) -> RawPart {
        RawPart {
            mime_type: Some("multipart/alternative".to_string()),
            headers: headers
                .into_iter()
                .map(|(name, value)| RawHeader {
                    name: name.to_string(),
                    value: value.to_string(),
                })
                .collect(),
            body: None,
            parts: None,
        }
    }

    fn text_part(mime_type: &str, text: &str) -> RawPart {
        RawPart {
            mime_type: Some(mime_type.to_string()),
            headers: Vec::new(),
            body: Some(RawBody {
                size: Some(text.len() as u64),
                data: Some(encode(text)),
            }),
            parts: None,
        }
    }

    fn raw_message(payload: RawPart) -> RawMessage {
        RawMessage {
            id: "m1".to_string(),
            thread_id: "t1".to_string(),
            label_ids: vec!["INBOX".to_string()],
            snippet: Some("snippet".to_string()),
            internal_date: Some("1700000000000".to_string()),
            payload,
        }
    }

    #[test]
    fn test_basic_extraction() {
        let mut payload = header_part(vec![
            ("From", "Ada Lovelace <ada@example.com>"),
            ("To", "bob@example.com"),
            ("Subject", "Analytical engines"),
        ]);
        payload.parts = Some(vec![
            text_part("text/plain", "plain body"),
            text_part("text/html", "<p>html body</p>"),
        ]);

        let message = extract_message(&raw_message(payload), "user-1", "acct-1", Some("42"));

        assert_eq!(message.remote_message_id, "m1");
        assert_eq!(message.remote_thread_id, "t1");
        assert_eq!(message.subject, "Analytical engines");
        assert_eq!(message.from, "Ada Lovelace");
        assert_eq!(message.from_email, "ada@example.com");
        assert_eq!(message.to, vec![Address::new("bob@example.com")]);
        assert_eq!(message.body, "plain body");
        assert_eq!(message.body_html.as_deref(), Some("<p>html body</p>"));
        assert_eq!(message.last_known_cursor.as_deref(), Some("42"));
        assert!(!message.is_unread);
        assert_eq!(
            message.internal_date,
            Utc.timestamp_millis_opt(1_700_000_000_000).single().unwrap()
        );
    }

    #[test]
    fn test_header_match_is_case_sensitive_first_wins() {
        let payload = header_part(vec![
            ("subject", "lowercase loses"),
            ("Subject", "first canonical"),
            ("Subject", "second canonical"),
        ]);

        let message = extract_message(&raw_message(payload), "user-1", "acct-1", None);
        assert_eq!(message.subject, "first canonical");
    }

    #[test]
    fn test_multi_valued_recipients_collect_all_instances() {
        let payload = header_part(vec![
            ("To", "a@example.com, \"Smith, Jane\" <jane@example.com>"),
            ("To", "b@example.com"),
            ("Cc", "c@example.com"),
        ]);

        let message = extract_message(&raw_message(payload), "user-1", "acct-1", None);
        assert_eq!(
            message.to,
            vec![
                Address::new("a@example.com"),
                Address::with_name("Smith, Jane", "jane@example.com"),
                Address::new("b@example.com"),
            ]
        );
        assert_eq!(message.cc, vec![Address::new("c@example.com")]);
        assert!(message.bcc.is_empty());
    }

    #[test]
    fn test_sender_fallback_uses_raw_string_for_both() {
        assert_eq!(
            parse_sender(Some("mailer-daemon")),
            ("mailer-daemon".to_string(), "mailer-daemon".to_string())
        );
        assert_eq!(
            parse_sender(Some("ada@example.com")),
            ("ada@example.com".to_string(), "ada@example.com".to_string())
        );
        assert_eq!(parse_sender(None), (String::new(), String::new()));
    }

    #[test]
    fn test_bare_angle_sender_uses_email_as_name() {
        assert_eq!(
            parse_sender(Some("<ada@example.com>")),
            ("ada@example.com".to_string(), "ada@example.com".to_string())
        );
    }

    #[test]
    fn test_nested_multipart_takes_first_of_each_kind() {
        let nested = RawPart {
            mime_type: Some("multipart/alternative".to_string()),
            headers: Vec::new(),
            body: None,
            parts: Some(vec![
                text_part("text/plain", "inner plain"),
                text_part("text/html", "<b>inner html</b>"),
            ]),
        };
        let mut payload = header_part(vec![("Subject", "nested")]);
        payload.parts = Some(vec![
            RawPart {
                mime_type: Some("multipart/mixed".to_string()),
                headers: Vec::new(),
                body: None,
                parts: Some(vec![nested]),
            },
            text_part("text/plain", "outer plain, seen second"),
        ]);

        let message = extract_message(&raw_message(payload), "user-1", "acct-1", None);
        assert_eq!(message.body, "inner plain");
        assert_eq!(message.body_html.as_deref(), Some("<b>inner html</b>"));
    }

    #[test]
    fn test_direct_body_preferred_over_part_walk() {
        let mut payload = text_part("text/plain", "direct body");
        payload.headers = vec![RawHeader {
            name: "Subject".to_string(),
            value: "direct".to_string(),
        }];

        let message = extract_message(&raw_message(payload), "user-1", "acct-1", None);
        assert_eq!(message.body, "direct body");
        assert!(message.body_html.is_none());
    }

    #[test]
    fn test_unread_derived_from_label() {
        let mut raw = raw_message(header_part(vec![("Subject", "s")]));
        raw.label_ids = vec!["INBOX".to_string(), "UNREAD".to_string()];
        let message = extract_message(&raw, "user-1", "acct-1", None);
        assert!(message.is_unread);
    }
}
