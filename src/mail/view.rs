use mail_parser::{Address, HeaderValue, MessageParser};

use crate::error::IngestError;

/// Parsing work is bounded: input beyond this many bytes is ignored rather
/// than failing, so adversarial or malformed messages cannot blow up memory
/// or CPU. 50 MiB.
const MAX_PARSE_BYTES: usize = 50 * 1024 * 1024;

/// Structured view of one message: exactly the fields the pipeline
/// persists.
///
/// Deriving it is pure (no network access, no side effects), so the two
/// stages may each derive their own copy from the same raw bytes and agree
/// on every field.
#[derive(Debug, Clone)]
pub struct MailView {
    pub subject: String,
    pub from: String,
    pub to: String,
    pub cc: String,
    pub bcc: String,
    /// Bare addresses from the Cc header.
    pub cc_addresses: Vec<String>,
    /// First bare address from the To header; recipient lookup key.
    pub to_address: Option<String>,
    pub in_reply_to: Option<String>,
    /// Declared date, RFC 3339. Absent when the message carries none; the
    /// record build substitutes processing time.
    pub date: Option<String>,
    pub attachment_count: usize,
    pub text_len: usize,
    /// Identifier embedded by the sender, angle brackets already stripped.
    pub message_id: Option<String>,
}

impl MailView {
    pub fn parse(raw: &[u8]) -> Result<Self, IngestError> {
        let input = &raw[..raw.len().min(MAX_PARSE_BYTES)];
        let msg = MessageParser::new().parse(input).ok_or(IngestError::Parse)?;

        Ok(Self {
            subject: msg.subject().unwrap_or_default().to_string(),
            from: address_text(msg.from()),
            to: address_text(msg.to()),
            cc: address_text(msg.cc()),
            bcc: address_text(msg.bcc()),
            cc_addresses: bare_addresses(msg.cc()),
            to_address: msg
                .to()
                .and_then(|a| a.first())
                .and_then(|a| a.address())
                .map(String::from),
            in_reply_to: first_text(msg.in_reply_to()),
            date: msg.date().map(|d| d.to_rfc3339()),
            attachment_count: msg.attachments().count(),
            text_len: msg.body_text(0).map(|t| t.len()).unwrap_or(0),
            message_id: msg.message_id().map(String::from),
        })
    }
}

fn address_text(addr: Option<&Address<'_>>) -> String {
    let addr = match addr {
        Some(a) => a,
        None => return String::new(),
    };
    addr.iter()
        .map(|a| match (a.name(), a.address()) {
            (Some(name), Some(email)) => format!("{} <{}>", name, email),
            (None, Some(email)) => email.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn bare_addresses(addr: Option<&Address<'_>>) -> Vec<String> {
    addr.map(|a| {
        a.iter()
            .filter_map(|a| a.address().map(String::from))
            .collect()
    })
    .unwrap_or_default()
}

fn first_text(hv: &HeaderValue<'_>) -> Option<String> {
    match hv {
        HeaderValue::Text(s) => Some(s.to_string()),
        HeaderValue::TextList(list) => list.first().map(|s| s.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &[u8] = b"Message-ID: <abc@x>\r\n\
From: Alice Example <alice@example.com>\r\n\
To: a@example.com\r\n\
Cc: Bob <b@example.com>, c@example.com\r\n\
In-Reply-To: <parent@x>\r\n\
Subject: Hello\r\n\
Date: Mon, 2 Jan 2023 10:00:00 +0000\r\n\
\r\n\
hi";

    #[test]
    fn extracts_persisted_fields() {
        let view = MailView::parse(SAMPLE).unwrap();
        assert_eq!(view.subject, "Hello");
        assert_eq!(view.from, "Alice Example <alice@example.com>");
        assert_eq!(view.to_address.as_deref(), Some("a@example.com"));
        assert_eq!(
            view.cc_addresses,
            vec!["b@example.com".to_string(), "c@example.com".to_string()]
        );
        assert_eq!(view.in_reply_to.as_deref(), Some("parent@x"));
        assert_eq!(view.message_id.as_deref(), Some("abc@x"));
        assert_eq!(view.attachment_count, 0);
        assert_eq!(view.text_len, 2);
        assert!(view.date.is_some());
    }

    #[test]
    fn missing_headers_yield_empty_fields() {
        let view = MailView::parse(b"Subject: only\r\n\r\nbody\r\n").unwrap();
        assert_eq!(view.subject, "only");
        assert_eq!(view.from, "");
        assert!(view.to_address.is_none());
        assert!(view.message_id.is_none());
        assert!(view.cc_addresses.is_empty());
        assert!(view.date.is_none());
    }

    #[test]
    fn derivation_is_stable_across_reparses() {
        let a = MailView::parse(SAMPLE).unwrap();
        let b = MailView::parse(SAMPLE).unwrap();
        assert_eq!(a.subject, b.subject);
        assert_eq!(a.message_id, b.message_id);
        assert_eq!(a.text_len, b.text_len);
        assert_eq!(a.date, b.date);
    }
}
