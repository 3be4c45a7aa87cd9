use rand::prelude::*;

use crate::mail::view::MailView;

/// A stable identifier for one message.
///
/// Either the sender's embedded Message-ID (trusted verbatim, angle
/// brackets stripped) or a freshly generated random token. The two pipeline
/// stages must agree on it: once the archival stage has published its
/// identifier in a storage reference, the metadata stage reuses that value
/// verbatim; independent resolution is only correct when no archival ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageId {
    Embedded(String),
    Generated(String),
}

impl MessageId {
    pub fn resolve(view: &MailView) -> Self {
        Self::resolve_with(view, &mut thread_rng())
    }

    /// Resolution with a caller-supplied RNG, so tests can pin the seed.
    pub fn resolve_with<R: Rng>(view: &MailView, rng: &mut R) -> Self {
        match view.message_id.as_deref() {
            Some(id) if !id.is_empty() => {
                MessageId::Embedded(id.trim_matches(|c| c == '<' || c == '>').to_string())
            }
            _ => {
                let mut token = [0u8; 16];
                rng.fill(&mut token);
                MessageId::Generated(hex::encode(token))
            }
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageId::Embedded(s) | MessageId::Generated(s) => s,
        }
    }

    pub fn into_inner(self) -> String {
        match self {
            MessageId::Embedded(s) | MessageId::Generated(s) => s,
        }
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;

    use super::*;
    use crate::mail::view::MailView;

    fn view_with_id(id: Option<&str>) -> MailView {
        let mut raw = Vec::new();
        if let Some(id) = id {
            raw.extend_from_slice(format!("Message-ID: {}\r\n", id).as_bytes());
        }
        raw.extend_from_slice(b"Subject: t\r\n\r\nbody");
        MailView::parse(&raw).unwrap()
    }

    #[test]
    fn embedded_id_is_deterministic_and_unbracketed() {
        let view = view_with_id(Some("<abc@x>"));
        let first = MessageId::resolve(&view);
        let second = MessageId::resolve(&view);
        assert_eq!(first, MessageId::Embedded("abc@x".to_string()));
        assert_eq!(first, second);
    }

    #[test]
    fn generated_id_is_sixteen_bytes_of_hex() {
        let view = view_with_id(None);
        match MessageId::resolve(&view) {
            MessageId::Generated(token) => {
                assert_eq!(token.len(), 32);
                assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
            }
            other => panic!("expected generated id, got {:?}", other),
        }
    }

    #[test]
    fn independent_resolutions_do_not_collide() {
        let view = view_with_id(None);
        let mut rng_a = StdRng::seed_from_u64(1);
        let mut rng_b = StdRng::seed_from_u64(2);
        let a = MessageId::resolve_with(&view, &mut rng_a);
        let b = MessageId::resolve_with(&view, &mut rng_b);
        assert_ne!(a, b);
    }
}
