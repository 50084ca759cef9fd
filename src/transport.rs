//! HTTP transport and response decoding. The backend sits behind a trait so
//! tests can script a server; production uses reqwest. Responses are either
//! plaintext JSON or an encrypted blob, sniffed by shape and never trusted:
//! payloads are parsed strictly with serde_json rather than evaluated.

use async_trait::async_trait;
use console_plugin::{Batch, Event};
use thiserror::Error;
use tracing::error;

use crate::cipher::SessionCipher;
use crate::error::RuntimeError;

/// Low-level transport outcome, classified for the three user-facing paths.
#[derive(Debug, Clone, Error)]
pub enum TransportFault {
    /// The server could not be reached at all.
    #[error("connection failed")]
    Unreachable,

    /// The request ran into the configured timeout.
    #[error("timed out")]
    Timeout,

    /// Anything else: TLS, HTTP status, body read failures.
    #[error("{0}")]
    Other(String),
}

/// The one operation the runtime needs from HTTP.
#[async_trait]
pub trait HttpBackend: Send + Sync {
    async fn post(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<String, TransportFault>;
}

/// Production backend on a shared reqwest client.
pub struct ReqwestBackend {
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(timeout: std::time::Duration) -> Result<Self, RuntimeError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RuntimeError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpBackend for ReqwestBackend {
    async fn post(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<String, TransportFault> {
        let response = self
            .client
            .post(url)
            .form(fields)
            .send()
            .await
            .map_err(classify)?
            .error_for_status()
            .map_err(classify)?;
        response.text().await.map_err(classify)
    }
}

fn classify(err: reqwest::Error) -> TransportFault {
    if err.is_timeout() {
        TransportFault::Timeout
    } else if err.is_connect() {
        TransportFault::Unreachable
    } else {
        TransportFault::Other(err.to_string())
    }
}

pub struct Transport {
    backend: Box<dyn HttpBackend>,
}

impl Transport {
    pub fn new(backend: Box<dyn HttpBackend>) -> Self {
        Self { backend }
    }

    pub async fn send(
        &self,
        url: &str,
        fields: &[(String, String)],
    ) -> Result<String, TransportFault> {
        self.backend.post(url, fields).await
    }
}

/// Turns a raw response body into an ordered event list. Bracketed text is
/// taken as plaintext JSON; anything else goes through the active cipher,
/// then trailing control characters (cipher block slack) are trimmed.
pub fn decode_response(
    raw: &str,
    cipher: Option<&dyn SessionCipher>,
) -> Result<Vec<Event>, RuntimeError> {
    let trimmed = raw.trim();
    let cleaned = if looks_structured(trimmed) {
        trimmed.to_string()
    } else {
        let cipher = cipher.ok_or(RuntimeError::CipherMissing)?;
        let decrypted = cipher.decrypt(trimmed)?;
        decrypted
            .trim_end_matches(|c: char| (c as u32) < 0x20)
            .to_string()
    };
    let batch: Batch = serde_json::from_str(&cleaned).map_err(|e| {
        error!("malformed server response: {e}");
        RuntimeError::Decode(e.to_string())
    })?;
    Ok(batch.into_events())
}

fn looks_structured(text: &str) -> bool {
    matches!(text.chars().next(), Some('{' | '['))
        || matches!(text.chars().last(), Some('}' | ']'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::CipherProvider;
    use crate::testing::XorCipherProvider;
    use console_plugin::CoreEvent;
    use serde_json::json;

    #[test]
    fn plaintext_array_decodes_in_order() {
        let raw = r#"[{"method":"appLocked"},{"method":"restart"}]"#;
        let events = decode_response(raw, None).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], Event::Core(CoreEvent::AppLocked));
        assert_eq!(events[1], Event::Core(CoreEvent::Restart));
    }

    #[test]
    fn single_object_decodes_as_one_event() {
        let events = decode_response(r#"{"method":"init"}"#, None).unwrap();
        assert_eq!(events, vec![Event::Core(CoreEvent::Init)]);
    }

    #[test]
    fn unbracketed_body_goes_through_the_cipher() {
        let cipher = XorCipherProvider.create(&[23, 42]).unwrap();
        // Simulate cipher slack: the decrypted text ends in control bytes.
        let body = json!([{"method": "getEvents"}]).to_string() + "\u{0}\u{1}\n";
        let wire = cipher.encrypt(&body).unwrap();
        assert!(!looks_structured(&wire));

        let events = decode_response(&wire, Some(cipher.as_ref())).unwrap();
        assert_eq!(events, vec![Event::Core(CoreEvent::GetEvents)]);
    }

    #[test]
    fn encrypted_body_without_cipher_is_an_error() {
        let result = decode_response("deadbeef", None);
        assert!(matches!(result, Err(RuntimeError::CipherMissing)));
    }

    #[test]
    fn garbage_after_decrypt_is_a_decode_error() {
        let cipher = XorCipherProvider.create(&[9]).unwrap();
        let wire = cipher.encrypt("not json at all").unwrap();
        let result = decode_response(&wire, Some(cipher.as_ref()));
        assert!(matches!(result, Err(RuntimeError::Decode(_))));
    }
}
