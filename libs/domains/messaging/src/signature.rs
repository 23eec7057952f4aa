//! Webhook HMAC-SHA256 signature validation.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Verify a webhook signature against the shared secret.
///
/// The signature header carries the hex-encoded HMAC-SHA256 of the raw
/// request body, optionally prefixed with `sha256=`. Comparison is
/// constant-time (`Mac::verify_slice`).
pub fn verify_webhook_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    let signature = signature.strip_prefix("sha256=").unwrap_or(signature);

    let Ok(signature_bytes) = hex::decode(signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&signature_bytes).is_ok()
}

/// Hex-encode the expected signature for a payload (used by tests and
/// outbound webhook emitters).
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key size");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_signature_roundtrip() {
        let payload = br#"{"instance":"I1"}"#;
        let signature = sign_payload(payload, "secret");

        assert!(verify_webhook_signature(payload, &signature, "secret"));
    }

    #[test]
    fn test_sha256_prefix_accepted() {
        let payload = b"body";
        let signature = format!("sha256={}", sign_payload(payload, "secret"));

        assert!(verify_webhook_signature(payload, &signature, "secret"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = b"body";
        let signature = sign_payload(payload, "secret");

        assert!(!verify_webhook_signature(payload, &signature, "other"));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let signature = sign_payload(b"body", "secret");
        assert!(!verify_webhook_signature(b"tampered", &signature, "secret"));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        assert!(!verify_webhook_signature(b"body", "not-hex!", "secret"));
        assert!(!verify_webhook_signature(b"body", "", "secret"));
    }
}
