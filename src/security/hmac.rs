//! HMAC-SHA256 request signatures, hex encoded.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn keyed(secret: &[u8]) -> HmacSha256 {
    match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any length"),
    }
}

/// MAC over the concatenation of `parts`
pub(crate) fn sign_parts(parts: &[&[u8]], secret: &str) -> String {
    let mut mac = keyed(secret.as_bytes());
    for part in parts {
        mac.update(part);
    }
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a hex signature over the concatenation of `parts`
pub(crate) fn verify_parts(parts: &[&[u8]], signature: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let mut mac = keyed(secret.as_bytes());
    for part in parts {
        mac.update(part);
    }
    mac.verify_slice(&expected).is_ok()
}

/// Sign a request body
pub fn sign_payload(payload: &[u8], secret: &str) -> String {
    sign_parts(&[payload], secret)
}

/// Verify a request body against the signature sent with it
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    verify_parts(&[payload], signature, secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "your-hmac-secret-key-here";

    #[test]
    fn matches_known_vector() {
        // RFC 4231 test case 2
        let signature = sign_payload(b"what do ya want for nothing?", "Jefe");
        assert_eq!(
            signature,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn signature_verifies_for_same_body() {
        let body = br#"{"client":{"name":"Acme Corp"},"items":[]}"#;
        let signature = sign_payload(body, SECRET);

        assert_eq!(signature.len(), 64);
        assert!(verify_signature(body, &signature, SECRET));
    }

    #[test]
    fn tampered_body_or_wrong_secret_fails() {
        let body = br#"{"amount":100}"#;
        let signature = sign_payload(body, SECRET);

        assert!(!verify_signature(br#"{"amount":900}"#, &signature, SECRET));
        assert!(!verify_signature(body, &signature, "other-secret"));
    }

    #[test]
    fn malformed_signature_is_rejected() {
        assert!(!verify_signature(b"{}", "not-hex", SECRET));
        assert!(!verify_signature(b"{}", "abcd", SECRET));
        assert!(!verify_signature(b"{}", "", SECRET));
    }
}
