//! Webhook signature verification (HMAC-SHA256).
//!
//! GitHub signs each delivery with the shared secret and sends the digest in
//! the `X-Hub-Signature-256` header as `sha256=<hex>`. Deliveries are verified
//! before their payload is parsed.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header GitHub puts the signature in.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Parses a signature header value (`sha256=<hex>`) into raw digest bytes.
///
/// Returns `None` for a missing prefix, another algorithm or invalid hex.
///
/// ```
/// use microci::webhooks::parse_signature_header;
///
/// assert_eq!(parse_signature_header("sha256=beef"), Some(vec![0xbe, 0xef]));
/// assert!(parse_signature_header("sha1=beef").is_none());
/// assert!(parse_signature_header("sha256=xyz").is_none());
/// ```
pub fn parse_signature_header(header: &str) -> Option<Vec<u8>> {
    hex::decode(header.trim().strip_prefix("sha256=")?).ok()
}

/// Computes the HMAC-SHA256 digest of `payload` keyed by `secret`.
pub fn compute_signature(payload: &[u8], secret: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.finalize().into_bytes().to_vec()
}

/// Formats a digest as a header value, `sha256=<hex>`.
pub fn format_signature_header(signature: &[u8]) -> String {
    format!("sha256={}", hex::encode(signature))
}

/// Checks a delivery against the shared secret in constant time.
///
/// ```
/// use microci::webhooks::{compute_signature, format_signature_header, verify_signature};
///
/// let body = br#"{"ref":"refs/heads/main"}"#;
/// let header = format_signature_header(&compute_signature(body, b"hook-secret"));
///
/// assert!(verify_signature(body, &header, b"hook-secret"));
/// assert!(!verify_signature(body, &header, b"other-secret"));
/// ```
pub fn verify_signature(payload: &[u8], signature_header: &str, secret: &[u8]) -> bool {
    let Some(expected) = parse_signature_header(signature_header) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}
