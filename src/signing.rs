use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `body` keyed by the secret key.
///
/// Sent as `x-signature` so the endpoint can check the request came from a
/// holder of the secret. Returns `None` when no secret is configured.
pub fn sign_body(secret_key: &str, body: &[u8]) -> Option<String> {
    if secret_key.is_empty() {
        return None;
    }
    // HMAC accepts keys of any length, so this never fails
    let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes()).ok()?;
    mac.update(body);
    Some(hex::encode(mac.finalize().into_bytes()))
}
