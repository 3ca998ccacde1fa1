use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Generate a hex HMAC-SHA256 tag over `payload`.
pub fn generate_tag(secret: &[u8], payload: &[u8]) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| anyhow::anyhow!("Invalid key length: {}", e))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Verify a hex HMAC-SHA256 tag using constant-time comparison
pub fn verify_tag(secret: &[u8], payload: &[u8], tag: &str) -> Result<bool, anyhow::Error> {
    let expected = generate_tag(secret, payload)?;
    Ok(constant_time_eq(expected.as_bytes(), tag.as_bytes()))
}

/// Length-aware constant time comparison.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Hex SHA-256 digest, used where only a fingerprint of a value is stored.
pub fn sha256_hex(value: &[u8]) -> String {
    hex::encode(Sha256::digest(value))
}
