//! # Payment Callback Signatures
//!
//! The gateway signs a settled payment as
//! `hex(HMAC-SHA256(secret, "{gateway_order_id}|{gateway_payment_id}"))`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

fn mac_for(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(gateway_order_id.as_bytes());
    mac.update(b"|");
    mac.update(gateway_payment_id.as_bytes());
    mac
}

/// Compute the expected hex signature for a callback
pub fn sign(secret: &str, gateway_order_id: &str, gateway_payment_id: &str) -> String {
    let mac = mac_for(secret, gateway_order_id, gateway_payment_id);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of a supplied hex signature.
///
/// Malformed hex is treated as a mismatch.
pub fn verify(
    secret: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature: &str,
) -> bool {
    let Ok(supplied) = hex::decode(signature.trim()) else {
        return false;
    };
    mac_for(secret, gateway_order_id, gateway_payment_id)
        .verify_slice(&supplied)
        .is_ok()
}
