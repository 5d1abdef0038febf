//! Signed tokens.
//!
//! A session-bound token is `expiry ‖ HMAC-SHA256(secret, expiry ‖ session)`
//! where the expiry is two little-endian `u64`s: seconds since the Unix epoch
//! and the sub-second nanoseconds. A sessionless token replaces the expiry
//! with 32 random bytes and signs only those.
//!
//! Neither form needs server-side state beyond the secret.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::Mac;

use crate::{random::RandomSource, Error, HmacSha256};

/// Length of a session-bound token.
pub const SIGNED_LEN: usize = EXPIRY_LEN + MAC_LEN;

/// Length of a sessionless token.
pub const SESSIONLESS_LEN: usize = NONCE_LEN + MAC_LEN;

const EXPIRY_LEN: usize = 16;
const NONCE_LEN: usize = 32;
const MAC_LEN: usize = 32;

/// Creates a token for `session_id` that stays valid for `ttl`.
pub fn create_token(secret: &[u8], session_id: &str, ttl: Duration) -> Result<Vec<u8>, Error> {
    let expires = SystemTime::now()
        .checked_add(ttl)
        .ok_or(Error::ExpiryOutOfRange)?;

    create_token_expiring(secret, session_id, expires)
}

/// Creates a token for `session_id` that is valid until `expires`.
pub fn create_token_expiring(
    secret: &[u8],
    session_id: &str,
    expires: SystemTime,
) -> Result<Vec<u8>, Error> {
    let mut token = Vec::with_capacity(SIGNED_LEN);
    token.extend_from_slice(&encode_expiry(expires));

    let mut mac = HmacSha256::new_from_slice(secret)?;
    mac.update(&token);
    mac.update(session_id.as_bytes());
    token.extend_from_slice(&mac.finalize().into_bytes());

    Ok(token)
}

/// Reports whether `token` was signed with `secret` for `session_id` and
/// hasn't expired yet.
pub fn verify_token(secret: &[u8], token: &[u8], session_id: &str) -> bool {
    if token.len() != SIGNED_LEN {
        return false;
    }

    let (expiry, signature) = token.split_at(EXPIRY_LEN);

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(expiry);
    mac.update(session_id.as_bytes());

    if mac.verify_slice(signature).is_err() {
        return false;
    }

    // the expiry is covered by the mac, so it's safe to trust from here on
    decode_expiry(expiry).is_some_and(|expires| SystemTime::now() < expires)
}

/// Creates a token that isn't bound to a session and never expires.
pub fn create_sessionless_token(
    secret: &[u8],
    random: &dyn RandomSource,
) -> Result<Vec<u8>, Error> {
    let mut token = vec![0u8; NONCE_LEN];
    random.fill(&mut token)?;

    let mut mac = HmacSha256::new_from_slice(secret)?;
    mac.update(&token);
    token.extend_from_slice(&mac.finalize().into_bytes());

    Ok(token)
}

/// Reports whether `token` is a sessionless token signed with `secret`.
pub fn verify_sessionless_token(secret: &[u8], token: &[u8]) -> bool {
    if token.len() != SESSIONLESS_LEN {
        return false;
    }

    let (nonce, signature) = token.split_at(NONCE_LEN);

    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(nonce);

    mac.verify_slice(signature).is_ok()
}

fn encode_expiry(expires: SystemTime) -> [u8; EXPIRY_LEN] {
    // anything before the epoch is long expired
    let since_epoch = expires.duration_since(UNIX_EPOCH).unwrap_or_default();

    let mut buf = [0u8; EXPIRY_LEN];
    buf[..8].copy_from_slice(&since_epoch.as_secs().to_le_bytes());
    buf[8..].copy_from_slice(&u64::from(since_epoch.subsec_nanos()).to_le_bytes());

    buf
}

fn decode_expiry(buf: &[u8]) -> Option<SystemTime> {
    let secs = u64::from_le_bytes(buf.get(..8)?.try_into().ok()?);
    let nanos = u64::from_le_bytes(buf.get(8..EXPIRY_LEN)?.try_into().ok()?);
    let nanos = u32::try_from(nanos).ok().filter(|n| *n < 1_000_000_000)?;

    UNIX_EPOCH.checked_add(Duration::new(secs, nanos))
}
