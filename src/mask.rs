//! Masked tokens for the double-submit cookie.
//!
//! The cookie carries a raw token. Every response hands out
//! `nonce ‖ (token ⊕ nonce ⊕ secret)` with a fresh nonce, so the value on the
//! page never repeats even though it always unmasks to the cookie's token.
//! That keeps compression oracles like [BREACH](http://breachattack.com/)
//! from recovering it byte by byte.

use base64::prelude::*;
use subtle::ConstantTimeEq;

use crate::{random::RandomSource, Error};

/// Length of a raw token and of the masking secret.
pub const TOKEN_LEN: usize = 32;

/// Length of a masked token: nonce followed by the masked token.
pub const MASKED_LEN: usize = 2 * TOKEN_LEN;

/// Generates a fresh raw token.
pub fn generate(random: &dyn RandomSource) -> Result<[u8; TOKEN_LEN], Error> {
    let mut token = [0u8; TOKEN_LEN];
    random.fill(&mut token)?;

    Ok(token)
}

/// Masks the token in `buf[TOKEN_LEN..]` in place.
///
/// A new nonce is written to `buf[..TOKEN_LEN]`, then the token is XORed with
/// the nonce and afterwards with the secret.
pub fn mask(
    secret: &[u8; TOKEN_LEN],
    buf: &mut [u8; MASKED_LEN],
    random: &dyn RandomSource,
) -> Result<(), Error> {
    let (nonce, token) = buf.split_at_mut(TOKEN_LEN);
    random.fill(nonce)?;

    xor(token, nonce);
    xor(token, secret);

    Ok(())
}

/// Reverses [`mask`], leaving the raw token in `buf[TOKEN_LEN..]`.
pub fn unmask(secret: &[u8; TOKEN_LEN], buf: &mut [u8; MASKED_LEN]) {
    let (nonce, token) = buf.split_at_mut(TOKEN_LEN);

    xor(token, secret);
    xor(token, nonce);
}

/// Reports whether `sent` is a masking of `real` under `secret`.
///
/// `real` is the base64 raw token (the cookie value) and `sent` the base64
/// masked token the client echoed. Anything that doesn't decode to the
/// expected length is rejected before comparing.
pub fn verify(secret: &[u8; TOKEN_LEN], real: &str, sent: &str) -> bool {
    let Some(real) = decode::<TOKEN_LEN>(real) else {
        return false;
    };

    verify_raw(secret, &real, sent)
}

pub(crate) fn verify_raw(secret: &[u8; TOKEN_LEN], real: &[u8; TOKEN_LEN], sent: &str) -> bool {
    let Some(mut sent) = decode::<MASKED_LEN>(sent) else {
        return false;
    };

    unmask(secret, &mut sent);

    sent[TOKEN_LEN..].ct_eq(real).into()
}

/// Masks `token` with a fresh nonce and encodes the result.
pub(crate) fn masked(
    secret: &[u8; TOKEN_LEN],
    token: &[u8; TOKEN_LEN],
    random: &dyn RandomSource,
) -> Result<String, Error> {
    let mut buf = [0u8; MASKED_LEN];
    buf[TOKEN_LEN..].copy_from_slice(token);
    mask(secret, &mut buf, random)?;

    Ok(encode(&buf))
}

pub(crate) fn encode(bytes: &[u8]) -> String {
    BASE64_URL_SAFE.encode(bytes)
}

pub(crate) fn decode<const N: usize>(value: &str) -> Option<[u8; N]> {
    BASE64_URL_SAFE.decode(value).ok()?.try_into().ok()
}

fn xor(dest: &mut [u8], key: &[u8]) {
    dest.iter_mut().zip(key).for_each(|(d, k)| *d ^= k);
}
