//! Guards against a man-in-the-middle who captured a token over plain HTTP
//! and replays it from another origin once the victim is on HTTPS.

use http::{
    header::{HOST, ORIGIN, REFERER},
    request::Parts,
    uri::Scheme,
    HeaderName,
};
use url::{Origin, Url};

use crate::Rejection;

const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// Reports whether the request arrived over an encrypted connection.
pub(crate) fn is_encrypted(parts: &Parts) -> bool {
    parts.uri.scheme() == Some(&Scheme::HTTPS)
        || first_value(parts, &X_FORWARDED_PROTO).is_some_and(|p| p.eq_ignore_ascii_case("https"))
}

/// Checks that the declared origin and the requested host agree.
pub(crate) fn verify(parts: &Parts) -> Result<(), Rejection> {
    let source = source_origin(parts).ok_or(Rejection::MalformedOrigin)?;
    let target = target_origin(parts).ok_or(Rejection::MalformedHost)?;

    if source == target {
        Ok(())
    } else {
        Err(Rejection::CrossOrigin)
    }
}

fn source_origin(parts: &Parts) -> Option<Origin> {
    let declared = parts
        .headers
        .get(ORIGIN)
        .and_then(|h| h.to_str().ok())
        .filter(|o| *o != "null")
        .or_else(|| parts.headers.get(REFERER).and_then(|h| h.to_str().ok()))?;

    let origin = Url::parse(declared).ok()?.origin();

    origin.is_tuple().then_some(origin)
}

fn target_origin(parts: &Parts) -> Option<Origin> {
    let host = first_value(parts, &X_FORWARDED_HOST)
        .or_else(|| parts.headers.get(HOST).and_then(|h| h.to_str().ok()))
        .map(str::to_owned)
        .or_else(|| parts.uri.authority().map(|a| a.as_str().to_owned()))?;

    let origin = Url::parse(&format!("https://{host}")).ok()?.origin();

    origin.is_tuple().then_some(origin)
}

fn first_value<'a>(parts: &'a Parts, name: &HeaderName) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}
