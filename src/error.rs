use http::{header::VARY, HeaderValue, StatusCode};

/// Errors raised while building a layer or while serving a request.
///
/// Anything returned from [`Csrf::build`](crate::Csrf::build) is a
/// configuration mistake and should stop the process from serving.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Maps the [`hmac::digest::InvalidLength`] error.
    #[error(transparent)]
    InvalidLength(#[from] hmac::digest::InvalidLength),
    /// The random source couldn't produce bytes.
    #[error("couldn't read random bytes: {0}")]
    Random(#[from] rand::Error),
    /// An expected extension was missing.
    #[error("couldn't extract `{0}`. is `CsrfLayer` enabled?")]
    ExtensionNotFound(String),
    /// The secret key is empty or all zeroes.
    #[error("no secret key")]
    MissingSecret,
    /// The form field name is empty.
    #[error("no form field name")]
    MissingFieldName,
    /// The cookie name is empty.
    #[error("no cookie name")]
    MissingCookieName,
    /// Session-bound tokens need a lifetime.
    #[error("no token expiry")]
    MissingExpiry,
    /// Session-bound tokens need a way to find the session.
    #[error("no session lookup")]
    MissingSession,
    /// A session-only option was set on a sessionless builder.
    #[error("`{0}` doesn't apply to sessionless tokens")]
    SessionlessOption(&'static str),
    /// The token expiry can't be represented.
    #[error("token expiry out of range")]
    ExpiryOutOfRange,
    /// A `__Host-` cookie must be secure, host-only, and scoped to `/`.
    #[error("cookie `{0}` requires Secure, no Domain and Path=/")]
    HostPrefix(String),
    /// A `__Secure-` cookie must be secure.
    #[error("cookie `{0}` requires Secure")]
    SecurePrefix(String),
    /// The header name isn't a valid HTTP header name.
    #[error(transparent)]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),
    /// An exempt path isn't a valid glob.
    #[error(transparent)]
    InvalidExemptPath(#[from] globset::Error),
}

/// Why a request was turned away.
///
/// Rejections are logged but never described to the client: every one of
/// them becomes the same bodiless 403.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    /// Neither `Origin` nor `Referer` held a usable origin.
    #[error("source origin missing or malformed")]
    MalformedOrigin,
    /// The request's host couldn't be determined.
    #[error("target origin missing or malformed")]
    MalformedHost,
    /// The source and target origins differ.
    #[error("cross-origin request")]
    CrossOrigin,
    /// No token was sent.
    #[error("no token")]
    MissingToken,
    /// The request has no session to bind the token to.
    #[error("no session")]
    MissingSession,
    /// The sent token didn't verify.
    #[error("invalid token")]
    InvalidToken,
}

impl Error {
    pub(crate) fn make_layer_error<T: Default, E>(
        err: impl std::error::Error,
    ) -> Result<http::Response<T>, E> {
        tracing::error!(err = %err);

        let mut response = http::Response::default();
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;

        Ok(response)
    }

    pub(crate) fn make_layer_forbidden<T: Default, E>(
        rejection: Rejection,
        vary: HeaderValue,
    ) -> Result<http::Response<T>, E> {
        tracing::debug!(%rejection, "csrf check failed");

        let mut response = http::Response::default();
        *response.status_mut() = StatusCode::FORBIDDEN;
        response.headers_mut().append(VARY, vary);

        Ok(response)
    }
}
