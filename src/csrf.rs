use bytes::Bytes;
use futures_util::future::BoxFuture;
use http::{header::VARY, request::Parts, HeaderName, HeaderValue, Request, Response};
use http_body::Body;
use std::{
    sync::Arc,
    task::{Context, Poll},
    time::Duration,
};
use tower_cookies::{cookie::SameSite, CookieManager};
use tower_layer::Layer;
use tower_service::Service;

use crate::{
    exempt::{Exempt, ExemptFn},
    form::{BoxError, Extractor},
    mask::TOKEN_LEN,
    origin,
    random::{OsRandom, RandomSource},
    signed::{Binding, SessionFn},
    strategy::Strategy,
    Error, Masked, Signed, Token,
};

const DEFAULT_BODY_LIMIT: usize = 2 * 1024 * 1024;

/// Builds a [`CsrfLayer`].
///
/// Start from [`Csrf::masked`], [`Csrf::signed`] or [`Csrf::sessionless`],
/// adjust, then call [`Csrf::build`]. Nothing is checked until `build`, and
/// `build` refuses anything that would leave requests unprotected.
pub struct Csrf<T> {
    strategy: T,
    exempt_fn: Option<ExemptFn>,
    exempt_paths: Vec<String>,
    field_name: String,
    header_name: String,
    body_limit: usize,
    random: Arc<dyn RandomSource>,
}

impl<T> Csrf<T> {
    fn with_strategy(strategy: T) -> Self {
        Self {
            strategy,
            exempt_fn: None,
            exempt_paths: Vec::new(),
            field_name: "csrf_token".into(),
            header_name: "X-CSRF-Token".into(),
            body_limit: DEFAULT_BODY_LIMIT,
            random: Arc::new(OsRandom),
        }
    }

    /// Exempts request paths matching a glob, where `*` doesn't cross `/`.
    pub fn exempt_path(mut self, pattern: impl Into<String>) -> Self {
        self.exempt_paths.push(pattern.into());

        self
    }

    /// Exempts requests for which `exempt_fn` returns `true`.
    pub fn exempt_fn<F>(mut self, exempt_fn: F) -> Self
    where
        F: Fn(&Parts) -> bool + Send + Sync + 'static,
    {
        self.exempt_fn = Some(Arc::new(exempt_fn));

        self
    }

    pub fn field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = field_name.into();

        self
    }

    pub fn header_name(mut self, header_name: impl Into<String>) -> Self {
        self.header_name = header_name.into();

        self
    }

    /// Caps how much of a form body is buffered while looking for the token.
    pub fn body_limit(mut self, body_limit: usize) -> Self {
        self.body_limit = body_limit;

        self
    }

    pub fn random(mut self, random: impl RandomSource + 'static) -> Self {
        self.random = Arc::new(random);

        self
    }
}

impl<T: Strategy> Csrf<T> {
    /// Checks the configuration and produces the layer.
    pub fn build(self) -> Result<CsrfLayer<T>, Error> {
        self.strategy.validate()?;

        if self.field_name.is_empty() {
            return Err(Error::MissingFieldName);
        }

        let header_name = HeaderName::try_from(self.header_name)?;
        let exempt = Exempt::new(&self.exempt_paths, self.exempt_fn)?;

        Ok(CsrfLayer {
            shared: Arc::new(Shared {
                vary: self.strategy.vary(),
                strategy: self.strategy,
                exempt,
                field_name: self.field_name.into(),
                header_name,
                body_limit: self.body_limit,
                random: self.random,
            }),
        })
    }
}

impl Csrf<Masked> {
    /// Double-submit cookie protection keyed by a 32 byte secret.
    pub fn masked(secret: [u8; TOKEN_LEN]) -> Self {
        Self::with_strategy(Masked::new(secret))
    }

    pub fn cookie_name(mut self, cookie_name: impl Into<String>) -> Self {
        self.strategy.cookie_name = cookie_name.into();

        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.strategy.domain = Some(domain.into());

        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.strategy.path = path.into();

        self
    }

    pub fn http_only(mut self, http_only: bool) -> Self {
        self.strategy.http_only = http_only;

        self
    }

    pub fn same_site(mut self, same_site: SameSite) -> Self {
        self.strategy.same_site = same_site;

        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.strategy.secure = secure;

        self
    }
}

impl Csrf<Signed> {
    /// Session-bound signed tokens. Needs [`Csrf::session`] and
    /// [`Csrf::expires`].
    pub fn signed(secret: impl Into<Vec<u8>>) -> Self {
        Self::with_strategy(Signed::new(secret.into()))
    }

    /// Signed tokens that aren't tied to a session and don't expire.
    /// [`Csrf::expires`] and [`Csrf::session`] make `build` fail.
    pub fn sessionless(secret: impl Into<Vec<u8>>) -> Self {
        Self::with_strategy(Signed::sessionless(secret.into()))
    }

    /// How long a token stays valid.
    pub fn expires(mut self, ttl: Duration) -> Self {
        match &mut self.strategy.binding {
            Binding::Session { expires, .. } => *expires = Some(ttl),
            Binding::Sessionless { stray } => *stray = Some("expires"),
        }

        self
    }

    /// Finds the session identifier of a request. Requests without one get
    /// no token and fail verification.
    pub fn session<F>(mut self, session_fn: F) -> Self
    where
        F: Fn(&Parts) -> Option<String> + Send + Sync + 'static,
    {
        match &mut self.strategy.binding {
            Binding::Session { lookup, .. } => *lookup = Some(Arc::new(session_fn) as SessionFn),
            Binding::Sessionless { stray } => *stray = Some("session"),
        }

        self
    }
}

pub(crate) struct Shared<T> {
    strategy: T,
    exempt: Exempt,
    field_name: Arc<str>,
    header_name: HeaderName,
    body_limit: usize,
    random: Arc<dyn RandomSource>,
    vary: HeaderValue,
}

/// Applies CSRF protection to a service. Built by [`Csrf::build`].
pub struct CsrfLayer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for CsrfLayer<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<S> Layer<S> for CsrfLayer<Masked> {
    type Service = CookieManager<CsrfService<S, Masked>>;

    fn layer(&self, inner: S) -> Self::Service {
        CookieManager::new(CsrfService {
            shared: self.shared.clone(),
            inner,
        })
    }
}

impl<S> Layer<S> for CsrfLayer<Signed> {
    type Service = CsrfService<S, Signed>;

    fn layer(&self, inner: S) -> Self::Service {
        CsrfService {
            shared: self.shared.clone(),
            inner,
        }
    }
}

pub struct CsrfService<S, T> {
    shared: Arc<Shared<T>>,
    inner: S,
}

impl<S: Clone, T> Clone for CsrfService<S, T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<S, T, Q, R> Service<Request<Q>> for CsrfService<S, T>
where
    S: Service<Request<Q>, Response = Response<R>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    T: Strategy,
    Q: Body + From<Bytes> + Send + 'static,
    Q::Data: Send,
    Q::Error: Into<BoxError>,
    R: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Q>) -> Self::Future {
        // the clone might not be ready, so keep it and use the one that is
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(protect(self.shared.clone(), inner, request))
    }
}

async fn protect<S, T, Q, R>(
    shared: Arc<Shared<T>>,
    mut inner: S,
    request: Request<Q>,
) -> Result<Response<R>, S::Error>
where
    S: Service<Request<Q>, Response = Response<R>>,
    T: Strategy,
    Q: Body + From<Bytes> + Send + 'static,
    Q::Data: Send,
    Q::Error: Into<BoxError>,
    R: Default,
{
    let (mut parts, mut body) = request.into_parts();

    let material = match shared.strategy.load(&parts, shared.random.as_ref()) {
        Ok(material) => material,
        Err(err) => return Error::make_layer_error(err),
    };

    if !shared.exempt.matches(&parts) {
        if origin::is_encrypted(&parts) {
            if let Err(rejection) = origin::verify(&parts) {
                return Error::make_layer_forbidden(rejection, shared.vary.clone());
            }
        }

        let extractor = Extractor {
            header_name: &shared.header_name,
            field_name: &shared.field_name,
            body_limit: shared.body_limit,
        };
        let (sent, buffered) = extractor.extract(&parts, body).await;
        body = buffered;

        if let Err(rejection) = shared.strategy.verify(&material, sent.as_deref()) {
            return Error::make_layer_forbidden(rejection, shared.vary.clone());
        }
    }

    let token = match shared.strategy.issue(material, shared.random.as_ref()) {
        Ok(token) => token,
        Err(err) => return Error::make_layer_error(err),
    };

    let header_value = match token.as_deref().map(HeaderValue::from_str).transpose() {
        Ok(value) => value,
        Err(err) => return Error::make_layer_error(err),
    };

    if let Some(value) = token {
        parts.extensions.insert(Token {
            value,
            field_name: shared.field_name.clone(),
        });
    }

    let mut response = inner.call(Request::from_parts(parts, body)).await?;

    let headers = response.headers_mut();
    headers.append(VARY, shared.vary.clone());
    if let Some(value) = header_value {
        headers.insert(shared.header_name.clone(), value);
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: [u8; TOKEN_LEN] = [42u8; TOKEN_LEN];

    #[test]
    fn builds_with_defaults() {
        assert!(Csrf::masked(SECRET).build().is_ok());
        assert!(Csrf::sessionless("secret").build().is_ok());
        assert!(Csrf::signed("secret")
            .expires(Duration::from_secs(60))
            .session(|_| Some("id".into()))
            .build()
            .is_ok());
    }

    #[test]
    fn host_cookie_must_be_secure() {
        assert!(matches!(
            Csrf::masked(SECRET)
                .cookie_name("__Host-session")
                .secure(false)
                .build(),
            Err(Error::HostPrefix(_))
        ));
    }

    #[test]
    fn rejects_empty_names() {
        assert!(matches!(
            Csrf::masked(SECRET).field_name("").build(),
            Err(Error::MissingFieldName)
        ));
        assert!(matches!(
            Csrf::masked(SECRET).header_name("not a header").build(),
            Err(Error::InvalidHeaderName(_))
        ));
    }

    #[test]
    fn signed_needs_session_and_expiry() {
        assert!(matches!(
            Csrf::signed("secret").session(|_| None).build(),
            Err(Error::MissingExpiry)
        ));
        assert!(matches!(
            Csrf::signed("secret")
                .expires(Duration::from_secs(60))
                .build(),
            Err(Error::MissingSession)
        ));
        assert!(matches!(
            Csrf::signed("")
                .expires(Duration::from_secs(60))
                .session(|_| None)
                .build(),
            Err(Error::MissingSecret)
        ));
    }

    #[test]
    fn signed_expiry_must_be_positive() {
        assert!(matches!(
            Csrf::signed("secret")
                .expires(Duration::ZERO)
                .session(|_| Some("id".into()))
                .build(),
            Err(Error::MissingExpiry)
        ));
    }

    #[test]
    fn sessionless_refuses_session_options() {
        assert!(matches!(
            Csrf::sessionless("secret")
                .expires(Duration::from_secs(60))
                .build(),
            Err(Error::SessionlessOption("expires"))
        ));
        assert!(matches!(
            Csrf::sessionless("secret")
                .session(|_| Some("id".into()))
                .build(),
            Err(Error::SessionlessOption("session"))
        ));
    }

    #[test]
    fn rejects_bad_exempt_glob() {
        assert!(matches!(
            Csrf::masked(SECRET).exempt_path("/hooks/[").build(),
            Err(Error::InvalidExemptPath(_))
        ));
    }
}
