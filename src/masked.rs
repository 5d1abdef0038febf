use http::{request::Parts, HeaderValue};
use tower_cookies::{
    cookie::{time::Duration, SameSite},
    Cookie, Cookies,
};

use crate::{
    mask::{self, TOKEN_LEN},
    random::RandomSource,
    strategy::Strategy,
    Error, Rejection,
};

const HOST_PREFIX: &str = "__Host-";
const SECURE_PREFIX: &str = "__Secure-";

/// Double-submit cookie with masked tokens.
///
/// The cookie holds a raw random token for a year and is only rewritten when
/// it's missing or unreadable. Each response carries that token masked with
/// a fresh nonce.
#[derive(Clone)]
pub struct Masked {
    pub(crate) secret: [u8; TOKEN_LEN],
    pub(crate) cookie_name: String,
    pub(crate) domain: Option<String>,
    pub(crate) path: String,
    pub(crate) http_only: bool,
    pub(crate) same_site: SameSite,
    pub(crate) secure: bool,
}

impl Masked {
    pub(crate) fn new(secret: [u8; TOKEN_LEN]) -> Self {
        Self {
            secret,
            cookie_name: "csrf".into(),
            domain: None,
            path: "/".into(),
            http_only: true,
            same_site: SameSite::Strict,
            secure: true,
        }
    }

    fn cookie(&self, value: String) -> Cookie<'static> {
        let mut cookie = Cookie::build((self.cookie_name.clone(), value))
            .path(self.path.clone())
            .max_age(Duration::days(365))
            .http_only(self.http_only)
            .same_site(self.same_site)
            .secure(self.secure)
            .build();

        if let Some(domain) = &self.domain {
            cookie.set_domain(domain.clone());
        }

        cookie
    }
}

/// The raw token a request's cookie holds.
pub struct CookieToken {
    raw: [u8; TOKEN_LEN],
    fresh: bool,
    cookies: Cookies,
}

impl Strategy for Masked {
    type Material = CookieToken;

    fn validate(&self) -> Result<(), Error> {
        if self.secret == [0u8; TOKEN_LEN] {
            return Err(Error::MissingSecret);
        }

        if self.cookie_name.is_empty() {
            return Err(Error::MissingCookieName);
        }

        if has_prefix(&self.cookie_name, HOST_PREFIX)
            && (!self.secure || self.domain.is_some() || self.path != "/")
        {
            return Err(Error::HostPrefix(self.cookie_name.clone()));
        }

        if has_prefix(&self.cookie_name, SECURE_PREFIX) && !self.secure {
            return Err(Error::SecurePrefix(self.cookie_name.clone()));
        }

        Ok(())
    }

    fn load(&self, parts: &Parts, random: &dyn RandomSource) -> Result<CookieToken, Error> {
        let cookies = parts
            .extensions
            .get::<Cookies>()
            .cloned()
            .ok_or(Error::ExtensionNotFound("Cookies".into()))?;

        let existing = cookies
            .get(&self.cookie_name)
            .and_then(|c| mask::decode::<TOKEN_LEN>(c.value()));

        match existing {
            Some(raw) => Ok(CookieToken {
                raw,
                fresh: false,
                cookies,
            }),
            None => {
                tracing::trace!(cookie = %self.cookie_name, "issuing new csrf cookie");

                Ok(CookieToken {
                    raw: mask::generate(random)?,
                    fresh: true,
                    cookies,
                })
            }
        }
    }

    fn verify(&self, material: &CookieToken, sent: Option<&str>) -> Result<(), Rejection> {
        let sent = sent.ok_or(Rejection::MissingToken)?;

        if mask::verify_raw(&self.secret, &material.raw, sent) {
            Ok(())
        } else {
            Err(Rejection::InvalidToken)
        }
    }

    fn issue(
        &self,
        material: CookieToken,
        random: &dyn RandomSource,
    ) -> Result<Option<String>, Error> {
        let masked = mask::masked(&self.secret, &material.raw, random)?;

        // rewriting an intact cookie would keep pushing its max-age out
        if material.fresh {
            material
                .cookies
                .add(self.cookie(mask::encode(&material.raw)));
        }

        Ok(Some(masked))
    }

    fn vary(&self) -> HeaderValue {
        HeaderValue::from_static("Cookie")
    }
}

// browsers match cookie prefixes case-insensitively
fn has_prefix(name: &str, prefix: &str) -> bool {
    name.get(..prefix.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(prefix))
}
