use std::{sync::Arc, time::Duration};

use base64::prelude::*;
use http::{request::Parts, HeaderValue};

use crate::{random::RandomSource, sign, strategy::Strategy, Error, Rejection};

pub(crate) type SessionFn = Arc<dyn Fn(&Parts) -> Option<String> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Binding {
    Session {
        lookup: Option<SessionFn>,
        expires: Option<Duration>,
    },
    /// Remembers a session-only option set on the builder so `build` can
    /// refuse it.
    Sessionless { stray: Option<&'static str> },
}

/// HMAC-signed tokens.
///
/// Session-bound tokens embed their expiry and are signed over it and the
/// session identifier, so they only verify for the session that received
/// them. Sessionless tokens are signed random bytes. Either way the only
/// server-side state is the secret.
#[derive(Clone)]
pub struct Signed {
    pub(crate) secret: Vec<u8>,
    pub(crate) binding: Binding,
}

impl Signed {
    pub(crate) fn new(secret: Vec<u8>) -> Self {
        Self {
            secret,
            binding: Binding::Session {
                lookup: None,
                expires: None,
            },
        }
    }

    pub(crate) fn sessionless(secret: Vec<u8>) -> Self {
        Self {
            secret,
            binding: Binding::Sessionless { stray: None },
        }
    }
}

/// What a request's session amounts to.
pub enum Session {
    Bound(String),
    Anonymous,
    Missing,
}

impl Strategy for Signed {
    type Material = Session;

    fn validate(&self) -> Result<(), Error> {
        if self.secret.is_empty() {
            return Err(Error::MissingSecret);
        }

        match &self.binding {
            Binding::Session { expires, .. } if expires.map_or(true, |d| d.is_zero()) => {
                Err(Error::MissingExpiry)
            }
            Binding::Session { lookup: None, .. } => Err(Error::MissingSession),
            Binding::Sessionless { stray: Some(option) } => Err(Error::SessionlessOption(*option)),
            _ => Ok(()),
        }
    }

    fn load(&self, parts: &Parts, _: &dyn RandomSource) -> Result<Session, Error> {
        Ok(match &self.binding {
            Binding::Session {
                lookup: Some(lookup),
                ..
            } => lookup(parts).map_or(Session::Missing, Session::Bound),
            Binding::Session { lookup: None, .. } => Session::Missing,
            Binding::Sessionless { .. } => Session::Anonymous,
        })
    }

    fn verify(&self, session: &Session, sent: Option<&str>) -> Result<(), Rejection> {
        if matches!(session, Session::Missing) {
            return Err(Rejection::MissingSession);
        }

        let sent = sent.ok_or(Rejection::MissingToken)?;
        let token = BASE64_STANDARD
            .decode(sent)
            .map_err(|_| Rejection::InvalidToken)?;

        let valid = match session {
            Session::Bound(id) => sign::verify_token(&self.secret, &token, id),
            Session::Anonymous => sign::verify_sessionless_token(&self.secret, &token),
            Session::Missing => false,
        };

        if valid {
            Ok(())
        } else {
            Err(Rejection::InvalidToken)
        }
    }

    fn issue(
        &self,
        session: Session,
        random: &dyn RandomSource,
    ) -> Result<Option<String>, Error> {
        let token = match (session, &self.binding) {
            (
                Session::Bound(id),
                Binding::Session {
                    expires: Some(ttl), ..
                },
            ) => sign::create_token(&self.secret, &id, *ttl)?,
            (Session::Anonymous, _) => sign::create_sessionless_token(&self.secret, random)?,
            _ => return Ok(None),
        };

        Ok(Some(BASE64_STANDARD.encode(token)))
    }

    fn vary(&self) -> HeaderValue {
        HeaderValue::from_static("Origin")
    }
}
