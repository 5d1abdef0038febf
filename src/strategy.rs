use http::{request::Parts, HeaderValue};

use crate::{random::RandomSource, Error, Rejection};

/// One way of binding tokens to clients.
///
/// [`Masked`](crate::Masked) keeps the token in a cookie,
/// [`Signed`](crate::Signed) derives it from a session and a secret. Both run
/// behind the same [`CsrfService`](crate::CsrfService).
pub trait Strategy: Send + Sync + 'static {
    /// Whatever a request carries that tokens are checked against.
    type Material: Send + 'static;

    /// Checks the configuration before any request is served.
    fn validate(&self) -> Result<(), Error>;

    /// Pulls the material out of an incoming request.
    fn load(&self, parts: &Parts, random: &dyn RandomSource) -> Result<Self::Material, Error>;

    /// Checks the token a non-exempt request sent, if it sent one.
    fn verify(&self, material: &Self::Material, sent: Option<&str>) -> Result<(), Rejection>;

    /// Produces the token to hand to the client, if one can be issued.
    fn issue(
        &self,
        material: Self::Material,
        random: &dyn RandomSource,
    ) -> Result<Option<String>, Error>;

    /// The request headers the response depends on.
    fn vary(&self) -> HeaderValue;
}
