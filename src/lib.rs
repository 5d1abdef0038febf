//! ## 🌊 Overview
//!
//! This crate protects [`tower`][crate-tower] services against Cross-Site Request Forgery.
//! It ships two strategies behind the same layer:
//!
//! - [**Masked**][Masked] uses the [Double Submit Cookie Pattern][owasp-double-submit].
//!   No server-side session is needed.
//! - [**Signed**][Signed] uses the [HMAC Based Token Pattern][owasp-hmac]. Tokens are bound to
//!   a session you identify, and they expire.
//!
//! ### How it works
//!
//! For every request:
//!
//! - **Exemption**: `GET`, `HEAD`, `OPTIONS` and `TRACE` requests, paths matching an exempt glob,
//!   and requests your exempt function accepts skip straight to token issuance. Exempt endpoints
//!   must not have side effects.
//! - **Origin check**: over HTTPS, the `Origin` (or `Referer`) header must match the requested
//!   host. This stops a man-in-the-middle who captured a token over plain HTTP from replaying it.
//! - **Verification**: the token is read from the `X-CSRF-Token` header, then from the configured
//!   field of an urlencoded or multipart form, and verified in constant time.
//! - **Issuance**: a fresh token is put in the request extensions as a [`Token`] and in the
//!   `X-CSRF-Token` response header.
//!
//! Any failed check answers `403 Forbidden` with an empty body. The inner service never runs.
//!
//! With the `axum` feature, [`Token`] is also an extractor.
//!
//! ### Masked tokens
//!
//! - A random **raw token** lives in a cookie for a year. It is only rewritten when it's missing
//!   or unreadable.
//! - Every response carries the raw token masked with a fresh one-time pad and the
//!   **secret key**, so the value on the page never repeats. This defeats [BREACH][breach].
//!
//! ### Signed tokens
//!
//! - A token is an **expiry** followed by an HMAC-SHA256 **signature** over the expiry and the
//!   **session identifier**, using the **secret key** (See:
//!   [OWASP's Cryptographic Storage Cheat Sheet][owasp-cryptographic-storage]).
//! - A request without a session gets no token and fails verification.
//!
//! ### Cookies
//!
//! By default the masked strategy's cookie is `HTTPOnly`, `SameSite: Strict` and `Secure`.
//! Names starting with `__Host-` or `__Secure-` are checked against the rules browsers enforce
//! for those prefixes.
//!
//! ## 🏗️ Usage
//!
//! ### With [`axum`][crate-axum]
//!
//! ```rust, no_run
//! use std::net::SocketAddr;
//!
//! use axum::{routing::{get, post}, Extension, Router};
//! use tower_seawall::{Csrf, Token};
//!
//! #[tokio::main]
//! async fn main() {
//!     let csrf = Csrf::masked(*b"an example key of thirty-two b!!")
//!         .field_name("csrf")
//!         .exempt_path("/hooks/*")
//!         .build()
//!         .expect("invalid csrf configuration");
//!
//!     let app = Router::new()
//!         .route("/", get(form))
//!         .route("/submit", post(|| async { "Success!" }))
//!         .layer(csrf);
//!
//!     let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
//!     let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
//!
//!     axum::serve(listener, app.into_make_service())
//!         .await
//!         .unwrap();
//! }
//!
//! async fn form(Extension(token): Extension<Token>) -> String {
//!     format!(r#"<form method="post" action="/submit">{}</form>"#, token.hidden_field())
//! }
//! ```
//!
//! [breach]: http://breachattack.com/
//! [crate-axum]: https://github.com/tokio-rs/axum
//! [crate-tower]: https://github.com/tower-rs/tower
//! [owasp-cryptographic-storage]: https://cheatsheetseries.owasp.org/cheatsheets/Cryptographic_Storage_Cheat_Sheet.html
//! [owasp-double-submit]: https://cheatsheetseries.owasp.org/cheatsheets/Cross-Site_Request_Forgery_Prevention_Cheat_Sheet.html#alternative-using-a-double-submit-cookie-pattern
//! [owasp-hmac]: https://cheatsheetseries.owasp.org/cheatsheets/Cross-Site_Request_Forgery_Prevention_Cheat_Sheet.html#signed-double-submit-cookie-recommended

use hmac::Hmac;
use sha2::Sha256;

pub(crate) type HmacSha256 = Hmac<Sha256>;

pub use csrf::{Csrf, CsrfLayer, CsrfService};
pub use error::{Error, Rejection};
pub use exempt::is_safe;
pub use masked::Masked;
pub use random::{OsRandom, RandomSource};
pub use signed::Signed;
pub use strategy::Strategy;
pub use token::Token;

pub mod mask;
pub mod sign;

mod csrf;
mod error;
mod exempt;
mod form;
mod masked;
mod origin;
mod random;
mod signed;
mod strategy;
mod token;
