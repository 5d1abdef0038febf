use std::{
    io,
    str::FromStr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Request, Response, StatusCode},
    routing::{get, post},
    Extension, Router,
};
use axum_test::{TestServer, TestServerConfig};
use tower::ServiceExt;
use tower_seawall::{Csrf, RandomSource, Token};

const SECRET: [u8; 32] = *b"integration-test-secret-32-bytes";

async fn echo_token(Extension(token): Extension<Token>) -> String {
    token.to_string()
}

fn masked_app(hits: Arc<AtomicUsize>) -> Result<Router> {
    let csrf = Csrf::masked(SECRET)
        .cookie_name("csrf")
        .field_name("csrf")
        .secure(false)
        .exempt_path("/hooks/*")
        .build()?;

    let counter = move || {
        let hits = hits.clone();
        async move {
            hits.fetch_add(1, Ordering::SeqCst);
        }
    };

    Ok(Router::new()
        .route("/", get(echo_token).post(counter.clone()))
        .route("/hooks/:name", post(counter))
        .layer(csrf))
}

fn header_str<'a>(response: &'a Response<Body>, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|h| h.to_str().ok())
}

/// Fetches a cookie and token pair the way a browser would on page load.
async fn handshake(app: &Router) -> Result<(String, String)> {
    let response = app
        .clone()
        .oneshot(Request::get("https://example.com/").body(Body::empty())?)
        .await?;

    let cookie = header_str(&response, "set-cookie")
        .and_then(|c| c.split(';').next())
        .expect("no cookie set")
        .to_owned();
    let token = header_str(&response, "x-csrf-token")
        .expect("no token header")
        .to_owned();

    Ok((cookie, token))
}

#[tokio::test]
async fn get_issues_cookie_and_token() -> Result<()> {
    let app = masked_app(Arc::default())?;

    let config = TestServerConfig::builder().save_cookies().build();
    let server = TestServer::new_with_config(app, config)?;

    let response = server.get("/").await;
    response.assert_status_ok();

    let cookie = response.cookie("csrf");
    assert_eq!(cookie.http_only(), Some(true));
    assert_eq!(cookie.path(), Some("/"));

    let token = response.header("x-csrf-token");
    assert_eq!(token.to_str()?, response.text());
    assert_eq!(response.header("vary"), "Cookie");

    Ok(())
}

#[tokio::test]
async fn cookie_is_kept_but_token_changes() -> Result<()> {
    let app = masked_app(Arc::default())?;

    let config = TestServerConfig::builder().save_cookies().build();
    let server = TestServer::new_with_config(app, config)?;

    let first = server.get("/").await;
    let second = server.get("/").await;

    assert!(first.headers().contains_key("set-cookie"));
    assert!(!second.headers().contains_key("set-cookie"));
    assert_ne!(first.text(), second.text());

    Ok(())
}

#[tokio::test]
async fn guards_mutation() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = masked_app(hits.clone())?;

    let config = TestServerConfig::builder().save_cookies().build();
    let mut server = TestServer::new_with_config(app, config)?;

    let token = server.get("/").await.text();

    // No token sent.

    server.post("/").await.assert_status_forbidden();
    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // Token sent in the form.

    server
        .post("/")
        .form(&[("csrf", token.as_str())])
        .await
        .assert_status_ok();
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // Token sent in the header.

    server.add_header(
        HeaderName::from_str("X-CSRF-Token")?,
        HeaderValue::from_str(&token)?,
    );

    server.post("/").await.assert_status_ok();
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    // Incorrect token sent.

    server.clear_headers();

    server.add_header(
        HeaderName::from_str("X-CSRF-Token")?,
        HeaderValue::from_str("oh howdy doody")?,
    );

    server.post("/").await.assert_status_forbidden();
    assert_eq!(hits.load(Ordering::SeqCst), 2);

    Ok(())
}

#[tokio::test]
async fn accepts_multipart_field() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = masked_app(hits.clone())?;
    let (cookie, token) = handshake(&app).await?;

    let body = format!(
        "--XYZ\r\n\
         Content-Disposition: form-data; name=\"csrf\"\r\n\r\n\
         {token}\r\n\
         --XYZ--\r\n"
    );

    let response = app
        .oneshot(
            Request::post("https://example.com/")
                .header(header::HOST, "example.com")
                .header(header::ORIGIN, "https://example.com")
                .header(header::COOKIE, cookie)
                .header(header::CONTENT_TYPE, "multipart/form-data; boundary=XYZ")
                .body(Body::from(body))?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn rejects_foreign_origin_over_https() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = masked_app(hits.clone())?;
    let (cookie, token) = handshake(&app).await?;

    for (name, value) in [
        (header::ORIGIN, "http://evil.com"),
        (header::REFERER, "http://evil.com/attack"),
    ] {
        let response = app
            .clone()
            .oneshot(
                Request::post("https://example.com/")
                    .header(header::HOST, "example.com")
                    .header(name, value)
                    .header(header::COOKIE, &cookie)
                    .header("x-csrf-token", &token)
                    .body(Body::empty())?,
            )
            .await?;

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(header_str(&response, "vary"), Some("Cookie"));
        assert!(header_str(&response, "x-csrf-token").is_none());
    }

    assert_eq!(hits.load(Ordering::SeqCst), 0);

    // the same token from the right origin goes through
    let response = app
        .oneshot(
            Request::post("https://example.com/")
                .header(header::HOST, "example.com")
                .header(header::ORIGIN, "https://example.com")
                .header(header::COOKIE, &cookie)
                .header("x-csrf-token", &token)
                .body(Body::empty())?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn exempt_paths_skip_verification() -> Result<()> {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = masked_app(hits.clone())?;

    let response = app
        .oneshot(Request::post("/hooks/github").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(header_str(&response, "x-csrf-token").is_some());
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    Ok(())
}

#[tokio::test]
async fn exempt_fn_skips_verification() -> Result<()> {
    let csrf = Csrf::masked(SECRET)
        .secure(false)
        .exempt_fn(|parts| parts.headers.contains_key("x-api-key"))
        .build()?;

    let app = Router::new().route("/", post(|| async {})).layer(csrf);

    let response = app
        .clone()
        .oneshot(
            Request::post("/")
                .header("x-api-key", "k")
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::post("/").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    Ok(())
}

fn signed_app(ttl: Duration) -> Result<Router> {
    let csrf = Csrf::signed("signing-secret")
        .expires(ttl)
        .field_name("csrf")
        .session(|parts| {
            parts
                .headers
                .get("x-session")
                .and_then(|h| h.to_str().ok())
                .map(str::to_owned)
        })
        .build()?;

    Ok(Router::new()
        .route("/", get(|| async {}).post(|| async {}))
        .layer(csrf))
}

fn signed_request(
    method: &str,
    session: Option<&str>,
    token: Option<&str>,
) -> Result<Request<Body>> {
    let mut builder = Request::builder().method(method).uri("/");
    if let Some(session) = session {
        builder = builder.header("x-session", session);
    }
    if let Some(token) = token {
        builder = builder.header("x-csrf-token", token);
    }

    Ok(builder.body(Body::empty())?)
}

#[tokio::test]
async fn signed_tokens_bind_to_session() -> Result<()> {
    let app = signed_app(Duration::from_secs(3600))?;

    let response = app
        .clone()
        .oneshot(signed_request("GET", Some("A"), None)?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "vary"), Some("Origin"));
    assert!(header_str(&response, "set-cookie").is_none());
    let token = header_str(&response, "x-csrf-token")
        .expect("no token header")
        .to_owned();

    let response = app
        .clone()
        .oneshot(signed_request("POST", Some("A"), Some(&token))?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(signed_request("POST", Some("B"), Some(&token))?)
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .oneshot(signed_request("POST", None, Some(&token))?)
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn signed_requires_session_for_token() -> Result<()> {
    let app = signed_app(Duration::from_secs(3600))?;

    let response = app.oneshot(signed_request("GET", None, None)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(header_str(&response, "x-csrf-token").is_none());

    Ok(())
}

#[tokio::test]
async fn signed_tokens_expire() -> Result<()> {
    let app = signed_app(Duration::from_millis(50))?;

    let response = app
        .clone()
        .oneshot(signed_request("GET", Some("A"), None)?)
        .await?;
    let token = header_str(&response, "x-csrf-token")
        .expect("no token header")
        .to_owned();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let response = app
        .oneshot(signed_request("POST", Some("A"), Some(&token))?)
        .await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    Ok(())
}

#[test]
fn host_prefix_requires_secure() {
    assert!(Csrf::masked(SECRET)
        .cookie_name("__Host-session")
        .secure(false)
        .build()
        .is_err());
}

#[derive(Clone, Copy)]
struct NoEntropy;

impl RandomSource for NoEntropy {
    fn fill(&self, _: &mut [u8]) -> Result<(), rand::Error> {
        Err(rand::Error::new(io::Error::other("no entropy")))
    }
}

#[tokio::test]
async fn failing_random_source_is_server_error() -> Result<()> {
    let masked = Router::new()
        .route("/", get(echo_token))
        .layer(Csrf::masked(SECRET).secure(false).random(NoEntropy).build()?);
    let sessionless = Router::new()
        .route("/", get(echo_token))
        .layer(Csrf::sessionless("signing-secret").random(NoEntropy).build()?);

    for app in [masked, sessionless] {
        let response = app
            .oneshot(Request::get("/").body(Body::empty())?)
            .await?;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(header_str(&response, "x-csrf-token").is_none());
        assert!(header_str(&response, "set-cookie").is_none());
    }

    Ok(())
}

#[tokio::test]
async fn sessionless_tokens_guard_mutation() -> Result<()> {
    let csrf = Csrf::sessionless("signing-secret")
        .field_name("csrf")
        .build()?;
    let app = Router::new()
        .route("/", get(echo_token).post(|| async {}))
        .layer(csrf);

    let server = TestServer::new(app)?;

    let response = server.get("/").await;
    response.assert_status_ok();
    assert_eq!(response.header("vary"), "Origin");
    let token = response.text();

    server.post("/").await.assert_status_forbidden();

    server
        .post("/")
        .form(&[("csrf", token.as_str())])
        .await
        .assert_status_ok();

    server
        .post("/")
        .add_header(
            HeaderName::from_str("X-CSRF-Token")?,
            HeaderValue::from_str(&token)?,
        )
        .await
        .assert_status_ok();

    Ok(())
}

#[test]
fn sessionless_rejects_session_options() {
    assert!(Csrf::sessionless("signing-secret")
        .expires(Duration::from_secs(60))
        .build()
        .is_err());
}
