use std::net::SocketAddr;

use axum::{
    routing::{get, post},
    Router,
};
use http::StatusCode;
use maud::{html, Markup, PreEscaped};
use tower_seawall::{Csrf, Token};

#[tokio::main]
async fn main() {
    let csrf = Csrf::masked(*b"change me to 32 random bytes!!!!")
        .field_name("csrf")
        .secure(false)
        .exempt_path("/hooks/*")
        .build()
        .expect("invalid csrf configuration");

    let app = Router::new()
        .route("/", get(root))
        .route("/submit", post(submit))
        .route("/hooks/:name", post(hook))
        .layer(csrf);

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();

    axum::serve(listener, app.into_make_service())
        .await
        .unwrap();
}

async fn root(token: Token) -> Markup {
    html! {
        link rel="stylesheet" href="https://cdn.jsdelivr.net/npm/@picocss/pico@2/css/pico.min.css";
        script src="https://unpkg.com/htmx.org@2.0.2" {}

        main class="container" {
            p { mark { "Open the Network tab in your dev console." } }
            p { small { kbd { (token) } } }

            div class="grid" {
                div {
                    form hx-post="/submit" hx-swap="none" "hx-on::config-request"={"event.detail.headers['X-CSRF-Token'] = \"" (token) "\""} {
                        label for="hotdogs" { "How do you like your hotdogs?" }

                        select name="hotdogs" value="ketchup" {
                            option value="ketchup" { "Ketchup" }
                            option value="ketchup-again" { "Ketchup" }
                            option value="more-ketchup" { "More ketchup" }
                        }

                        button type="submit" { "Submit with header" }
                    }
                }

                div {
                    form method="post" action="/submit" {
                        (PreEscaped(token.hidden_field()))

                        label for="mustard" { "And mustard?" }

                        select name="mustard" value="never" {
                            option value="never" { "Never" }
                        }

                        button type="submit" { "Submit with form field" }
                    }
                }

                div {
                    form hx-post="/submit" {
                        label for="hotdogs" { "How do you like your hotdogs?" }

                        select name="hotdogs" value="ketchup" {
                            option value="ketchup" { "Ketchup" }
                            option value="still-ketchup" { "Still ketchup" }
                            option value="always-ketchup" { "It'll always be ketchup!" }
                        }

                        button type="submit" { "Submit without token" }
                    }
                }
            }
        }
    }
}

async fn submit() -> (StatusCode, &'static str) {
    (StatusCode::OK, "Success!")
}

async fn hook() -> (StatusCode, &'static str) {
    (StatusCode::OK, "Hooked, no token needed.")
}
