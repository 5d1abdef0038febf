use std::{fmt, sync::Arc};

use http::Extensions;

/// The token issued for the current request.
///
/// The layer stores it in the request extensions before calling the inner
/// service, so handlers can embed it in whatever they render. The same value
/// is sent back in the `X-CSRF-Token` response header.
#[derive(Clone, Debug)]
pub struct Token {
    pub(crate) value: String,
    pub(crate) field_name: Arc<str>,
}

impl Token {
    /// Gets the token the layer attached to a request, if any.
    pub fn from_extensions(extensions: &Extensions) -> Option<&Self> {
        extensions.get::<Self>()
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// The form field the layer reads the token from.
    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    /// Renders a hidden form input carrying the token.
    pub fn hidden_field(&self) -> String {
        format!(
            r#"<input type="hidden" name="{}" value="{}">"#,
            escape(&self.field_name),
            escape(&self.value)
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Lets axum handlers take the token as an argument. Missing the layer is a
/// server bug, so it answers 500.
#[cfg(feature = "axum")]
#[async_trait::async_trait]
impl<S: Send + Sync> axum_core::extract::FromRequestParts<S> for Token {
    type Rejection = (http::StatusCode, String);

    async fn from_request_parts(
        parts: &mut http::request::Parts,
        _: &S,
    ) -> Result<Self, Self::Rejection> {
        match Self::from_extensions(&parts.extensions) {
            Some(token) => Ok(token.clone()),
            None => Err((
                http::StatusCode::INTERNAL_SERVER_ERROR,
                crate::Error::ExtensionNotFound("Token".into()).to_string(),
            )),
        }
    }
}

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }

    escaped
}
