use std::convert::Infallible;

use bytes::Bytes;
use futures_util::stream;
use http::{header::CONTENT_TYPE, request::Parts, HeaderName};
use http_body::Body;
use http_body_util::{BodyExt, Limited};

pub(crate) type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Where the client put its token.
pub(crate) struct Extractor<'a> {
    pub(crate) header_name: &'a HeaderName,
    pub(crate) field_name: &'a str,
    pub(crate) body_limit: usize,
}

impl Extractor<'_> {
    /// Looks for the token in the header, then in an urlencoded form, then in
    /// a multipart form. The body is returned as it was read so the handler
    /// still sees it.
    pub(crate) async fn extract<B>(&self, parts: &Parts, body: B) -> (Option<String>, B)
    where
        B: Body + From<Bytes> + Send + 'static,
        B::Data: Send,
        B::Error: Into<BoxError>,
    {
        if let Some(token) = parts
            .headers
            .get(self.header_name)
            .and_then(|h| h.to_str().ok())
            .filter(|t| !t.is_empty())
        {
            return (Some(token.to_owned()), body);
        }

        let Some(kind) = FormKind::of(parts) else {
            return (None, body);
        };

        let bytes = match Limited::new(body, self.body_limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(err) => {
                tracing::debug!(err = %err, "couldn't buffer form body");
                return (None, B::from(Bytes::new()));
            }
        };

        let token = match kind {
            FormKind::UrlEncoded => self.in_urlencoded(&bytes),
            FormKind::Multipart(boundary) => self.in_multipart(bytes.clone(), boundary).await,
        };

        (token, B::from(bytes))
    }

    fn in_urlencoded(&self, bytes: &[u8]) -> Option<String> {
        serde_urlencoded::from_bytes::<Vec<(String, String)>>(bytes)
            .ok()?
            .into_iter()
            .find(|(name, value)| name == self.field_name && !value.is_empty())
            .map(|(_, value)| value)
    }

    async fn in_multipart(&self, bytes: Bytes, boundary: String) -> Option<String> {
        let body = stream::once(async move { Ok::<_, Infallible>(bytes) });
        let mut multipart = multer::Multipart::new(body, boundary);

        while let Ok(Some(field)) = multipart.next_field().await {
            if field.name() == Some(self.field_name) {
                return field.text().await.ok().filter(|t| !t.is_empty());
            }
        }

        None
    }
}

enum FormKind {
    UrlEncoded,
    Multipart(String),
}

impl FormKind {
    fn of(parts: &Parts) -> Option<Self> {
        let content_type = parts.headers.get(CONTENT_TYPE)?.to_str().ok()?;
        let essence = content_type.split(';').next()?.trim();

        if essence.eq_ignore_ascii_case("application/x-www-form-urlencoded") {
            Some(Self::UrlEncoded)
        } else if essence.eq_ignore_ascii_case("multipart/form-data") {
            multer::parse_boundary(content_type).ok().map(Self::Multipart)
        } else {
            None
        }
    }
}
