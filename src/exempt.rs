use std::{fmt, sync::Arc};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use http::{request::Parts, Method};

use crate::Error;

pub(crate) type ExemptFn = Arc<dyn Fn(&Parts) -> bool + Send + Sync>;

/// Decides which requests skip verification.
///
/// Safe methods are always exempt. Beyond those, a request is exempt if its
/// path matches one of the globs or the predicate says so. Exempt endpoints
/// must not have side effects.
#[derive(Clone)]
pub(crate) struct Exempt {
    paths: GlobSet,
    predicate: Option<ExemptFn>,
}

impl Exempt {
    pub(crate) fn new(patterns: &[String], predicate: Option<ExemptFn>) -> Result<Self, Error> {
        let mut paths = GlobSetBuilder::new();

        for pattern in patterns {
            // `*` stops at `/`, like a shell glob over a path
            paths.add(GlobBuilder::new(pattern).literal_separator(true).build()?);
        }

        Ok(Self {
            paths: paths.build()?,
            predicate,
        })
    }

    pub(crate) fn matches(&self, parts: &Parts) -> bool {
        is_safe(&parts.method)
            || self.paths.is_match(parts.uri.path())
            || self.predicate.as_ref().is_some_and(|f| f(parts))
    }
}

impl fmt::Debug for Exempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exempt")
            .field("paths", &self.paths.len())
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Reports whether `method` is read-only: GET, HEAD, OPTIONS or TRACE.
pub fn is_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}
