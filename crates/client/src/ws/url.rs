//! Where a consumer's URL comes from, and query string construction.

use std::rc::Rc;

use futures_util::future::LocalBoxFuture;
use sockshare_shared::WsError;

/// Produces the URL to connect to.
#[derive(Clone)]
pub enum UrlSource {
    Static(String),
    /// Resolved on the scheduler before every connect. A failed resolution
    /// is retried when `retry_on_error` is set.
    Deferred(Rc<dyn Fn() -> LocalBoxFuture<'static, Result<String, WsError>>>),
}

impl UrlSource {
    pub fn deferred<F, Fut>(resolve: F) -> Self
    where
        F: Fn() -> Fut + 'static,
        Fut: std::future::Future<Output = Result<String, WsError>> + 'static,
    {
        UrlSource::Deferred(Rc::new(move || Box::pin(resolve())))
    }

    /// Whether switching from `self` to `other` would connect to the same
    /// place. Deferred sources cannot be compared and count as equal.
    pub fn same_target(&self, other: &UrlSource) -> bool {
        match (self, other) {
            (UrlSource::Static(a), UrlSource::Static(b)) => a == b,
            (UrlSource::Deferred(_), UrlSource::Deferred(_)) => true,
            _ => false,
        }
    }
}

impl std::fmt::Debug for UrlSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UrlSource::Static(url) => f.debug_tuple("Static").field(url).finish(),
            UrlSource::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

impl From<&str> for UrlSource {
    fn from(url: &str) -> Self {
        UrlSource::Static(url.to_string())
    }
}

impl From<String> for UrlSource {
    fn from(url: String) -> Self {
        UrlSource::Static(url)
    }
}

/// Append `params` to `url` in order, keeping any existing query.
pub fn append_query_params(url: &str, params: &[(String, String)]) -> String {
    if params.is_empty() {
        return url.to_string();
    }

    if let Ok(mut parsed) = ::url::Url::parse(url) {
        parsed
            .query_pairs_mut()
            .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        return parsed.into();
    }

    // Relative or otherwise unparseable: build the query by hand.
    let query = params
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = if !url.contains('?') {
        "?"
    } else if url.ends_with('?') || url.ends_with('&') {
        ""
    } else {
        "&"
    };
    format!("{url}{separator}{query}")
}
