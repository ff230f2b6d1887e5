use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes prepared requests. Upstream clients are generic over this so a
/// key-carrying wrapper can sit in front of the transport.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}

/// Appends an API key to every request's query string.
///
/// The Warsaw open-data API takes its key as `apikey=<key>`.
pub struct UrlParam<C> {
    pub inner: C,
    pub param_name: String,
    pub key: String,
}

impl<C> UrlParam<C> {
    pub fn new(inner: C, param_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            inner,
            param_name: param_name.into(),
            key: key.into(),
        }
    }

    fn sign(&self, req: &mut Request) {
        req.url_mut()
            .query_pairs_mut()
            .append_pair(&self.param_name, &self.key);
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for UrlParam<C> {
    async fn execute(&self, mut req: Request) -> reqwest::Result<Response> {
        self.sign(&mut req);
        self.inner.execute(req).await
    }
}
