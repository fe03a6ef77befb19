use bytes::Bytes;
use http::{Method, StatusCode};
use registry_controller_core::AdminError;
use std::time::Duration;

/// A raw admin API response.
#[derive(Clone, Debug)]
pub struct Response {
    pub status: StatusCode,
    pub body: Bytes,
}

/// Sends requests to the gateway's admin API.
///
/// `path` is relative to the admin base URL and always starts with `/`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        timeout: Option<Duration>,
    ) -> Result<Response, AdminError>;

    /// Turns a URL returned by the gateway, such as a pagination cursor, into
    /// a request path.
    fn path_of<'u>(&self, url: &'u str) -> &'u str {
        strip_origin(url)
    }
}

/// A [`Transport`] backed by a pooled `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base: String,
}

// === impl Response ===

impl Response {
    /// Renders the body for log messages.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn into_error(self) -> AdminError {
        AdminError::Status {
            status: self.status.as_u16(),
            body: self.text(),
        }
    }
}

// === impl HttpTransport ===

impl HttpTransport {
    /// Builds a client whose requests time out after `timeout` unless a
    /// request overrides it.
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        timeout: Option<Duration>,
    ) -> Result<Response, AdminError> {
        let mut req = self.client.request(method, format!("{}{}", self.base, path));
        if let Some(body) = body {
            req = req.json(&body);
        }
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }

        let rsp = req.send().await.map_err(request_error)?;
        let status = rsp.status();
        let body = rsp.bytes().await.map_err(request_error)?;
        Ok(Response { status, body })
    }

    fn path_of<'u>(&self, url: &'u str) -> &'u str {
        match url.strip_prefix(self.base.as_str()) {
            Some(path) if path.starts_with('/') => path,
            _ => strip_origin(url),
        }
    }
}

/// Drops the scheme and authority of an absolute URL. Paths pass through.
fn strip_origin(url: &str) -> &str {
    let rest = match url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
    {
        Some(rest) => rest,
        None => return url,
    };
    match rest.find('/') {
        Some(idx) => &rest[idx..],
        None => "/",
    }
}

fn request_error(error: reqwest::Error) -> AdminError {
    if error.is_timeout() {
        AdminError::Timeout
    } else {
        AdminError::Transport(error.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn cursors_resolve_against_the_admin_base() {
        let transport =
            HttpTransport::new("http://kong-gateway:8001/admin/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            transport.path_of("http://kong-gateway:8001/admin/services?offset=abc"),
            "/services?offset=abc"
        );
        assert_eq!(
            transport.path_of("https://10.0.0.7:8444/services?offset=abc"),
            "/services?offset=abc"
        );
        assert_eq!(transport.path_of("/services?offset=abc"), "/services?offset=abc");
        assert_eq!(strip_origin("http://kong-gateway:8001"), "/");
    }
}
