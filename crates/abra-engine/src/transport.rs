use std::io::{BufRead, BufReader};
use std::time::Duration;

use abra_contracts::graphql::{FormFields, Operation, FORM_CONTENT_TYPE};
use abra_contracts::{AbraError, Result};
use reqwest::blocking::{Client as HttpClient, RequestBuilder};
use reqwest::header::{CONTENT_TYPE, COOKIE};
use tracing::{debug, warn};

use crate::config::ClientConfig;

/// Lines of a streamed response body, pulled on demand.
pub type LineStream = Box<dyn Iterator<Item = Result<String>> + Send>;

/// Which HTTP session a request may ride on.
///
/// `Isolated` requests get a freshly built client so cookie-derived state from
/// one credential scope never leaks into another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CredentialScope {
    #[default]
    Shared,
    Isolated,
}

#[derive(Debug, Clone)]
pub struct FormRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub form: FormFields,
    pub scope: CredentialScope,
}

impl FormRequest {
    pub fn new(url: impl Into<String>, operation: Operation, form: FormFields) -> Self {
        Self {
            url: url.into(),
            headers: vec![
                (CONTENT_TYPE.as_str().to_string(), FORM_CONTENT_TYPE.to_string()),
                (
                    "x-fb-friendly-name".to_string(),
                    operation.friendly_name.to_string(),
                ),
            ],
            form,
            scope: CredentialScope::Shared,
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_cookie(self, cookie: impl Into<String>) -> Self {
        self.with_header(COOKIE.as_str(), cookie)
    }

    pub fn with_scope(mut self, scope: CredentialScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The HTTP operations the client needs. Implemented over `reqwest` for real
/// traffic and by scripted doubles in tests.
pub trait Transport: Send + Sync {
    fn get_text(&self, url: &str, headers: &[(String, String)]) -> Result<HttpReply>;
    /// Downloads a body, failing on non-2xx status.
    fn get_bytes(&self, url: &str) -> Result<Vec<u8>>;
    fn post_form(&self, request: &FormRequest) -> Result<HttpReply>;
    fn post_form_lines(&self, request: &FormRequest) -> Result<LineStream>;
}

pub struct HttpTransport {
    http: HttpClient,
    user_agent: String,
    proxy: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = build_http_client(
            &config.user_agent,
            config.proxy.as_deref(),
            config.request_timeout,
        )?;
        Ok(Self {
            http,
            user_agent: config.user_agent.clone(),
            proxy: config.proxy.clone(),
            timeout: config.request_timeout,
        })
    }

    fn client_for(&self, scope: CredentialScope) -> Result<HttpClient> {
        match scope {
            CredentialScope::Shared => Ok(self.http.clone()),
            CredentialScope::Isolated => {
                build_http_client(&self.user_agent, self.proxy.as_deref(), self.timeout)
            }
        }
    }

    fn form_request(&self, request: &FormRequest) -> Result<RequestBuilder> {
        let mut builder = self.client_for(request.scope)?.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        debug!(
            url = %request.url,
            scope = ?request.scope,
            operation = request.header("x-fb-friendly-name").unwrap_or_default(),
            "dispatching form request"
        );
        Ok(builder.form(&request.form))
    }
}

fn build_http_client(
    user_agent: &str,
    proxy: Option<&str>,
    timeout: Duration,
) -> Result<HttpClient> {
    let mut builder = HttpClient::builder().user_agent(user_agent).timeout(timeout);
    if let Some(proxy) = proxy {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|err| AbraError::transport("invalid proxy", error_chain_text(&err)))?;
        builder = builder.proxy(proxy);
    }
    builder
        .build()
        .map_err(|err| AbraError::transport("failed to build HTTP client", error_chain_text(&err)))
}

impl Transport for HttpTransport {
    fn get_text(&self, url: &str, headers: &[(String, String)]) -> Result<HttpReply> {
        let mut builder = self.http.get(url);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder.send().map_err(|err| {
            AbraError::transport(format!("GET {url} failed"), error_chain_text(&err))
        })?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|err| {
            AbraError::transport(format!("GET {url} body read failed"), error_chain_text(&err))
        })?;
        Ok(HttpReply { status, body })
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .http
            .get(url)
            .send()
            .map_err(|err| {
                AbraError::transport(format!("GET {url} failed"), error_chain_text(&err))
            })?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AbraError::transport(
                format!("GET {url} failed ({})", status.as_u16()),
                truncate_text(&body, 256),
            ));
        }
        let bytes = response.bytes().map_err(|err| {
            AbraError::transport(format!("GET {url} body read failed"), error_chain_text(&err))
        })?;
        Ok(bytes.to_vec())
    }

    fn post_form(&self, request: &FormRequest) -> Result<HttpReply> {
        let response = self.form_request(request)?.send().map_err(|err| {
            AbraError::transport(format!("POST {} failed", request.url), error_chain_text(&err))
        })?;
        let status = response.status().as_u16();
        let body = response.text().map_err(|err| {
            AbraError::transport(
                format!("POST {} body read failed", request.url),
                error_chain_text(&err),
            )
        })?;
        Ok(HttpReply { status, body })
    }

    fn post_form_lines(&self, request: &FormRequest) -> Result<LineStream> {
        let response = self.form_request(request)?.send().map_err(|err| {
            AbraError::transport(format!("POST {} failed", request.url), error_chain_text(&err))
        })?;
        if !response.status().is_success() {
            warn!(
                status = response.status().as_u16(),
                url = %request.url,
                "streamed request returned non-success status"
            );
        }
        let url = request.url.clone();
        let lines = BufReader::new(response).lines().map(move |line| {
            line.map_err(|err| {
                AbraError::transport(format!("reading stream from {url} failed"), err.to_string())
            })
        });
        Ok(Box::new(lines))
    }
}

pub(crate) fn error_chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    parts.join(" | caused by: ")
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use abra_contracts::graphql::SEND_MESSAGE;

    use super::*;

    #[test]
    fn form_request_sets_protocol_headers() {
        let request = FormRequest::new(
            "https://example.test/graphql",
            SEND_MESSAGE,
            vec![("doc_id".to_string(), "1".to_string())],
        )
        .with_cookie("abra_sess=x")
        .with_scope(CredentialScope::Isolated);
        assert_eq!(request.header("Content-Type"), Some(FORM_CONTENT_TYPE));
        assert_eq!(
            request.header("x-fb-friendly-name"),
            Some(SEND_MESSAGE.friendly_name)
        );
        assert_eq!(request.header("cookie"), Some("abra_sess=x"));
        assert_eq!(request.field("doc_id"), Some("1"));
        assert_eq!(request.scope, CredentialScope::Isolated);
    }

    #[test]
    fn http_reply_success_range() {
        assert!(HttpReply::ok("{}").is_success());
        assert!(!HttpReply {
            status: 502,
            body: String::new()
        }
        .is_success());
    }

    #[test]
    fn truncate_text_marks_cut() {
        assert_eq!(truncate_text("abcdef", 3), "abc…");
        assert_eq!(truncate_text("abc", 3), "abc");
    }

    #[test]
    fn error_chain_text_dedupes_repeats() {
        let err = std::io::Error::other("socket closed");
        assert_eq!(error_chain_text(&err), "socket closed");
    }
}
