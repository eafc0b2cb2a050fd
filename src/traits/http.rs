use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

const USER_AGENT: &str = concat!("demogen/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Credentials attached to an outgoing request
#[derive(Clone, Copy)]
pub enum Credentials<'a> {
    None,
    Bearer(&'a str),
    /// Personal access token sent as basic auth with an empty user name
    Basic(&'a str),
}

impl std::fmt::Debug for Credentials<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::None => write!(f, "None"),
            Credentials::Bearer(_) => write!(f, "Bearer(***)"),
            Credentials::Basic(_) => write!(f, "Basic(***)"),
        }
    }
}

/// Status and body of a completed HTTP exchange
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Deserialize the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body)
            .with_context(|| format!("Unexpected response body (HTTP {})", self.status))
    }
}

/// HTTP client trait for testing.
///
/// Transport failures are errors; any HTTP status is returned as a response
/// so callers can branch on it.
pub trait HttpClient: Send + Sync {
    fn get(&self, url: &str, credentials: Credentials<'_>) -> Result<HttpResponse>;

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse>;

    fn post_json(&self, url: &str, credentials: Credentials<'_>, body: &Value) -> Result<HttpResponse>;
}

/// Real HTTP client using reqwest
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }

    fn send(&self, request: reqwest::blocking::RequestBuilder, url: &str) -> Result<HttpResponse> {
        let response = request
            .send()
            .with_context(|| format!("Failed to reach: {}", url))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .with_context(|| format!("Failed to read response body from: {}", url))?;
        Ok(HttpResponse { status, body })
    }
}

fn authorize(
    request: reqwest::blocking::RequestBuilder,
    credentials: Credentials<'_>,
) -> reqwest::blocking::RequestBuilder {
    match credentials {
        Credentials::None => request,
        Credentials::Bearer(token) => request.bearer_auth(token),
        Credentials::Basic(token) => request.basic_auth("", Some(token)),
    }
}

impl HttpClient for ReqwestClient {
    fn get(&self, url: &str, credentials: Credentials<'_>) -> Result<HttpResponse> {
        self.send(authorize(self.client.get(url), credentials), url)
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse> {
        self.send(self.client.post(url).form(form), url)
    }

    fn post_json(&self, url: &str, credentials: Credentials<'_>, body: &Value) -> Result<HttpResponse> {
        self.send(authorize(self.client.post(url), credentials).json(body), url)
    }
}

/// Request captured by MockHttpClient
#[derive(Debug, Clone, PartialEq)]
#[allow(dead_code)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    /// "none", "bearer:<token>" or "basic:<token>"
    pub credentials: String,
    pub body: String,
}

/// Scripted HTTP client. Each canned response is bound to a URL fragment and
/// consumed once; the first route whose fragment occurs in the URL and still
/// has responses queued answers the request.
#[allow(dead_code)]
pub struct MockHttpClient {
    routes: Mutex<Vec<(String, VecDeque<Result<HttpResponse, String>>)>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

#[allow(dead_code)]
impl MockHttpClient {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a response for URLs containing `fragment`
    pub fn respond(self, fragment: &str, status: u16, body: &str) -> Self {
        self.push(fragment, Ok(HttpResponse::new(status, body)));
        self
    }

    /// Queue a transport failure for URLs containing `fragment`
    pub fn fail(self, fragment: &str, error: &str) -> Self {
        self.push(fragment, Err(error.to_string()));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, fragment: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.contains(fragment))
            .collect()
    }

    fn push(&self, fragment: &str, response: Result<HttpResponse, String>) {
        let mut routes = self.routes.lock().unwrap();
        match routes.iter_mut().find(|(f, _)| f == fragment) {
            Some((_, queue)) => queue.push_back(response),
            None => routes.push((fragment.to_string(), VecDeque::from([response]))),
        }
    }

    fn answer(&self, method: &str, url: &str, credentials: Credentials<'_>, body: String) -> Result<HttpResponse> {
        let credentials = match credentials {
            Credentials::None => "none".to_string(),
            Credentials::Bearer(t) => format!("bearer:{}", t),
            Credentials::Basic(t) => format!("basic:{}", t),
        };
        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.to_string(),
            url: url.to_string(),
            credentials,
            body,
        });

        let mut routes = self.routes.lock().unwrap();
        let queued = routes
            .iter_mut()
            .find(|(fragment, queue)| url.contains(fragment.as_str()) && !queue.is_empty())
            .and_then(|(_, queue)| queue.pop_front());

        match queued {
            Some(Ok(response)) => Ok(response),
            Some(Err(error)) => Err(anyhow::anyhow!("{}", error)),
            None => Err(anyhow::anyhow!("No mock response configured for {} {}", method, url)),
        }
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient for MockHttpClient {
    fn get(&self, url: &str, credentials: Credentials<'_>) -> Result<HttpResponse> {
        self.answer("GET", url, credentials, String::new())
    }

    fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<HttpResponse> {
        let body = form
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        self.answer("POST", url, Credentials::None, body)
    }

    fn post_json(&self, url: &str, credentials: Credentials<'_>, body: &Value) -> Result<HttpResponse> {
        self.answer("POST", url, credentials, body.to_string())
    }
}
