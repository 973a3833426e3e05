//! Single-attempt HTTP fetch and the fixed-delay retry wrapper around it.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            query: Vec::new(),
            body: None,
            timeout,
        }
    }

    pub fn post(url: impl Into<String>, body: Value, timeout: Duration) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            ..Self::get(url, timeout)
        }
    }

    pub fn with_query(mut self, query: &[(String, String)]) -> Self {
        self.query.extend_from_slice(query);
        self
    }
}

/// One network call per invocation, no retries.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &ApiRequest) -> Result<Value, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("oracle-portfolio/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &ApiRequest) -> Result<Value, FetchError> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        }
        .header(ACCEPT, "application/json")
        .timeout(request.timeout);

        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(classify)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(classify)?;
        debug!(url = %request.url, bytes = bytes.len(), "response received");
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
    }
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err.to_string())
    }
}

/// Constant delay between attempts; there is no backoff growth or jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_millis(1_000),
        }
    }
}

impl RetryPolicy {
    /// Runs `attempt` until it succeeds or `max_attempts` calls have been
    /// made, returning the last failure in the latter case.
    pub async fn run<T, F, Fut>(&self, label: &str, mut attempt: F) -> Result<T, FetchError>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut number = 1;
        loop {
            match attempt(number).await {
                Ok(value) => return Ok(value),
                Err(err) if number >= max_attempts => return Err(err),
                Err(err) => {
                    warn!(target: "oracle_portfolio::retry", %label, attempt = number, error = %err, "attempt failed, retrying");
                    tokio::time::sleep(self.delay).await;
                    number += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn serve_once(status_line: &'static str, body: &'static str, delay: Duration) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut read = Vec::new();
            while !read.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                read.extend_from_slice(&buf[..n]);
            }
            tokio::time::sleep(delay).await;
            let response = format!(
                "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}/getRegime")
    }

    fn request(url: String, timeout_ms: u64) -> ApiRequest {
        ApiRequest::get(url, Duration::from_millis(timeout_ms))
    }

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new().unwrap()
    }

    #[tokio::test]
    async fn post_sends_json_body() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let mut read = Vec::new();
            while !read.ends_with(b"}") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                read.extend_from_slice(&buf[..n]);
            }
            let body = "{}";
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
            String::from_utf8_lossy(&read).into_owned()
        });

        let request = ApiRequest::post(
            format!("http://{addr}/getMultiRegime"),
            serde_json::json!({"countries": ["FRA"]}),
            Duration::from_millis(2_000),
        );
        fetcher().fetch(&request).await.unwrap();

        let received = server.await.unwrap();
        assert!(received.starts_with("POST /getMultiRegime"));
        assert!(received.ends_with(r#"{"countries":["FRA"]}"#));
    }

    #[tokio::test]
    async fn parses_successful_json() {
        let url = serve_once("200 OK", r#"{"regime":"EXPANSION"}"#, Duration::ZERO).await;
        let value = fetcher().fetch(&request(url, 2_000)).await.unwrap();
        assert_eq!(value["regime"], "EXPANSION");
    }

    #[tokio::test]
    async fn non_success_status_is_reported() {
        let url = serve_once("503 Service Unavailable", "{}", Duration::ZERO).await;
        let err = fetcher().fetch(&request(url, 2_000)).await.unwrap_err();
        assert_eq!(err, FetchError::HttpStatus(503));
    }

    #[tokio::test]
    async fn malformed_body_is_a_parse_failure() {
        let url = serve_once("200 OK", "<html>", Duration::ZERO).await;
        let err = fetcher().fetch(&request(url, 2_000)).await.unwrap_err();
        assert!(matches!(err, FetchError::Parse(_)));
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let url = serve_once("200 OK", "{}", Duration::from_secs(2)).await;
        let err = fetcher().fetch(&request(url, 100)).await.unwrap_err();
        assert_eq!(err, FetchError::Timeout);
    }

    #[tokio::test]
    async fn refused_connection_is_a_network_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let err = fetcher()
            .fetch(&request(format!("http://{addr}/getHealth"), 1_000))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_succeeds_on_the_nth_attempt() {
        let policy = RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1_000),
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = policy
            .run("getRegime", move |n| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(FetchError::Network("reset".to_string()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 4,
            delay: Duration::from_millis(250),
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let started = tokio::time::Instant::now();
        let result: Result<(), FetchError> = policy
            .run("getCountries", move |n| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err(FetchError::HttpStatus(500 + n as u16)) }
            })
            .await;
        assert_eq!(result, Err(FetchError::HttpStatus(504)));
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        // three waits between four attempts, constant delay
        assert_eq!(started.elapsed(), Duration::from_millis(750));
    }
}
