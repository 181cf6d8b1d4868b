use std::thread::sleep;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::EnrichError;

/// Raw outcome of a GET that reached the server. Error statuses are still responses.
#[derive(Debug, Clone, PartialEq, Eq)]
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

    /// Anything below 400, matching what a browser would render.
    pub fn is_ok(&self) -> bool {
        self.status < 400
    }

    pub fn json(&self, url: &str) -> Result<Value, EnrichError> {
        serde_json::from_str(&self.body).map_err(|error| EnrichError::malformed(url, error.to_string()))
    }
}

pub trait HttpTransport {
    fn get(
        &self,
        url: &str,
        params: &[(&str, String)],
        timeout: Duration,
    ) -> Result<HttpResponse, EnrichError>;
}

pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    /// Zero is treated as one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 1.5,
        }
    }
}

/// Blocking GET with geometric backoff on transport failures only.
#[derive(Clone, Copy)]
pub struct Fetcher<'a> {
    transport: &'a dyn HttpTransport,
    sleeper: &'a dyn Sleeper,
}

impl<'a> Fetcher<'a> {
    pub fn new(transport: &'a dyn HttpTransport, sleeper: &'a dyn Sleeper) -> Self {
        Self { transport, sleeper }
    }

    pub fn sleeper(&self) -> &'a dyn Sleeper {
        self.sleeper
    }

    pub fn fetch(
        &self,
        url: &str,
        params: &[(&str, String)],
        policy: &RetryPolicy,
    ) -> Result<HttpResponse, EnrichError> {
        let attempts = policy.max_attempts.max(1);
        let mut delay = policy.initial_delay;
        let mut last_error = None::<EnrichError>;

        for attempt in 1..=attempts {
            match self.transport.get(url, params, policy.timeout) {
                Ok(response) => {
                    debug!(url, status = response.status, attempt, "fetched");
                    return Ok(response);
                }
                Err(error) if error.is_transport() => {
                    warn!(url, attempt, attempts, %error, "transport failure");
                    last_error = Some(error);
                    if attempt < attempts {
                        self.sleeper.sleep(delay);
                        delay = scale_delay(delay, policy.backoff_multiplier);
                    }
                }
                Err(error) => return Err(error),
            }
        }

        Err(last_error.unwrap_or_else(|| EnrichError::transport(url, "request failed")))
    }
}

fn scale_delay(delay: Duration, factor: f64) -> Duration {
    let nanos = delay.as_nanos() as f64 * factor;
    if !nanos.is_finite() || nanos < 0.0 {
        return delay;
    }
    Duration::from_nanos(nanos.min(u64::MAX as f64) as u64)
}

pub struct ReqwestTransport {
    client: Client,
    user_agent: String,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self, EnrichError> {
        let client = Client::builder()
            .build()
            .map_err(|error| EnrichError::Construction(format!("failed to build HTTP client: {error}")))?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
        })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(
        &self,
        url: &str,
        params: &[(&str, String)],
        timeout: Duration,
    ) -> Result<HttpResponse, EnrichError> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent.clone())
            .query(params)
            .timeout(timeout)
            .send()
            .map_err(|error| EnrichError::transport(url, error.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|error| EnrichError::transport(url, format!("failed to read body: {error}")))?;
        Ok(HttpResponse { status, body })
    }
}
