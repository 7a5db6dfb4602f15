//! Post-deploy HTTP probe
//!
//! Confirms the new instance answers on its published port. The request is
//! retried while the container starts up.

use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::debug;

/// Polls an instance until it returns 200 with the expected body
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: Client,
    expected_body: Option<String>,
    attempts: u32,
    interval: Duration,
}

impl HttpProbe {
    pub fn new(expected_body: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            expected_body,
            attempts: 10,
            interval: Duration::from_secs(2),
        }
    }

    pub fn with_attempts(mut self, attempts: u32, interval: Duration) -> Self {
        self.attempts = attempts.max(1);
        self.interval = interval;
        self
    }

    /// Checks `url`, returning the last failure once attempts run out
    ///
    /// Error messages never contain the URL.
    pub async fn check(&self, url: &str) -> Result<(), String> {
        let mut last_error = String::from("no attempts made");

        for attempt in 1..=self.attempts {
            match self.client.get(url).send().await {
                Ok(response) if response.status() == StatusCode::OK => {
                    let body = response.text().await.map_err(|e| e.without_url().to_string())?;
                    match &self.expected_body {
                        Some(expected) if body.trim() != expected.trim() => {
                            last_error = format!("unexpected response body: {}", body.trim());
                        }
                        _ => return Ok(()),
                    }
                }
                Ok(response) => {
                    last_error = format!("instance answered with {}", response.status());
                }
                Err(e) => {
                    last_error = e.without_url().to_string();
                }
            }

            debug!("Probe attempt {}/{} failed: {}", attempt, self.attempts, last_error);
            if attempt < self.attempts {
                tokio::time::sleep(self.interval).await;
            }
        }

        Err(last_error)
    }
}
