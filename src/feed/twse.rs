//! TWSE open-data client

use super::{FetchPolicy, WarrantFeed};
use crate::error::{FetchError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Client;
use tracing::{debug, warn};

const ACCEPT_VALUE: &str = "application/json,text/plain,*/*";
const USER_AGENT_VALUE: &str = "twse-warrant-volume-radar/1.0";

/// TWSE warrant trade dataset feed
pub struct TwseFeed {
    client: Client,
    url: String,
    policy: FetchPolicy,
}

impl TwseFeed {
    pub fn new(url: impl Into<String>, policy: FetchPolicy) -> Result<Self> {
        // Per-attempt timeouts are enforced in fetch_json, not on the client
        let client = Client::builder().build()?;
        Ok(Self {
            client,
            url: url.into(),
            policy,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl WarrantFeed for TwseFeed {
    fn name(&self) -> &'static str {
        "twse"
    }

    async fn fetch_latest(&self) -> std::result::Result<serde_json::Value, FetchError> {
        fetch_json(&self.client, &self.url, &self.policy).await
    }
}

/// GET a JSON document with a hard per-attempt timeout and linear backoff.
///
/// Timeouts, non-success statuses, transport failures and undecodable bodies
/// are all retried. When attempts run out the last failure is returned.
pub async fn fetch_json(
    client: &Client,
    url: &str,
    policy: &FetchPolicy,
) -> std::result::Result<serde_json::Value, FetchError> {
    let attempts = policy.max_retries.saturating_add(1);
    let mut last_err = FetchError::Transport("no attempt made".to_string());

    for attempt in 1..=attempts {
        debug!("Fetching {} (attempt {}/{})", url, attempt, attempts);

        match tokio::time::timeout(policy.timeout, fetch_once(client, url)).await {
            Ok(Ok(payload)) => return Ok(payload),
            Ok(Err(e)) => last_err = e,
            Err(_) => last_err = FetchError::TimedOut,
        }

        if attempt < attempts {
            let delay = policy.backoff(attempt);
            warn!(
                "Fetch attempt {}/{} for {} failed: {}; retrying in {:?}",
                attempt, attempts, url, last_err, delay
            );
            tokio::time::sleep(delay).await;
        } else {
            warn!("Fetch attempt {}/{} for {} failed: {}", attempt, attempts, url, last_err);
        }
    }

    Err(last_err)
}

async fn fetch_once(client: &Client, url: &str) -> std::result::Result<serde_json::Value, FetchError> {
    let response = client
        .get(url)
        .header(ACCEPT, ACCEPT_VALUE)
        .header(USER_AGENT, USER_AGENT_VALUE)
        .send()
        .await
        .map_err(classify)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    let body = response.bytes().await.map_err(classify)?;
    serde_json::from_slice(&body).map_err(|e| FetchError::Decode(e.to_string()))
}

fn classify(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::TimedOut
    } else {
        FetchError::Transport(err.to_string())
    }
}
