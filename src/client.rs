use std::time::Duration;

use rand::Rng;
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::{ConnectionDescriptor, RetryPolicy};
use crate::error::{truncate_body, MigrateError};
use crate::model::{ChangeOp, Zone};

const MAX_BODY_LOG_LEN: usize = 2048;

/// Async PowerDNS API client. Owns a single connection pool, opened at
/// construction and released on [`PdnsClient::close`].
///
/// Grounded on `original_source/powerdns_migrator/async_client.py`'s
/// `AsyncPowerDNSClient`, ported from `aiohttp` to `reqwest`; header
/// and URL composition follow the teacher's `pdns.rs::PdnsClient`.
#[derive(Clone)]
pub struct PdnsClient {
    http: reqwest::Client,
    connection: ConnectionDescriptor,
    retry: RetryPolicy,
}

impl PdnsClient {
    pub fn new(connection: ConnectionDescriptor, retry: RetryPolicy) -> Result<Self, MigrateError> {
        let http = reqwest::Client::builder()
            .timeout(retry.timeout)
            .danger_accept_invalid_certs(!connection.verify_ssl)
            .build()
            .map_err(|e| MigrateError::config(format!("building HTTP client: {e}")))?;
        Ok(Self {
            http,
            connection,
            retry,
        })
    }

    /// Releases the connection pool. `reqwest::Client` has no explicit
    /// close; dropping the last clone tears the pool down, so this
    /// exists to give callers an explicit point to shield from
    /// cancellation (spec.md §5) and to make the lifecycle visible.
    pub async fn close(self) {
        drop(self);
    }

    pub async fn get_zone(&self, zone: &str) -> Result<Zone, MigrateError> {
        let path = format!("/zones/{zone}");
        let value = self.request_json(Method::GET, &path, None).await?;
        serde_json::from_value(value).map_err(|e| {
            MigrateError::config(format!("malformed zone document for {zone}: {e}"))
        })
    }

    /// Returns `Ok(None)` on a 404, matching the Python source's
    /// `zone_exists`.
    pub async fn zone_exists(&self, zone: &str) -> Result<Option<Zone>, MigrateError> {
        match self.get_zone(zone).await {
            Ok(z) => Ok(Some(z)),
            Err(MigrateError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn create_zone(&self, payload: &Zone) -> Result<Zone, MigrateError> {
        let body = serde_json::to_value(payload)
            .map_err(|e| MigrateError::config(format!("encoding zone payload: {e}")))?;
        let value = self.request_json(Method::POST, "/zones", Some(body)).await?;
        serde_json::from_value(value)
            .map_err(|e| MigrateError::config(format!("malformed create_zone response: {e}")))
    }

    pub async fn delete_zone(&self, zone: &str) -> Result<(), MigrateError> {
        let path = format!("/zones/{zone}");
        self.request_ok(Method::DELETE, &path, None).await
    }

    pub async fn patch_zone_rrsets(
        &self,
        zone: &str,
        ops: &[ChangeOp],
    ) -> Result<(), MigrateError> {
        let path = format!("/zones/{zone}");
        let body = serde_json::json!({ "rrsets": ops });
        self.request_ok(Method::PATCH, &path, Some(body)).await
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, MigrateError> {
        let url = self.connection.url(path);
        let resp = self.send_with_retries(&method, &url, body.as_ref()).await?;
        resp.json::<Value>()
            .await
            .map_err(|e| MigrateError::config(format!("decoding response from {url}: {e}")))
    }

    async fn request_ok(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<(), MigrateError> {
        let url = self.connection.url(path);
        self.send_with_retries(&method, &url, body.as_ref()).await?;
        Ok(())
    }

    /// Core retry loop. Up to `retries + 1` total attempts are made.
    /// Transport failures and retryable statuses both retry with the
    /// same backoff schedule; a non-retryable status raises
    /// immediately as [`MigrateError::Api`].
    async fn send_with_retries(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Response, MigrateError> {
        let mut last_cause: Option<reqwest::Error> = None;

        for attempt in 0..=self.retry.retries {
            let mut req = self
                .http
                .request(method.clone(), url)
                .header("X-API-Key", &self.connection.api_key)
                .header("Content-Type", "application/json")
                .header("Accept", "application/json");
            if let Some(b) = body {
                req = req.json(b);
            }

            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return Ok(resp);
                    }
                    if MigrateError::is_retryable_status(status.as_u16())
                        && attempt < self.retry.retries
                    {
                        let delay = self.retry_delay(attempt, Some(&resp));
                        debug!(
                            method = %method,
                            url,
                            attempt,
                            retries = self.retry.retries,
                            delay_ms = delay.as_millis() as u64,
                            "retrying after retryable status {status}"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    let body_text = resp.text().await.unwrap_or_default();
                    return Err(MigrateError::Api {
                        method: method.to_string(),
                        url: url.to_string(),
                        status: status.as_u16(),
                        body: truncate_body(&body_text, MAX_BODY_LOG_LEN),
                    });
                }
                Err(e) => {
                    if attempt >= self.retry.retries {
                        last_cause = Some(e);
                        break;
                    }
                    let delay = self.retry_delay(attempt, None);
                    warn!(
                        method = %method,
                        url,
                        attempt,
                        retries = self.retry.retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "retrying after transport error"
                    );
                    last_cause = Some(e);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let cause = last_cause.expect("retry loop exits only after recording a cause");
        Err(MigrateError::Connection {
            method: method.to_string(),
            url: url.to_string(),
            cause_type: classify_transport_error(&cause).to_string(),
            cause_message: cause.to_string(),
            retries_attempted: self.retry.retries,
        })
    }

    fn retry_delay(&self, attempt: u32, resp: Option<&reqwest::Response>) -> Duration {
        let exp = 2u32.saturating_pow(attempt);
        let backoff = self.retry.backoff.saturating_mul(exp);
        let mut delay = backoff.min(self.retry.max_backoff);

        if !self.retry.jitter.is_zero() {
            let jitter_ms = self.retry.jitter.as_millis().max(1) as u64;
            let added = rand::thread_rng().gen_range(0..=jitter_ms);
            delay += Duration::from_millis(added);
        }

        if let Some(resp) = resp {
            if let Some(retry_after) = resp
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
            {
                delay = delay.max(Duration::from_secs(retry_after));
            }
        }
        delay
    }
}

fn classify_transport_error(e: &reqwest::Error) -> &'static str {
    if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connect"
    } else if e.is_request() {
        "request"
    } else if e.is_decode() {
        "decode"
    } else {
        "other"
    }
}
