// Collaborator contracts for quote refresh and coupon validation, plus the
// HTTP client that talks to the storefront API

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::coupon::{CouponValidationRequest, CouponValidationResponse, CouponVerdict};
use crate::quote::{CarEnvelope, CarQuote, TripDates};

pub const CAR_BOOKING_PATH: &str = "/front/cars/booking";
pub const COUPON_VALIDATE_PATH: &str = "/coupons/validate";

// Errors returned by collaborators
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("API error: {status_code} - {}", .message.as_deref().unwrap_or("no message"))]
    ApiResponseError {
        status_code: u16,
        /// `message` from the response body, if it carried one.
        message: Option<String>,
        is_retryable: bool,
    },

    #[error("Decode error: {0}")]
    DecodeError(String),

    #[error("Other error: {0}")]
    Other(String),
}

impl ApiError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::NetworkError(_) | ApiError::Timeout(_) => true,
            ApiError::ApiResponseError { is_retryable, .. } => *is_retryable,
            ApiError::DecodeError(_) | ApiError::Other(_) => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Initialization error: {0}")]
    InitError(String),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_ms: u64,
    pub retry_config: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            api_key: String::new(),
            timeout_ms: 8000,
            retry_config: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 100,
            max_backoff_ms: 2000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClientStats {
    pub requests_sent: usize,
    pub requests_succeeded: usize,
    pub requests_failed: usize,
    pub requests_retried: usize,
}

/// Fetches a fresh quote for a car over a date range.
#[async_trait]
pub trait CarSyncService: Send + Sync + 'static {
    async fn fetch_quote(&self, car_id: u64, trip: TripDates) -> Result<CarQuote, ApiError>;
}

/// Validates a coupon code against the trip it should discount.
#[async_trait]
pub trait CouponValidator: Send + Sync + 'static {
    async fn validate_coupon(
        &self,
        request: CouponValidationRequest,
    ) -> Result<CouponVerdict, ApiError>;
}

#[derive(Debug, Serialize)]
struct CarBookingRequest {
    car_id: u64,
    start_date: String,
    end_date: String,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
}

/// Storefront API client implementing both collaborator contracts.
pub struct HttpBookingApi {
    http: reqwest::Client,
    config: ClientConfig,
    stats: Mutex<ClientStats>,
}

impl HttpBookingApi {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        if !config.base_url.starts_with("http://") && !config.base_url.starts_with("https://") {
            return Err(ClientError::ConfigError(format!(
                "base_url must be an http(s) URL, got {:?}",
                config.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ClientError::InitError(e.to_string()))?;

        Ok(Self {
            http,
            config,
            stats: Mutex::new(ClientStats::default()),
        })
    }

    pub fn stats(&self) -> ClientStats {
        self.stats.lock().clone()
    }

    // Exponential backoff with jitter
    pub fn calculate_backoff(retry_attempt: u32, config: &RetryConfig) -> Duration {
        let base_backoff_ms = (config.initial_backoff_ms as f64
            * config.backoff_multiplier.powf(retry_attempt as f64))
        .min(config.max_backoff_ms as f64);

        let jitter = rand::random::<f64>() * config.jitter_factor * base_backoff_ms;
        let backoff_ms = base_backoff_ms * (1.0 - config.jitter_factor / 2.0) + jitter;

        Duration::from_millis(backoff_ms as u64)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.url(path);
        let mut attempt = 0;

        loop {
            self.stats.lock().requests_sent += 1;

            match self.send_once(&url, body).await {
                Ok(response) => {
                    self.stats.lock().requests_succeeded += 1;
                    return Ok(response);
                }
                Err(e) if e.is_retryable() && attempt < self.config.retry_config.max_retries => {
                    let backoff = Self::calculate_backoff(attempt, &self.config.retry_config);
                    debug!(%url, attempt, ?backoff, error = %e, "retrying request");
                    self.stats.lock().requests_retried += 1;
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => {
                    self.stats.lock().requests_failed += 1;
                    warn!(%url, error = %e, "request failed");
                    return Err(e);
                }
            }
        }
    }

    async fn send_once<B, R>(&self, url: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut request = self.http.post(url).json(body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request.send().await.map_err(|e| self.map_transport(e))?;
        let status = response.status();
        let payload: Bytes = response.bytes().await.map_err(|e| self.map_transport(e))?;

        if status.is_success() {
            return serde_json::from_slice(&payload)
                .map_err(|e| ApiError::DecodeError(e.to_string()));
        }

        let message = serde_json::from_slice::<ErrorBody>(&payload)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.trim().is_empty());

        Err(ApiError::ApiResponseError {
            status_code: status.as_u16(),
            message,
            is_retryable: status.is_server_error()
                || status == reqwest::StatusCode::TOO_MANY_REQUESTS,
        })
    }

    fn map_transport(&self, e: reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout(self.config.timeout_ms)
        } else {
            ApiError::NetworkError(e.to_string())
        }
    }
}

#[async_trait]
impl CarSyncService for HttpBookingApi {
    async fn fetch_quote(&self, car_id: u64, trip: TripDates) -> Result<CarQuote, ApiError> {
        let body = CarBookingRequest {
            car_id,
            start_date: trip.start_param(),
            end_date: trip.end_param(),
        };

        let envelope: CarEnvelope = self.post_json(CAR_BOOKING_PATH, &body).await?;
        let car = envelope
            .into_car()
            .ok_or_else(|| ApiError::DecodeError("empty car payload".to_string()))?;

        Ok(CarQuote::from(car))
    }
}

#[async_trait]
impl CouponValidator for HttpBookingApi {
    async fn validate_coupon(
        &self,
        request: CouponValidationRequest,
    ) -> Result<CouponVerdict, ApiError> {
        let response: Result<CouponValidationResponse, ApiError> =
            self.post_json(COUPON_VALIDATE_PATH, &request).await;

        match response {
            Ok(response) => Ok(response.into_verdict(&request.code)),
            // credentials problems are ours, not the code's
            Err(e @ ApiError::ApiResponseError {
                status_code: 401 | 403,
                ..
            }) => Err(e),
            // any other 4xx is the server refusing the code
            Err(ApiError::ApiResponseError {
                message,
                is_retryable: false,
                ..
            }) => Ok(CouponVerdict::Rejected { message }),
            Err(e) => Err(e),
        }
    }
}
