//! ==============================================================================
//! report.rs - measurement delivery over http
//! ==============================================================================
//!
//! purpose:
//!     posts one measurement to the collection backend. one attempt per
//!     cycle, bounded by the client timeout; the next cycle is the retry.
//!
//! contract:
//!     201 Created          -> success
//!     any other status     -> failure, status + body kept for the log
//!     timeout/connect/dns  -> failure, no status, error text kept
//!
//! ==============================================================================

use crate::domain::{DeliveryResult, Measurement};
use anyhow::{Context, Result};
use reqwest::StatusCode;
use std::time::Duration;

pub struct Reporter {
    client: reqwest::Client,
    endpoint: String,
}

impl Reporter {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub async fn deliver(&self, measurement: &Measurement) -> DeliveryResult {
        let response = match self
            .client
            .post(&self.endpoint)
            .json(&measurement.payload())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return DeliveryResult::unreachable(e.to_string()),
        };

        let status = response.status();
        if status == StatusCode::CREATED {
            return DeliveryResult::delivered(status.as_u16());
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => format!("<unreadable body: {}>", e),
        };
        DeliveryResult::rejected(status.as_u16(), body)
    }
}

// ==============================================================================
// tests
// ==============================================================================
// a local axum server stands in for the backend

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert;
    use crate::domain::RawSample;
    use axum::{http::StatusCode as AxumStatus, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    fn measurement() -> Measurement {
        let raw = RawSample::new(512).unwrap();
        convert::measurement(22.5, 45.0, raw, raw)
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/api/sensors", addr)
    }

    #[tokio::test]
    async fn created_is_success() {
        let received = Arc::new(Mutex::new(None));
        let sink = received.clone();
        let app = Router::new().route(
            "/api/sensors",
            post(move |Json(body): Json<serde_json::Value>| async move {
                *sink.lock().unwrap() = Some(body);
                (AxumStatus::CREATED, "Data saved successfully.")
            }),
        );
        let endpoint = serve(app).await;

        let reporter = Reporter::new(endpoint, Duration::from_secs(5)).unwrap();
        let result = reporter.deliver(&measurement()).await;

        assert_eq!(result, DeliveryResult::delivered(201));
        let body = received.lock().unwrap().take().unwrap();
        assert_eq!(body["temperature"], 22.5);
        assert_eq!(body["mq135"]["co2"], 89554.82);
        assert_eq!(body["mq9"]["co"], 2.91);
    }

    #[tokio::test]
    async fn server_error_keeps_status_and_body() {
        let app = Router::new().route(
            "/api/sensors",
            post(|| async { (AxumStatus::INTERNAL_SERVER_ERROR, "{\"error\":\"db down\"}") }),
        );
        let endpoint = serve(app).await;

        let reporter = Reporter::new(endpoint, Duration::from_secs(5)).unwrap();
        let result = reporter.deliver(&measurement()).await;

        assert!(!result.success);
        assert_eq!(result.status, Some(500));
        assert_eq!(result.body.as_deref(), Some("{\"error\":\"db down\"}"));
    }

    #[tokio::test]
    async fn ok_is_not_created() {
        let app = Router::new().route("/api/sensors", post(|| async { "fine" }));
        let endpoint = serve(app).await;

        let reporter = Reporter::new(endpoint, Duration::from_secs(5)).unwrap();
        let result = reporter.deliver(&measurement()).await;

        assert_eq!(result, DeliveryResult::rejected(200, "fine".to_string()));
    }

    #[tokio::test]
    async fn unreachable_endpoint_has_no_status() {
        // bind then drop to get a port nothing listens on
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let reporter =
            Reporter::new(format!("http://{}/api/sensors", addr), Duration::from_secs(5)).unwrap();
        let result = reporter.deliver(&measurement()).await;

        assert!(!result.success);
        assert_eq!(result.status, None);
        assert!(result.body.is_some());
    }
}
