use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{NewBooking, NewUser, NewVehicle};

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend returned status {0}")]
    Status(u16),

    #[error("backend request timed out")]
    Timeout,

    #[error("backend transport error: {0}")]
    Transport(String),

    #[error("unexpected backend response: {0}")]
    InvalidResponse(String),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Timeout | BackendError::Transport(_) => true,
            BackendError::Status(code) => *code >= 500,
            BackendError::InvalidResponse(_) => false,
        }
    }
}

/// The registration and booking endpoints the conversation writes through.
/// Every call carries a request token; repeating a token must not create a
/// second record.
#[async_trait]
pub trait BackendApi: Send + Sync {
    async fn create_user(&self, user: &NewUser, token: &str) -> Result<i64, BackendError>;
    async fn create_vehicle(&self, vehicle: &NewVehicle, token: &str) -> Result<i64, BackendError>;
    async fn create_booking(&self, booking: &NewBooking, token: &str) -> Result<i64, BackendError>;
}

pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// POSTs `body` and reads the id stored under `id_field`, retrying once
    /// when the first attempt fails in a retryable way.
    async fn post_for_id<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
        token: &str,
        id_field: &str,
    ) -> Result<i64, BackendError> {
        match self.post_once(path, body, token, id_field).await {
            Err(e) if e.is_retryable() => {
                tracing::warn!(path, error = %e, "backend call failed, retrying once");
                self.post_once(path, body, token, id_field).await
            }
            other => other,
        }
    }

    async fn post_once<T: Serialize + Sync>(
        &self,
        path: &str,
        body: &T,
        token: &str,
        id_field: &str,
    ) -> Result<i64, BackendError> {
        let resp = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header(IDEMPOTENCY_HEADER, token)
            .json(body)
            .send()
            .await
            .map_err(map_transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let data: serde_json::Value = read_json(resp).await?;
        data[id_field]
            .as_i64()
            .ok_or_else(|| BackendError::InvalidResponse(format!("missing `{id_field}` in {data}")))
    }
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, BackendError> {
    resp.json()
        .await
        .map_err(|e| BackendError::InvalidResponse(e.to_string()))
}

fn map_transport(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else {
        BackendError::Transport(e.to_string())
    }
}

#[async_trait]
impl BackendApi for HttpBackend {
    async fn create_user(&self, user: &NewUser, token: &str) -> Result<i64, BackendError> {
        self.post_for_id("/usuarios", user, token, "usuario").await
    }

    async fn create_vehicle(&self, vehicle: &NewVehicle, token: &str) -> Result<i64, BackendError> {
        self.post_for_id("/vehiculos", vehicle, token, "vehiculo").await
    }

    async fn create_booking(&self, booking: &NewBooking, token: &str) -> Result<i64, BackendError> {
        self.post_for_id("/reservas", booking, token, "reserva").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(BackendError::Timeout.is_retryable());
        assert!(BackendError::Transport("reset".to_string()).is_retryable());
        assert!(BackendError::Status(503).is_retryable());
        assert!(!BackendError::Status(400).is_retryable());
        assert!(!BackendError::InvalidResponse("{}".to_string()).is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let backend =
            HttpBackend::new("http://127.0.0.1:9".to_string(), Duration::from_millis(500)).unwrap();
        let booking = NewBooking {
            user_id: 1,
            vehicle_id: 1,
            service_id: 1,
            slot_id: 1,
            problem: "ruido".to_string(),
            date_time: "2025-06-16 09:00:00".to_string(),
        };

        let err = backend.create_booking(&booking, "tok").await.unwrap_err();
        assert!(matches!(err, BackendError::Transport(_) | BackendError::Timeout));
    }
}
