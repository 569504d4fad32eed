//! Client for the office script endpoint

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shiftlog_api::{DriverIdentity, DriverShift, OutboundEvent, Station, Vehicle, VehicleUsage};
use shiftlog_office::{OfficeBackend, OfficeError, OfficeResult, RemoteStart};
use shiftlog_util::EmployeeId;
use std::time::Duration;
use tracing::{debug, warn};

use crate::wire::{
    self, WireDriver, WireDriverShift, WireRemoteStart, WireStation, WireUsage, WireVehicle,
};

/// Office backend talking to the spreadsheet script over HTTP
///
/// Reads are `GET {endpoint}?action=<name>&...`, writes are a JSON `POST`
/// to the endpoint itself.
#[derive(Clone)]
pub struct HttpOffice {
    http: Client,
    endpoint: String,
}

impl HttpOffice {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> OfficeResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| OfficeError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_value(&self, action: &str, params: &[(&str, &str)]) -> OfficeResult<Value> {
        let mut query = vec![("action", action)];
        query.extend_from_slice(params);

        let response = self
            .http
            .get(&self.endpoint)
            .query(&query)
            .send()
            .await
            .map_err(map_transport)?;

        let body = check_response(response).await?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| OfficeError::Decode(format!("{}: {}", action, e)))?;

        if let Some(message) = wire::error_message(&value) {
            return Err(OfficeError::Rejected(message));
        }

        debug!(action, "Office lookup succeeded");
        Ok(value)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        action: &str,
        params: &[(&str, &str)],
    ) -> OfficeResult<T> {
        let value = self.get_value(action, params).await?;
        serde_json::from_value(value).map_err(|e| OfficeError::Decode(format!("{}: {}", action, e)))
    }

    async fn get_list<W, T>(&self, action: &str, params: &[(&str, &str)]) -> OfficeResult<Vec<T>>
    where
        W: DeserializeOwned,
        T: From<W>,
    {
        let value = self.get_value(action, params).await?;
        // An empty sheet comes back as null
        if value.is_null() {
            return Ok(Vec::new());
        }
        let rows: Vec<W> = serde_json::from_value(value)
            .map_err(|e| OfficeError::Decode(format!("{}: {}", action, e)))?;
        Ok(rows.into_iter().map(T::from).collect())
    }
}

fn map_transport(e: reqwest::Error) -> OfficeError {
    if e.is_timeout() {
        OfficeError::Timeout
    } else {
        OfficeError::Transport(e.to_string())
    }
}

async fn check_response(response: reqwest::Response) -> OfficeResult<String> {
    let status = response.status();
    let body = response.text().await.map_err(map_transport)?;

    if !status.is_success() {
        warn!(status = status.as_u16(), "Office returned an error status");
        return Err(OfficeError::Status(status.as_u16()));
    }

    Ok(body)
}

#[async_trait]
impl OfficeBackend for HttpOffice {
    async fn get_driver(&self, employee_id: &EmployeeId) -> OfficeResult<Option<DriverIdentity>> {
        let wire: WireDriver = self
            .get_json("getDriver", &[("matricola", employee_id.as_str())])
            .await?;

        Ok(match (wire.found, wire.name) {
            (true, Some(name)) if !name.trim().is_empty() => {
                Some(DriverIdentity::new(employee_id.clone(), name.trim()))
            }
            _ => None,
        })
    }

    async fn get_vehicles(&self) -> OfficeResult<Vec<Vehicle>> {
        self.get_list::<WireVehicle, _>("getVehicles", &[]).await
    }

    async fn check_remote_start(&self, driver_name: &str) -> OfficeResult<RemoteStart> {
        let wire: WireRemoteStart = self
            .get_json("checkRemoteStart", &[("driverName", driver_name)])
            .await?;
        Ok(wire.into())
    }

    async fn get_history(&self, vehicle: &str) -> OfficeResult<Vec<VehicleUsage>> {
        self.get_list::<WireUsage, _>("getHistory", &[("targa", vehicle)])
            .await
    }

    async fn get_driver_history(&self, employee_id: &EmployeeId) -> OfficeResult<Vec<DriverShift>> {
        self.get_list::<WireDriverShift, _>(
            "getDriverHistory",
            &[("matricola", employee_id.as_str())],
        )
        .await
    }

    async fn get_stations(&self) -> OfficeResult<Vec<Station>> {
        self.get_list::<WireStation, _>("getStations", &[]).await
    }

    async fn push(&self, event: &OutboundEvent) -> OfficeResult<()> {
        let body = wire::push_body(event);

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(map_transport)?;

        let text = check_response(response).await?;

        // The script may answer with plain text; only a JSON error rejects
        if let Ok(value) = serde_json::from_str::<Value>(&text) {
            if let Some(message) = wire::error_message(&value) {
                return Err(OfficeError::Rejected(message));
            }
        }

        debug!(
            key = %event.idempotency_key,
            action = %event.action(),
            "Outbound record delivered"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response and hand back the request head
    async fn serve_once(
        status: &'static str,
        body: &'static str,
    ) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 8192];
            let n = socket.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();

            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request
        });

        (format!("http://{}/exec", addr), handle)
    }

    #[tokio::test]
    async fn get_driver_found() {
        let (url, server) = serve_once("200 OK", r#"{"found":true,"nome":"Mario Rossi"}"#).await;
        let office = HttpOffice::new(url, Duration::from_secs(5)).unwrap();

        let driver = office
            .get_driver(&EmployeeId::new("12345"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(driver.name, "Mario Rossi");

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /exec?action=getDriver&matricola=12345"));
    }

    #[tokio::test]
    async fn get_driver_not_found() {
        let (url, _server) = serve_once("200 OK", r#"{"found":false}"#).await;
        let office = HttpOffice::new(url, Duration::from_secs(5)).unwrap();

        assert!(office
            .get_driver(&EmployeeId::new("000"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn error_body_is_rejected() {
        let (url, _server) = serve_once("200 OK", r#"{"error":"foglio non trovato"}"#).await;
        let office = HttpOffice::new(url, Duration::from_secs(5)).unwrap();

        let err = office.get_stations().await.unwrap_err();
        assert!(matches!(err, OfficeError::Rejected(m) if m == "foglio non trovato"));
    }

    #[tokio::test]
    async fn server_error_status() {
        let (url, _server) = serve_once("500 Internal Server Error", "oops").await;
        let office = HttpOffice::new(url, Duration::from_secs(5)).unwrap();

        let err = office.get_vehicles().await.unwrap_err();
        assert!(matches!(err, OfficeError::Status(500)));
    }

    #[tokio::test]
    async fn unreachable_endpoint() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let office = HttpOffice::new(format!("http://{}/exec", addr), Duration::from_secs(2)).unwrap();
        assert!(office.check_remote_start("Mario Rossi").await.is_err());
    }
}
