use crate::errors::{Error, Result};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Pulls the current snapshot from the upstream sensor-network API.
pub struct Fetcher {
    client: reqwest::Client,
    url: String,
}

impl Fetcher {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// One GET, no retry. Retrying is left to the next poll tick.
    pub async fn fetch(&self) -> Result<Vec<Value>> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        let readings = into_readings(body)?;
        debug!("Fetched {} reading(s) from {}", readings.len(), self.url);
        Ok(readings)
    }
}

/// The endpoint may answer with a single reading or a list of them.
pub fn into_readings(body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Array(items) => Ok(items),
        Value::Object(_) => Ok(vec![body]),
        other => Err(Error::UnexpectedPayload(format!(
            "expected a JSON object or array, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves exactly one canned HTTP response on an ephemeral port.
    async fn serve_once(status_line: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status_line,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}/live", addr)
    }

    #[test]
    fn test_single_object_is_wrapped() {
        let readings = into_readings(json!({ "devAddr": "01ab23cd" })).unwrap();
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0]["devAddr"], "01ab23cd");
    }

    #[test]
    fn test_array_passes_through() {
        let readings = into_readings(json!([{ "devAddr": "a" }, { "devAddr": "b" }])).unwrap();
        assert_eq!(readings.len(), 2);
    }

    #[test]
    fn test_scalar_body_is_rejected() {
        assert!(matches!(
            into_readings(json!("hello")),
            Err(Error::UnexpectedPayload(_))
        ));
        assert!(into_readings(Value::Null).is_err());
    }

    #[tokio::test]
    async fn test_fetch_single_object() {
        let url = serve_once("200 OK", r#"{"devAddr":"01ab23cd"}"#).await;
        let fetcher = Fetcher::new(url, Duration::from_secs(5)).unwrap();

        let readings = fetcher.fetch().await.unwrap();
        assert_eq!(readings.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_non_success_status() {
        let url = serve_once("503 Service Unavailable", "{}").await;
        let fetcher = Fetcher::new(url, Duration::from_secs(5)).unwrap();

        let err = fetcher.fetch().await.unwrap_err();
        assert!(err.is_fetch());
    }

    #[tokio::test]
    async fn test_fetch_unparsable_body() {
        let url = serve_once("200 OK", "not json").await;
        let fetcher = Fetcher::new(url, Duration::from_secs(5)).unwrap();

        assert!(fetcher.fetch().await.unwrap_err().is_fetch());
    }
}
