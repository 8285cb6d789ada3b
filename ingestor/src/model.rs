use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Canonical telemetry reading, one row in `telemetry`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Session address of the device. Never empty.
    pub node_id: String,
    pub device_eui: Option<String>,
    pub gateway_id: Option<String>,
    /// When the network server received the uplink.
    pub network_timestamp: Option<DateTime<Utc>>,
    /// Device-local clock, independent of the network timestamp.
    pub device_timestamp: Option<DateTime<Utc>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub altitude: Option<f64>,
    pub temperature_c: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub battery_level: Option<f64>,
    pub rssi: Option<f64>,
    pub snr: Option<f64>,
    pub smoke_detected: bool,
}

impl TelemetryRecord {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            device_eui: None,
            gateway_id: None,
            network_timestamp: None,
            device_timestamp: None,
            latitude: None,
            longitude: None,
            altitude: None,
            temperature_c: None,
            humidity_pct: None,
            battery_level: None,
            rssi: None,
            snr: None,
            smoke_detected: false,
        }
    }

    /// Identity used for alert rate limiting. The device EUI survives
    /// session re-joins; the session address is only a fallback.
    pub fn alert_subject(&self) -> &str {
        self.device_eui.as_deref().unwrap_or(&self.node_id)
    }
}

/// Row in `nodes`. Overwritten on every re-observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct NodeRecord {
    pub node_id: String,
    pub device_eui: Option<String>,
    pub last_seen: Option<DateTime<Utc>>,
}

impl From<&TelemetryRecord> for NodeRecord {
    fn from(record: &TelemetryRecord) -> Self {
        Self {
            node_id: record.node_id.clone(),
            device_eui: record.device_eui.clone(),
            last_seen: record.network_timestamp,
        }
    }
}
