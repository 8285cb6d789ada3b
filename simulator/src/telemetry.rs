use serde::Serialize;

/// One uplink in the shape the network server's live endpoint reports.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Uplink {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dev_addr: Option<String>,
    pub device_info: DeviceInfo,
    pub time: String,
    pub rx_info: Vec<RxInfo>,
    pub object: Payload,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub dev_eui: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RxInfo {
    pub gateway_id: String,
    pub rssi: i32,
    pub snr: f64,
    pub location: Location,
}

#[derive(Debug, Clone, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

/// Decoded application payload. Temperature is in hundredths of a degree.
#[derive(Debug, Clone, Serialize)]
pub struct Payload {
    pub battery_level: f64,
    pub humidity: f64,
    pub smoke_detected: u8,
    pub temperature: i64,
    pub timestamp: i64,
}
