use crate::metrics::{READINGS_RECEIVED_TOTAL, READINGS_SKIPPED_TOTAL};
use crate::model::TelemetryRecord;
use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde_json::Value;
use tracing::debug;

/// Raw temperature is reported in hundredths of a degree Celsius.
const TEMPERATURE_SCALE: f64 = 100.0;

/// Years a `timestamptz` column accepts without complaint.
const MIN_YEAR: i32 = 1;
const MAX_YEAR: i32 = 9999;

/// Maps one raw uplink onto a `TelemetryRecord`.
///
/// Returns `None` when the reading has no usable session address; such
/// readings are never persisted. Every other field degrades to `None`
/// (or `false` for the smoke flag) when absent or malformed.
pub fn normalize(raw: &Value) -> Option<TelemetryRecord> {
    let obj = raw.as_object()?;

    let node_id = obj
        .get("devAddr")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.contains('\0'))?;

    let mut record = TelemetryRecord::new(node_id);

    record.device_eui = as_text(raw.pointer("/deviceInfo/devEui"));
    record.network_timestamp = parse_rfc3339(obj.get("time"));

    // Only the first receiving gateway is kept.
    if let Some(rx) = raw.pointer("/rxInfo/0").and_then(Value::as_object) {
        record.gateway_id = as_text(rx.get("gatewayId"));
        record.rssi = as_f64(rx.get("rssi"));
        record.snr = as_f64(rx.get("snr"));
        if let Some(loc) = rx.get("location") {
            record.latitude = as_f64(loc.get("latitude"));
            record.longitude = as_f64(loc.get("longitude"));
            record.altitude = as_f64(loc.get("altitude"));
        }
    }

    if let Some(payload) = obj.get("object").and_then(Value::as_object) {
        record.battery_level = as_f64(payload.get("battery_level"));
        record.humidity_pct = as_f64(payload.get("humidity"));
        record.temperature_c = as_f64(payload.get("temperature")).map(|t| t / TEMPERATURE_SCALE);
        record.smoke_detected = is_truthy(payload.get("smoke_detected"));
        record.device_timestamp = parse_unix_epoch(payload.get("timestamp"));
    }

    Some(record)
}

/// Normalizes a whole snapshot. Unusable readings are dropped and counted;
/// they never affect the rest of the batch.
pub fn normalize_batch(raws: &[Value]) -> Vec<TelemetryRecord> {
    READINGS_RECEIVED_TOTAL.inc_by(raws.len() as f64);

    raws.iter()
        .filter_map(|raw| {
            let record = normalize(raw);
            if record.is_none() {
                READINGS_SKIPPED_TOTAL.inc();
                debug!("Skipping reading without session address");
            }
            record
        })
        .collect()
}

/// RFC3339 with a literal `Z` accepted as UTC. Offset-less timestamps are
/// taken to be UTC.
fn parse_rfc3339(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let s = value?.as_str()?.trim();
    if s.is_empty() {
        return None;
    }
    let parsed = match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(_) => NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()?
            .and_utc(),
    };
    in_storable_range(parsed)
}

/// Integer unix seconds, given as a JSON integer, an integral float or a
/// numeric string.
fn parse_unix_epoch(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let secs = match value? {
        Value::Number(n) => match n.as_i64() {
            Some(i) => i,
            None => {
                let f = n.as_f64()?;
                if f.fract() != 0.0 || !f.is_finite() || f.abs() > i64::MAX as f64 {
                    return None;
                }
                f as i64
            }
        },
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    DateTime::from_timestamp(secs, 0).and_then(in_storable_range)
}

fn in_storable_range(dt: DateTime<Utc>) -> Option<DateTime<Utc>> {
    (MIN_YEAR..=MAX_YEAR).contains(&dt.year()).then_some(dt)
}

/// Non-empty text without NUL bytes, which `text` columns reject.
fn as_text(value: Option<&Value>) -> Option<String> {
    value?
        .as_str()
        .filter(|s| !s.is_empty() && !s.contains('\0'))
        .map(str::to_string)
}

fn as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => {
            let s = s.trim();
            !(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false"))
        }
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
    }
}
