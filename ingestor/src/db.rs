use crate::errors::Result;
use crate::model::{NodeRecord, TelemetryRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::{debug, info};

pub async fn make_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    info!("Database connection established");
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Migrations completed");

    Ok(pool)
}

/// Durable sink for one poll cycle's records.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Writes the batch all-or-nothing.
    async fn persist_batch(&self, batch: &[TelemetryRecord]) -> Result<()>;
}

/// What one batch writes to each table.
#[derive(Debug, PartialEq)]
pub struct BatchPlan<'a> {
    /// One entry per distinct node, in first-seen order, carrying the
    /// values of the last record for that node.
    pub nodes: Vec<NodeRecord>,
    pub gateways: Vec<&'a str>,
    pub telemetry: &'a [TelemetryRecord],
}

/// Collapses the batch so the multi-row node upsert never touches the same
/// key twice, which PostgreSQL rejects inside a single statement.
pub fn plan_batch(batch: &[TelemetryRecord]) -> BatchPlan<'_> {
    let mut nodes: Vec<NodeRecord> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for record in batch {
        match index.get(record.node_id.as_str()) {
            Some(&i) => nodes[i] = NodeRecord::from(record),
            None => {
                index.insert(record.node_id.as_str(), nodes.len());
                nodes.push(NodeRecord::from(record));
            }
        }
    }

    let gateways: BTreeSet<&str> = batch
        .iter()
        .filter_map(|r| r.gateway_id.as_deref())
        .collect();

    BatchPlan {
        nodes,
        gateways: gateways.into_iter().collect(),
        telemetry: batch,
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TelemetryStore for PgStore {
    async fn persist_batch(&self, batch: &[TelemetryRecord]) -> Result<()> {
        insert_batch(&self.pool, batch).await
    }
}

/// Upserts nodes, inserts new gateways and appends telemetry in one
/// transaction. Any failure rolls the whole batch back.
pub async fn insert_batch(pool: &PgPool, batch: &[TelemetryRecord]) -> Result<()> {
    if batch.is_empty() {
        return Ok(());
    }

    let plan = plan_batch(batch);
    let mut tx = pool.begin().await?;

    upsert_nodes(&mut tx, &plan.nodes).await?;
    insert_gateways(&mut tx, &plan.gateways).await?;
    append_telemetry(&mut tx, plan.telemetry).await?;

    tx.commit().await?;
    debug!(
        "Committed {} node(s), {} gateway(s), {} telemetry row(s)",
        plan.nodes.len(),
        plan.gateways.len(),
        plan.telemetry.len()
    );
    Ok(())
}

/// Last write wins: no comparison against the stored `last_seen`.
async fn upsert_nodes(conn: &mut PgConnection, nodes: &[NodeRecord]) -> Result<()> {
    let node_ids: Vec<&str> = nodes.iter().map(|n| n.node_id.as_str()).collect();
    let device_euis: Vec<Option<&str>> = nodes.iter().map(|n| n.device_eui.as_deref()).collect();
    let last_seen: Vec<Option<DateTime<Utc>>> = nodes.iter().map(|n| n.last_seen).collect();

    let query = r#"
        INSERT INTO nodes (node_id, device_eui, last_seen)
        SELECT * FROM UNNEST($1::text[], $2::text[], $3::timestamptz[])
        ON CONFLICT (node_id) DO UPDATE
        SET device_eui = EXCLUDED.device_eui,
            last_seen  = EXCLUDED.last_seen
        "#;

    sqlx::query(query)
        .bind(&node_ids)
        .bind(&device_euis)
        .bind(&last_seen)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

async fn insert_gateways(conn: &mut PgConnection, gateways: &[&str]) -> Result<()> {
    if gateways.is_empty() {
        return Ok(());
    }

    let query = r#"
        INSERT INTO gateways (gateway_id)
        SELECT * FROM UNNEST($1::text[])
        ON CONFLICT (gateway_id) DO NOTHING
        "#;

    sqlx::query(query)
        .bind(gateways)
        .execute(&mut *conn)
        .await?;

    Ok(())
}

async fn append_telemetry(conn: &mut PgConnection, batch: &[TelemetryRecord]) -> Result<()> {
    let node_ids: Vec<&str> = batch.iter().map(|t| t.node_id.as_str()).collect();
    let gateway_ids: Vec<Option<&str>> = batch.iter().map(|t| t.gateway_id.as_deref()).collect();
    let timestamps: Vec<Option<DateTime<Utc>>> = batch.iter().map(|t| t.network_timestamp).collect();
    let device_timestamps: Vec<Option<DateTime<Utc>>> =
        batch.iter().map(|t| t.device_timestamp).collect();
    let latitudes: Vec<Option<f64>> = batch.iter().map(|t| t.latitude).collect();
    let longitudes: Vec<Option<f64>> = batch.iter().map(|t| t.longitude).collect();
    let altitudes: Vec<Option<f64>> = batch.iter().map(|t| t.altitude).collect();
    let temperatures: Vec<Option<f64>> = batch.iter().map(|t| t.temperature_c).collect();
    let humidities: Vec<Option<f64>> = batch.iter().map(|t| t.humidity_pct).collect();
    let batteries: Vec<Option<f64>> = batch.iter().map(|t| t.battery_level).collect();
    let rssis: Vec<Option<f64>> = batch.iter().map(|t| t.rssi).collect();
    let snrs: Vec<Option<f64>> = batch.iter().map(|t| t.snr).collect();
    let smoke: Vec<bool> = batch.iter().map(|t| t.smoke_detected).collect();

    let query = r#"
        INSERT INTO telemetry
            (node_id, gateway_id, timestamp, device_timestamp,
             latitude, longitude, altitude,
             temperature_c, humidity_pct, battery_level,
             rssi, snr, smoke_detected)
        SELECT * FROM UNNEST(
            $1::text[], $2::text[], $3::timestamptz[], $4::timestamptz[],
            $5::float8[], $6::float8[], $7::float8[],
            $8::float8[], $9::float8[], $10::float8[],
            $11::float8[], $12::float8[], $13::bool[])
        "#;

    sqlx::query(query)
        .bind(&node_ids)
        .bind(&gateway_ids)
        .bind(&timestamps)
        .bind(&device_timestamps)
        .bind(&latitudes)
        .bind(&longitudes)
        .bind(&altitudes)
        .bind(&temperatures)
        .bind(&humidities)
        .bind(&batteries)
        .bind(&rssis)
        .bind(&snrs)
        .bind(&smoke)
        .execute(&mut *conn)
        .await?;

    Ok(())
}
