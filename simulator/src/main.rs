mod telemetry;

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use clap::Parser;
use rand::Rng;
use serde_json::Value;
use std::sync::Arc;
use telemetry::{DeviceInfo, Location, Payload, RxInfo, Uplink};
use tracing::{debug, info};

/// Serves randomized sensor-network snapshots for local ingestor runs.
#[derive(Debug, Clone, Parser)]
#[command(name = "lora-simulator")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "SIM_ADDR", default_value = "0.0.0.0:8090")]
    addr: String,

    /// Number of simulated devices
    #[arg(long, env = "DEVICES", default_value_t = 20)]
    devices: usize,

    /// Number of gateways the devices are spread over
    #[arg(long, env = "GATEWAYS", default_value_t = 3)]
    gateways: usize,

    /// Probability that a reading reports smoke
    #[arg(long, env = "SMOKE_PROBABILITY", default_value_t = 0.01)]
    smoke_probability: f64,

    /// Probability that a reading is abnormally hot
    #[arg(long, env = "HOT_PROBABILITY", default_value_t = 0.02)]
    hot_probability: f64,

    /// Probability that a reading is missing its session address
    #[arg(long, env = "ORPHAN_PROBABILITY", default_value_t = 0.0)]
    orphan_probability: f64,

    /// Answer with a single object instead of a list
    #[arg(long, env = "SINGLE", default_value_t = false)]
    single: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    info!("Starting LoRa Simulator");
    info!(
        "Devices: {}, Gateways: {}, smoke p={}, hot p={}, single={}",
        args.devices, args.gateways, args.smoke_probability, args.hot_probability, args.single
    );

    let addr = args.addr.clone();
    let app = Router::new()
        .route("/live", get(live))
        .with_state(Arc::new(args));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Serving snapshots on http://{}/live", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

async fn live(State(args): State<Arc<Args>>) -> Json<Value> {
    let snapshot = generate_snapshot(&args);
    debug!("Serving snapshot of {} reading(s)", snapshot.len());

    let body = if args.single {
        snapshot
            .into_iter()
            .next()
            .map(|u| serde_json::to_value(u).unwrap_or(Value::Null))
            .unwrap_or(Value::Null)
    } else {
        serde_json::to_value(snapshot).unwrap_or(Value::Array(Vec::new()))
    };
    Json(body)
}

fn generate_snapshot(args: &Args) -> Vec<Uplink> {
    let mut rng = rand::thread_rng();
    let count = if args.single { 1 } else { args.devices };
    (0..count)
        .map(|_| {
            let device = rng.gen_range(0..args.devices.max(1));
            generate_uplink(&mut rng, args, device)
        })
        .collect()
}

fn generate_uplink(rng: &mut impl Rng, args: &Args, device: usize) -> Uplink {
    let now = Utc::now();
    let gateway = device % args.gateways.max(1);

    let temperature_c: f64 = if rng.gen_bool(args.hot_probability.clamp(0.0, 1.0)) {
        rng.gen_range(70.0..120.0) // Hot outlier
    } else {
        rng.gen_range(10.0..35.0) // Normal range
    };

    let dev_addr = if rng.gen_bool(args.orphan_probability.clamp(0.0, 1.0)) {
        None
    } else {
        Some(format!("{:08x}", 0x0100_0000 + device))
    };

    Uplink {
        dev_addr,
        device_info: DeviceInfo {
            dev_eui: format!("70b3d57ed0{:06x}", device),
        },
        time: now.to_rfc3339(),
        rx_info: vec![RxInfo {
            gateway_id: format!("gw-{:04}", gateway),
            rssi: rng.gen_range(-120..-60),
            snr: rng.gen_range(-10.0..12.0),
            location: Location {
                latitude: 34.0 + gateway as f64 * 0.05,
                longitude: -118.3 + gateway as f64 * 0.05,
                altitude: rng.gen_range(50.0..400.0),
            },
        }],
        object: Payload {
            battery_level: rng.gen_range(20.0..100.0),
            humidity: rng.gen_range(10.0..80.0),
            smoke_detected: u8::from(rng.gen_bool(args.smoke_probability.clamp(0.0, 1.0))),
            temperature: (temperature_c * 100.0).round() as i64,
            timestamp: now.timestamp(),
        },
    }
}
