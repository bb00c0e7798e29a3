//! Tracker simulator - publishes random-walk uplinks for local testing
//!
//! Each simulated tracker starts near the configured map centre and moves a
//! random step per tick. Every `no_fix_every`-th uplink carries no location,
//! like a T1000 reporting battery only.
//!
//! Usage:
//!   cargo run --bin wavemap-sim -- --config config/dev.toml --trackers 3

use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::json;
use std::time::Duration;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wavemap::infra::Config;

/// Metres per degree of latitude
const METERS_PER_DEG: f64 = 111_320.0;

#[derive(Parser, Debug)]
#[command(name = "wavemap-sim")]
#[command(about = "Publish simulated tracker uplinks to the configured MQTT broker")]
struct Args {
    /// Config file path (broker, topic and map centre are taken from it)
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,

    /// Number of simulated trackers
    #[arg(long, default_value = "3")]
    trackers: usize,

    /// Milliseconds between ticks
    #[arg(long, default_value = "1000")]
    interval_ms: u64,

    /// Maximum step length per tick in metres
    #[arg(long, default_value = "250")]
    step_m: f64,

    /// Stop after this many ticks (0 = run forever)
    #[arg(long, default_value = "0")]
    ticks: u64,

    /// Every n-th uplink has no GPS fix (0 = never)
    #[arg(long, default_value = "10")]
    no_fix_every: u64,

    /// RNG seed for reproducible walks
    #[arg(long, default_value = "1")]
    seed: u64,
}

struct SimTracker {
    dev_eui: String,
    name: String,
    lat: f64,
    lng: f64,
}

impl SimTracker {
    fn step(&mut self, rng: &mut StdRng, max_step_m: f64) {
        let heading: f64 = rng.gen_range(0.0..std::f64::consts::TAU);
        let dist = rng.gen_range(0.0..=max_step_m);
        let dlat = dist * heading.cos() / METERS_PER_DEG;
        let dlng = dist * heading.sin() / (METERS_PER_DEG * self.lat.to_radians().cos().max(0.01));
        self.lat = (self.lat + dlat).clamp(-89.9, 89.9);
        self.lng = ((self.lng + dlng + 540.0) % 360.0) - 180.0;
    }

    fn uplink(&self, with_fix: bool) -> serde_json::Value {
        let time = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
        let object = if with_fix {
            json!({ "latitude": self.lat, "longitude": self.lng, "battery": 90 })
        } else {
            json!({ "battery": 90 })
        };
        json!({
            "time": time,
            "deviceInfo": { "devEui": self.dev_eui, "deviceName": self.name },
            "fPort": 5,
            "object": object,
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    let mut mqtt_options = MqttOptions::new(
        format!("wavemap-sim-{}", std::process::id()),
        config.mqtt_host(),
        config.mqtt_port(),
    );
    mqtt_options.set_keep_alive(Duration::from_secs(30));
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqtt_options.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqtt_options, 100);
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => info!("sim_mqtt_connected"),
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "sim_mqtt_error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    let mut rng = StdRng::seed_from_u64(args.seed);
    let (center_lat, center_lng) = config.map_center();
    let mut trackers: Vec<SimTracker> = (0..args.trackers)
        .map(|i| SimTracker {
            dev_eui: format!("a84041{:010x}", i),
            name: format!("sim-{}", i + 1),
            lat: center_lat,
            lng: center_lng,
        })
        .collect();

    info!(trackers = %trackers.len(), topic = %config.mqtt_topic(), "sim_started");

    let mut interval = tokio::time::interval(Duration::from_millis(args.interval_ms.max(1)));
    let mut sent: u64 = 0;
    let mut tick: u64 = 0;
    loop {
        interval.tick().await;
        tick += 1;

        for tracker in trackers.iter_mut() {
            tracker.step(&mut rng, args.step_m);
            sent += 1;
            let with_fix = args.no_fix_every == 0 || sent % args.no_fix_every != 0;
            let payload = tracker.uplink(with_fix).to_string();
            if let Err(e) = client.publish(config.mqtt_topic(), QoS::AtMostOnce, false, payload).await {
                warn!(error = %e, "sim_publish_failed");
            }
        }

        if args.ticks > 0 && tick >= args.ticks {
            break;
        }
    }

    // Let the eventloop flush outstanding publishes
    tokio::time::sleep(Duration::from_millis(500)).await;
    info!(uplinks = %sent, "sim_finished");
    Ok(())
}
