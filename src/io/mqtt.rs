//! MQTT client for receiving tracker uplinks from ChirpStack

use crate::domain::types::{epoch_ms, DevEui, LocationReport, UplinkMessage};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::uplink_log::UplinkLog;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Start the MQTT client and forward decoded location reports to the pipeline
///
/// Reports are sent via try_send to avoid blocking the MQTT eventloop.
/// Dropped reports are counted in metrics and logged (rate-limited).
pub async fn start_mqtt_client(
    config: &Config,
    report_tx: mpsc::Sender<LocationReport>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
    uplink_log: Option<UplinkLog>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut mqttoptions =
        MqttOptions::new(config.mqtt_client_id(), config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }
    if config.mqtt_tls() {
        mqttoptions.set_transport(Transport::tls_with_default_config());
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    let topic = config.mqtt_topic().to_string();

    info!(topic = %topic, host = %config.mqtt_host(), port = %config.mqtt_port(), tls = %config.mqtt_tls(), "mqtt_client_starting");

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let Some(report) =
                            accept_payload(&publish.payload, epoch_ms(), uplink_log.as_ref())
                        else {
                            metrics.record_report_malformed();
                            continue;
                        };

                        metrics.record_report_received();
                        if report.fix().is_some() {
                            debug!(dev_eui = %report.dev_eui, lat = ?report.latitude, lon = ?report.longitude, "uplink_with_location");
                        } else {
                            debug!(dev_eui = %report.dev_eui, "uplink_without_location");
                        }

                        if let Err(e) = report_tx.try_send(report) {
                            match e {
                                TrySendError::Full(_) => {
                                    metrics.record_report_dropped();
                                    if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                        warn!("mqtt_report_dropped: channel full");
                                        last_drop_warn = Instant::now();
                                    }
                                }
                                TrySendError::Closed(_) => {
                                    warn!("Report channel closed");
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // Subscriptions do not survive a clean-session reconnect
                        info!("mqtt_connected");
                        if let Err(e) = client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                            error!(error = %e, topic = %topic, "mqtt_subscribe_failed");
                        } else {
                            info!(topic = %topic, "mqtt_subscribed");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "MQTT error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// Decode one MQTT payload, appending it to the uplink log once it parses
fn accept_payload(
    payload: &[u8],
    received_at_ms: u64,
    uplink_log: Option<&UplinkLog>,
) -> Option<LocationReport> {
    let json_str = match std::str::from_utf8(payload) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "Invalid UTF-8 in MQTT payload");
            return None;
        }
    };

    let report = parse_uplink(json_str, received_at_ms)?;
    if let Some(log) = uplink_log {
        log.write(json_str);
    }
    Some(report)
}

/// Decode a ChirpStack uplink into a location report
///
/// Returns `None` for payloads that are not uplink events. Uplinks without a
/// decoded location (joins, battery-only messages) still produce a report.
pub fn parse_uplink(json_str: &str, received_at_ms: u64) -> Option<LocationReport> {
    let message: UplinkMessage = match serde_json::from_str(json_str) {
        Ok(m) => m,
        Err(e) => {
            debug!(error = %e, "Failed to parse uplink message");
            return None;
        }
    };

    if message.device_info.dev_eui.is_empty() {
        debug!("uplink_without_dev_eui");
        return None;
    }

    let timestamp = message.time.as_deref().and_then(parse_iso_time).unwrap_or(received_at_ms);
    let object = message.object.unwrap_or_default();

    Some(LocationReport {
        dev_eui: DevEui(message.device_info.dev_eui),
        display_name: message.device_info.device_name,
        latitude: object.latitude,
        longitude: object.longitude,
        timestamp,
    })
}

/// Parse RFC 3339 timestamp to epoch milliseconds
fn parse_iso_time(time_str: &str) -> Option<u64> {
    OffsetDateTime::parse(time_str, &Rfc3339)
        .ok()
        .and_then(|dt| u64::try_from(dt.unix_timestamp_nanos() / 1_000_000).ok())
}
