//! Embedded MQTT broker using rumqttd, for running without ChirpStack's broker
//!
//! Only the v4 listener is enabled. Uplinks are small JSON documents, so the
//! payload limit is kept low.

use crate::infra::config::Config as AppConfig;
use rumqttd::{Broker, Config, ConnectionSettings, RouterConfig, ServerSettings};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

/// Largest accepted uplink payload
const MAX_UPLINK_PAYLOAD: usize = 16 * 1024;

fn listener(listen: SocketAddr) -> ServerSettings {
    ServerSettings {
        name: "wavemap-v4".to_string(),
        listen,
        tls: None,
        next_connection_delay_ms: 1,
        connections: ConnectionSettings {
            connection_timeout_ms: 5000,
            max_payload_size: MAX_UPLINK_PAYLOAD,
            max_inflight_count: 100,
            auth: None,
            dynamic_filters: false,
            external_auth: None,
        },
    }
}

/// Broker settings for the configured bind address.
///
/// `None` when the broker is disabled or the address does not parse.
pub fn broker_config(app_config: &AppConfig) -> Option<Config> {
    if !app_config.broker_enabled() {
        return None;
    }

    let addr = format!("{}:{}", app_config.broker_bind_address(), app_config.broker_port());
    let listen: SocketAddr = match addr.parse() {
        Ok(listen) => listen,
        Err(e) => {
            warn!(error = %e, addr = %addr, "broker_invalid_bind_address");
            return None;
        }
    };

    let router = RouterConfig {
        max_segment_size: 1024 * 1024,
        max_segment_count: 4,
        max_connections: 256,
        max_outgoing_packet_count: 100,
        initialized_filters: None,
        ..Default::default()
    };

    Some(Config {
        id: 0,
        router,
        v4: Some(HashMap::from([("v4".to_string(), listener(listen))])),
        v5: None,
        ws: None,
        prometheus: None,
        metrics: None,
        bridge: None,
        console: None,
        cluster: None,
    })
}

/// Start the embedded MQTT broker if enabled in config
pub fn start_embedded_broker(app_config: &AppConfig) {
    let Some(config) = broker_config(app_config) else {
        return;
    };

    thread::spawn(move || {
        // start() blocks for the broker's lifetime
        if let Err(e) = Broker::new(config).start() {
            warn!(error = %e, "broker_start_failed");
        }
    });

    // Let the listener bind before the MQTT client connects to it
    thread::sleep(Duration::from_millis(100));
    info!(
        bind_address = %app_config.broker_bind_address(),
        port = %app_config.broker_port(),
        "broker_started"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_broker_has_no_config() {
        assert!(broker_config(&AppConfig::default()).is_none());
        // Must return without binding
        start_embedded_broker(&AppConfig::default());
    }

    #[test]
    fn test_dev_config_enables_v4_listener() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/dev.toml");
        let app_config = AppConfig::from_file(path).unwrap();

        let config = broker_config(&app_config).unwrap();
        let servers = config.v4.unwrap();
        let server = &servers["v4"];
        assert_eq!(server.listen.port(), 1883);
        assert_eq!(server.connections.max_payload_size, MAX_UPLINK_PAYLOAD);
    }
}
