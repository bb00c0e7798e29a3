//! HTTP API and map page
//!
//! Routes:
//! - `GET /` - map page with highscore legend
//! - `GET /trackers` - leaderboard JSON
//! - `GET /geojson` - visited cells by tier as GeoJSON
//! - `GET /stats` - aggregate counters
//! - `GET /metrics` - Prometheus metrics
//! - `GET /health` - liveness

use crate::infra::metrics::Metrics;
use crate::io::geojson::feature_collection;
use crate::io::prometheus::format_prometheus_metrics;
use crate::services::query::{LeaderboardEntry, QueryService};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::fmt::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Shared state for request handlers
pub struct ApiState {
    pub query: QueryService,
    pub metrics: Arc<Metrics>,
    /// Initial map centre (lat, lng)
    pub map_center: (f64, f64),
}

fn respond(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", content_type)
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(body.into()))
        .expect("static response should not fail")
}

fn json_response(value: &impl serde::Serialize) -> Response<Full<Bytes>> {
    match serde_json::to_vec(value) {
        Ok(body) => respond(StatusCode::OK, "application/json", body),
        Err(e) => {
            error!(error = %e, "http_json_encode_failed");
            respond(StatusCode::INTERNAL_SERVER_ERROR, "text/plain", "encode error")
        }
    }
}

/// Dispatch a request to its view
pub fn route(method: &Method, path: &str, state: &ApiState) -> Response<Full<Bytes>> {
    match (method, path) {
        (&Method::GET, "/") => {
            let body = render_map_page(state);
            respond(StatusCode::OK, "text/html; charset=utf-8", body)
        }
        (&Method::GET, "/trackers") => json_response(&state.query.leaderboard()),
        (&Method::GET, "/geojson") => json_response(&feature_collection(&state.query.classify_cells())),
        (&Method::GET, "/stats") => json_response(&state.query.stats()),
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&state.metrics, &state.query.stats());
            respond(StatusCode::OK, "text/plain; version=0.0.4; charset=utf-8", body)
        }
        (&Method::GET, "/health") => respond(StatusCode::OK, "text/plain", "ok"),
        _ => respond(StatusCode::NOT_FOUND, "text/plain", "Not Found"),
    }
}

async fn handle_request(
    req: Request<hyper::body::Incoming>,
    state: Arc<ApiState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    debug!(method = %req.method(), path = %req.uri().path(), "http_request");
    Ok(route(req.method(), req.uri().path(), &state))
}

/// Minimal HTML escaping for user-supplied tracker names
fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn render_legend(board: &[LeaderboardEntry]) -> String {
    let mut lines = String::new();
    for entry in board {
        let _ = writeln!(
            lines,
            "&nbsp; {} [{}]: {} points &nbsp;<br>",
            escape_html(&entry.display_name),
            escape_html(entry.dev_eui.as_str()),
            entry.score
        );
    }
    let height = board.len() * 20 + 50;
    format!(
        r#"<div style="position: fixed; bottom: 20px; left: 20px; width: 400px; height: {height}px;
     border: 2px solid grey; z-index: 9999; font-size: 14px; background-color: white; opacity: 0.85;">
&nbsp; <b>Highscore</b><br>
{lines}</div>"#
    )
}

fn render_map_page(state: &ApiState) -> String {
    let (lat, lng) = state.map_center;
    let layer_name = format!("Wave-Mapping [{} cells]", state.query.visited_cell_count());
    let legend = render_legend(&state.query.leaderboard());

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>{layer_name}</title>
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>html, body, #map {{ height: 100%; margin: 0; }}</style>
</head>
<body>
<div id="map"></div>
{legend}
<script>
const map = L.map('map').setView([{lat}, {lng}], 13);
const osm = L.tileLayer('https://tile.openstreetmap.org/{{z}}/{{x}}/{{y}}.png', {{
  maxZoom: 19, attribution: '&copy; OpenStreetMap contributors'
}}).addTo(map);
const control = L.control.layers({{'OpenStreetMap': osm}}, {{}}).addTo(map);
fetch('/geojson').then(r => r.json()).then(data => {{
  if (!data) return;
  const layer = L.geoJSON(data, {{
    style: f => ({{ fillColor: f.properties.fill, color: f.properties.stroke }})
  }}).addTo(map);
  control.addOverlay(layer, {layer_name:?});
}});
</script>
</body>
</html>
"#
    )
}

/// Start the HTTP server
pub async fn start_http_server(
    bind_address: &str,
    port: u16,
    state: Arc<ApiState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr: SocketAddr = format!("{bind_address}:{port}").parse()?;
    let listener = TcpListener::bind(addr).await?;

    info!(addr = %addr, "http_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();
                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });
                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "http_connection_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "http_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("http_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::grid::GridIndex;
    use crate::domain::types::DevEui;
    use crate::services::store::ExplorationStore;
    use h3o::Resolution;
    use http_body_util::BodyExt;

    fn state() -> (ApiState, Arc<ExplorationStore>) {
        let store = Arc::new(ExplorationStore::new());
        let query = QueryService::new(store.clone(), GridIndex::new(Resolution::Eight));
        (ApiState { query, metrics: Arc::new(Metrics::new()), map_center: (47.5, 7.6) }, store)
    }

    async fn body_string(response: Response<Full<Bytes>>) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn seed(store: &ExplorationStore) {
        let grid = GridIndex::new(Resolution::Eight);
        let eui = DevEui::new("a840411f61847b6c");
        store.upsert_tracker_if_absent(&eui, "<script>").unwrap();
        let cell = grid.cell_of(47.5442, 7.5886).unwrap();
        store.claim_and_credit(cell, 1, 0, &eui).unwrap();
    }

    #[tokio::test]
    async fn test_health() {
        let (state, _) = state();
        let response = route(&Method::GET, "/health", &state);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "ok");
    }

    #[tokio::test]
    async fn test_not_found() {
        let (state, _) = state();
        assert_eq!(route(&Method::GET, "/nope", &state).status(), StatusCode::NOT_FOUND);
        assert_eq!(route(&Method::POST, "/trackers", &state).status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_trackers_json() {
        let (state, store) = state();
        seed(&store);

        let body = body_string(route(&Method::GET, "/trackers", &state)).await;
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed[0]["dev_eui"], "a840411f61847b6c");
        assert_eq!(parsed[0]["score"], 1);
    }

    #[tokio::test]
    async fn test_geojson_null_when_empty() {
        let (state, _) = state();
        let body = body_string(route(&Method::GET, "/geojson", &state)).await;
        assert_eq!(body, "null");
    }

    #[tokio::test]
    async fn test_geojson_and_stats() {
        let (state, store) = state();
        seed(&store);

        let body = body_string(route(&Method::GET, "/geojson", &state)).await;
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["features"].as_array().unwrap().len(), 3);

        let body = body_string(route(&Method::GET, "/stats", &state)).await;
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed["visited_cells"], 1);
        assert_eq!(parsed["total_score"], 1);
    }

    #[tokio::test]
    async fn test_map_page_escapes_names() {
        let (state, store) = state();
        seed(&store);

        let body = body_string(route(&Method::GET, "/", &state)).await;
        assert!(body.contains("Wave-Mapping [1 cells]"));
        assert!(body.contains("&lt;script&gt; [a840411f61847b6c]: 1 points"));
        assert!(!body.contains("<script> ["));
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let (state, store) = state();
        seed(&store);
        let body = body_string(route(&Method::GET, "/metrics", &state)).await;
        assert!(body.contains("wavemap_visited_cells 1"));
    }
}
