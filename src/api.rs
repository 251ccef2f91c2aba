use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::dispatcher::{DispatchResult, Dispatcher, Reply};
use crate::error::DispatchError;
use crate::registry::params::{HelpParams, InvokeParams, RawParams, Request};
use crate::transport::TransportStats;
use crate::registry::{catalog, CommandCategory};

// ── Response types ───────────────────────────────────────────────

#[derive(Serialize)]
struct ApiOk<T: Serialize> {
    ok: bool,
    data: T,
}

#[derive(Serialize)]
struct ApiErr {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<DispatchResult>,
}

fn ok_json<T: Serialize>(data: T) -> Response {
    Json(ApiOk { ok: true, data }).into_response()
}

fn err_json(status: StatusCode, msg: String) -> Response {
    (
        status,
        Json(ApiErr {
            ok: false,
            error: msg,
            result: None,
        }),
    )
        .into_response()
}

/// HTTP status for a failed dispatch.
pub fn status_for(error: &DispatchError) -> StatusCode {
    match error {
        DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
        DispatchError::RangeError { .. }
        | DispatchError::TypeError { .. }
        | DispatchError::EncodeError(_) => StatusCode::BAD_REQUEST,
        DispatchError::TransportError(_) => StatusCode::BAD_GATEWAY,
    }
}

fn dispatch_response(result: DispatchResult) -> Response {
    match result.error() {
        None => ok_json(result),
        Some(error) => {
            let status = status_for(error);
            let message = error.to_string();
            (
                status,
                Json(ApiErr {
                    ok: false,
                    error: message,
                    result: Some(result),
                }),
            )
                .into_response()
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CommandsQuery {
    category: Option<String>,
}

async fn get_commands(
    Extension(dispatcher): Extension<Arc<Dispatcher>>,
    Query(query): Query<CommandsQuery>,
) -> Response {
    match query.category.as_deref() {
        None => ok_json(catalog::grouped_addresses(dispatcher.registry())),
        Some(slug) => match CommandCategory::from_slug(slug) {
            Some(category) => ok_json(catalog::entries(dispatcher.registry(), Some(category))),
            None => err_json(StatusCode::NOT_FOUND, format!("Unknown category: {slug}")),
        },
    }
}

async fn get_help(
    Extension(dispatcher): Extension<Arc<Dispatcher>>,
    Query(params): Query<HelpParams>,
) -> Response {
    ok_json(catalog::help_text(dispatcher.registry(), params.topic.as_deref()))
}

async fn get_schema() -> Response {
    ok_json(catalog::to_json_schema())
}

#[derive(Serialize)]
struct Status {
    destination: String,
    commands: usize,
    version: &'static str,
    transport: TransportStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    idle_ms: Option<u64>,
}

async fn get_status(Extension(dispatcher): Extension<Arc<Dispatcher>>) -> Response {
    let stats = dispatcher.stats();
    ok_json(Status {
        destination: dispatcher.destination().to_string(),
        commands: dispatcher.registry().len(),
        version: env!("CARGO_PKG_VERSION"),
        idle_ms: stats.idle().map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
        transport: stats,
    })
}

async fn post_invoke(
    Extension(dispatcher): Extension<Arc<Dispatcher>>,
    Json(params): Json<InvokeParams>,
) -> Response {
    dispatch_response(
        dispatcher
            .invoke(&params.command, params.layer, params.value)
            .await,
    )
}

async fn post_raw(
    Extension(dispatcher): Extension<Arc<Dispatcher>>,
    Json(params): Json<RawParams>,
) -> Response {
    dispatch_response(dispatcher.send_raw(&params.address, &params.values).await)
}

async fn post_tool(
    Extension(dispatcher): Extension<Arc<Dispatcher>>,
    Path(name): Path<String>,
    Json(body): Json<Value>,
) -> Response {
    let request = match Request::from_tool_call(&name, &body) {
        Ok(request) => request,
        Err(e) => return err_json(StatusCode::BAD_REQUEST, e),
    };
    match dispatcher.execute(request).await {
        Reply::Dispatched(result) => dispatch_response(result),
        reply => ok_json(reply),
    }
}

// ── Server startup ───────────────────────────────────────────────

pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/api/commands", get(get_commands))
        .route("/api/help", get(get_help))
        .route("/api/schema", get(get_schema))
        .route("/api/status", get(get_status))
        .route("/api/invoke", post(post_invoke))
        .route("/api/raw", post(post_raw))
        .route("/api/tools/{name}", post(post_tool))
        .layer(CorsLayer::permissive())
        .layer(Extension(dispatcher))
}

/// Bind the HTTP API and serve it on a background task. Returns the bound
/// address (useful when `addr` has port 0).
pub async fn start_api_server(
    dispatcher: Arc<Dispatcher>,
    addr: SocketAddr,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), String> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind API server on {addr}: {e}"))?;
    let local = listener
        .local_addr()
        .map_err(|e| format!("Failed to get API server address: {e}"))?;

    let app = router(dispatcher);
    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server stopped");
        }
    });
    info!(address = %local, "API server listening");
    Ok((local, handle))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpStream, UdpSocket};

    use super::*;
    use crate::registry::Registry;

    async fn server() -> (SocketAddr, UdpSocket) {
        let synth = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let dispatcher = Dispatcher::udp(
            Arc::new(Registry::builtin().unwrap()),
            "127.0.0.1:0".parse().unwrap(),
            synth.local_addr().unwrap(),
        )
        .await
        .unwrap();
        let listen = "127.0.0.1:0".parse().unwrap();
        let (addr, _handle) = start_api_server(Arc::new(dispatcher), listen).await.unwrap();
        (addr, synth)
    }

    /// Minimal HTTP/1.1 exchange; returns (status, JSON body).
    async fn request(
        addr: SocketAddr,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> (u16, Value) {
        let body = body.map(|b| b.to_string()).unwrap_or_default();
        let raw = format!(
            "{method} {path} HTTP/1.1\r\n\
             Host: localhost\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n{body}",
            body.len()
        );
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(raw.as_bytes()).await.unwrap();
        let mut response = String::new();
        tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
            .await
            .expect("response in time")
            .unwrap();

        let status: u16 = response.split_whitespace().nth(1).unwrap().parse().unwrap();
        let json_start = response.find("\r\n\r\n").unwrap() + 4;
        let json = serde_json::from_str(&response[json_start..]).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn invoke_over_http_reaches_the_synth() {
        let (addr, synth) = server().await;
        let (status, json) = request(
            addr,
            "POST",
            "/api/invoke",
            Some(serde_json::json!({"command": "seqbpm", "value": 120})),
        )
        .await;
        assert_eq!(status, 200, "{json}");
        assert_eq!(json["ok"], true);
        assert_eq!(json["data"]["address"], "/polynodes/seqbpm");

        let mut buf = [0u8; 128];
        let (n, _) = tokio::time::timeout(Duration::from_secs(2), synth.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        let msg = crate::osc::OscMessage::decode(&buf[..n]).unwrap();
        assert_eq!(msg.address, "/polynodes/seqbpm");
    }

    #[tokio::test]
    async fn failures_map_to_status_codes() {
        let (addr, _synth) = server().await;
        let (status, json) = request(
            addr,
            "POST",
            "/api/invoke",
            Some(serde_json::json!({"command": "seqbpm", "value": 5})),
        )
        .await;
        assert_eq!(status, 400);
        assert_eq!(json["ok"], false);
        assert_eq!(json["result"]["error"]["code"], "RangeError");

        let (status, _) = request(
            addr,
            "POST",
            "/api/invoke",
            Some(serde_json::json!({"command": "nonexistent", "value": 1})),
        )
        .await;
        assert_eq!(status, 404);

        let (status, _) = request(
            addr,
            "POST",
            "/api/raw",
            Some(serde_json::json!({"address": "bad address", "values": [1]})),
        )
        .await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn listing_and_schema_are_served() {
        let (addr, _synth) = server().await;
        let (status, json) = request(addr, "GET", "/api/commands", None).await;
        assert_eq!(status, 200);
        assert!(json["data"]["camera"]["/polynodes/camzoom"].is_string());

        let (status, json) = request(addr, "GET", "/api/commands?category=tuning", None).await;
        assert_eq!(status, 200);
        assert_eq!(json["data"].as_array().unwrap().len(), 2);

        let (status, json) = request(addr, "GET", "/api/schema", None).await;
        assert_eq!(status, 200);
        assert_eq!(json["data"][1]["name"], "send_raw");
    }

    #[tokio::test]
    async fn tool_route_accepts_named_calls() {
        let (addr, _synth) = server().await;
        let (status, json) = request(
            addr,
            "POST",
            "/api/tools/send_raw",
            Some(serde_json::json!({"address": "/polynodes/custom/address", "values": [1, 2, 3]})),
        )
        .await;
        assert_eq!(status, 200, "{json}");
        assert_eq!(json["data"]["args"].as_array().unwrap().len(), 3);

        let empty = Some(serde_json::json!({}));
        let (status, _) = request(addr, "POST", "/api/tools/explode", empty).await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn every_advertised_tool_is_served() {
        let (addr, _synth) = server().await;
        let bodies = serde_json::json!({
            "invoke": {"command": "DryWet", "value": 0.5},
            "send_raw": {"address": "/polynodes/custom/address", "values": [1]},
            "list": {},
            "help": {"topic": "template:gain"},
        });
        for tool in catalog::to_json_schema().as_array().unwrap() {
            let name = tool["name"].as_str().unwrap();
            let path = format!("/api/tools/{name}");
            let (status, json) = request(addr, "POST", &path, Some(bodies[name].clone())).await;
            assert_eq!(status, 200, "{name}: {json}");
            assert_eq!(json["ok"], true);
        }
    }

    #[tokio::test]
    async fn list_tool_returns_flat_entries() {
        let (addr, _synth) = server().await;
        let (status, json) =
            request(addr, "POST", "/api/tools/list", Some(serde_json::json!({}))).await;
        assert_eq!(status, 200);
        let entries = json["data"].as_array().unwrap();
        assert_eq!(entries.len(), 34 + 45);
        assert_eq!(entries[0]["address"], "/polynodes/playstartstop");
        assert!(entries[0]["type"].is_string());
        assert!(entries[0]["domain"].is_object());

        let filter = Some(serde_json::json!({"category": "camera"}));
        let (status, json) = request(addr, "POST", "/api/tools/list", filter).await;
        assert_eq!(status, 200);
        assert_eq!(json["data"].as_array().unwrap().len(), 2);

        let help = Some(serde_json::json!({"topic": "seqbpm"}));
        let (status, json) = request(addr, "POST", "/api/tools/help", help).await;
        assert_eq!(status, 200);
        assert!(json["data"].as_str().unwrap().contains("Address: /polynodes/seqbpm"));
    }

    #[tokio::test]
    async fn status_reports_transport_counters() {
        let (addr, _synth) = server().await;
        let (_, json) = request(addr, "GET", "/api/status", None).await;
        assert_eq!(json["data"]["transport"]["packets_sent"], 0);
        assert!(json["data"].get("idle_ms").is_none());

        let body = Some(serde_json::json!({"command": "DryWet", "value": 0.5}));
        let (status, _) = request(addr, "POST", "/api/invoke", body).await;
        assert_eq!(status, 200);

        let (_, json) = request(addr, "GET", "/api/status", None).await;
        assert_eq!(json["data"]["transport"]["packets_sent"], 1);
        assert_eq!(json["data"]["transport"]["errors"], 0);
        assert!(json["data"]["idle_ms"].is_number());
    }

    #[test]
    fn transport_failures_are_bad_gateway() {
        let err = DispatchError::TransportError(crate::error::TransportError::Send {
            destination: "127.0.0.1:4799".parse().unwrap(),
            message: "down".to_string(),
        });
        assert_eq!(status_for(&err), StatusCode::BAD_GATEWAY);
    }
}
