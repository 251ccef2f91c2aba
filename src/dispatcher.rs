//! The single dispatch point for every surface (CLI, HTTP, tool calls).
//!
//! `invoke` resolves, validates, encodes and sends. `send_raw` skips the
//! registry and only encodes and sends. Each successful call emits exactly
//! one datagram; nothing is retried, cached or coalesced.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{DispatchError, TransportError};
use crate::osc::{OscArg, OscMessage};
use crate::registry::catalog::{self, CatalogEntry};
use crate::registry::params::Request;
use crate::registry::{CommandDescriptor, Layer, NumericValue, Registry};
use crate::transport::{Transport, TransportStats, UdpTransport};

/// What happened to one call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// Encoded and handed to the transport.
    Sent { bytes: usize },
    Failed { error: DispatchError },
}

/// Per-call report: where the message went (or would have gone) and what it
/// carried.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub args: Vec<OscArg>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl DispatchResult {
    pub fn is_sent(&self) -> bool {
        matches!(self.outcome, Outcome::Sent { .. })
    }

    pub fn error(&self) -> Option<&DispatchError> {
        match &self.outcome {
            Outcome::Sent { .. } => None,
            Outcome::Failed { error } => Some(error),
        }
    }
}

/// Answer to a collaborator request.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Dispatched(DispatchResult),
    Listing(Vec<CatalogEntry>),
    Help(String),
}

/// What is known about a call before it reaches an outcome.
struct Draft {
    command: Option<String>,
    layer: Option<Layer>,
    address: Option<String>,
    args: Vec<OscArg>,
}

impl Draft {
    fn finish(self, outcome: Outcome) -> DispatchResult {
        DispatchResult {
            command: self.command,
            layer: self.layer,
            address: self.address,
            args: self.args,
            outcome,
        }
    }

    fn reject(self, error: DispatchError) -> DispatchResult {
        warn!(
            command = self.command.as_deref().unwrap_or("<raw>"),
            address = self.address.as_deref().unwrap_or(""),
            kind = error.kind(),
            "rejected: {error}"
        );
        self.finish(Outcome::Failed { error })
    }
}

/// Shared, thread-safe dispatcher. Clone the `Arc`, not the dispatcher.
pub struct Dispatcher {
    registry: Arc<Registry>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    /// Dispatcher over a freshly bound UDP socket.
    pub async fn udp(
        registry: Arc<Registry>,
        bind: SocketAddr,
        destination: SocketAddr,
    ) -> Result<Self, TransportError> {
        let transport = UdpTransport::bind(bind, destination).await?;
        Ok(Self::new(registry, Arc::new(transport)))
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn destination(&self) -> SocketAddr {
        self.transport.destination()
    }

    pub fn stats(&self) -> TransportStats {
        self.transport.stats()
    }

    /// Registered commands in table order.
    pub fn list(&self) -> impl ExactSizeIterator<Item = &CommandDescriptor> + '_ {
        self.registry.list()
    }

    /// Validate a registered command and send it.
    pub async fn invoke(
        &self,
        name: &str,
        layer: Option<Layer>,
        value: NumericValue,
    ) -> DispatchResult {
        let mut draft = Draft {
            command: Some(name.to_string()),
            layer,
            address: None,
            args: Vec::new(),
        };

        let descriptor = match self.registry.lookup(name, layer) {
            Ok(d) => d,
            Err(error) => return draft.reject(error),
        };
        draft.address = Some(descriptor.address.clone());

        match descriptor.validate(value) {
            Ok(arg) => draft.args.push(arg),
            Err(error) => return draft.reject(error),
        }

        self.transmit(draft).await
    }

    /// Send `values` to `address` without consulting the registry.
    pub async fn send_raw(&self, address: &str, values: &[NumericValue]) -> DispatchResult {
        let mut draft = Draft {
            command: None,
            layer: None,
            address: Some(address.to_string()),
            args: Vec::with_capacity(values.len()),
        };
        for value in values {
            match OscArg::try_from(*value) {
                Ok(arg) => draft.args.push(arg),
                Err(e) => return draft.reject(e.into()),
            }
        }
        self.transmit(draft).await
    }

    /// Run a collaborator request.
    pub async fn execute(&self, request: Request) -> Reply {
        debug!(tool = request.tool_name(), "executing request");
        match request {
            Request::Invoke(p) => {
                Reply::Dispatched(self.invoke(&p.command, p.layer, p.value).await)
            }
            Request::SendRaw(p) => Reply::Dispatched(self.send_raw(&p.address, &p.values).await),
            Request::List(p) => Reply::Listing(catalog::entries(&self.registry, p.category)),
            Request::Help(p) => Reply::Help(catalog::help_text(&self.registry, p.topic.as_deref())),
        }
    }

    async fn transmit(&self, draft: Draft) -> DispatchResult {
        let address = draft.address.clone().unwrap_or_default();
        let message = OscMessage::new(address, draft.args.clone());
        let payload = match message.encode() {
            Ok(payload) => payload,
            Err(e) => return draft.reject(e.into()),
        };

        match self.transport.send(&payload).await {
            Ok(bytes) => {
                debug!(address = %message.address, args = ?message.args, bytes, "dispatched");
                draft.finish(Outcome::Sent { bytes })
            }
            // The transport already logged the failure.
            Err(e) => draft.finish(Outcome::Failed { error: e.into() }),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use async_trait::async_trait;
    use parking_lot::Mutex;

    use super::*;
    use crate::error::{NotFoundReason, OscError};
    use crate::registry::params::{HelpParams, ListParams};
    use crate::registry::CommandCategory;

    /// Records payloads instead of sending them; optionally fails every send.
    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<Vec<u8>>>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn send(&self, payload: &[u8]) -> Result<usize, TransportError> {
            if self.fail {
                return Err(TransportError::Send {
                    destination: self.destination(),
                    message: "network unreachable".to_string(),
                });
            }
            self.sent.lock().push(payload.to_vec());
            Ok(payload.len())
        }

        fn destination(&self) -> SocketAddr {
            SocketAddr::from(([127, 0, 0, 1], 4799))
        }

        fn stats(&self) -> TransportStats {
            let sent = self.sent.lock();
            TransportStats {
                packets_sent: sent.len() as u64,
                bytes_sent: sent.iter().map(|p| p.len() as u64).sum(),
                ..TransportStats::default()
            }
        }
    }

    fn dispatcher(fail: bool) -> (Dispatcher, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            fail,
            ..Recorder::default()
        });
        let registry = Arc::new(Registry::builtin().unwrap());
        (Dispatcher::new(registry, recorder.clone()), recorder)
    }

    fn decode(payload: &[u8]) -> OscMessage {
        OscMessage::decode(payload).unwrap()
    }

    #[tokio::test]
    async fn invoke_sends_one_validated_datagram() {
        let (d, rec) = dispatcher(false);
        let result = d.invoke("seqbpm", None, NumericValue::Integer(120)).await;
        assert!(result.is_sent(), "{result:?}");
        assert_eq!(result.address.as_deref(), Some("/polynodes/seqbpm"));
        assert_eq!(result.args, vec![OscArg::Float(120.0)]);

        let sent = rec.sent.lock();
        assert_eq!(sent.len(), 1);
        let msg = decode(&sent[0]);
        assert_eq!(msg.address, "/polynodes/seqbpm");
        assert_eq!(msg.args, vec![OscArg::Float(120.0)]);
    }

    #[tokio::test]
    async fn rejected_invocations_send_nothing() {
        let (d, rec) = dispatcher(false);
        let cases = [
            ("seqbpm", None, NumericValue::Integer(5)),
            ("MacroGainsolo", None, NumericValue::Integer(2)),
            ("gain", None, NumericValue::Float(0.0)),
            ("nonexistent", None, NumericValue::Float(0.0)),
            ("DryWet", Some(Layer::Micro), NumericValue::Float(0.5)),
        ];
        for (name, layer, value) in cases {
            let result = d.invoke(name, layer, value).await;
            assert!(!result.is_sent(), "{name} should fail");
            assert!(result.error().unwrap().is_validation());
        }
        assert!(rec.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn layered_invoke_targets_the_layer_address() {
        let (d, rec) = dispatcher(false);
        let result = d
            .invoke("blackhole_force", Some(Layer::Macro), NumericValue::Float(0.8))
            .await;
        assert!(result.is_sent());
        assert_eq!(result.address.as_deref(), Some("/polynodes/BHmacroforce"));
        let msg = decode(&rec.sent.lock()[0]);
        assert_eq!(msg.args, vec![OscArg::Float(0.8)]);
    }

    #[tokio::test]
    async fn repeated_invocations_are_not_deduplicated() {
        let (d, rec) = dispatcher(false);
        for _ in 0..2 {
            assert!(d.invoke("DryWet", None, NumericValue::Float(0.25)).await.is_sent());
        }
        let sent = rec.sent.lock();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
    }

    #[tokio::test]
    async fn raw_bypasses_the_registry() {
        let (d, rec) = dispatcher(false);
        let values = [
            NumericValue::Integer(1),
            NumericValue::Integer(2),
            NumericValue::Integer(3),
        ];
        let result = d.send_raw("/polynodes/custom/address", &values).await;
        assert!(result.is_sent());
        let msg = decode(&rec.sent.lock()[0]);
        assert_eq!(msg.type_tags(), ",iii");
        assert_eq!(msg.args, vec![OscArg::Int(1), OscArg::Int(2), OscArg::Int(3)]);
    }

    #[tokio::test]
    async fn raw_encode_errors_are_reported() {
        let (d, rec) = dispatcher(false);
        let result = d.send_raw("no-slash", &[NumericValue::Float(1.0)]).await;
        assert!(matches!(
            result.error(),
            Some(DispatchError::EncodeError(OscError::InvalidAddress { .. }))
        ));
        let result = d
            .send_raw("/x", &[NumericValue::Integer(i64::from(i32::MAX) + 1)])
            .await;
        assert!(matches!(
            result.error(),
            Some(DispatchError::EncodeError(OscError::IntegerOverflow { .. }))
        ));
        assert!(rec.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn transport_failures_surface_in_the_result() {
        let (d, _) = dispatcher(true);
        let result = d.invoke("DryWet", None, NumericValue::Float(0.5)).await;
        let err = result.error().unwrap();
        assert_eq!(err.kind(), "TransportError");
        assert!(!err.is_validation());
        // Resolution still happened.
        assert_eq!(result.address.as_deref(), Some("/polynodes/DryWet"));
    }

    #[tokio::test]
    async fn execute_routes_requests() {
        let (d, rec) = dispatcher(false);
        let req = Request::from_tool_call(
            "invoke",
            &serde_json::json!({"command": "filter_freq", "layer": "meso", "value": 440}),
        )
        .unwrap();
        let Reply::Dispatched(result) = d.execute(req).await else {
            panic!("invoke should dispatch");
        };
        assert_eq!(result.address.as_deref(), Some("/polynodes/filtmeso"));
        assert_eq!(rec.sent.lock().len(), 1);
        assert_eq!(d.stats().packets_sent, 1);
    }

    #[tokio::test]
    async fn list_and_help_requests_send_nothing() {
        let (d, rec) = dispatcher(false);
        let Reply::Listing(all) = d.execute(Request::List(ListParams::default())).await else {
            panic!("list should produce a listing");
        };
        assert_eq!(all.len(), d.registry().len());

        let camera = ListParams {
            category: Some(CommandCategory::Camera),
        };
        let Reply::Listing(camera) = d.execute(Request::List(camera)).await else {
            panic!("list should produce a listing");
        };
        assert_eq!(camera.len(), 2);

        let topic = HelpParams {
            topic: Some("seqbpm".to_string()),
        };
        let Reply::Help(text) = d.execute(Request::Help(topic)).await else {
            panic!("help should produce text");
        };
        assert!(text.contains("/polynodes/seqbpm"));
        assert!(rec.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn rejected_calls_never_report_bytes() {
        let (d, _) = dispatcher(false);
        let result = d.invoke("seqbpm", None, NumericValue::Integer(5)).await;
        assert!(matches!(result.outcome, Outcome::Failed { .. }));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failed");
        assert!(json.get("bytes").is_none());
        assert_eq!(d.stats().packets_sent, 0);
    }

    #[tokio::test]
    async fn not_found_keeps_the_reason() {
        let (d, _) = dispatcher(false);
        let result = d.invoke("gain", None, NumericValue::Float(0.0)).await;
        assert!(matches!(
            result.error(),
            Some(DispatchError::NotFound { reason: NotFoundReason::LayerRequired, .. })
        ));
    }

    #[test]
    fn result_serializes_flat() {
        let result = DispatchResult {
            command: Some("seqbpm".to_string()),
            layer: None,
            address: Some("/polynodes/seqbpm".to_string()),
            args: vec![OscArg::Float(120.0)],
            outcome: Outcome::Sent { bytes: 28 },
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "sent");
        assert_eq!(json["bytes"], 28);
        assert_eq!(json["args"][0]["type"], "float");
    }
}
