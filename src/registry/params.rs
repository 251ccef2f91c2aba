use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{CommandCategory, Layer, NumericValue};

// ── Tool inputs ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InvokeParams {
    /// Command name from the registry, e.g. `seqbpm` or `blackhole_force`.
    pub command: String,
    /// Required for layered commands, rejected for every other command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,
    /// The single value the command carries.
    pub value: NumericValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RawParams {
    /// Any OSC address, registered or not.
    pub address: String,
    /// Sent verbatim: integers as int32, floats as float32, booleans as 0/1.
    #[serde(default)]
    pub values: Vec<NumericValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ListParams {
    /// Restrict the listing to one category slug, e.g. `blackhole`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<CommandCategory>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HelpParams {
    /// Category slug, template name or command name. Omit for the overview.
    /// `template:<name>` picks the template when it shares a category's name.
    #[serde(default)]
    pub topic: Option<String>,
}

// ── Requests ────────────────────────────────────────────────────

/// A dispatchable request as it arrives from a collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "params", rename_all = "snake_case")]
pub enum Request {
    Invoke(InvokeParams),
    SendRaw(RawParams),
    List(ListParams),
    Help(HelpParams),
}

impl Request {
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::Invoke(_) => "invoke",
            Self::SendRaw(_) => "send_raw",
            Self::List(_) => "list",
            Self::Help(_) => "help",
        }
    }

    /// Build a request from a tool name and its JSON input.
    pub fn from_tool_call(name: &str, input: &Value) -> Result<Self, String> {
        match name {
            "invoke" => Ok(Self::Invoke(de(input)?)),
            "send_raw" | "raw" => Ok(Self::SendRaw(de(input)?)),
            "list" => Ok(Self::List(de(input)?)),
            "help" => Ok(Self::Help(de(input)?)),
            _ => Err(format!("Unknown tool: {name}")),
        }
    }
}

pub(super) fn de<T: serde::de::DeserializeOwned>(input: &Value) -> Result<T, String> {
    serde_json::from_value(input.clone()).map_err(|e| e.to_string())
}
