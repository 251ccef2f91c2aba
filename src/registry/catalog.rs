//! Introspection over the registry: listings, help text and tool schemas.

use schemars::schema_for;
use serde::Serialize;
use serde_json::{Map, Value};

use super::params::{HelpParams, InvokeParams, ListParams, RawParams};
use super::{
    CommandCategory, CommandDescriptor, Domain, Layer, Registry, TemplateView, ValueType,
};

/// Flat view of one concrete command, as handed to collaborators.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub address: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
    pub domain: Domain,
    pub category: CommandCategory,
    pub description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<&'static str>,
}

impl From<&CommandDescriptor> for CatalogEntry {
    fn from(d: &CommandDescriptor) -> Self {
        Self {
            name: d.name.clone(),
            address: d.address.clone(),
            value_type: d.argument.value_type,
            domain: d.argument.domain,
            category: d.category,
            description: d.description,
            layer: d.layer,
            template: d.template,
        }
    }
}

pub(super) fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

pub(super) fn schema_value<T: schemars::JsonSchema>() -> Value {
    let root = schema_for!(T);
    serde_json::to_value(root).unwrap_or_else(|_| empty_object_schema())
}

/// Every command in table order, optionally restricted to one category.
pub fn entries(registry: &Registry, category: Option<CommandCategory>) -> Vec<CatalogEntry> {
    registry
        .list()
        .filter(|d| category.map_or(true, |c| d.category == c))
        .map(CatalogEntry::from)
        .collect()
}

/// One-line summary used in the grouped listing.
///
/// `Macro: Layer gain in dB (-80 to 20). [-80 to 20]`
fn summary(d: &CommandDescriptor) -> String {
    match d.layer {
        Some(layer) => format!("{}: {} [{}]", layer.title(), d.description, d.argument.domain),
        None => format!("{} [{}]", d.description, d.argument.domain),
    }
}

/// All addresses grouped by category slug, each mapped to a short summary.
pub fn grouped_addresses(registry: &Registry) -> Value {
    let mut groups = Map::new();
    for category in CommandCategory::all() {
        let addresses: Map<String, Value> = registry
            .by_category(*category)
            .map(|d| (d.address.clone(), Value::String(summary(d))))
            .collect();
        if !addresses.is_empty() {
            groups.insert(category.slug().to_string(), Value::Object(addresses));
        }
    }
    Value::Object(groups)
}

/// Prefix that forces the template tier when a template shares a category's name.
pub const TEMPLATE_TOPIC_PREFIX: &str = "template:";

/// Help text for command discovery.
/// Three tiers: no topic → categories, category → command list, command → details.
pub fn help_text(registry: &Registry, topic: Option<&str>) -> String {
    let Some(topic) = topic.map(str::trim).filter(|t| !t.is_empty()) else {
        let mut lines = vec!["Available command categories:".to_string()];
        for category in CommandCategory::all() {
            let count = registry.by_category(*category).count();
            if count > 0 {
                lines.push(format!(
                    "  {} ({count}): {}",
                    category.slug(),
                    category.description()
                ));
            }
        }
        lines.push(String::new());
        lines.push("Use `help <category>` to list its commands.".to_string());
        lines.push("Use `help <command>` for address, type and range.".to_string());
        return lines.join("\n");
    };

    if let Some(name) = topic.strip_prefix(TEMPLATE_TOPIC_PREFIX) {
        let name = name.trim();
        return match registry.template(name) {
            Some(template) => template_help(template),
            None => format!("Unknown template: \"{name}\". Use `help` to see categories."),
        };
    }

    // Category slugs win over template names ("gain", "playback_rate").
    if let Some(category) = CommandCategory::from_slug(topic) {
        let mut lines = vec![format!("{} commands:", category.slug())];
        let mut seen_templates: Vec<&str> = Vec::new();
        for d in registry.by_category(category) {
            match d.template {
                Some(template) if seen_templates.contains(&template) => {}
                Some(template) => {
                    seen_templates.push(template);
                    let mut line = format!("  - {template} <layer>: {}", d.description);
                    if CommandCategory::from_slug(template).is_some() {
                        line.push_str(&format!(" (help {TEMPLATE_TOPIC_PREFIX}{template})"));
                    }
                    lines.push(line);
                }
                None => lines.push(format!("  - {}: {}", d.name, d.description)),
            }
        }
        return lines.join("\n");
    }

    if let Some(template) = registry.template(topic) {
        return template_help(template);
    }

    let Some(d) = registry.get(topic) else {
        return format!("Unknown topic: \"{topic}\". Use `help` to see categories.");
    };
    let mut text = format!(
        "{}: {}\nAddress: {}\nCategory: {} | Type: {:?} | Domain: {}",
        d.name,
        d.description,
        d.address,
        d.category.slug(),
        d.argument.value_type,
        d.argument.domain,
    );
    if let (Some(template), Some(layer)) = (d.template, d.layer) {
        text.push_str(&format!("\nInstance of `{template}` for layer {layer}."));
    }
    text
}

fn template_help(template: TemplateView<'_>) -> String {
    let [first, ..] = template.instances;
    let mut lines = vec![
        format!("{}: {}", template.name, template.description),
        format!(
            "Category: {} | Type: {:?} | Requires a layer",
            template.category.slug(),
            first.argument.value_type
        ),
        String::new(),
    ];
    for d in template.instances {
        if let Some(layer) = d.layer {
            lines.push(format!("  {:<6} {}  [{}]", layer.slug(), d.address, d.argument.domain));
        }
    }
    lines.join("\n")
}

/// Tool descriptions in JSON Schema form, for tool-exposing collaborators.
pub fn to_json_schema() -> Value {
    serde_json::json!([
        {
            "name": "invoke",
            "description": "Validate a registered PolyNodes command and send it. \
                Layered commands need a layer (macro, meso or micro).",
            "inputSchema": schema_value::<InvokeParams>(),
        },
        {
            "name": "send_raw",
            "description": "Send an OSC message to any address without validation. \
                Values keep their literal type.",
            "inputSchema": schema_value::<RawParams>(),
        },
        {
            "name": "list",
            "description": "List every registered command with its address, type and domain, \
                optionally for one category.",
            "inputSchema": schema_value::<ListParams>(),
        },
        {
            "name": "help",
            "description": "Discover commands. No topic lists categories; a category lists its \
                commands; a command shows its address and range.",
            "inputSchema": schema_value::<HelpParams>(),
        },
    ])
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::builtin().unwrap()
    }

    #[test]
    fn grouped_listing_covers_every_address() {
        let reg = registry();
        let grouped = grouped_addresses(&reg);
        let total: usize = grouped
            .as_object()
            .unwrap()
            .values()
            .map(|g| g.as_object().unwrap().len())
            .sum();
        assert_eq!(total, reg.len());
        assert!(grouped["blackhole"]
            .as_object()
            .unwrap()
            .contains_key("/polynodes/BHmacroforce"));
        assert!(grouped["transport"]["/polynodes/seqbpm"]
            .as_str()
            .unwrap()
            .contains("10 to 300"));
    }

    #[test]
    fn entries_filter_by_category() {
        let reg = registry();
        let camera = entries(&reg, Some(CommandCategory::Camera));
        let names: Vec<&str> = camera.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["camzoom", "camrotate"]);
        assert_eq!(entries(&reg, None).len(), reg.len());
    }

    #[test]
    fn entry_serializes_type_and_domain() {
        let reg = registry();
        let entry = CatalogEntry::from(reg.get("granusw").unwrap());
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "boolean");
        assert_eq!(json["domain"]["kind"], "set");
        assert_eq!(json["domain"]["members"], serde_json::json!([0, 1]));
    }

    #[test]
    fn help_tiers() {
        let reg = registry();
        let overview = help_text(&reg, None);
        assert!(overview.contains("blackhole (4)"));

        let category = help_text(&reg, Some("comb_filter"));
        assert!(category.contains("comb_delay <layer>"));
        assert_eq!(category.matches("comb_delay").count(), 1);

        let template = help_text(&reg, Some("comb_delay"));
        assert!(template.contains("/polynodes/combmicro"));
        assert!(template.contains("10 to 300"));

        // "gain" is both a category and a template; the category wins.
        let gain = help_text(&reg, Some("gain"));
        assert!(gain.starts_with("gain commands:"));
        assert!(gain.contains("(help template:gain)"));
        assert!(!category.contains("template:"));

        let command = help_text(&reg, Some("seqbpm"));
        assert!(command.contains("Address: /polynodes/seqbpm"));

        assert!(help_text(&reg, Some("nope")).starts_with("Unknown topic"));
    }

    #[test]
    fn tool_schema_lists_input_properties() {
        let tools = to_json_schema();
        let invoke = &tools[0];
        assert_eq!(invoke["name"], "invoke");
        let props = invoke["inputSchema"]["properties"].as_object().unwrap();
        assert!(props.contains_key("command"));
        assert!(props.contains_key("layer"));
        assert!(props.contains_key("value"));
    }

    #[test]
    fn shared_names_reach_the_template_through_the_prefix() {
        let reg = registry();
        let gain = help_text(&reg, Some("template:gain"));
        assert!(gain.starts_with("gain: "));
        assert!(gain.contains("Requires a layer"));
        for layer in ["macro", "meso", "micro"] {
            assert!(gain.contains(layer), "{layer} missing:\n{gain}");
        }
        let rate = help_text(&reg, Some("template: playback_rate"));
        assert!(rate.starts_with("playback_rate: "));
        assert!(help_text(&reg, Some("template:seqbpm")).starts_with("Unknown template"));
    }

    #[test]
    fn every_advertised_tool_can_be_called() {
        use super::super::params::Request;

        let samples = serde_json::json!({
            "invoke": {"command": "seqbpm", "value": 120},
            "send_raw": {"address": "/polynodes/custom/address", "values": [1]},
            "list": {},
            "help": {},
        });
        let tools = to_json_schema();
        let tools = tools.as_array().unwrap();
        assert_eq!(tools.len(), samples.as_object().unwrap().len());
        for tool in tools {
            let name = tool["name"].as_str().unwrap();
            let request = Request::from_tool_call(name, &samples[name])
                .unwrap_or_else(|e| panic!("tool {name} rejected: {e}"));
            assert_eq!(request.tool_name(), name);
        }
    }
}
