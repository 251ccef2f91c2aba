//! Parameter registry: the single source of truth mapping a command name (and,
//! for layered commands, a layer selector) to an OSC address and a value domain.
//!
//! The registry is built once from the static table in [`table`] and is
//! read-only afterwards. Layered templates are expanded into three concrete
//! descriptors at build time, one per [`Layer`].

pub mod catalog;
pub mod params;
pub mod table;
pub mod validation;

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, NotFoundReason, ParseLayerError, RegistryError};
use crate::osc::{self, OscArg, OscType};

use table::{LayerDomains, Template};
pub use validation::NumericValue;

/// Every PolyNodes address lives under this prefix.
pub const ADDRESS_PREFIX: &str = "/polynodes/";

// ── Layer ───────────────────────────────────────────────────────

/// One of the three temporal-scale processing paths of the synth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    #[serde(alias = "Macro", alias = "MACRO")]
    Macro,
    #[serde(alias = "Meso", alias = "MESO")]
    Meso,
    #[serde(alias = "Micro", alias = "MICRO")]
    Micro,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Self::Macro, Self::Meso, Self::Micro];

    /// Lowercase form, substituted for `{layer}` in address patterns.
    pub fn slug(self) -> &'static str {
        match self {
            Self::Macro => "macro",
            Self::Meso => "meso",
            Self::Micro => "micro",
        }
    }

    /// Capitalized form, substituted for `{Layer}` in address patterns.
    pub fn title(self) -> &'static str {
        match self {
            Self::Macro => "Macro",
            Self::Meso => "Meso",
            Self::Micro => "Micro",
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::Macro => 0,
            Self::Meso => 1,
            Self::Micro => 2,
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Layer {
    type Err = ParseLayerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "macro" => Ok(Self::Macro),
            "meso" => Ok(Self::Meso),
            "micro" => Ok(Self::Micro),
            _ => Err(ParseLayerError(s.to_string())),
        }
    }
}

// ── Argument shape ──────────────────────────────────────────────

/// Declared kind of a command's value. Incoming numbers are coerced to this
/// before the domain is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Float,
    Integer,
    Boolean,
}

impl ValueType {
    /// Wire tag used when the table does not override it.
    pub fn default_wire(self) -> OscType {
        match self {
            Self::Float => OscType::Float,
            Self::Integer | Self::Boolean => OscType::Int,
        }
    }
}

/// Valid values for one argument: a closed interval or an enumerated set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Domain {
    Range { min: f64, max: f64 },
    Set { members: &'static [i64] },
}

impl Domain {
    /// On/off switch.
    pub const SWITCH: Domain = Domain::Set { members: &[0, 1] };

    /// Anything that survives the trip to a finite float32.
    #[allow(clippy::cast_lossless)]
    pub const ANY_FLOAT32: Domain = Domain::Range {
        min: f32::MIN as f64,
        max: f32::MAX as f64,
    };

    pub const fn range(min: f64, max: f64) -> Domain {
        Domain::Range { min, max }
    }

    fn check(&self) -> Result<(), String> {
        match self {
            Domain::Range { min, max } => {
                if min.is_nan() || max.is_nan() || min > max {
                    Err(format!("invalid range [{min}, {max}]"))
                } else {
                    Ok(())
                }
            }
            Domain::Set { members } if members.is_empty() => Err("empty value set".to_string()),
            Domain::Set { .. } => Ok(()),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            _ if *self == Domain::ANY_FLOAT32 => f.write_str("any float"),
            Domain::Range { min, max } => write!(f, "{min} to {max}"),
            Domain::Set { members } => {
                let items: Vec<String> = members.iter().map(ToString::to_string).collect();
                write!(f, "{{{}}}", items.join(", "))
            }
        }
    }
}

/// Type, domain and wire encoding of a single argument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ArgumentSpec {
    pub value_type: ValueType,
    pub domain: Domain,
    pub wire: OscType,
}

// ── Command metadata ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommandCategory {
    Transport,
    Gain,
    Envelope,
    PlaybackRate,
    Granulator,
    BandpassFilter,
    CombFilter,
    #[serde(rename = "blackhole")]
    BlackHole,
    #[serde(rename = "whitehole")]
    WhiteHole,
    RingModulator,
    Bitcrusher,
    Resonator,
    CuboidFx,
    Isomorph,
    Navigation,
    Tuning,
    Camera,
}

impl CommandCategory {
    pub fn slug(&self) -> &'static str {
        match self {
            Self::Transport => "transport",
            Self::Gain => "gain",
            Self::Envelope => "envelope",
            Self::PlaybackRate => "playback_rate",
            Self::Granulator => "granulator",
            Self::BandpassFilter => "bandpass_filter",
            Self::CombFilter => "comb_filter",
            Self::BlackHole => "blackhole",
            Self::WhiteHole => "whitehole",
            Self::RingModulator => "ring_modulator",
            Self::Bitcrusher => "bitcrusher",
            Self::Resonator => "resonator",
            Self::CuboidFx => "cuboid_fx",
            Self::Isomorph => "isomorph",
            Self::Navigation => "navigation",
            Self::Tuning => "tuning",
            Self::Camera => "camera",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Transport => "Play/stop, preset slots and sequencer BPM",
            Self::Gain => "Per-layer gain, solo and dry/wet balance",
            Self::Envelope => "Attack/decay envelope time per layer",
            Self::PlaybackRate => "Agent playback rate and its modulation range",
            Self::Granulator => "Granular chunk duration and modulation",
            Self::BandpassFilter => "Bandpass filter switch, frequency and modulation",
            Self::CombFilter => "Comb filter switch, delay and modulation",
            Self::BlackHole => "Black Hole interactable: switch and gravitational force",
            Self::WhiteHole => "White Hole interactable: switch and reflection force",
            Self::RingModulator => "Ring modulator switch and frequency",
            Self::Bitcrusher => "Bitcrusher/decimator switch, bit level and range",
            Self::Resonator => "Resonator switch, frequency distribution and balance",
            Self::CuboidFx => "Cuboid FX switches and return levels",
            Self::Isomorph => "Isomorphic modulation targets, depths and bandpass center",
            Self::Navigation => "Random navigation, re-arrange and poly gates",
            Self::Tuning => "Tuning scale on playback rate and resonator",
            Self::Camera => "3D camera zoom and rotation",
        }
    }

    pub fn all() -> &'static [CommandCategory] {
        &[
            Self::Transport,
            Self::Gain,
            Self::Envelope,
            Self::PlaybackRate,
            Self::Granulator,
            Self::BandpassFilter,
            Self::CombFilter,
            Self::BlackHole,
            Self::WhiteHole,
            Self::RingModulator,
            Self::Bitcrusher,
            Self::Resonator,
            Self::CuboidFx,
            Self::Isomorph,
            Self::Navigation,
            Self::Tuning,
            Self::Camera,
        ]
    }

    pub fn from_slug(slug: &str) -> Option<CommandCategory> {
        let wanted = slug.trim().to_ascii_lowercase();
        Self::all().iter().copied().find(|c| c.slug() == wanted)
    }
}

/// A concrete, addressable command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandDescriptor {
    pub name: String,
    pub address: String,
    pub argument: ArgumentSpec,
    pub category: CommandCategory,
    pub description: &'static str,
    /// Set when this descriptor was expanded from a layered template.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<&'static str>,
}

impl CommandDescriptor {
    /// Coerce `value` to this command's declared type, check it against the
    /// domain and produce the argument that goes on the wire.
    pub fn validate(&self, value: NumericValue) -> Result<OscArg, DispatchError> {
        validation::check_value(&self.name, &self.argument, value)
    }
}

/// A layered template after expansion: one descriptor index per layer.
#[derive(Debug, Clone)]
struct TemplateEntry {
    category: CommandCategory,
    description: &'static str,
    instances: [usize; 3],
}

/// Borrowed view of a layered template and its three expansions.
#[derive(Debug, Clone, Copy)]
pub struct TemplateView<'a> {
    pub name: &'a str,
    pub category: CommandCategory,
    pub description: &'static str,
    pub instances: [&'a CommandDescriptor; 3],
}

// ── Registry ────────────────────────────────────────────────────

/// Immutable command table. Construct once and share behind an `Arc`.
#[derive(Debug, Clone)]
pub struct Registry {
    commands: IndexMap<String, CommandDescriptor>,
    templates: IndexMap<&'static str, TemplateEntry>,
}

impl Registry {
    /// Build the registry from the built-in PolyNodes table.
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::build(table::templates())
    }

    /// Build a registry from templates, expanding layered ones and checking
    /// that names and addresses are unique and every domain is well formed.
    pub fn build(templates: impl IntoIterator<Item = Template>) -> Result<Self, RegistryError> {
        let mut registry = Registry {
            commands: IndexMap::new(),
            templates: IndexMap::new(),
        };
        let mut addresses: HashSet<String> = HashSet::new();

        for template in templates {
            if template.layered {
                if !template.pattern.contains("{layer}") && !template.pattern.contains("{Layer}") {
                    return Err(RegistryError::UnresolvedPattern {
                        name: template.name.to_string(),
                        pattern: template.pattern.to_string(),
                    });
                }
                if registry.commands.contains_key(template.name)
                    || registry.templates.contains_key(template.name)
                {
                    return Err(RegistryError::DuplicateName {
                        name: template.name.to_string(),
                    });
                }

                let mut instances = [0usize; 3];
                for (slot, layer) in instances.iter_mut().zip(Layer::ALL) {
                    let leaf = expand_pattern(template.pattern, layer);
                    let domain = template.domains.for_layer(layer);
                    *slot = registry.insert(&mut addresses, &template, leaf, domain, Some(layer))?;
                }
                registry.templates.insert(
                    template.name,
                    TemplateEntry {
                        category: template.category,
                        description: template.description,
                        instances,
                    },
                );
            } else {
                let LayerDomains::Uniform(domain) = template.domains else {
                    return Err(RegistryError::InvalidDomain {
                        name: template.name.to_string(),
                        message: "per-layer domains on a command without layers".to_string(),
                    });
                };
                if template.pattern.contains('{') {
                    return Err(RegistryError::UnresolvedPattern {
                        name: template.name.to_string(),
                        pattern: template.pattern.to_string(),
                    });
                }
                if registry.templates.contains_key(template.name) {
                    return Err(RegistryError::DuplicateName {
                        name: template.name.to_string(),
                    });
                }
                let leaf = template.pattern.to_string();
                registry.insert(&mut addresses, &template, leaf, domain, None)?;
            }
        }

        Ok(registry)
    }

    fn insert(
        &mut self,
        addresses: &mut HashSet<String>,
        template: &Template,
        leaf: String,
        domain: Domain,
        layer: Option<Layer>,
    ) -> Result<usize, RegistryError> {
        domain
            .check()
            .map_err(|message| RegistryError::InvalidDomain {
                name: leaf.clone(),
                message,
            })?;

        let address = format!("{ADDRESS_PREFIX}{leaf}");
        osc::validate_address(&address).map_err(|source| RegistryError::InvalidAddress {
            name: leaf.clone(),
            source,
        })?;

        if self.commands.contains_key(&leaf) || self.templates.contains_key(leaf.as_str()) {
            return Err(RegistryError::DuplicateName { name: leaf });
        }
        if !addresses.insert(address.clone()) {
            return Err(RegistryError::DuplicateAddress { address });
        }

        let descriptor = CommandDescriptor {
            name: leaf.clone(),
            address,
            argument: ArgumentSpec {
                value_type: template.value_type,
                domain,
                wire: template.wire.unwrap_or_else(|| template.value_type.default_wire()),
            },
            category: template.category,
            description: template.description,
            layer,
            template: layer.map(|_| template.name),
        };
        let (index, _) = self.commands.insert_full(leaf, descriptor);
        Ok(index)
    }

    /// Find the descriptor for `name`, applying the layer policy:
    /// layered templates require a layer, every other command rejects one.
    pub fn lookup(
        &self,
        name: &str,
        layer: Option<Layer>,
    ) -> Result<&CommandDescriptor, DispatchError> {
        if let Some(entry) = self.templates.get(name) {
            let Some(layer) = layer else {
                return Err(not_found(name, None, NotFoundReason::LayerRequired));
            };
            return entry
                .instances
                .get(layer.index())
                .and_then(|&i| self.commands.get_index(i))
                .map(|(_, d)| d)
                .ok_or_else(|| not_found(name, Some(layer), NotFoundReason::UnknownCommand));
        }

        match (self.commands.get(name), layer) {
            (Some(descriptor), None) => Ok(descriptor),
            (Some(_), Some(layer)) => Err(not_found(
                name,
                Some(layer),
                NotFoundReason::LayerNotAccepted,
            )),
            (None, layer) => Err(not_found(name, layer, NotFoundReason::UnknownCommand)),
        }
    }

    /// Resolve a command (and optional layer) to its OSC address.
    pub fn resolve(&self, name: &str, layer: Option<Layer>) -> Result<&str, DispatchError> {
        self.lookup(name, layer).map(|d| d.address.as_str())
    }

    /// Validate a value for a concrete command.
    pub fn validate(&self, name: &str, value: NumericValue) -> Result<OscArg, DispatchError> {
        self.lookup(name, None)?.validate(value)
    }

    /// All concrete descriptors in table order. Stable across calls.
    pub fn list(&self) -> impl ExactSizeIterator<Item = &CommandDescriptor> + '_ {
        self.commands.values()
    }

    pub fn get(&self, name: &str) -> Option<&CommandDescriptor> {
        self.commands.get(name)
    }

    /// Descriptor owning `address`, if any.
    pub fn by_address(&self, address: &str) -> Option<&CommandDescriptor> {
        self.commands.values().find(|d| d.address == address)
    }

    pub fn by_category(
        &self,
        category: CommandCategory,
    ) -> impl Iterator<Item = &CommandDescriptor> + '_ {
        self.commands.values().filter(move |d| d.category == category)
    }

    /// Layered templates in table order.
    pub fn templates(&self) -> impl Iterator<Item = TemplateView<'_>> + '_ {
        self.templates.iter().filter_map(|(name, entry)| {
            let [a, b, c] = entry.instances;
            Some(TemplateView {
                name: *name,
                category: entry.category,
                description: entry.description,
                instances: [
                    self.commands.get_index(a)?.1,
                    self.commands.get_index(b)?.1,
                    self.commands.get_index(c)?.1,
                ],
            })
        })
    }

    pub fn template(&self, name: &str) -> Option<TemplateView<'_>> {
        self.templates().find(|t| t.name == name)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

fn not_found(name: &str, layer: Option<Layer>, reason: NotFoundReason) -> DispatchError {
    DispatchError::NotFound {
        command: name.to_string(),
        layer,
        reason,
    }
}

/// Substitute the layer placeholders in an address pattern.
fn expand_pattern(pattern: &str, layer: Layer) -> String {
    pattern
        .replace("{Layer}", layer.title())
        .replace("{layer}", layer.slug())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn registry() -> Registry {
        Registry::builtin().expect("built-in table must be valid")
    }

    #[test]
    fn builtin_table_builds() {
        let reg = registry();
        // 34 single commands + 15 templates × 3 layers
        assert_eq!(reg.len(), 34 + 45);
        assert_eq!(reg.templates().count(), 15);
    }

    #[test]
    fn addresses_are_unique_and_prefixed() {
        let reg = registry();
        let mut seen = HashSet::new();
        for d in reg.list() {
            assert!(d.address.starts_with(ADDRESS_PREFIX), "{}", d.address);
            assert!(seen.insert(d.address.clone()), "duplicate {}", d.address);
        }
    }

    #[test]
    fn concrete_names_match_address_leaf() {
        for d in registry().list() {
            assert_eq!(d.address, format!("{ADDRESS_PREFIX}{}", d.name));
        }
    }

    #[test]
    fn layered_resolution_yields_three_distinct_addresses() {
        let reg = registry();
        let macro_addr = reg.resolve("blackhole_force", Some(Layer::Macro)).unwrap();
        let meso_addr = reg.resolve("blackhole_force", Some(Layer::Meso)).unwrap();
        let micro_addr = reg.resolve("blackhole_force", Some(Layer::Micro)).unwrap();
        assert_eq!(macro_addr, "/polynodes/BHmacroforce");
        assert_eq!(meso_addr, "/polynodes/BHmesoforce");
        assert_eq!(micro_addr, "/polynodes/BHmicroforce");
        for addr in [macro_addr, meso_addr, micro_addr] {
            assert!(reg.by_address(addr).is_some());
        }
    }

    #[test]
    fn every_template_expands_to_distinct_registered_addresses() {
        let reg = registry();
        for t in reg.templates() {
            let addrs: HashSet<&str> = Layer::ALL
                .iter()
                .map(|&l| reg.resolve(t.name, Some(l)).unwrap())
                .collect();
            assert_eq!(addrs.len(), 3, "template {}", t.name);
        }
    }

    #[test]
    fn title_and_slug_placeholders_expand() {
        let reg = registry();
        assert_eq!(reg.resolve("gain", Some(Layer::Meso)).unwrap(), "/polynodes/MesoGain");
        assert_eq!(
            reg.resolve("playback_rate_mod_range", Some(Layer::Micro)).unwrap(),
            "/polynodes/pbrmicroMR"
        );
    }

    #[test]
    fn layered_template_without_layer_is_not_found() {
        let err = registry().resolve("gain", None).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::NotFound { reason: NotFoundReason::LayerRequired, .. }
        ));
    }

    #[test]
    fn layer_on_plain_command_is_rejected() {
        let reg = registry();
        let err = reg.resolve("seqbpm", Some(Layer::Macro)).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::NotFound { reason: NotFoundReason::LayerNotAccepted, .. }
        ));
        // Expanded instances are concrete too.
        let err = reg.resolve("MacroGain", Some(Layer::Macro)).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::NotFound { reason: NotFoundReason::LayerNotAccepted, .. }
        ));
        assert_eq!(reg.resolve("MacroGain", None).unwrap(), "/polynodes/MacroGain");
    }

    #[test]
    fn unknown_command_is_not_found() {
        let err = registry().resolve("nonexistent", None).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::NotFound { reason: NotFoundReason::UnknownCommand, .. }
        ));
    }

    #[test]
    fn per_layer_domains_differ() {
        let reg = registry();
        let micro = reg.lookup("comb_delay", Some(Layer::Micro)).unwrap();
        let macro_ = reg.lookup("comb_delay", Some(Layer::Macro)).unwrap();
        assert_eq!(micro.argument.domain, Domain::range(10.0, 300.0));
        assert_eq!(macro_.argument.domain, Domain::range(10.0, 3000.0));
    }

    #[test]
    fn list_is_stable_across_calls() {
        let reg = registry();
        let first: Vec<&str> = reg.list().map(|d| d.name.as_str()).collect();
        let second: Vec<&str> = reg.list().map(|d| d.name.as_str()).collect();
        assert_eq!(first, second);
        assert_eq!(first.first().copied(), Some("playstartstop"));
    }

    #[test]
    fn layer_parses_case_insensitively() {
        assert_eq!(" MACRO ".parse::<Layer>().unwrap(), Layer::Macro);
        assert_eq!("Meso".parse::<Layer>().unwrap(), Layer::Meso);
        assert!("mega".parse::<Layer>().is_err());
    }

    #[test]
    fn duplicate_name_is_rejected_at_build() {
        let t = Template {
            name: "DryWet",
            pattern: "DryWet",
            layered: false,
            value_type: ValueType::Float,
            wire: None,
            domains: LayerDomains::Uniform(Domain::range(0.0, 1.0)),
            category: CommandCategory::Gain,
            description: "",
        };
        let err = Registry::build([t.clone(), t]).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateName { .. }));
    }

    #[test]
    fn inverted_range_is_rejected_at_build() {
        let t = Template {
            name: "broken",
            pattern: "broken",
            layered: false,
            value_type: ValueType::Float,
            wire: None,
            domains: LayerDomains::Uniform(Domain::range(5.0, 1.0)),
            category: CommandCategory::Gain,
            description: "",
        };
        assert!(matches!(
            Registry::build([t]).unwrap_err(),
            RegistryError::InvalidDomain { .. }
        ));
    }

    #[test]
    fn layered_template_needs_placeholder() {
        let t = Template {
            name: "flat",
            pattern: "flat",
            layered: true,
            value_type: ValueType::Float,
            wire: None,
            domains: LayerDomains::Uniform(Domain::range(0.0, 1.0)),
            category: CommandCategory::Gain,
            description: "",
        };
        assert!(matches!(
            Registry::build([t]).unwrap_err(),
            RegistryError::UnresolvedPattern { .. }
        ));
    }
}
