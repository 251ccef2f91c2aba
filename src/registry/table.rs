//! The PolyNodes parameter table.
//!
//! Single commands use their address leaf as name. Layered commands are
//! declared once as a template whose pattern contains `{Layer}` (`Macro`) or
//! `{layer}` (`macro`); [`Registry::build`](super::Registry::build) expands
//! each into three concrete commands.

use super::{CommandCategory, Domain, Layer, ValueType};
use crate::osc::OscType;

/// Domain of a template: shared by every layer or given per layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerDomains {
    Uniform(Domain),
    PerLayer([Domain; 3]),
}

impl LayerDomains {
    pub fn for_layer(&self, layer: Layer) -> Domain {
        match self {
            Self::Uniform(domain) => *domain,
            Self::PerLayer([macro_, meso, micro]) => match layer {
                Layer::Macro => *macro_,
                Layer::Meso => *meso,
                Layer::Micro => *micro,
            },
        }
    }
}

impl From<Domain> for LayerDomains {
    fn from(domain: Domain) -> Self {
        Self::Uniform(domain)
    }
}

/// Macro / Meso / Micro ranges, in that order.
pub const fn per_layer(macro_: Domain, meso: Domain, micro: Domain) -> LayerDomains {
    LayerDomains::PerLayer([macro_, meso, micro])
}

const fn range(min: f64, max: f64) -> Domain {
    Domain::range(min, max)
}

const SWITCH: Domain = Domain::SWITCH;
const ANY: Domain = Domain::ANY_FLOAT32;
/// Stochastic modulation width shared by every `*MR` parameter.
const MOD_RANGE: Domain = Domain::range(0.0, 0.75);

/// One row of the table before layer expansion.
#[derive(Debug, Clone)]
pub struct Template {
    pub name: &'static str,
    pub pattern: &'static str,
    pub layered: bool,
    pub value_type: ValueType,
    /// Overrides [`ValueType::default_wire`].
    pub wire: Option<OscType>,
    pub domains: LayerDomains,
    pub category: CommandCategory,
    pub description: &'static str,
}

/// Generates [`templates`] from two sections:
/// - `single`: `[Category] leaf: Type [as Wire], domain => "description";`
/// - `layered`: `[Category] name => "pattern": Type, domains => "description";`
macro_rules! define_parameters {
    (
        single {
            $(
                [ $sc:ident ] $sn:ident : $st:ident $( as $sw:ident )? , $sd:expr
                => $sdesc:literal ;
            )*
        }
        layered {
            $(
                [ $lc:ident ] $ln:ident => $lp:literal : $lt:ident , $ld:expr
                => $ldesc:literal ;
            )*
        }
    ) => {
        /// Every row of the built-in table, single commands first.
        pub fn templates() -> Vec<Template> {
            vec![
                $( Template {
                    name: stringify!($sn),
                    pattern: stringify!($sn),
                    layered: false,
                    value_type: ValueType::$st,
                    wire: define_parameters!(@wire $($sw)?),
                    domains: LayerDomains::Uniform($sd),
                    category: CommandCategory::$sc,
                    description: $sdesc,
                }, )*
                $( Template {
                    name: stringify!($ln),
                    pattern: $lp,
                    layered: true,
                    value_type: ValueType::$lt,
                    wire: None,
                    domains: LayerDomains::from($ld),
                    category: CommandCategory::$lc,
                    description: $ldesc,
                }, )*
            ]
        }
    };
    (@wire) => { None };
    (@wire $w:ident) => { Some(OscType::$w) };
}

define_parameters! {
    single {
        // ── Transport (3) ───────────────────────────────────────
        [Transport] playstartstop: Boolean, SWITCH
            => "Start (1) or stop (0) playback.";
        // The patch reads slot and BPM as floats.
        [Transport] presetslot: Integer as Float, range(1.0, 10.0)
            => "Select a preset slot (1-10).";
        [Transport] seqbpm: Integer as Float, range(10.0, 300.0)
            => "Set the sequencer BPM (10-300).";

        // ── Gain (1) ────────────────────────────────────────────
        [Gain] DryWet: Float, range(0.0, 1.0)
            => "Dry/wet balance: 0 = original input, 1 = synthesis.";

        // ── Granulator (3) ──────────────────────────────────────
        [Granulator] granusw: Boolean, SWITCH
            => "Granulator on/off.";
        [Granulator] granuDur: Float, range(10.0, 1000.0)
            => "Granular chunk duration (10-1000).";
        [Granulator] granuDurMR: Float, MOD_RANGE
            => "Granular duration modulation range (0-0.75).";

        // ── DSP interactables (12) ──────────────────────────────
        [BlackHole] BHsw: Boolean, SWITCH
            => "Black Hole on/off.";
        [WhiteHole] WHsw: Boolean, SWITCH
            => "White Hole on/off.";
        [RingModulator] RMsw: Boolean, SWITCH
            => "Ring modulator on/off.";
        [Bitcrusher] CRSsw: Boolean, SWITCH
            => "Bitcrusher/decimator on/off.";
        [Bitcrusher] CRSbitLvl: Float, range(0.0, 1.0)
            => "Bitcrusher bit depth level (0-1).";
        [Bitcrusher] CRSrange: Float, range(0.0, 5.0)
            => "Bitcrusher sampling frequency range (0-5).";
        [Resonator] ResoSw: Boolean, SWITCH
            => "Resonator on/off.";
        [Resonator] ResoFreqdist: Float, range(1.0, 3.0)
            => "Resonator frequency distribution (1-3).";
        [Resonator] ResoBalance: Float, range(0.0, 0.5)
            => "Resonator wet/dry balance (0-0.5).";
        [CuboidFx] C1sw: Boolean, SWITCH
            => "Cuboid 1 on/off.";
        [CuboidFx] C2sw: Boolean, SWITCH
            => "Cuboid 2 on/off.";
        [CuboidFx] C3sw: Boolean, SWITCH
            => "Cuboid 3 on/off.";

        // ── IsoMorph (8) ────────────────────────────────────────
        [Isomorph] isomorphsw: Boolean, SWITCH
            => "IsoMorph modulation on/off.";
        [Isomorph] isomfreqsw: Boolean, SWITCH
            => "IsoMorph frequency modulation target on/off.";
        [Isomorph] isomampsw: Boolean, SWITCH
            => "IsoMorph amplitude modulation target on/off.";
        [Isomorph] isomressw: Boolean, SWITCH
            => "IsoMorph resonance modulation target on/off.";
        [Isomorph] isomfreqmodr: Float, range(0.0, 2.0)
            => "IsoMorph frequency modulation depth (0-2).";
        [Isomorph] isomampmodr: Float, range(0.0, 2.0)
            => "IsoMorph amplitude modulation depth (0-2).";
        [Isomorph] isomresmodr: Float, range(0.0, 2.0)
            => "IsoMorph resonance modulation depth (0-2).";
        [Isomorph] isombpcent: Float, range(0.0, 5000.0)
            => "IsoMorph bandpass center frequency (0-5000).";

        // ── Navigation & tuning (5) ─────────────────────────────
        [Navigation] navigrndtrig: Boolean, SWITCH
            => "Random navigation mode trigger.";
        [Navigation] rearrtrig: Boolean, SWITCH
            => "Re-Arr trigger: rearranges input sample chunks.";
        [Navigation] polygatessw: Boolean, SWITCH
            => "Poly Gates (BPM-synced layer gating) on/off.";
        [Tuning] tuningpbsw: Boolean, SWITCH
            => "Apply the tuning scale to playback rate.";
        [Tuning] tuningressw: Boolean, SWITCH
            => "Apply the tuning scale to the resonator filter.";

        // ── Camera (2) ──────────────────────────────────────────
        [Camera] camzoom: Float, ANY
            => "Zoom the 3D camera (positive = in, negative = out).";
        [Camera] camrotate: Float, ANY
            => "Rotate the 3D camera, in radians.";
    }
    layered {
        // ── Gain & envelope (3) ─────────────────────────────────
        [Gain] gain => "{Layer}Gain": Float, range(-80.0, 20.0)
            => "Layer gain in dB (-80 to 20).";
        [Gain] gain_solo => "{Layer}Gainsolo": Boolean, SWITCH
            => "Solo (1) or unsolo (0) a layer.";
        [Envelope] envelope_time => "{Layer}Envtime": Float, range(0.01, 0.5)
            => "Attack/decay envelope time (0.01-0.5).";

        // ── Playback rate (2) ───────────────────────────────────
        [PlaybackRate] playback_rate => "pbr{layer}": Float,
            per_layer(range(0.3, 10.0), range(0.3, 20.0), range(0.3, 30.0))
            => "Agent playback rate (macro 0.3-10, meso 0.3-20, micro 0.3-30).";
        [PlaybackRate] playback_rate_mod_range => "pbr{layer}MR": Float, MOD_RANGE
            => "Playback rate modulation range (0-0.75).";

        // ── Bandpass filter (3) ─────────────────────────────────
        [BandpassFilter] filter_switch => "filt{layer}sw": Boolean, SWITCH
            => "Bandpass filter on/off.";
        [BandpassFilter] filter_freq => "filt{layer}": Float, range(80.0, 8000.0)
            => "Bandpass center frequency in Hz (80-8000).";
        [BandpassFilter] filter_mod_range => "filt{layer}MR": Float, MOD_RANGE
            => "Bandpass filter modulation range (0-0.75).";

        // ── Comb filter (3) ─────────────────────────────────────
        [CombFilter] comb_switch => "comb{layer}sw": Boolean, SWITCH
            => "Comb filter on/off.";
        [CombFilter] comb_delay => "comb{layer}": Float,
            per_layer(range(10.0, 3000.0), range(10.0, 1000.0), range(10.0, 300.0))
            => "Comb filter delay (macro 10-3000, meso 10-1000, micro 10-300).";
        [CombFilter] comb_mod_range => "comb{layer}MR": Float, MOD_RANGE
            => "Comb filter modulation range (0-0.75).";

        // ── Interactables & cuboids (4) ─────────────────────────
        [BlackHole] blackhole_force => "BH{layer}force": Float, range(0.0, 1.0)
            => "Black Hole gravitational force (0-1).";
        [WhiteHole] whitehole_force => "WH{layer}force": Float, range(0.0, 1.0)
            => "White Hole reflection force (0-1).";
        [RingModulator] ringmod_freq => "RM{layer}": Float, range(1.0, 3.0)
            => "Ring modulator center frequency (1-3).";
        [CuboidFx] cuboid_return_level => "{Layer}returnLvl": Float, range(1.0, 80.0)
            => "Cuboid FX return level (1-80).";
    }
}
