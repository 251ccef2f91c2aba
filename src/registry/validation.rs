//! Value typing and domain checks.
//!
//! Collaborators hand in untyped numbers. They arrive here as a
//! [`NumericValue`], get coerced to the command's declared [`ValueType`], are
//! checked against its [`Domain`] and come out as the [`OscArg`] to transmit.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{ArgumentSpec, Domain, ValueType};
use crate::error::DispatchError;
use crate::osc::{OscArg, OscType};

/// A number as supplied by a caller, before it is matched to a command.
///
/// Deserializes untagged: JSON `true` is `Bool`, `120` is `Integer`,
/// `120.0` and `0.8` are `Float`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum NumericValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
}

impl fmt::Display for NumericValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v:?}"),
        }
    }
}

impl FromStr for NumericValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "true" => return Ok(Self::Bool(true)),
            "false" => return Ok(Self::Bool(false)),
            _ => {}
        }
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Self::Integer(i));
        }
        s.parse::<f64>()
            .map(Self::Float)
            .map_err(|_| format!("'{s}' is not a number"))
    }
}

impl From<f64> for NumericValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for NumericValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<bool> for NumericValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

/// A value after coercion to the declared type.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Coerced {
    Real(f64),
    Whole(i64),
}

impl Coerced {
    #[allow(clippy::cast_precision_loss)]
    fn as_f64(self) -> f64 {
        match self {
            Self::Real(v) => v,
            Self::Whole(i) => i as f64,
        }
    }
}

/// Coerce, domain-check and wire-encode one value for `command`.
pub fn check_value(
    command: &str,
    spec: &ArgumentSpec,
    value: NumericValue,
) -> Result<OscArg, DispatchError> {
    let coerced = coerce(command, spec.value_type, value)?;
    check_domain(command, &spec.domain, coerced)?;
    to_wire(command, spec.wire, coerced)
}

fn type_error(command: &str, message: String) -> DispatchError {
    DispatchError::TypeError {
        command: command.to_string(),
        message,
    }
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::float_cmp)]
fn coerce(
    command: &str,
    value_type: ValueType,
    value: NumericValue,
) -> Result<Coerced, DispatchError> {
    match (value_type, value) {
        (ValueType::Float, NumericValue::Float(v)) if v.is_nan() => {
            Err(type_error(command, "expects a number, got NaN".to_string()))
        }
        (ValueType::Float, NumericValue::Float(v)) => Ok(Coerced::Real(v)),
        (ValueType::Float, NumericValue::Integer(i)) => Ok(Coerced::Real(i as f64)),
        (ValueType::Float, NumericValue::Bool(b)) => Err(type_error(
            command,
            format!("expects a float, got boolean {b}"),
        )),

        (ValueType::Integer, NumericValue::Integer(i)) => Ok(Coerced::Whole(i)),
        // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound.
        (ValueType::Integer, NumericValue::Float(v))
            if v.is_finite() && v.fract() == 0.0 && v >= i64::MIN as f64 && v < i64::MAX as f64 =>
        {
            Ok(Coerced::Whole(v as i64))
        }
        (ValueType::Integer, NumericValue::Float(v)) => Err(type_error(
            command,
            format!("expects an integer, got {v:?}"),
        )),
        (ValueType::Integer, NumericValue::Bool(b)) => Err(type_error(
            command,
            format!("expects an integer, got boolean {b}"),
        )),

        (ValueType::Boolean, NumericValue::Bool(b)) => Ok(Coerced::Whole(i64::from(b))),
        (ValueType::Boolean, NumericValue::Integer(i @ (0 | 1))) => Ok(Coerced::Whole(i)),
        (ValueType::Boolean, NumericValue::Float(v)) if v == 0.0 || v == 1.0 => {
            Ok(Coerced::Whole(v as i64))
        }
        (ValueType::Boolean, other) => Err(type_error(
            command,
            format!("is a switch and only accepts 0 or 1, got {other}"),
        )),
    }
}

fn check_domain(command: &str, domain: &Domain, value: Coerced) -> Result<(), DispatchError> {
    match *domain {
        Domain::Range { min, max } => {
            let v = value.as_f64();
            if v < min || v > max {
                return Err(DispatchError::RangeError {
                    command: command.to_string(),
                    value: v,
                    min,
                    max,
                });
            }
            Ok(())
        }
        Domain::Set { members } => {
            let is_member = match value {
                Coerced::Whole(i) => members.contains(&i),
                #[allow(clippy::cast_precision_loss, clippy::float_cmp)]
                Coerced::Real(v) => members.iter().any(|&m| m as f64 == v),
            };
            if is_member {
                Ok(())
            } else {
                Err(type_error(
                    command,
                    format!("{} is not one of {domain}", value.as_f64()),
                ))
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_wire(command: &str, wire: OscType, value: Coerced) -> Result<OscArg, DispatchError> {
    match (wire, value) {
        (OscType::Float, v) => Ok(OscArg::Float(v.as_f64() as f32)),
        (OscType::Int, Coerced::Whole(i)) => i32::try_from(i)
            .map(OscArg::Int)
            .map_err(|_| type_error(command, format!("{i} does not fit in a 32-bit integer"))),
        (OscType::Int, Coerced::Real(v)) => Err(type_error(
            command,
            format!("{v:?} cannot be sent as an integer"),
        )),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::registry::{Layer, Registry};

    fn registry() -> Registry {
        Registry::builtin().unwrap()
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let reg = registry();
        assert_eq!(reg.validate("seqbpm", 10i64.into()).unwrap(), OscArg::Float(10.0));
        assert_eq!(reg.validate("seqbpm", 300i64.into()).unwrap(), OscArg::Float(300.0));
        assert!(matches!(
            reg.validate("seqbpm", 5i64.into()).unwrap_err(),
            DispatchError::RangeError { .. }
        ));
        assert!(matches!(
            reg.validate("seqbpm", 301i64.into()).unwrap_err(),
            DispatchError::RangeError { .. }
        ));
    }

    #[test]
    fn integer_commands_reject_fractions() {
        let reg = registry();
        let err = reg.validate("presetslot", 2.5.into()).unwrap_err();
        assert!(matches!(err, DispatchError::TypeError { .. }));
        // Integral floats are fine.
        assert_eq!(reg.validate("presetslot", 3.0.into()).unwrap(), OscArg::Float(3.0));
    }

    #[test]
    fn switches_accept_exactly_zero_and_one() {
        let reg = registry();
        assert_eq!(reg.validate("granusw", 1i64.into()).unwrap(), OscArg::Int(1));
        assert_eq!(reg.validate("granusw", 0.0.into()).unwrap(), OscArg::Int(0));
        assert_eq!(reg.validate("granusw", true.into()).unwrap(), OscArg::Int(1));
        for bad in [NumericValue::Integer(2), NumericValue::Float(0.5), NumericValue::Integer(-1)] {
            assert!(
                matches!(reg.validate("granusw", bad), Err(DispatchError::TypeError { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn float_commands_reject_booleans_and_nan() {
        let reg = registry();
        assert!(matches!(
            reg.validate("DryWet", true.into()),
            Err(DispatchError::TypeError { .. })
        ));
        assert!(matches!(
            reg.validate("DryWet", f64::NAN.into()),
            Err(DispatchError::TypeError { .. })
        ));
    }

    #[test]
    fn camera_accepts_any_finite_float32() {
        let reg = registry();
        assert_eq!(reg.validate("camrotate", (-3.5).into()).unwrap(), OscArg::Float(-3.5));
        assert!(matches!(
            reg.validate("camzoom", f64::INFINITY.into()),
            Err(DispatchError::RangeError { .. })
        ));
    }

    #[test]
    fn layered_instances_validate_against_their_own_range() {
        let reg = registry();
        let micro = reg.lookup("playback_rate", Some(Layer::Micro)).unwrap();
        let macro_ = reg.lookup("playback_rate", Some(Layer::Macro)).unwrap();
        assert!(micro.validate(25.0.into()).is_ok());
        assert!(matches!(
            macro_.validate(25.0.into()),
            Err(DispatchError::RangeError { .. })
        ));
    }

    #[test]
    fn parses_cli_values() {
        assert_eq!("120".parse::<NumericValue>().unwrap(), NumericValue::Integer(120));
        assert_eq!("0.8".parse::<NumericValue>().unwrap(), NumericValue::Float(0.8));
        assert_eq!("true".parse::<NumericValue>().unwrap(), NumericValue::Bool(true));
        assert!("loud".parse::<NumericValue>().is_err());
    }

    #[test]
    fn deserializes_untagged_json() {
        let values: Vec<NumericValue> = serde_json::from_str("[1, 2.5, true, 3.0]").unwrap();
        assert_eq!(
            values,
            vec![
                NumericValue::Integer(1),
                NumericValue::Float(2.5),
                NumericValue::Bool(true),
                NumericValue::Float(3.0),
            ]
        );
    }

    /// Smallest step below/above a bound that is still distinguishable.
    fn epsilon(bound: f64) -> f64 {
        (bound.abs() * 1e-9).max(1e-9)
    }

    #[test]
    fn every_range_command_accepts_bounds_and_rejects_just_outside() {
        let reg = registry();
        for d in reg.list() {
            let Domain::Range { min, max } = d.argument.domain else {
                continue;
            };
            if d.argument.domain == Domain::ANY_FLOAT32 {
                continue;
            }
            assert!(d.validate(min.into()).is_ok(), "{} min", d.name);
            assert!(d.validate(max.into()).is_ok(), "{} max", d.name);
            let below = d.validate((min - epsilon(min)).into()).unwrap_err();
            let above = d.validate((max + epsilon(max)).into()).unwrap_err();
            // Integer commands may report the fraction before the range.
            for err in [below, above] {
                assert!(
                    matches!(
                        err,
                        DispatchError::RangeError { .. } | DispatchError::TypeError { .. }
                    ),
                    "{}: {err}",
                    d.name
                );
            }
            if d.argument.value_type == ValueType::Integer {
                #[allow(clippy::cast_possible_truncation)]
                let (lo, hi) = (min as i64 - 1, max as i64 + 1);
                assert!(matches!(
                    d.validate(lo.into()),
                    Err(DispatchError::RangeError { .. })
                ));
                assert!(matches!(
                    d.validate(hi.into()),
                    Err(DispatchError::RangeError { .. })
                ));
            }
        }
    }

    proptest! {
        #[test]
        fn switches_reject_everything_but_zero_and_one(v in any::<f64>()) {
            prop_assume!(v != 0.0 && v != 1.0);
            let reg = registry();
            for d in reg.list().filter(|d| d.argument.domain == Domain::SWITCH) {
                prop_assert!(
                    matches!(d.validate(v.into()), Err(DispatchError::TypeError { .. })),
                    "{} accepted {}", d.name, v
                );
            }
        }

        #[test]
        fn in_range_floats_encode_as_float32(v in 80.0f64..=8000.0) {
            let reg = registry();
            let d = reg.lookup("filter_freq", Some(Layer::Meso)).unwrap();
            #[allow(clippy::cast_possible_truncation)]
            let expected = OscArg::Float(v as f32);
            prop_assert_eq!(d.validate(v.into()).unwrap(), expected);
        }
    }
}
