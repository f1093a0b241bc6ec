use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Gain value in decibels
pub type GainValue = f64;

/// Level reading in decibels
pub type LevelValue = f64;

/// A value written to (or cached for) one parameter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    /// Value as it appears on the right-hand side of a text command.
    ///
    /// Booleans travel as `1`/`0`, strings are quoted.
    pub fn to_script(&self) -> String {
        match self {
            ParamValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            ParamValue::Int(i) => i.to_string(),
            ParamValue::Float(f) => f.to_string(),
            ParamValue::Text(s) => format!("\"{}\"", s),
        }
    }

    /// Interpret as a boolean flag (`1`/`0` or `true`/`false`)
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(b) => Some(*b),
            ParamValue::Int(i) => Some(*i != 0),
            ParamValue::Float(f) => Some(*f != 0.0),
            ParamValue::Text(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<i32> for ParamValue {
    fn from(value: i32) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<u16> for ParamValue {
    fn from(value: u16) -> Self {
        ParamValue::Int(value as i64)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

/// Notification delivered to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Event {
    /// A non-level parameter changed in the latest snapshot
    ParameterChanged,
    /// A level meter moved outside the quiet-floor tolerance
    LevelChanged,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::ParameterChanged => f.write_str("pdirty"),
            Event::LevelChanged => f.write_str("ldirty"),
        }
    }
}

/// Product reported by the remote in its snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MixerType {
    Basic,
    Banana,
    Potato,
}

impl MixerType {
    /// Decode the snapshot's device type byte (1-based)
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(MixerType::Basic),
            2 => Some(MixerType::Banana),
            3 => Some(MixerType::Potato),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MixerType::Basic => "basic",
            MixerType::Banana => "banana",
            MixerType::Potato => "potato",
        }
    }
}

impl fmt::Display for MixerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutually exclusive bus mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusMode {
    Normal,
    Amix,
    Bmix,
    Repeat,
    Composite,
    Tvmix,
    Upmix21,
    Upmix41,
    Upmix61,
    Centeronly,
    Lfeonly,
    Rearonly,
}

impl BusMode {
    pub const ALL: [BusMode; 12] = [
        BusMode::Normal,
        BusMode::Amix,
        BusMode::Bmix,
        BusMode::Repeat,
        BusMode::Composite,
        BusMode::Tvmix,
        BusMode::Upmix21,
        BusMode::Upmix41,
        BusMode::Upmix61,
        BusMode::Centeronly,
        BusMode::Lfeonly,
        BusMode::Rearonly,
    ];

    /// Name used in `Bus[n].mode.<name>` commands
    pub fn as_str(&self) -> &'static str {
        match self {
            BusMode::Normal => "normal",
            BusMode::Amix => "amix",
            BusMode::Bmix => "bmix",
            BusMode::Repeat => "repeat",
            BusMode::Composite => "composite",
            BusMode::Tvmix => "tvmix",
            BusMode::Upmix21 => "upmix21",
            BusMode::Upmix41 => "upmix41",
            BusMode::Upmix61 => "upmix61",
            BusMode::Centeronly => "centeronly",
            BusMode::Lfeonly => "lfeonly",
            BusMode::Rearonly => "rearonly",
        }
    }
}

impl fmt::Display for BusMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BusMode {
    type Err = crate::error::VbanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        BusMode::ALL
            .iter()
            .find(|mode| mode.as_str() == lower)
            .copied()
            .ok_or_else(|| crate::error::VbanError::Value(format!("unknown bus mode '{}'", s)))
    }
}
