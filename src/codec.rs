//! Register codec: turns raw 16-bit register words into typed values and back.
//!
//! Everything here is pure. Reading and writing happens in `transport`, and
//! deciding which words to read lives in `plan`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterSpace {
    Holding,
    Input,
}

// Switch {{{
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Switch {
    #[serde(rename = "ON")]
    On,
    #[serde(rename = "OFF")]
    Off,
}

impl Switch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Switch::On => "ON",
            Switch::Off => "OFF",
        }
    }

    /// Accepts the spellings control messages tend to use for a flag.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" | "1" | "true" | "enable" | "enabled" => Some(Switch::On),
            "off" | "0" | "false" | "disable" | "disabled" => Some(Switch::Off),
            _ => None,
        }
    }
}

impl From<bool> for Switch {
    fn from(on: bool) -> Self {
        if on {
            Switch::On
        } else {
            Switch::Off
        }
    }
} // }}}

// Value {{{
/// A decoded field value. Serializes as a bare number, `"ON"`/`"OFF"`, or a string.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Number(f64),
    Switch(Switch),
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Switch(s) => write!(f, "{}", s.as_str()),
            Value::Text(t) => write!(f, "{:?}", t),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<Switch> for Value {
    fn from(s: Switch) -> Self {
        Value::Switch(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
} // }}}

pub type EnumTable = &'static [(u16, &'static str)];

/// How a field occupies its register(s).
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FieldKind {
    /// One word, `raw / scale`.
    Scaled { scale: u16 },
    /// Two words, high word at the lower address, `(high << 16 | low) / scale`.
    Combined32 { scale: u16 },
    /// Upper byte of a word shared with a `LowByte` field.
    HighByte,
    /// Lower byte of a word shared with a `HighByte` field.
    LowByte,
    /// Code table; unknown codes decode to their raw number.
    Enumerated(EnumTable),
    /// 0 = OFF, anything else = ON.
    Switch,
}

impl FieldKind {
    pub fn word_span(&self) -> u16 {
        match self {
            FieldKind::Combined32 { .. } => 2,
            _ => 1,
        }
    }

    pub fn is_packed(&self) -> bool {
        matches!(self, FieldKind::HighByte | FieldKind::LowByte)
    }

    fn scale(&self) -> u16 {
        match self {
            FieldKind::Scaled { scale } | FieldKind::Combined32 { scale } => (*scale).max(1),
            _ => 1,
        }
    }
}

// FieldRule {{{
#[derive(Clone, Debug, PartialEq)]
pub struct FieldRule {
    pub name: &'static str,
    pub space: RegisterSpace,
    pub address: u16,
    pub kind: FieldKind,
    /// Inclusive numeric range accepted on write. Sensors leave this unset.
    pub bounds: Option<(f64, f64)>,
}

impl FieldRule {
    pub fn input(name: &'static str, address: u16, kind: FieldKind) -> Self {
        Self {
            name,
            space: RegisterSpace::Input,
            address,
            kind,
            bounds: None,
        }
    }

    pub fn holding(name: &'static str, address: u16, kind: FieldKind) -> Self {
        Self {
            name,
            space: RegisterSpace::Holding,
            address,
            kind,
            bounds: None,
        }
    }

    pub fn bounded(mut self, min: f64, max: f64) -> Self {
        self.bounds = Some((min, max));
        self
    }

    pub fn word_span(&self) -> u16 {
        self.kind.word_span()
    }

    pub fn last_address(&self) -> u16 {
        self.address.saturating_add(self.word_span() - 1)
    }

    pub fn overlaps(&self, other: &FieldRule) -> bool {
        self.space == other.space
            && self.address <= other.last_address()
            && other.address <= self.last_address()
    }

    pub fn same_range(&self, other: &FieldRule) -> bool {
        self.space == other.space
            && self.address == other.address
            && self.word_span() == other.word_span()
    }

    /// Why `value` is not acceptable for this field, if it isn't.
    pub fn violation(&self, value: &Value) -> Option<String> {
        match (self.kind, value) {
            (FieldKind::Switch, Value::Switch(_)) => None,
            (FieldKind::Switch, other) => Some(format!("expected ON or OFF, got {}", other)),
            (FieldKind::Enumerated(table), Value::Text(t)) => {
                if table.iter().any(|(_, name)| name.eq_ignore_ascii_case(t)) {
                    None
                } else {
                    Some(format!("{:?} is not a known option", t))
                }
            }
            (FieldKind::Enumerated(table), Value::Number(n)) => {
                if table.iter().any(|(code, _)| f64::from(*code) == *n) {
                    None
                } else {
                    Some(format!("{} is not a known code", n))
                }
            }
            (_, Value::Number(n)) if !n.is_finite() => Some("not a finite number".to_string()),
            (_, Value::Number(n)) => match self.bounds {
                Some((min, max)) if *n < min || *n > max => {
                    Some(format!("{} outside [{}, {}]", n, min, max))
                }
                _ => None,
            },
            (_, other) => Some(format!("expected a number, got {}", other)),
        }
    }

    fn invalid(&self, value: &Value, reason: impl Into<String>) -> Error {
        Error::InvalidFieldValue {
            field: self.name.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Converts a numeric value into the raw integer the device stores.
    fn raw_number(&self, value: &Value, max: u32) -> Result<u32> {
        let n = value
            .as_number()
            .ok_or_else(|| self.invalid(value, "expected a number"))?;
        if !n.is_finite() || n < 0.0 {
            return Err(self.invalid(value, "must be a non-negative finite number"));
        }

        let scale = self.kind.scale();
        let scaled = n * f64::from(scale);
        let rounded = scaled.round();
        if (scaled - rounded).abs() > 1e-6 {
            return Err(self.invalid(
                value,
                format!("not representable at 1/{} resolution", scale),
            ));
        }
        if rounded > f64::from(max) {
            return Err(self.invalid(value, format!("raw value {} exceeds {}", rounded, max)));
        }

        Ok(rounded as u32)
    }
} // }}}

// RegisterWindow {{{
/// Words read from one contiguous address range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegisterWindow {
    pub space: RegisterSpace,
    pub start: u16,
    pub words: Vec<u16>,
}

impl RegisterWindow {
    pub fn new(space: RegisterSpace, start: u16, words: Vec<u16>) -> Self {
        Self { space, start, words }
    }

    pub fn covers(&self, rule: &FieldRule) -> bool {
        self.words_for(rule).is_some()
    }

    fn words_for(&self, rule: &FieldRule) -> Option<&[u16]> {
        if rule.space != self.space || rule.address < self.start {
            return None;
        }
        let offset = usize::from(rule.address - self.start);
        self.words.get(offset..offset + usize::from(rule.word_span()))
    }
} // }}}

/// Decodes one field out of a window that covers it.
pub fn decode(window: &RegisterWindow, rule: &FieldRule) -> Result<Value> {
    let words = window
        .words_for(rule)
        .ok_or_else(|| Error::WindowMismatch {
            field: rule.name.to_string(),
            space: window.space,
            start: window.start,
            len: window.words.len(),
        })?;

    Ok(decode_words(rule.kind, words))
}

/// Decodes every rule from whichever window covers it.
pub fn decode_all<'a, I>(windows: &[RegisterWindow], rules: I) -> Result<BTreeMap<String, Value>>
where
    I: IntoIterator<Item = &'a FieldRule>,
{
    let mut values = BTreeMap::new();
    for rule in rules {
        let window = windows
            .iter()
            .find(|w| w.covers(rule))
            .ok_or_else(|| Error::WindowMismatch {
                field: rule.name.to_string(),
                space: rule.space,
                start: rule.address,
                len: 0,
            })?;
        values.insert(rule.name.to_string(), decode(window, rule)?);
    }
    Ok(values)
}

pub fn decode_words(kind: FieldKind, words: &[u16]) -> Value {
    let first = words.first().copied().unwrap_or_default();
    let scale = f64::from(kind.scale());

    match kind {
        FieldKind::Scaled { .. } => Value::Number(f64::from(first) / scale),
        FieldKind::Combined32 { .. } => {
            let low = words.get(1).copied().unwrap_or_default();
            let raw = (u32::from(first) << 16) | u32::from(low);
            Value::Number(f64::from(raw) / scale)
        }
        FieldKind::HighByte => Value::Number(f64::from(first >> 8)),
        FieldKind::LowByte => Value::Number(f64::from(first & 0xFF)),
        FieldKind::Enumerated(table) => table
            .iter()
            .find(|(code, _)| *code == first)
            .map(|(_, name)| Value::Text(name.to_string()))
            .unwrap_or(Value::Number(f64::from(first))),
        FieldKind::Switch => Value::Switch(Switch::from(first != 0)),
    }
}

/// The bits one field contributes to one register word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WordBits {
    pub address: u16,
    pub bits: u16,
    pub mask: u16,
}

impl WordBits {
    fn whole(address: u16, word: u16) -> Self {
        Self {
            address,
            bits: word,
            mask: 0xFFFF,
        }
    }
}

pub fn encode_field(rule: &FieldRule, value: &Value) -> Result<Vec<WordBits>> {
    let bits = match rule.kind {
        FieldKind::Scaled { .. } => {
            let raw = rule.raw_number(value, u32::from(u16::MAX))?;
            vec![WordBits::whole(rule.address, raw as u16)]
        }
        FieldKind::Combined32 { .. } => {
            let raw = rule.raw_number(value, u32::MAX)?;
            vec![
                WordBits::whole(rule.address, (raw >> 16) as u16),
                WordBits::whole(rule.address.saturating_add(1), (raw & 0xFFFF) as u16),
            ]
        }
        FieldKind::HighByte => {
            let raw = rule.raw_number(value, 0xFF)? as u16;
            vec![WordBits {
                address: rule.address,
                bits: raw << 8,
                mask: 0xFF00,
            }]
        }
        FieldKind::LowByte => {
            let raw = rule.raw_number(value, 0xFF)? as u16;
            vec![WordBits {
                address: rule.address,
                bits: raw,
                mask: 0x00FF,
            }]
        }
        FieldKind::Enumerated(table) => {
            let code = match value {
                Value::Text(t) => table
                    .iter()
                    .find(|(_, name)| name.eq_ignore_ascii_case(t))
                    .map(|(code, _)| *code)
                    .ok_or_else(|| rule.invalid(value, "not a known option"))?,
                _ => rule.raw_number(value, u32::from(u16::MAX))? as u16,
            };
            vec![WordBits::whole(rule.address, code)]
        }
        FieldKind::Switch => match value {
            Value::Switch(Switch::On) => vec![WordBits::whole(rule.address, 1)],
            Value::Switch(Switch::Off) => vec![WordBits::whole(rule.address, 0)],
            _ => return Err(rule.invalid(value, "expected ON or OFF")),
        },
    };

    Ok(bits)
}

/// Encodes a whole domain into complete register words, keyed by address.
///
/// Words shared by packed sub-fields are rebuilt from every sub-field's value
/// in `state`, never from a single field.
pub fn encode_domain<'a, I>(rules: I, state: &BTreeMap<String, Value>) -> Result<BTreeMap<u16, u16>>
where
    I: IntoIterator<Item = &'a FieldRule>,
{
    let mut words: BTreeMap<u16, (u16, u16)> = BTreeMap::new();

    for rule in rules {
        let value = state.get(rule.name).ok_or_else(|| Error::InvalidFieldValue {
            field: rule.name.to_string(),
            value: "<missing>".to_string(),
            reason: "no value in domain state".to_string(),
        })?;

        for part in encode_field(rule, value)? {
            let (bits, mask) = words.entry(part.address).or_insert((0, 0));
            *bits = (*bits & !part.mask) | (part.bits & part.mask);
            *mask |= part.mask;
        }
    }

    if let Some((address, _)) = words.iter().find(|(_, (_, mask))| *mask != 0xFFFF) {
        return Err(Error::InvalidFieldValue {
            field: format!("register {}", address),
            value: "<partial word>".to_string(),
            reason: "domain does not describe every bit of this word".to_string(),
        });
    }

    Ok(words.into_iter().map(|(address, (bits, _))| (address, bits)).collect())
}
