//! Step rate values and the voltage tier resolver
//!
//! A step's `value` is either a plain rate or a table keyed by delivery
//! voltage band (`"0-2.2 kV"`, `"Over 60 kV"`). The shape is decided once when
//! the tariff document is read; resolving a rate never re-parses labels.

use regex::Regex;
use serde::de::{self, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::Deserialize;
use std::fmt;
use std::sync::LazyLock;
use tracing::warn;

static NUMBER: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?"));

/// Result of a lookup that may fall back to a conservative default
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Value(f64),
    /// Zero contribution, with the reason kept for the trace
    Default(String),
}

impl Outcome {
    /// Numeric value, 0.0 for a default
    pub fn value(&self) -> f64 {
        match self {
            Outcome::Value(v) => *v,
            Outcome::Default(_) => 0.0,
        }
    }

    pub fn default_reason(&self) -> Option<&str> {
        match self {
            Outcome::Value(_) => None,
            Outcome::Default(reason) => Some(reason),
        }
    }
}

/// One voltage band of a tiered rate, bounds inclusive
#[derive(Debug, Clone, PartialEq)]
pub struct VoltageTier {
    pub label: String,
    pub low_kv: f64,
    pub high_kv: f64,
    /// None when the document's rate for this band is not numeric
    pub rate: Option<f64>,
}

impl VoltageTier {
    pub fn new(label: impl Into<String>, rate: Option<f64>) -> Self {
        let label = label.into();
        let (low_kv, high_kv) = parse_tier_label(&label);
        Self {
            label,
            low_kv,
            high_kv,
            rate,
        }
    }

    pub fn contains(&self, kv: f64) -> bool {
        self.low_kv <= kv && kv <= self.high_kv
    }
}

/// Value of a logic step
#[derive(Debug, Clone, PartialEq)]
pub enum RateValue {
    Scalar(f64),
    /// Bands in document order; the first matching band wins
    Tiered(Vec<VoltageTier>),
    /// Present but not a number (raw text kept for messages)
    Invalid(String),
}

impl Default for RateValue {
    fn default() -> Self {
        RateValue::Scalar(0.0)
    }
}

impl RateValue {
    pub fn is_tiered(&self) -> bool {
        matches!(self, RateValue::Tiered(_))
    }

    /// Resolve to a scalar rate for the given delivery voltage (kV)
    ///
    /// Never fails: a non-numeric rate, a tiered rate without a voltage and a
    /// voltage outside every band all resolve to [`Outcome::Default`].
    pub fn resolve(&self, delivery_voltage: Option<f64>, step_name: &str) -> Outcome {
        match self {
            RateValue::Scalar(rate) => Outcome::Value(*rate),
            RateValue::Invalid(raw) => {
                warn!(step = step_name, value = raw.as_str(), "Could not parse numeric rate");
                Outcome::Default(format!("rate '{}' is not numeric", raw))
            },
            RateValue::Tiered(tiers) => {
                let Some(kv) = delivery_voltage else {
                    warn!(step = step_name, "delivery_voltage not provided but value is tiered");
                    return Outcome::Default("no delivery voltage for tiered rate".to_string());
                };

                match tiers.iter().find(|tier| tier.contains(kv)) {
                    Some(VoltageTier {
                        rate: Some(rate), ..
                    }) => Outcome::Value(*rate),
                    Some(tier) => {
                        warn!(
                            step = step_name,
                            tier = tier.label.as_str(),
                            "Could not parse tiered rate"
                        );
                        Outcome::Default(format!("rate for tier '{}' is not numeric", tier.label))
                    },
                    None => {
                        warn!(step = step_name, delivery_voltage = kv, "No voltage tier match");
                        Outcome::Default(format!("no voltage tier matches {} kV", kv))
                    },
                }
            },
        }
    }
}

/// Parse a band label into an inclusive `(low_kv, high_kv)` range
///
/// - `"A-B kV"` → `(A, B)`
/// - `"Over N kV"` / `"Over N"` → `(N, ∞)`
/// - a single number → `(N, N)`
/// - anything else → `(0, ∞)`
pub fn parse_tier_label(label: &str) -> (f64, f64) {
    let text = label.replace("kV", "");
    let text = text.trim();
    let numbers: Vec<f64> = match NUMBER.as_ref() {
        Ok(re) => re
            .find_iter(text)
            .filter_map(|m| m.as_str().parse().ok())
            .collect(),
        Err(_) => Vec::new(),
    };

    if text.to_lowercase().starts_with("over") {
        return (numbers.first().copied().unwrap_or(0.0), f64::INFINITY);
    }

    match numbers.as_slice() {
        [low, high, ..] => (*low, *high),
        [point] => (*point, *point),
        [] => {
            warn!(tier = label, "Unrecognised voltage tier label, matching all voltages");
            (0.0, f64::INFINITY)
        },
    }
}

/// Numeric reading of a JSON scalar: `null` and `false` read as 0,
/// numeric text is parsed
fn number_from_json(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Null => Some(0.0),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => parse_text(s),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => None,
    }
}

fn parse_text(s: &str) -> Option<f64> {
    let t = s.trim();
    if t.is_empty() {
        return Some(0.0);
    }
    t.parse::<f64>().ok().filter(|v| v.is_finite())
}

struct RateValueVisitor;

impl<'de> Visitor<'de> for RateValueVisitor {
    type Value = RateValue;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a rate or a map of voltage band to rate")
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<RateValue, E> {
        Ok(RateValue::Scalar(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<RateValue, E> {
        Ok(RateValue::Scalar(v as f64))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<RateValue, E> {
        Ok(RateValue::Scalar(v as f64))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<RateValue, E> {
        Ok(RateValue::Scalar(if v { 1.0 } else { 0.0 }))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<RateValue, E> {
        Ok(match parse_text(v) {
            Some(rate) => RateValue::Scalar(rate),
            None => RateValue::Invalid(v.to_string()),
        })
    }

    fn visit_unit<E: de::Error>(self) -> Result<RateValue, E> {
        Ok(RateValue::Scalar(0.0))
    }

    fn visit_none<E: de::Error>(self) -> Result<RateValue, E> {
        Ok(RateValue::Scalar(0.0))
    }

    fn visit_some<D: Deserializer<'de>>(self, deserializer: D) -> Result<RateValue, D::Error> {
        deserializer.deserialize_any(self)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<RateValue, A::Error> {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element::<serde_json::Value>()? {
            items.push(item);
        }
        Ok(RateValue::Invalid(serde_json::Value::Array(items).to_string()))
    }

    // map entries are read in document order
    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<RateValue, A::Error> {
        let mut tiers = Vec::new();
        while let Some((label, rate)) = map.next_entry::<String, serde_json::Value>()? {
            tiers.push(VoltageTier::new(label, number_from_json(&rate)));
        }
        Ok(RateValue::Tiered(tiers))
    }
}

impl<'de> Deserialize<'de> for RateValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(RateValueVisitor)
    }
}

impl fmt::Display for RateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateValue::Scalar(v) => write!(f, "{}", v),
            RateValue::Invalid(raw) => write!(f, "{:?} (not numeric)", raw),
            RateValue::Tiered(tiers) => {
                for (i, tier) in tiers.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match tier.rate {
                        Some(rate) => write!(f, "{}: {}", tier.label, rate)?,
                        None => write!(f, "{}: ?", tier.label)?,
                    }
                }
                Ok(())
            },
        }
    }
}
