//! Shared Serde deserializers
//!
//! Bill rows come from spreadsheets exported to CSV as often as from JSON, so
//! numeric and text fields are accepted in whatever shape they arrive:
//! - `null` / missing → None
//! - `""` (empty string) → None
//! - String number `"123.4"` → Some(123.4)
//! - Native number `123.4` → Some(123.4)
//! - Boolean → Some(1.0) / Some(0.0)

use serde::{Deserialize, Deserializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Float(f64),
    String(String),
}

/// Lenient optional number
///
/// Text that is not a number is treated as absent and logged, never rejected,
/// so a single dirty cell cannot drop the whole row.
pub fn deserialize_optional_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Option::<Scalar>::deserialize(deserializer)? {
        None => None,
        Some(Scalar::Bool(b)) => Some(if b { 1.0 } else { 0.0 }),
        Some(Scalar::Float(f)) => Some(f),
        Some(Scalar::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                match t.parse::<f64>() {
                    Ok(v) => Some(v),
                    Err(_) => {
                        tracing::warn!("Ignoring non-numeric value '{}'", s);
                        None
                    },
                }
            }
        },
    };
    // NaN cells behave like missing ones
    Ok(value.filter(|v| !v.is_nan()))
}

/// Lenient optional text: numbers and booleans are kept as their text form,
/// blank strings become None
pub fn deserialize_optional_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Scalar>::deserialize(deserializer)? {
        None => None,
        Some(Scalar::Bool(b)) => Some(b.to_string()),
        Some(Scalar::Float(f)) => Some(f.to_string()),
        Some(Scalar::String(s)) => {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        },
    })
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Row {
        #[serde(default, deserialize_with = "deserialize_optional_string")]
        name: Option<String>,
        #[serde(default, deserialize_with = "deserialize_optional_f64")]
        amount: Option<f64>,
    }

    #[test]
    fn test_json_shapes() {
        let row: Row = serde_json::from_str(r#"{"name": "SC-1", "amount": 12.5}"#).unwrap();
        assert_eq!(row.name.as_deref(), Some("SC-1"));
        assert_eq!(row.amount, Some(12.5));

        let row: Row = serde_json::from_str(r#"{"name": 9, "amount": "  42 "}"#).unwrap();
        assert_eq!(row.name.as_deref(), Some("9"));
        assert_eq!(row.amount, Some(42.0));

        let row: Row = serde_json::from_str(r#"{"name": "  ", "amount": null}"#).unwrap();
        assert_eq!(row.name, None);
        assert_eq!(row.amount, None);

        let row: Row = serde_json::from_str(r#"{"amount": true}"#).unwrap();
        assert_eq!(row.name, None);
        assert_eq!(row.amount, Some(1.0));
    }

    #[test]
    fn test_non_numeric_text_is_absent() {
        let row: Row = serde_json::from_str(r#"{"amount": "n/a"}"#).unwrap();
        assert_eq!(row.amount, None);
    }

    #[test]
    fn test_csv_rows() {
        let data = "name,amount\nSC 2,100.25\n,\nSC3,abc\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let rows: Vec<Row> = reader.deserialize().collect::<Result<_, _>>().unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].name.as_deref(), Some("SC 2"));
        assert_eq!(rows[0].amount, Some(100.25));
        assert_eq!(rows[1].name, None);
        assert_eq!(rows[1].amount, None);
        assert_eq!(rows[2].amount, None);
    }
}
