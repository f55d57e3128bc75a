//! Usage records (one bill row) and their evaluation context

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use common::serde_helpers::{deserialize_optional_f64, deserialize_optional_string};
use serde::{Deserialize, Serialize};
use tariff_calc::{Context, Value};

/// Billing period length assumed when a row does not carry one
pub const DEFAULT_DAYS_USED: f64 = 30.0;

/// Names an expression may reference
pub const CONTEXT_VARIABLES: [&str; 7] = [
    "user.billed_kwh",
    "user.billed_demand",
    "user.billed_rkva",
    "user.days_used",
    "user.bill_date",
    "time_of_use",
    "delivery_voltage",
];

/// One bill row as supplied by the caller
///
/// Every field is optional: dirty or missing cells degrade to defaults when
/// the context is built, they never reject the row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub account_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub service_class: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub billed_kwh: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub billed_demand: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub billed_rkva: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub days_used: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub bill_date: Option<String>,
    /// kV
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub delivery_voltage: Option<f64>,
    /// kV, preferred over `delivery_voltage` when non-zero
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub delivery_voltage_kv: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_optional_string")]
    pub time_of_use: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_f64")]
    pub bill_amount: Option<f64>,
}

impl UsageRecord {
    pub fn new(service_class: impl Into<String>) -> Self {
        Self {
            service_class: Some(service_class.into()),
            ..Self::default()
        }
    }

    /// Delivery voltage in kV
    pub fn voltage_kv(&self) -> Option<f64> {
        self.delivery_voltage_kv
            .filter(|kv| *kv != 0.0)
            .or(self.delivery_voltage)
    }

    /// Billing days, 30 when absent or zero
    pub fn days(&self) -> f64 {
        match self.days_used {
            Some(days) if days != 0.0 && days.is_finite() => days.trunc(),
            _ => DEFAULT_DAYS_USED,
        }
    }

    /// Amount actually billed, 0 when absent
    pub fn actual_bill(&self) -> f64 {
        self.bill_amount.unwrap_or(0.0)
    }

    /// Bill date as an expression value: a date when it parses, the raw text
    /// otherwise
    pub fn bill_date_value(&self) -> Value {
        match self.bill_date.as_deref() {
            None => Value::None,
            Some(raw) => parse_bill_date(raw).map_or_else(|| Value::from(raw), Value::Date),
        }
    }

    /// Closed evaluation context for this record
    pub fn to_context(&self) -> Context {
        Context::new()
            .with("user.billed_kwh", self.billed_kwh.unwrap_or(0.0))
            .with("user.billed_demand", self.billed_demand.unwrap_or(0.0))
            .with("user.billed_rkva", self.billed_rkva.unwrap_or(0.0))
            .with("user.days_used", self.days())
            .with("user.bill_date", self.bill_date_value())
            .with("time_of_use", self.time_of_use.clone())
            .with("delivery_voltage", self.voltage_kv())
    }
}

/// Parse the date formats bill exports use
pub fn parse_bill_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    ["%Y-%m-%d", "%m/%d/%Y", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive()))
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_context_has_exactly_the_closed_names() {
        let ctx = UsageRecord::new("SC1").to_context();
        let names: Vec<_> = ctx.names().collect();
        let mut expected = CONTEXT_VARIABLES.to_vec();
        expected.sort_unstable();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_defaults() {
        let record = UsageRecord::new("SC1");
        let ctx = record.to_context();
        assert_eq!(ctx.get("user.billed_kwh"), Some(&Value::Number(0.0)));
        assert_eq!(ctx.get("user.days_used"), Some(&Value::Number(30.0)));
        assert_eq!(ctx.get("user.bill_date"), Some(&Value::None));
        assert_eq!(ctx.get("delivery_voltage"), Some(&Value::None));
        assert_eq!(ctx.get("time_of_use"), Some(&Value::None));
        assert_eq!(record.actual_bill(), 0.0);
    }

    #[test]
    fn test_days_used() {
        let mut record = UsageRecord::new("SC1");
        record.days_used = Some(0.0);
        assert_eq!(record.days(), 30.0);
        record.days_used = Some(28.9);
        assert_eq!(record.days(), 28.0);
    }

    #[test]
    fn test_voltage_precedence() {
        let mut record = UsageRecord::new("SC3");
        record.delivery_voltage = Some(13.2);
        assert_eq!(record.voltage_kv(), Some(13.2));

        record.delivery_voltage_kv = Some(69.0);
        assert_eq!(record.voltage_kv(), Some(69.0));

        // zero kV column falls through to delivery_voltage
        record.delivery_voltage_kv = Some(0.0);
        assert_eq!(record.voltage_kv(), Some(13.2));
    }

    #[test]
    fn test_bill_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 7, 15).unwrap();
        for raw in [
            "2024-07-15",
            "2024-07-15 10:30:00",
            "2024-07-15T10:30:00Z",
            "07/15/2024",
            "2024/07/15",
        ] {
            assert_eq!(parse_bill_date(raw), Some(expected), "format {}", raw);
        }
        assert_eq!(parse_bill_date("mid July"), None);

        let mut record = UsageRecord::new("SC1");
        record.bill_date = Some("mid July".to_string());
        assert_eq!(record.bill_date_value(), Value::from("mid July"));
    }

    #[test]
    fn test_deserialize_json_row() {
        let record: UsageRecord = serde_json::from_str(
            r#"{"account_id": 1001, "service_class": "SC-2", "billed_kwh": "1,200",
                "billed_demand": 55, "bill_date": "2024-01-31", "bill_amount": "310.55",
                "time_of_use": "", "delivery_voltage": null}"#,
        )
        .unwrap();
        assert_eq!(record.account_id.as_deref(), Some("1001"));
        assert_eq!(record.service_class.as_deref(), Some("SC-2"));
        // thousands separators are not numbers
        assert_eq!(record.billed_kwh, None);
        assert_eq!(record.billed_demand, Some(55.0));
        assert_eq!(record.bill_amount, Some(310.55));
        assert_eq!(record.time_of_use, None);
        assert_eq!(record.delivery_voltage, None);
    }

    #[test]
    fn test_deserialize_csv_rows() {
        let data = "account_id,service_class,billed_kwh,bill_amount,delivery_voltage_kv\n\
                    A-1,SC1,850,112.40,\n\
                    A-2,SC 3,,n/a,13.2\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let records: Vec<UsageRecord> = reader.deserialize().collect::<Result<_, _>>().unwrap();

        assert_eq!(records[0].billed_kwh, Some(850.0));
        assert_eq!(records[0].voltage_kv(), None);
        assert_eq!(records[1].service_class.as_deref(), Some("SC 3"));
        assert_eq!(records[1].billed_kwh, None);
        assert_eq!(records[1].bill_amount, None);
        assert_eq!(records[1].voltage_kv(), Some(13.2));
    }
}
