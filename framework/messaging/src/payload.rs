use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw payload fields as they travel over the bus.
pub type Fields = serde_json::Map<String, Value>;

#[derive(thiserror::Error, Debug)]
pub enum PayloadError {
    #[error("{payload} payload is missing required fields: {missing:?}")]
    MissingFields {
        payload: &'static str,
        missing: Vec<&'static str>,
    },
    #[error("invalid {payload} payload: {source}")]
    Invalid {
        payload: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{payload} payload did not serialize to an object")]
    NotAnObject { payload: &'static str },
}

/// A structured message exchanged over the notification bus.
///
/// Every payload declares the fields it requires. Building a payload from received fields fails
/// if any of them is missing. Fields beyond the required set are allowed and kept.
pub trait Payload: Serialize + DeserializeOwned {
    const NAME: &'static str;
    const REQUIRED_FIELDS: &'static [&'static str];

    fn from_fields(fields: Fields) -> Result<Self, PayloadError> {
        let missing = Self::REQUIRED_FIELDS
            .iter()
            .filter(|field| !fields.contains_key(**field))
            .copied()
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(PayloadError::MissingFields {
                payload: Self::NAME,
                missing,
            });
        }

        serde_json::from_value(Value::Object(fields)).map_err(|source| PayloadError::Invalid {
            payload: Self::NAME,
            source,
        })
    }

    fn to_fields(&self) -> Result<Fields, PayloadError> {
        match serde_json::to_value(self) {
            Ok(Value::Object(fields)) => Ok(fields),
            Ok(_) => Err(PayloadError::NotAnObject {
                payload: Self::NAME,
            }),
            Err(source) => Err(PayloadError::Invalid {
                payload: Self::NAME,
                source,
            }),
        }
    }
}

/// Lifecycle notification from a traffic generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorPayload {
    pub version: u32,
    /// 1-based index of the iteration this notification refers to
    pub iteration: u64,
    pub kpi: Value,
    #[serde(flatten)]
    pub extra: Fields,
}

impl GeneratorPayload {
    pub fn new(version: u32, iteration: u64, kpi: Value) -> Self {
        Self {
            version,
            iteration,
            kpi,
            extra: Fields::new(),
        }
    }
}

impl Payload for GeneratorPayload {
    const NAME: &'static str = "generator";
    const REQUIRED_FIELDS: &'static [&'static str] = &["version", "iteration", "kpi"];
}

/// Lifecycle notification from a runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerPayload {
    pub version: u32,
    pub data: Value,
    #[serde(flatten)]
    pub extra: Fields,
}

impl RunnerPayload {
    pub fn new(version: u32, data: Value) -> Self {
        Self {
            version,
            data,
            extra: Fields::new(),
        }
    }
}

impl Payload for RunnerPayload {
    const NAME: &'static str = "runner";
    const REQUIRED_FIELDS: &'static [&'static str] = &["version", "data"];
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(fields) => fields,
            _ => panic!("Expected an object"),
        }
    }

    #[test]
    fn generator_payload_requires_all_fields() {
        let err = GeneratorPayload::from_fields(fields(json!({"version": 1, "iteration": 3})))
            .unwrap_err();
        match err {
            PayloadError::MissingFields { payload, missing } => {
                assert_eq!(payload, "generator");
                assert_eq!(missing, vec!["kpi"]);
            }
            other => panic!("Unexpected error: {other}"),
        }
    }

    #[test]
    fn runner_payload_reports_every_missing_field() {
        let err = RunnerPayload::from_fields(Fields::new()).unwrap_err();
        assert!(
            matches!(err, PayloadError::MissingFields { ref missing, .. } if missing == &vec!["version", "data"])
        );
    }

    #[test]
    fn extra_fields_are_kept() {
        let payload = GeneratorPayload::from_fields(fields(json!({
            "version": 1,
            "iteration": 2,
            "kpi": {"rx_pps": 100},
            "host": "tg-0",
        })))
        .unwrap();

        assert_eq!(payload.iteration, 2);
        assert_eq!(payload.extra.get("host"), Some(&json!("tg-0")));

        let round_trip = payload.to_fields().unwrap();
        assert_eq!(round_trip.get("host"), Some(&json!("tg-0")));
        assert_eq!(round_trip.get("kpi"), Some(&json!({"rx_pps": 100})));
    }

    #[test]
    fn wrong_field_type_is_invalid() {
        let err = GeneratorPayload::from_fields(fields(json!({
            "version": 1,
            "iteration": "second",
            "kpi": null,
        })))
        .unwrap_err();
        assert!(matches!(err, PayloadError::Invalid { .. }));
    }
}
