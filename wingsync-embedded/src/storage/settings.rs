use alloc::string::String;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};
use crate::types::WING_COUNT;

/// Accepts any JSON for the field and keeps it only if it has the right shape.
/// A bad value leaves the field unset so the in-memory value survives.
fn lenient<'de, D, T>(deserializer: D) -> core::result::Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    match serde_json::from_value(value) {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => {
            log::warn!("Ignoring unreadable settings field: {}", e);
            Ok(None)
        }
    }
}

/// Persisted device settings. Every field is optional: a record only patches
/// what it carries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsRecord {
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub steps: Option<[u32; WING_COUNT]>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub destination: Option<[i32; WING_COUNT]>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub fixit: Option<[i32; WING_COUNT]>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub cycles: Option<[u32; WING_COUNT]>,

    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub reversed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub separately: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub inverted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub tandem: Option<bool>,

    /// Schedule string, see `RuleSet`.
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub smart: Option<String>,
    /// `"<lat>x<lon>"`, empty when unset.
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub dusk: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub dawn: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub sunset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub sunrise: Option<i64>,
    /// Calendar night.
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub twilight: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub lock: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub boundary: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub sensor_twilight: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub nightfall: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub daybreak: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient")]
    pub overstep: Option<i64>,
}

impl SettingsRecord {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            log::warn!("Settings record is not readable: {}", e);
            Error::InvalidSettings
        })
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|_| Error::InvalidSettings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lenient_fields() {
        let record = SettingsRecord::from_json(
            r#"{"steps":[200,0,0],"boundary":"bright","reversed":true,"destination":[1,2],"smart":null,"unknown":5}"#,
        )
        .unwrap();

        assert_eq!(record.steps, Some([200, 0, 0]));
        assert_eq!(record.boundary, None);
        assert_eq!(record.reversed, Some(true));
        assert_eq!(record.destination, None);
        assert_eq!(record.smart, None);
    }

    #[test]
    fn test_unreadable_record() {
        assert_eq!(SettingsRecord::from_json("[1,2,3]"), Err(Error::InvalidSettings));
        assert_eq!(SettingsRecord::from_json("{\"steps\":"), Err(Error::InvalidSettings));
    }

    #[test]
    fn test_round_trip_skips_unset() {
        let record = SettingsRecord {
            steps: Some([200, 200, 0]),
            location: Some(String::from("52.23x21.01")),
            lock: Some(false),
            ..Default::default()
        };

        let json = record.to_json().unwrap();
        assert_eq!(json, r#"{"steps":[200,200,0],"location":"52.23x21.01","lock":false}"#);
        assert_eq!(SettingsRecord::from_json(&json), Ok(record));
    }
}
