//! Per-cycle user snapshot: profile and garden merged into one record, with
//! the sensor list re-keyed by serial.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{BridgeError, Result};
use crate::ident;

/// One registered sensor. Every field the cloud sent is kept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRecord {
    pub sensor_serial: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl SensorRecord {
    /// Identifier the peripheral advertises over the air.
    pub fn peripheral_id(&self) -> String {
        ident::serial_to_peripheral(&self.sensor_serial)
    }

    fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(BridgeError::Composition(
                "sensor entry is not an object".into(),
            ));
        };
        let serial = match fields.remove("sensor_serial") {
            Some(Value::String(s)) => s,
            _ => {
                return Err(BridgeError::Composition(
                    "sensor entry without a string sensor_serial".into(),
                ))
            }
        };
        Ok(Self {
            sensor_serial: serial,
            fields,
        })
    }
}

/// Merged profile + garden for one cycle.
///
/// `sensors` keeps the order the garden listed them in; a duplicate serial
/// replaces the earlier record in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    #[serde(flatten)]
    pub profile: Map<String, Value>,
    pub sensors: IndexMap<String, SensorRecord>,
}

impl UserSnapshot {
    /// Merge `garden` into `profile` and index the sensors by serial.
    pub fn compose(profile: Option<Value>, garden: Option<Value>) -> Result<Self> {
        let profile = require_object("profile", profile)?;
        let garden = require_object("garden", garden)?;

        let mut merged = profile;
        deep_merge(&mut merged, garden);

        let sensors = match merged.remove("sensors") {
            Some(Value::Array(list)) => list,
            Some(_) => {
                return Err(BridgeError::Composition(
                    "`sensors` is not a list".into(),
                ))
            }
            None => {
                return Err(BridgeError::Composition(
                    "garden has no `sensors` list".into(),
                ))
            }
        };

        let mut by_serial = IndexMap::with_capacity(sensors.len());
        for entry in sensors {
            let record = SensorRecord::from_value(entry)?;
            by_serial.insert(record.sensor_serial.clone(), record);
        }

        Ok(Self {
            profile: merged,
            sensors: by_serial,
        })
    }

    /// Device-native identifiers of every sensor, in snapshot order.
    pub fn peripheral_ids(&self) -> impl Iterator<Item = String> + '_ {
        self.sensors.values().map(SensorRecord::peripheral_id)
    }

    /// Look a sensor up by the identifier its peripheral advertises. When
    /// serials collide up to case, the first sensor in snapshot order wins.
    pub fn sensor_for_peripheral(&self, peripheral_id: &str) -> Option<&SensorRecord> {
        self.sensors
            .values()
            .find(|s| s.peripheral_id().eq_ignore_ascii_case(peripheral_id))
    }
}

fn require_object(name: &str, value: Option<Value>) -> Result<Map<String, Value>> {
    match value {
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(BridgeError::Composition(format!("{name} is not an object"))),
        None => Err(BridgeError::Composition(format!("{name} is missing"))),
    }
}

/// Recursively merge `src` into `dst`. Nested objects merge key by key;
/// any other value in `src` replaces the one in `dst`.
pub fn deep_merge(dst: &mut Map<String, Value>, src: Map<String, Value>) {
    for (key, value) in src {
        match (dst.get_mut(&key), value) {
            (Some(Value::Object(d)), Value::Object(s)) => deep_merge(d, s),
            (_, v) => {
                dst.insert(key, v);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn profile() -> Value {
        json!({
            "user_profile": { "email": "a@b.c", "language_iso3166": "FR" },
            "server_identifier": 7
        })
    }

    fn garden() -> Value {
        json!({
            "user_profile": { "tmz_offset": 3600 },
            "locations": [{ "location_identifier": "loc1" }],
            "sensors": [
                { "sensor_serial": "A0143D000008B4C7", "nickname": "basil", "firmware_version": "1.1.0" },
                { "sensor_serial": "SN2", "nickname": "mint" }
            ]
        })
    }

    #[test]
    fn compose_merges_nested_objects() {
        let snap = UserSnapshot::compose(Some(profile()), Some(garden())).unwrap();
        let up = snap.profile["user_profile"].as_object().unwrap();
        assert_eq!(up["email"], "a@b.c");
        assert_eq!(up["tmz_offset"], 3600);
        assert_eq!(snap.profile["server_identifier"], 7);
        assert!(snap.profile.contains_key("locations"));
        assert!(!snap.profile.contains_key("sensors"));
    }

    #[test]
    fn compose_keys_sensors_by_serial_in_order() {
        let snap = UserSnapshot::compose(Some(profile()), Some(garden())).unwrap();
        let keys: Vec<_> = snap.sensors.keys().cloned().collect();
        assert_eq!(keys, vec!["A0143D000008B4C7", "SN2"]);
        let basil = &snap.sensors["A0143D000008B4C7"];
        assert_eq!(basil.fields["nickname"], "basil");
        assert_eq!(basil.fields["firmware_version"], "1.1.0");
    }

    #[test]
    fn duplicate_serial_overwrites_in_place() {
        let garden = json!({
            "sensors": [
                { "sensor_serial": "SN1", "nickname": "old" },
                { "sensor_serial": "SN2" },
                { "sensor_serial": "SN1", "nickname": "new" }
            ]
        });
        let snap = UserSnapshot::compose(Some(json!({})), Some(garden)).unwrap();
        assert_eq!(snap.sensors.len(), 2);
        assert_eq!(snap.sensors.get_index(0).unwrap().0, "SN1");
        assert_eq!(snap.sensors["SN1"].fields["nickname"], "new");
    }

    #[test]
    fn missing_input_is_a_composition_error() {
        let err = UserSnapshot::compose(Some(profile()), None).unwrap_err();
        assert!(matches!(err, BridgeError::Composition(_)));
        let err = UserSnapshot::compose(None, Some(garden())).unwrap_err();
        assert!(matches!(err, BridgeError::Composition(_)));
    }

    #[test]
    fn sensors_must_be_a_list_of_serialised_records() {
        let err = UserSnapshot::compose(Some(json!({})), Some(json!({ "sensors": {} })))
            .unwrap_err();
        assert!(err.to_string().contains("not a list"));

        let err = UserSnapshot::compose(
            Some(json!({})),
            Some(json!({ "sensors": [{ "nickname": "anon" }] })),
        )
        .unwrap_err();
        assert!(err.to_string().contains("sensor_serial"));
    }

    #[test]
    fn case_colliding_serials_resolve_to_first_sensor() {
        let garden = json!({ "sensors": [
            { "sensor_serial": "SN1", "nickname": "upper" },
            { "sensor_serial": "sn1", "nickname": "lower" },
        ]});
        let snap = UserSnapshot::compose(Some(json!({})), Some(garden)).unwrap();
        assert_eq!(snap.sensors.len(), 2);
        assert_eq!(snap.peripheral_ids().collect::<Vec<_>>(), vec!["sn1", "sn1"]);
        assert_eq!(
            snap.sensor_for_peripheral("sn1").unwrap().fields["nickname"],
            "upper"
        );
    }

    #[test]
    fn peripheral_ids_follow_snapshot_order() {
        let snap = UserSnapshot::compose(Some(profile()), Some(garden())).unwrap();
        let ids: Vec<_> = snap.peripheral_ids().collect();
        assert_eq!(ids, vec!["a0143d08b4c7", "sn2"]);
        assert_eq!(
            snap.sensor_for_peripheral("A0143D08B4C7").unwrap().fields["nickname"],
            "basil"
        );
    }
}
