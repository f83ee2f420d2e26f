//! `%data` envelopes for maps and sets.
//!
//! JSON has no map or set type, so both are written as tagged objects:
//!
//! ```json
//! {"%data": "%data:Map", "%data:Map": [["b-a", {}], ["b-b", {}]]}
//! {"%data": "%data:Set", "%data:Set": ["a", "b"]}
//! ```
//!
//! Map entries are written sorted by key and set values sorted, so equal
//! collections always encode to identical bytes.

use indexmap::IndexMap;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const DATA_TAG: &str = "%data";
pub const MAP_KIND: &str = "%data:Map";
pub const SET_KIND: &str = "%data:Set";

/// String-keyed map encoded as a `%data:Map` envelope.
///
/// Decoding keeps the order of the encoded entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapEnvelope<V>(pub IndexMap<String, V>);

/// Ordered set encoded as a `%data:Set` envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetEnvelope<T: Ord>(pub BTreeSet<T>);

impl<V> Default for MapEnvelope<V> {
    fn default() -> Self {
        Self(IndexMap::new())
    }
}

impl<T: Ord> Default for SetEnvelope<T> {
    fn default() -> Self {
        Self(BTreeSet::new())
    }
}

#[derive(Serialize)]
struct MapOut<'a, V> {
    #[serde(rename = "%data")]
    kind: &'static str,
    #[serde(rename = "%data:Map")]
    entries: Vec<(&'a str, &'a V)>,
}

#[derive(Deserialize)]
struct MapIn<V> {
    #[serde(rename = "%data")]
    kind: String,
    #[serde(rename = "%data:Map")]
    entries: Vec<(String, V)>,
}

#[derive(Serialize)]
struct SetOut<'a, T> {
    #[serde(rename = "%data")]
    kind: &'static str,
    #[serde(rename = "%data:Set")]
    values: Vec<&'a T>,
}

#[derive(Deserialize)]
struct SetIn<T> {
    #[serde(rename = "%data")]
    kind: String,
    #[serde(rename = "%data:Set")]
    values: Vec<T>,
}

fn check_kind<E: de::Error>(found: &str, expected: &str) -> Result<(), E> {
    if found == expected {
        Ok(())
    } else {
        Err(E::custom(format!(
            "expected a {expected} envelope, found {found:?}"
        )))
    }
}

impl<V: Serialize> Serialize for MapEnvelope<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut entries: Vec<(&str, &V)> = self.0.iter().map(|(k, v)| (k.as_str(), v)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        MapOut {
            kind: MAP_KIND,
            entries,
        }
        .serialize(serializer)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for MapEnvelope<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = MapIn::<V>::deserialize(deserializer)?;
        check_kind(&raw.kind, MAP_KIND)?;

        let mut map = IndexMap::with_capacity(raw.entries.len());
        for (key, value) in raw.entries {
            if map.insert(key.clone(), value).is_some() {
                return Err(de::Error::custom(format!("duplicate map key {key:?}")));
            }
        }
        Ok(Self(map))
    }
}

impl<T: Ord + Serialize> Serialize for SetEnvelope<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SetOut {
            kind: SET_KIND,
            values: self.0.iter().collect(),
        }
        .serialize(serializer)
    }
}

impl<'de, T: Ord + Deserialize<'de>> Deserialize<'de> for SetEnvelope<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = SetIn::<T>::deserialize(deserializer)?;
        check_kind(&raw.kind, SET_KIND)?;
        Ok(Self(raw.values.into_iter().collect()))
    }
}
