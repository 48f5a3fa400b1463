//! Composite kart identity

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;

/// Composite kart key: track configuration plus stable kart identifier.
///
/// The same display number on two track layouts is a different comparison population, so the
/// track configuration is part of the identity. Without a track configuration the key is the
/// base identifier alone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "tauri", derive(specta::Type))]
#[serde(transparent)]
pub struct KartKey(String);

impl KartKey {
    /// Build a key from an optional track configuration and a base kart identifier.
    pub fn new(track_config_id: Option<&str>, base_kart_id: &str) -> Self {
        match track_config_id {
            Some(track) if !track.is_empty() => Self(format!("{track}_{base_kart_id}")),
            _ => Self(base_kart_id.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KartKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for KartKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for KartKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn key_includes_track_configuration() {
        assert_eq!(KartKey::new(Some("layout-2"), "K17").as_str(), "layout-2_K17");
        assert_eq!(KartKey::new(None, "7").as_str(), "7");
        assert_eq!(KartKey::new(Some(""), "7").as_str(), "7");
    }

    #[test]
    fn map_lookup_by_str() {
        let mut map = BTreeMap::new();
        map.insert(KartKey::new(Some("t1"), "3"), 1u32);
        assert_eq!(map.get("t1_3"), Some(&1));
    }

    #[test]
    fn serializes_as_plain_string() {
        let key = KartKey::new(Some("t1"), "3");
        assert_eq!(serde_json::to_string(&key).unwrap(), "\"t1_3\"");
    }
}
