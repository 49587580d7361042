//! TTL policy for cached query results

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Cache settings: on/off, default TTL and per-entity overrides
///
/// Entity sets change at very different rates (votes during a sitting vs.
/// the list of parliamentary periods), so TTLs can be set per entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    #[serde(with = "duration_secs")]
    pub default_ttl: Duration,
    #[serde(with = "duration_secs_map")]
    pub entity_ttls: HashMap<String, Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(900),
            entity_ttls: HashMap::new(),
        }
    }
}

impl CacheConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// TTL for an entity set, falling back to the default
    pub fn ttl_for(&self, entity: &str) -> Duration {
        self.entity_ttls
            .get(entity)
            .copied()
            .unwrap_or(self.default_ttl)
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_entity_ttl(mut self, entity: impl Into<String>, ttl: Duration) -> Self {
        self.entity_ttls.insert(entity.into(), ttl);
        self
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

mod duration_secs_map {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(map: &HashMap<String, Duration>, s: S) -> Result<S::Ok, S::Error> {
        map.iter()
            .map(|(k, v)| (k.as_str(), v.as_secs()))
            .collect::<BTreeMap<_, _>>()
            .serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<HashMap<String, Duration>, D::Error> {
        let secs = HashMap::<String, u64>::deserialize(d)?;
        Ok(secs
            .into_iter()
            .map(|(k, v)| (k, Duration::from_secs(v)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ttl_for_uses_override() {
        let config = CacheConfig::default()
            .with_entity_ttl("Stemme", Duration::from_secs(60))
            .with_entity_ttl("Periode", Duration::from_secs(86_400));

        assert_eq!(config.ttl_for("Stemme"), Duration::from_secs(60));
        assert_eq!(config.ttl_for("Periode"), Duration::from_secs(86_400));
        assert_eq!(config.ttl_for("Sag"), Duration::from_secs(900));
    }

    #[test]
    fn test_deserialize_from_toml() {
        let config: CacheConfig = toml::from_str(
            r#"
            default_ttl = 300

            [entity_ttls]
            Afstemning = 60
            "#,
        )
        .unwrap();

        assert!(config.enabled);
        assert_eq!(config.default_ttl, Duration::from_secs(300));
        assert_eq!(config.ttl_for("Afstemning"), Duration::from_secs(60));
    }
}
