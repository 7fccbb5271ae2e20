use {
    serde::{Deserialize, Serialize},
    std::collections::{BTreeMap, HashMap},
};

/// A single metadata value. Nested objects carry grouped results such as
/// the stamped license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(i64),
    Text(String),
    Object(Metadata),
}

impl MetadataValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Flattened form used for provider-visible metadata (string values only).
    pub fn to_provider_string(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s.clone(),
            Self::Object(m) => serde_json::to_string(m).unwrap_or_default(),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for MetadataValue {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Metadata> for MetadataValue {
    fn from(m: Metadata) -> Self {
        Self::Object(m)
    }
}

pub const PROVIDER_MAX_KEYS: usize = 50;
pub const PROVIDER_MAX_KEY_CHARS: usize = 40;
pub const PROVIDER_MAX_VALUE_CHARS: usize = 500;

/// Provider-bound metadata plus what had to give way to fit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderMetadata {
    pub values: HashMap<String, String>,
    pub dropped: Vec<String>,
    pub truncated: Vec<String>,
}

/// Typed metadata bag with explicit merge rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, MetadataValue>);

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.0.get(key)
    }

    /// Text value, ignoring empty strings.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(MetadataValue::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &MetadataValue)> {
        self.0.iter()
    }

    /// Copy entries from `incoming` only where the key is absent here.
    pub fn merge_absent(&mut self, incoming: &Metadata) {
        for (key, value) in &incoming.0 {
            self.0
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Explicit update: every key in `patch` replaces the stored value.
    pub fn overwrite(&mut self, patch: &Metadata) {
        for (key, value) in &patch.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// String form that fits the provider's metadata limits. Over-long keys
    /// and empty values are dropped and long values truncated. When too many
    /// keys remain, keys starting with a `keep_first` prefix are kept ahead
    /// of the rest.
    pub fn to_provider_strings(&self, keep_first: &[&str]) -> ProviderMetadata {
        let mut out = ProviderMetadata::default();
        let mut candidates = Vec::with_capacity(self.0.len());

        for (key, value) in &self.0 {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            if key.chars().count() > PROVIDER_MAX_KEY_CHARS {
                out.dropped.push(key.to_string());
                continue;
            }
            let value = value.to_provider_string();
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let value: String = if value.chars().count() > PROVIDER_MAX_VALUE_CHARS {
                out.truncated.push(key.to_string());
                value.chars().take(PROVIDER_MAX_VALUE_CHARS).collect()
            } else {
                value.to_string()
            };
            candidates.push((key.to_string(), value));
        }

        if candidates.len() > PROVIDER_MAX_KEYS {
            let rank = |key: &str| {
                keep_first
                    .iter()
                    .position(|prefix| key.starts_with(*prefix))
                    .unwrap_or(keep_first.len())
            };
            // stable: keys of equal rank stay in key order
            candidates.sort_by_key(|(key, _)| rank(key.as_str()));
            for (key, _) in candidates.drain(PROVIDER_MAX_KEYS..) {
                out.dropped.push(key);
            }
        }

        out.values = candidates.into_iter().collect();
        out
    }

    pub fn from_provider_strings(map: &HashMap<String, String>) -> Self {
        Self(
            map.iter()
                .map(|(k, v)| (k.clone(), MetadataValue::Text(v.clone())))
                .collect(),
        )
    }
}

impl FromIterator<(String, MetadataValue)> for Metadata {
    fn from_iter<I: IntoIterator<Item = (String, MetadataValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
