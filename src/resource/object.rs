use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// Identifying metadata carried by every mirrored object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,

    /// Empty for cluster-scoped objects.
    #[serde(default)]
    pub namespace: String,

    #[serde(default)]
    pub labels: BTreeMap<String, String>,

    #[serde(default)]
    pub resource_version: String,
}

/// An untyped object as delivered by the remote source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicObject {
    pub metadata: ObjectMeta,

    /// Everything except metadata, kept as-is.
    #[serde(flatten)]
    pub data: serde_json::Map<String, serde_json::Value>,
}

impl DynamicObject {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                ..Default::default()
            },
            data: serde_json::Map::new(),
        }
    }

    pub fn with_label(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_field(
        mut self,
        key: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.metadata.labels
    }

    /// Store key: `namespace/name`, or just `name` when cluster scoped.
    pub fn key(&self) -> String {
        object_key(&self.metadata.namespace, &self.metadata.name)
    }
}

pub fn object_key(
    namespace: &str,
    name: &str,
) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", namespace, name)
    }
}

/// Result of a list call: the items plus the collection version to watch from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectList {
    pub items: Vec<DynamicObject>,
    pub resource_version: String,
}
