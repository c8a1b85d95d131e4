use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;

/// Identity of a remote collection kind (group / version / plural resource).
///
/// The core group is the empty string. This is the only key used by the
/// cache registries, so it is cheap to clone and totally ordered.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceType {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl ResourceType {
    pub fn new(
        group: impl Into<String>,
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            group: group.into(),
            version: version.into(),
            resource: resource.into(),
        }
    }

    /// Resource in the core (unnamed) group, e.g. `v1/pods`.
    pub fn core(
        version: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self::new("", version, resource)
    }

    pub fn is_core(&self) -> bool {
        self.group.is_empty()
    }

    /// Parseable path form: `apps/v1/deployments`, or `v1/pods` for the core group.
    pub fn to_path(&self) -> String {
        if self.is_core() {
            format!("{}/{}", self.version, self.resource)
        } else {
            format!("{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "{}/{}, Resource={}",
            self.group, self.version, self.resource
        )
    }
}

impl FromStr for ResourceType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('/').collect();
        let parsed = match parts.as_slice() {
            [version, resource] => ResourceType::core(*version, *resource),
            [group, version, resource] if !group.is_empty() => {
                ResourceType::new(*group, *version, *resource)
            }
            _ => return Err(Error::InvalidResourceType(s.to_string())),
        };

        if parsed.version.is_empty() || parsed.resource.is_empty() {
            return Err(Error::InvalidResourceType(s.to_string()));
        }
        Ok(parsed)
    }
}

impl TryFrom<String> for ResourceType {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceType> for String {
    fn from(value: ResourceType) -> Self {
        value.to_path()
    }
}
