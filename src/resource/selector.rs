use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> bool {
        match self {
            Requirement::Equals(k, v) => labels.get(k) == Some(v),
            // An absent label also satisfies `!=`.
            Requirement::NotEquals(k, v) => labels.get(k) != Some(v),
            Requirement::Exists(k) => labels.contains_key(k),
            Requirement::DoesNotExist(k) => !labels.contains_key(k),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Requirement::Equals(k, v) => write!(f, "{}={}", k, v),
            Requirement::NotEquals(k, v) => write!(f, "{}!={}", k, v),
            Requirement::Exists(k) => write!(f, "{}", k),
            Requirement::DoesNotExist(k) => write!(f, "!{}", k),
        }
    }
}

/// Label selector; all requirements must match. The empty selector matches
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    requirements: Vec<Requirement>,
}

impl Selector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    pub fn with(
        mut self,
        requirement: Requirement,
    ) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn matches(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for Selector {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

impl FromStr for Selector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::InvalidSelector {
            selector: s.to_string(),
            reason: reason.to_string(),
        };

        let mut selector = Selector::everything();
        if s.trim().is_empty() {
            return Ok(selector);
        }

        for term in s.split(',').map(str::trim) {
            if term.is_empty() {
                return Err(invalid("empty requirement"));
            }

            let requirement = if let Some((k, v)) = term.split_once("!=") {
                Requirement::NotEquals(label_key(k).ok_or_else(|| invalid("empty key"))?, v.trim().to_string())
            } else if let Some((k, v)) = term.split_once("==") {
                Requirement::Equals(label_key(k).ok_or_else(|| invalid("empty key"))?, v.trim().to_string())
            } else if let Some((k, v)) = term.split_once('=') {
                Requirement::Equals(label_key(k).ok_or_else(|| invalid("empty key"))?, v.trim().to_string())
            } else if let Some(k) = term.strip_prefix('!') {
                Requirement::DoesNotExist(label_key(k).ok_or_else(|| invalid("empty key"))?)
            } else {
                Requirement::Exists(label_key(term).ok_or_else(|| invalid("empty key"))?)
            };

            if let Requirement::Equals(_, v) | Requirement::NotEquals(_, v) = &requirement {
                if v.contains('=') || v.contains('!') {
                    return Err(invalid("malformed value"));
                }
            }
            selector.requirements.push(requirement);
        }

        Ok(selector)
    }
}

fn label_key(raw: &str) -> Option<String> {
    let key = raw.trim();
    if key.is_empty() || key.contains('!') || key.contains('=') {
        None
    } else {
        Some(key.to_string())
    }
}
