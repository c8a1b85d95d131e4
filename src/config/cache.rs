use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::ResourceType;
use crate::Result;

/// Dynamic cache parameters
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CacheConfig {
    /// Namespace every reflector is scoped to. Empty watches all namespaces.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Resource types the demo binary watches on startup
    #[serde(default = "default_resources")]
    pub resources: Vec<ResourceType>,

    /// Idle wake-up of the lifecycle coordinator
    #[serde(default = "default_coordinator_tick_ms")]
    pub coordinator_tick_ms: u64,

    /// Capacity of the removal request queue. Reporters wait when it is full.
    #[serde(default = "default_removal_queue_size")]
    pub removal_queue_size: usize,

    /// Upper bound for `wait_for_initial_sync_timeout`
    #[serde(default = "default_sync_timeout_ms")]
    pub sync_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            resources: default_resources(),
            coordinator_tick_ms: default_coordinator_tick_ms(),
            removal_queue_size: default_removal_queue_size(),
            sync_timeout_ms: default_sync_timeout_ms(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<()> {
        // 10ms .. 1 minute
        if !(10..=60_000).contains(&self.coordinator_tick_ms) {
            return Err(Error::Config(ConfigError::Message(format!(
                "coordinator_tick_ms must be between 10 and 60000, got {}",
                self.coordinator_tick_ms
            ))));
        }

        if self.removal_queue_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "removal_queue_size must be greater than 0".into(),
            )));
        }

        if self.sync_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "sync_timeout_ms must be greater than 0".into(),
            )));
        }

        Ok(())
    }

    pub fn coordinator_tick(&self) -> Duration {
        Duration::from_millis(self.coordinator_tick_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }
}

fn default_namespace() -> String {
    "default".to_string()
}

fn default_coordinator_tick_ms() -> u64 {
    1000
}

fn default_removal_queue_size() -> usize {
    16
}

fn default_sync_timeout_ms() -> u64 {
    30_000
}

fn default_resources() -> Vec<ResourceType> {
    [
        ("apiregistration.k8s.io", "v1", "apiservices"),
        ("apps", "v1", "replicasets"),
        ("rbac.authorization.k8s.io", "v1", "clusterrolebindings"),
        ("rbac.authorization.k8s.io", "v1", "clusterroles"),
        ("", "v1", "pods"),
        ("", "v1", "configmaps"),
        ("batch", "v1beta1", "cronjobs"),
        ("apiextensions.k8s.io", "v1", "customresourcedefinitions"),
        ("apps", "v1", "daemonsets"),
        ("apps", "v1", "deployments"),
        ("", "v1", "events"),
        ("autoscaling", "v1", "horizontalpodautoscalers"),
        ("networking.k8s.io", "v1", "ingresses"),
        ("batch", "v1", "jobs"),
        ("admissionregistration.k8s.io", "v1", "mutatingwebhookconfigurations"),
        ("", "v1", "nodes"),
        ("", "v1", "namespaces"),
        ("networking.k8s.io", "v1", "networkpolicies"),
        ("", "v1", "serviceaccounts"),
        ("", "v1", "secrets"),
        ("", "v1", "services"),
        ("metrics.k8s.io", "v1beta1", "podmetrics"),
        ("", "v1", "persistentvolumes"),
        ("", "v1", "persistentvolumeclaims"),
        ("", "v1", "replicationcontrollers"),
        ("apps", "v1", "statefulsets"),
        ("rbac.authorization.k8s.io", "v1", "rolebindings"),
        ("rbac.authorization.k8s.io", "v1", "roles"),
        ("admissionregistration.k8s.io", "v1", "validatingwebhookconfigurations"),
        ("storage.k8s.io", "v1", "storageclasses"),
    ]
    .into_iter()
    .map(|(g, v, r)| ResourceType::new(g, v, r))
    .collect()
}
