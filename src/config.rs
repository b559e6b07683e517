//! Settings describing where and how backends are provisioned.

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to read configuration")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration")]
    Parse(#[from] serde_json::Error),
}

/// Describes the account, service, and sizing of provisioned functions.
///
/// Every field has a default, so a host only needs to supply what it
/// changes. The account, region, and image defaults are placeholders.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProvisionConfig {
    /// Account owning the service.
    ///
    /// Default: empty
    pub account_id: String,

    /// Region in which functions are created.
    ///
    /// Default: "cn-hangzhou"
    pub region: String,

    /// Name of the service which holds every provisioned function.
    ///
    /// Default: "sd-backends"
    pub service_name: String,

    /// Container image run by each function.
    ///
    /// Default: empty
    pub image: String,

    /// Extra command-line arguments passed to the model server through the
    /// `EXTRA_ARGS` environment variable.
    ///
    /// Default: empty
    pub extra_args: String,

    /// Port the container listens on.
    ///
    /// Default: 7860
    pub ca_port: i32,

    /// vCPUs per instance.
    ///
    /// Default: 8.0
    pub cpu: f32,

    /// Request timeout for the function, in seconds.
    ///
    /// Default: 600
    pub timeout: i32,

    /// Default: "fc.gpu.tesla.1"
    pub instance_type: String,

    /// How many requests a single instance serves at once.
    ///
    /// Default: 1
    pub instance_concurrency: i32,

    /// Memory per instance, in MB.
    ///
    /// Default: 32768
    pub memory_size: i32,

    /// Disk per instance, in MB.
    ///
    /// Default: 10240
    pub disk_size: i32,

    /// GPU memory per instance, in MB.
    ///
    /// Default: 16384
    pub gpu_memory_size: i32,

    /// Name given to each function's HTTP trigger.
    ///
    /// Default: "defaultTrigger"
    pub trigger_name: String,
}

impl ProvisionConfig {
    /// Parses configuration from a JSON document.
    pub fn from_json(s: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(s)?)
    }

    /// Reads configuration from a JSON file.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let contents = tokio::fs::read_to_string(path).await?;
        Self::from_json(&contents)
    }
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            account_id: String::new(),
            region: "cn-hangzhou".to_string(),
            service_name: "sd-backends".to_string(),
            image: String::new(),
            extra_args: String::new(),
            ca_port: 7860,
            cpu: 8.0,
            timeout: 600,
            instance_type: "fc.gpu.tesla.1".to_string(),
            instance_concurrency: 1,
            memory_size: 32768,
            disk_size: 10240,
            gpu_memory_size: 16384,
            trigger_name: "defaultTrigger".to_string(),
        }
    }
}
