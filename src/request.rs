//! Builders for the requests sent to the provisioning platform.

use crate::config::ProvisionConfig;
use crate::endpoint::Endpoint;
use crate::key::FunctionName;

use serde::Serialize;
use std::collections::BTreeMap;

/// Environment variables of a function.
pub type Env = BTreeMap<String, String>;

pub const ENV_EXTRA_ARGS: &str = "EXTRA_ARGS";
pub const ENV_SD_MODEL: &str = "SD_MODEL";
pub const ENV_SD_VAE: &str = "SD_VAE";

/// Changing this variable forces running instances to reload their models.
pub const ENV_MODEL_REFRESH_SIGNAL: &str = "MODEL_REFRESH_SIGNAL";

const RUNTIME: &str = "custom-container";
const HANDLER: &str = "index.handler";
const ACCELERATION_TYPE: &str = "Default";
const TRIGGER_TYPE: &str = "http";
const TRIGGER_AUTH_TYPE: &str = "anonymous";
const TRIGGER_METHODS: &[&str] = &["GET", "POST", "PUT"];

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomContainerConfig {
    pub acceleration_type: String,
    pub image: String,
    pub web_server_mode: bool,
}

/// Parameters for creating a function.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionParams {
    pub function_name: String,
    pub ca_port: i32,
    pub cpu: f32,
    pub timeout: i32,
    pub instance_type: String,
    pub runtime: String,
    pub instance_concurrency: i32,
    pub memory_size: i32,
    pub disk_size: i32,
    pub handler: String,
    pub gpu_memory_size: i32,
    pub environment_variables: Env,
    pub custom_container_config: CustomContainerConfig,
}

impl FunctionParams {
    pub fn new(config: &ProvisionConfig, name: &FunctionName, env: Env) -> Self {
        Self {
            function_name: name.to_string(),
            ca_port: config.ca_port,
            cpu: config.cpu,
            timeout: config.timeout,
            instance_type: config.instance_type.clone(),
            runtime: RUNTIME.to_string(),
            instance_concurrency: config.instance_concurrency,
            memory_size: config.memory_size,
            disk_size: config.disk_size,
            handler: HANDLER.to_string(),
            gpu_memory_size: config.gpu_memory_size,
            environment_variables: env,
            custom_container_config: CustomContainerConfig {
                acceleration_type: ACCELERATION_TYPE.to_string(),
                image: config.image.clone(),
                web_server_mode: true,
            },
        }
    }
}

/// Parameters for creating the trigger which exposes a function.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerParams {
    pub trigger_name: String,
    pub trigger_type: String,
    /// JSON-encoded trigger configuration, passed through as a string.
    pub trigger_config: String,
}

impl TriggerParams {
    /// An anonymous HTTP trigger accepting GET, POST and PUT.
    pub fn http(config: &ProvisionConfig) -> Self {
        let trigger_config = serde_json::json!({
            "authType": TRIGGER_AUTH_TYPE,
            "methods": TRIGGER_METHODS,
        });
        Self {
            trigger_name: config.trigger_name.clone(),
            trigger_type: TRIGGER_TYPE.to_string(),
            trigger_config: trigger_config.to_string(),
        }
    }
}

/// Parameters for updating a function in place.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateParams {
    pub environment_variables: Env,
}

/// The environment a freshly created function starts with.
///
/// `now` (seconds) is written to [ENV_MODEL_REFRESH_SIGNAL].
pub fn model_env(config: &ProvisionConfig, sd_model: &str, sd_vae: &str, now: u64) -> Env {
    Env::from([
        (ENV_EXTRA_ARGS.to_string(), config.extra_args.clone()),
        (ENV_SD_MODEL.to_string(), sd_model.to_string()),
        (ENV_SD_VAE.to_string(), sd_vae.to_string()),
        (ENV_MODEL_REFRESH_SIGNAL.to_string(), now.to_string()),
    ])
}

/// The internal proxy URL through which the function `name` is reached.
///
/// `name` is normally a [FunctionName], but any path segment is accepted so
/// that an unverified guess can be formed from a raw key.
pub fn endpoint_url(config: &ProvisionConfig, name: &str) -> Endpoint {
    Endpoint::from(format!(
        "https://{account}.{region}-internal.fc.aliyuncs.com/2016-08-15/proxy/{service}.LATEST/{name}/",
        account = config.account_id,
        region = config.region,
        service = config.service_name,
    ))
}
