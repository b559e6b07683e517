//! Implementation of [Provisioner] over the platform's REST API.
//!
//! Requests are sent unsigned: hosts which need request signing should put
//! a signing proxy in front of `base_url`.

use crate::provisioner::{Error, Provisioner};
use crate::request::{Env, FunctionParams, TriggerParams, UpdateParams};

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{event, instrument, Level};

/// Version prefix of every API path.
pub const API_VERSION: &str = "2021-04-06";

const ACCOUNT_ID_HEADER: &str = "X-Fc-Account-Id";

// How long a single call may take before we give up on it.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration options to tweak the HTTP client.
#[derive(Clone, Debug)]
pub struct HttpProvisionerConfig {
    /// Upper bound on a single request, including reading the response.
    ///
    /// Default: 60 seconds
    pub request_timeout: Duration,
}

impl Default for HttpProvisionerConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// A [`Provisioner`] which talks to the platform over HTTP.
#[derive(Clone, Debug)]
pub struct HttpProvisioner {
    client: reqwest::Client,
    base_url: String,
    account_id: String,
}

impl HttpProvisioner {
    /// Creates a provisioner which sends requests to `base_url`.
    pub fn new(
        base_url: impl Into<String>,
        account_id: impl Into<String>,
        config: HttpProvisionerConfig,
    ) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::Other(anyhow!(e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account_id: account_id.into(),
        })
    }

    /// Creates a provisioner for the public API of `region`.
    pub fn for_region(
        account_id: &str,
        region: &str,
        config: HttpProvisionerConfig,
    ) -> Result<Self, Error> {
        Self::new(
            format!("https://{account_id}.{region}.fc.aliyuncs.com"),
            account_id,
            config,
        )
    }

    fn functions_url(&self, service: &str) -> String {
        format!(
            "{base}/{API_VERSION}/services/{service}/functions",
            base = self.base_url
        )
    }

    fn function_url(&self, service: &str, function: &str) -> String {
        format!("{}/{function}", self.functions_url(service))
    }

    async fn send(&self, request: reqwest::RequestBuilder, resource: &str) -> Result<(), Error> {
        let response = request
            .header(ACCOUNT_ID_HEADER, &self.account_id)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    Error::Timeout
                } else {
                    Error::Other(anyhow!(err))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let message = response.text().await.unwrap_or_default();
        event!(Level::DEBUG, %status, body = %message, resource, "Platform rejected request");
        Err(match status {
            StatusCode::CONFLICT => Error::AlreadyExists(resource.to_string()),
            StatusCode::NOT_FOUND => Error::NotFound(resource.to_string()),
            _ => Error::Status {
                status: status.as_u16(),
                message,
            },
        })
    }
}

#[async_trait]
impl Provisioner for HttpProvisioner {
    #[instrument(level = "debug", skip(self, params), fields(function = %params.function_name), err)]
    async fn create_function(&self, service: &str, params: &FunctionParams) -> Result<(), Error> {
        let request = self.client.post(self.functions_url(service)).json(params);
        self.send(request, &params.function_name).await
    }

    #[instrument(level = "debug", skip(self, params), err)]
    async fn create_trigger(
        &self,
        service: &str,
        function: &str,
        params: &TriggerParams,
    ) -> Result<(), Error> {
        let url = format!("{}/triggers", self.function_url(service, function));
        let request = self.client.post(url).json(params);
        self.send(request, &params.trigger_name).await
    }

    #[instrument(level = "debug", skip(self, env), err)]
    async fn update_function(
        &self,
        service: &str,
        function: &str,
        env: &Env,
    ) -> Result<(), Error> {
        let body = UpdateParams {
            environment_variables: env.clone(),
        };
        let request = self
            .client
            .put(self.function_url(service, function))
            .json(&body);
        self.send(request, function).await
    }
}
