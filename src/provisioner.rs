//! The interface for creating and updating backends on the remote platform.

use crate::request::{Env, FunctionParams, TriggerParams};

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The resource being created is already present.
    ///
    /// Names are derived deterministically, so this usually means an earlier
    /// attempt created it.
    #[error("Resource already exists: {0}")]
    AlreadyExists(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Platform rejected request with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error(transparent)]
    Other(anyhow::Error),
}

/// Describes how functions are created and updated on the remote platform.
///
/// Each call may block on the network; implementations bound how long a
/// single call can take.
#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Creates a function within `service`.
    async fn create_function(&self, service: &str, params: &FunctionParams) -> Result<(), Error>;

    /// Creates a trigger which exposes `function`.
    async fn create_trigger(
        &self,
        service: &str,
        function: &str,
        params: &TriggerParams,
    ) -> Result<(), Error>;

    /// Replaces environment variables of an existing function.
    async fn update_function(&self, service: &str, function: &str, env: &Env)
        -> Result<(), Error>;
}

pub type SharedProvisioner = Arc<dyn Provisioner>;
