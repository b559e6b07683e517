//! fcorb resolves model pairs to serverless backends, creating them lazily.
//!
//! It uses the following terminology:
//! * A resource key names a pair of models (a checkpoint and a VAE) which a
//!   caller wants served.
//! * A backend is a remote function, exposed through an HTTP trigger, which
//!   serves a single resource key.
//! * An endpoint is the URL through which a backend is reached.
//!
//! # Usage
//!
//! * The main interface for this crate is [manager::EndpointManager].
//! * To construct a manager, you must supply a [store::Datastore] and a
//!   [provisioner::Provisioner]. These are interfaces which specify "where
//!   provisioned backends are remembered" and "how backends are created",
//!   respectively.
//!
//! ```no_run
//! use fcorb::config::ProvisionConfig;
//! use fcorb::manager::EndpointManager;
//! use fcorb::policy::Policy;
//! use fcorb::provisioners::http::{HttpProvisioner, HttpProvisionerConfig};
//! use fcorb::stores::file::FileStore;
//! use std::sync::Arc;
//!
//! # async {
//! let config = ProvisionConfig::from_file("provision.json").await.unwrap();
//! let store = Arc::new(FileStore::open("endpoints.json").await.unwrap());
//! let provisioner = Arc::new(
//!     HttpProvisioner::for_region(
//!         &config.account_id,
//!         &config.region,
//!         HttpProvisionerConfig::default(),
//!     )
//!     .unwrap(),
//! );
//!
//! let manager = EndpointManager::new(store, provisioner, config, Policy::default())
//!     .await
//!     .unwrap();
//! let endpoint = manager.resolve("v1-5-pruned", "vae-ft-mse").await;
//! # };
//! ```
//!
//! # DTrace probes
//!
//! fcorb contains a number of DTrace USDT probes, which fire as endpoints are
//! resolved and backends are provisioned:
//!
//! - `resolve-start`: Fires before resolving a resource key.
//! - `resolve-done`: Fires when a key resolved, naming the tier ("cache",
//!   "store", "created", or "adopted") that answered.
//! - `resolve-failed`: Fires when every attempt to resolve a key failed.
//! - `provision-start`: Fires before creating a backend.
//! - `provision-done`: Fires after a backend was created (or adopted).
//! - `provision-failed`: Fires when creating a backend failed.
//!
//! The existence of the probes is behind the `"probes"` feature, which is
//! enabled by default. Registration happens in
//! [manager::EndpointManager::new]; a registration failure is logged and
//! otherwise ignored.

// Public API
pub mod config;
pub mod endpoint;
pub mod key;
pub mod manager;
pub mod policy;
pub mod provisioner;
pub mod record;
pub mod request;
pub mod store;

#[cfg(test)]
mod test_utils;

// Default implementations of generic interfaces
pub mod provisioners;
pub mod stores;

/// USDT probes for tracing how fcorb resolves endpoints.
#[cfg(feature = "probes")]
#[usdt::provider(provider = "fcorb")]
mod probes {
    /// Fires right before resolving a resource key.
    fn resolve__start(key: &str) {}

    /// Fires when a resource key is resolved, with the tier which answered.
    fn resolve__done(key: &str, source: &str) {}

    /// Fires when every attempt to resolve a key failed, with a string
    /// identifying the reason.
    fn resolve__failed(key: &str, reason: &str) {}

    /// Fires right before creating the function and trigger for a key.
    fn provision__start(key: &str, function: &str) {}

    /// Fires after the function and trigger for a key exist.
    fn provision__done(key: &str, function: &str) {}

    /// Fires after failing to create a backend, with a string identifying
    /// the reason.
    fn provision__failed(key: &str, function: &str, reason: &str) {}
}
