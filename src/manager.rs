//! A manager which resolves model pairs to the [Endpoint] of a backend,
//! provisioning the backend through a [provisioner] when none exists yet.
//!
//! Lookups go through three tiers, each filling the ones above it:
//!
//! 1. An in-memory cache, read under a shared lock. Hits never wait on
//!    provisioning.
//! 2. The durable [store].
//! 3. Creation of a new function and HTTP trigger on the remote platform.
//!
//! Tiers two and three run under a per-key creation lock, so at most one
//! caller provisions a given key at a time, while unrelated keys provision
//! concurrently.

use crate::config::ProvisionConfig;
use crate::endpoint::Endpoint;
use crate::key::{FunctionName, ResourceKey};
use crate::policy::Policy;
#[cfg(feature = "probes")]
use crate::probes;
use crate::provisioner::{self, SharedProvisioner};
use crate::record::{self, EndpointRecord};
use crate::request::{self, Env, FunctionParams, TriggerParams};
use crate::store::{self, SharedDatastore};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{event, instrument, Level};

#[derive(Error, Debug)]
pub enum Error {
    /// Every attempt failed.
    ///
    /// `fallback` is the URL the backend would have if it existed. It has
    /// not been verified, but callers may choose to try it anyway.
    #[error("Could not resolve an endpoint for {key}")]
    Unresolved {
        key: ResourceKey,
        fallback: Endpoint,
        #[source]
        source: AttemptError,
    },

    #[error("Failed to update function {function}")]
    Update {
        function: FunctionName,
        #[source]
        source: provisioner::Error,
    },

    #[error("Failed to load endpoints from the store")]
    Load(#[source] store::Error),
}

impl Error {
    /// Returns the unverified best-guess endpoint, if resolution failed.
    pub fn fallback(&self) -> Option<&Endpoint> {
        match self {
            Error::Unresolved { fallback, .. } => Some(fallback),
            _ => None,
        }
    }
}

/// Why a single resolution attempt failed.
#[derive(Error, Debug)]
pub enum AttemptError {
    #[error("Store access failed")]
    Store(#[from] store::Error),

    #[error("Provisioning failed")]
    Provision(#[from] provisioner::Error),
}

// Which tier produced an endpoint.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Source {
    Cache,
    Store,
    Created,
    // The function already existed remotely, but we had no record of it.
    Adopted,
}

impl Source {
    #[cfg(feature = "probes")]
    const fn as_str(&self) -> &'static str {
        match self {
            Source::Cache => "cache",
            Source::Store => "store",
            Source::Created => "created",
            Source::Adopted => "adopted",
        }
    }
}

type KeyLock = Arc<tokio::sync::Mutex<()>>;

// Creation locks, one per key which is currently being resolved past the
// cache. Entries are removed once nobody holds or waits on them.
#[derive(Default)]
struct CreationLocks {
    locks: Mutex<HashMap<ResourceKey, KeyLock>>,
}

impl CreationLocks {
    async fn lock(&self, key: &ResourceKey) -> CreationGuard<'_> {
        let lock = self
            .locks
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .clone();
        let guard = lock.clone().lock_owned().await;
        CreationGuard {
            locks: self,
            key: key.clone(),
            lock,
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

struct CreationGuard<'a> {
    locks: &'a CreationLocks,
    key: ResourceKey,
    lock: KeyLock,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for CreationGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.locks.locks.lock().unwrap();
        // One reference from the table, one from us: nobody else is waiting.
        if Arc::strong_count(&self.lock) == 2 {
            locks.remove(&self.key);
        }
    }
}

/// Resolves model pairs to endpoints, creating backends on demand.
///
/// Construct once with [EndpointManager::new] and share it behind an
/// [Arc]; every method takes `&self`.
pub struct EndpointManager {
    cache: RwLock<HashMap<ResourceKey, Endpoint>>,
    creating: CreationLocks,
    store: SharedDatastore,
    provisioner: SharedProvisioner,
    config: ProvisionConfig,
    policy: Policy,
}

impl EndpointManager {
    /// Creates a manager, filling its cache with every record in `store`.
    ///
    /// The manager is only returned once the cache is loaded, so no caller
    /// can observe a partially loaded cache.
    ///
    /// - store: Where provisioned backends are remembered across restarts.
    /// - provisioner: Creates and updates functions on the remote platform.
    /// - config: Names and sizing for provisioned functions.
    /// - policy: Retry behavior of [EndpointManager::resolve].
    #[instrument(skip_all, name = "EndpointManager::new")]
    pub async fn new(
        store: SharedDatastore,
        provisioner: SharedProvisioner,
        config: ProvisionConfig,
        policy: Policy,
    ) -> Result<Self, Error> {
        let manager = Self {
            cache: RwLock::new(HashMap::new()),
            creating: CreationLocks::default(),
            store,
            provisioner,
            config,
            policy,
        };
        manager.load_all().await.map_err(Error::Load)?;

        #[cfg(feature = "probes")]
        if let Err(err) = usdt::register_probes() {
            event!(Level::WARN, ?err, "USDT probe registration failed");
        }
        Ok(manager)
    }

    /// Returns the configuration provisioned functions are created with.
    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    /// Returns the retry policy of [EndpointManager::resolve].
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Returns the cached endpoint for a model pair, without consulting the
    /// store or provisioning anything.
    pub fn cached(&self, sd_model: &str, sd_vae: &str) -> Option<Endpoint> {
        self.cache_get(&ResourceKey::new(sd_model, sd_vae))
    }

    /// Returns the number of cached endpoints.
    pub fn cache_len(&self) -> usize {
        self.cache.read().unwrap().len()
    }

    /// Returns the endpoint of the backend serving `sd_model` and `sd_vae`,
    /// creating that backend if it does not exist yet.
    ///
    /// On failure, the error carries a best-guess endpoint
    /// ([Error::fallback]) which callers may use at their own risk.
    #[instrument(level = "debug", skip(self), err, name = "EndpointManager::resolve")]
    pub async fn resolve(&self, sd_model: &str, sd_vae: &str) -> Result<Endpoint, Error> {
        let key = ResourceKey::new(sd_model, sd_vae);
        #[cfg(feature = "probes")]
        probes::resolve__start!(|| key.as_str());
        let res = self.do_resolve(&key, sd_model, sd_vae).await;
        #[cfg(feature = "probes")]
        match &res {
            Ok((_, source)) => probes::resolve__done!(|| (key.as_str(), source.as_str())),
            Err(err) => {
                let reason = err.to_string();
                probes::resolve__failed!(|| (key.as_str(), reason.as_str()))
            }
        }
        res.map(|(endpoint, _)| endpoint)
    }

    async fn do_resolve(
        &self,
        key: &ResourceKey,
        sd_model: &str,
        sd_vae: &str,
    ) -> Result<(Endpoint, Source), Error> {
        if let Some(endpoint) = self.cache_get(key) {
            return Ok((endpoint, Source::Cache));
        }

        let attempts = self.policy.attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.resolve_uncached(key, sd_model, sd_vae).await {
                Ok(found) => return Ok(found),
                Err(err) => err,
            };
            event!(Level::WARN, %key, attempt, ?err, "Resolution attempt failed");
            if attempt >= attempts {
                return Err(Error::Unresolved {
                    key: key.clone(),
                    fallback: request::endpoint_url(&self.config, key.as_str()),
                    source: err,
                });
            }
            tokio::time::sleep(self.policy.retry_backoff).await;
        }
    }

    // A single attempt at resolving past the cache.
    async fn resolve_uncached(
        &self,
        key: &ResourceKey,
        sd_model: &str,
        sd_vae: &str,
    ) -> Result<(Endpoint, Source), AttemptError> {
        let _guard = self.creating.lock(key).await;

        // Whoever held the lock before us may have just finished.
        if let Some(endpoint) = self.cache_get(key) {
            return Ok((endpoint, Source::Cache));
        }

        let fields = self
            .store
            .get(key.as_str(), &[record::FIELD_ENDPOINT])
            .await?;
        if let Some(endpoint) = fields.get(record::FIELD_ENDPOINT) {
            let endpoint = Endpoint::from(endpoint.as_str());
            event!(Level::DEBUG, %key, %endpoint, "Found endpoint in store");
            self.cache_insert(key.clone(), endpoint.clone());
            return Ok((endpoint, Source::Store));
        }

        self.provision(key, sd_model, sd_vae).await
    }

    // Creates the backend for "key", then remembers it in both the store
    // and the cache.
    #[instrument(
        level = "debug",
        skip(self, key, sd_model, sd_vae),
        fields(key = %key),
        name = "EndpointManager::provision"
    )]
    async fn provision(
        &self,
        key: &ResourceKey,
        sd_model: &str,
        sd_vae: &str,
    ) -> Result<(Endpoint, Source), AttemptError> {
        let function = key.function_name();
        let now = record::now_secs();
        let env = request::model_env(&self.config, sd_model, sd_vae, now);
        let params = FunctionParams::new(&self.config, &function, env);

        #[cfg(feature = "probes")]
        probes::provision__start!(|| (key.as_str(), function.as_str()));
        let source = match self.create_backend(&function, &params).await {
            Ok(source) => source,
            Err(err) => {
                #[cfg(feature = "probes")]
                {
                    let reason = err.to_string();
                    probes::provision__failed!(|| (
                        key.as_str(),
                        function.as_str(),
                        reason.as_str()
                    ));
                }
                return Err(err.into());
            }
        };
        #[cfg(feature = "probes")]
        probes::provision__done!(|| (key.as_str(), function.as_str()));

        let endpoint = request::endpoint_url(&self.config, function.as_str());
        let record = EndpointRecord::new(sd_model, sd_vae, endpoint.clone(), now);
        if let Err(err) = self.store.put(key.as_str(), record.to_fields()).await {
            // The backend exists, so hand it out anyway. It is adopted by
            // name the next time this key misses the cache.
            event!(
                Level::WARN,
                %key,
                %function,
                ?err,
                "Provisioned backend could not be persisted"
            );
        }
        self.cache_insert(key.clone(), endpoint.clone());
        event!(Level::INFO, %key, %function, %endpoint, ?source, "Provisioned backend");
        Ok((endpoint, source))
    }

    async fn create_backend(
        &self,
        function: &FunctionName,
        params: &FunctionParams,
    ) -> Result<Source, provisioner::Error> {
        let service = self.config.service_name.as_str();

        let source = match self.provisioner.create_function(service, params).await {
            Ok(()) => Source::Created,
            Err(provisioner::Error::AlreadyExists(_)) => {
                event!(Level::INFO, %function, "Function already exists, adopting it");
                Source::Adopted
            }
            Err(err) => return Err(err),
        };

        let trigger = TriggerParams::http(&self.config);
        match self
            .provisioner
            .create_trigger(service, function.as_str(), &trigger)
            .await
        {
            Ok(()) | Err(provisioner::Error::AlreadyExists(_)) => Ok(source),
            Err(err) => Err(err),
        }
    }

    /// Replaces environment variables of the backend serving `sd_model` and
    /// `sd_vae`.
    ///
    /// Does nothing if no such backend is known to the cache or the store.
    /// Neither the cache nor the store is modified.
    #[instrument(level = "debug", skip(self, env), err, name = "EndpointManager::update_environment")]
    pub async fn update_environment(
        &self,
        sd_model: &str,
        sd_vae: &str,
        env: &Env,
    ) -> Result<(), Error> {
        let key = ResourceKey::new(sd_model, sd_vae);
        if !self.is_known(&key).await {
            event!(Level::DEBUG, %key, "No backend for key, skipping update");
            return Ok(());
        }

        let function = key.function_name();
        let res = self
            .provisioner
            .update_function(&self.config.service_name, function.as_str(), env)
            .await;
        if let Err(source) = res {
            return Err(Error::Update { function, source });
        }
        Ok(())
    }

    async fn is_known(&self, key: &ResourceKey) -> bool {
        if self.cache_get(key).is_some() {
            return true;
        }
        match self
            .store
            .get(key.as_str(), &[record::FIELD_ENDPOINT])
            .await
        {
            Ok(fields) => !fields.is_empty(),
            Err(err) => {
                event!(Level::WARN, %key, ?err, "Store lookup failed, treating key as unknown");
                false
            }
        }
    }

    /// Releases the underlying store.
    pub async fn close(&self) -> Result<(), store::Error> {
        self.store.close().await
    }

    // Fills the cache with every record in the store.
    async fn load_all(&self) -> Result<(), store::Error> {
        let rows = self.store.list_all(record::ALL_FIELDS).await?;
        let mut cache = self.cache.write().unwrap();
        for row in &rows {
            match EndpointRecord::from_fields(row) {
                Ok(record) => {
                    cache.insert(record.key, record.endpoint);
                }
                Err(err) => {
                    event!(Level::WARN, ?err, ?row, "Skipping malformed record");
                }
            }
        }
        event!(Level::INFO, count = cache.len(), "Loaded endpoints from store");
        Ok(())
    }

    fn cache_get(&self, key: &ResourceKey) -> Option<Endpoint> {
        self.cache.read().unwrap().get(key).cloned()
    }

    fn cache_insert(&self, key: ResourceKey, endpoint: Endpoint) {
        self.cache.write().unwrap().insert(key, endpoint);
    }
}
