//! Utilities to help with testing fcorb

use crate::provisioner::{self, Provisioner};
use crate::request::{Env, FunctionParams, TriggerParams};
use crate::store::{self, Datastore, Fields};
use crate::stores::memory::MemoryStore;

use anyhow::anyhow;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Routes tracing output to the test harness. Safe to call from every test.
pub fn setup_tracing_subscriber() {
    use tracing_subscriber::fmt::format::FmtSpan;
    let _ = tracing_subscriber::fmt()
        .with_thread_names(true)
        .with_span_events(FmtSpan::ENTER)
        .with_max_level(tracing::Level::TRACE)
        .with_test_writer()
        .try_init();
}

/// How a [FakeProvisioner] answers `create_function`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreateOutcome {
    Succeed,
    Fail,
    AlreadyExists,
    /// The first call creates the function; later calls find it existing.
    SucceedOnce,
}

/// A test-only provisioner which records calls and can be slowed down or
/// made to fail.
pub struct FakeProvisioner {
    delay_ms: AtomicU64,
    outcome: Mutex<CreateOutcome>,
    fail_updates: AtomicBool,
    failing_triggers: AtomicUsize,
    triggers_exist: AtomicBool,
    pub function_creates: AtomicUsize,
    pub trigger_creates: AtomicUsize,
    pub updates: AtomicUsize,
    pub created: Mutex<Vec<FunctionParams>>,
    pub updated: Mutex<Vec<(String, Env)>>,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self {
            delay_ms: AtomicU64::new(0),
            outcome: Mutex::new(CreateOutcome::Succeed),
            fail_updates: AtomicBool::new(false),
            failing_triggers: AtomicUsize::new(0),
            triggers_exist: AtomicBool::new(false),
            function_creates: AtomicUsize::new(0),
            trigger_creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            created: Mutex::new(vec![]),
            updated: Mutex::new(vec![]),
        }
    }

    /// Every call through the provisioner takes `ms` milliseconds.
    pub fn delay(&self, ms: u64) {
        self.delay_ms.store(ms, Ordering::SeqCst);
    }

    pub fn set_outcome(&self, outcome: CreateOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    pub fn fail_updates(&self) {
        self.fail_updates.store(true, Ordering::SeqCst);
    }

    /// The next `n` calls to `create_trigger` fail.
    pub fn fail_triggers(&self, n: usize) {
        self.failing_triggers.store(n, Ordering::SeqCst);
    }

    /// Every call to `create_trigger` reports an existing trigger.
    pub fn triggers_exist(&self) {
        self.triggers_exist.store(true, Ordering::SeqCst);
    }

    pub fn function_creates(&self) -> usize {
        self.function_creates.load(Ordering::SeqCst)
    }

    pub fn trigger_creates(&self) -> usize {
        self.trigger_creates.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    async fn react(&self) {
        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
        }
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn create_function(
        &self,
        _service: &str,
        params: &FunctionParams,
    ) -> Result<(), provisioner::Error> {
        let previous = self.function_creates.fetch_add(1, Ordering::SeqCst);
        self.react().await;
        let outcome = match *self.outcome.lock().unwrap() {
            CreateOutcome::SucceedOnce if previous == 0 => CreateOutcome::Succeed,
            CreateOutcome::SucceedOnce => CreateOutcome::AlreadyExists,
            outcome => outcome,
        };
        match outcome {
            CreateOutcome::Succeed | CreateOutcome::SucceedOnce => {
                self.created.lock().unwrap().push(params.clone());
                Ok(())
            }
            CreateOutcome::Fail => Err(provisioner::Error::Status {
                status: 500,
                message: "injected failure".to_string(),
            }),
            CreateOutcome::AlreadyExists => Err(provisioner::Error::AlreadyExists(
                params.function_name.clone(),
            )),
        }
    }

    async fn create_trigger(
        &self,
        _service: &str,
        _function: &str,
        params: &TriggerParams,
    ) -> Result<(), provisioner::Error> {
        self.trigger_creates.fetch_add(1, Ordering::SeqCst);
        self.react().await;
        let failing = self
            .failing_triggers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(provisioner::Error::Status {
                status: 500,
                message: "injected trigger failure".to_string(),
            });
        }
        if self.triggers_exist.load(Ordering::SeqCst) {
            return Err(provisioner::Error::AlreadyExists(
                params.trigger_name.clone(),
            ));
        }
        Ok(())
    }

    async fn update_function(
        &self,
        _service: &str,
        function: &str,
        env: &Env,
    ) -> Result<(), provisioner::Error> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.react().await;
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(provisioner::Error::NotFound(function.to_string()));
        }
        self.updated
            .lock()
            .unwrap()
            .push((function.to_string(), env.clone()));
        Ok(())
    }
}

/// A [MemoryStore] which counts accesses and can refuse reads or writes.
pub struct CountingStore {
    pub inner: MemoryStore,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
    fail_gets: AtomicBool,
    fail_puts: AtomicBool,
}

impl CountingStore {
    pub fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            gets: AtomicUsize::new(0),
            puts: AtomicUsize::new(0),
            fail_gets: AtomicBool::new(false),
            fail_puts: AtomicBool::new(false),
        }
    }

    pub fn fail_gets(&self) {
        self.fail_gets.store(true, Ordering::SeqCst);
    }

    pub fn fail_puts(&self) {
        self.fail_puts.store(true, Ordering::SeqCst);
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Datastore for CountingStore {
    async fn get(&self, key: &str, fields: &[&str]) -> Result<Fields, store::Error> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(store::Error::Other(anyhow!("injected get failure")));
        }
        self.inner.get(key, fields).await
    }

    async fn put(&self, key: &str, fields: Fields) -> Result<(), store::Error> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(store::Error::Other(anyhow!("injected put failure")));
        }
        self.inner.put(key, fields).await
    }

    async fn list_all(&self, fields: &[&str]) -> Result<Vec<Fields>, store::Error> {
        self.inner.list_all(fields).await
    }
}
