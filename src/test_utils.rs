use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::config::AppConfig;
use crate::integration::{DeferredServices, LocalEventBus};
use crate::provider::{AppContext, Provider};

/// Shared, ordered record of hook calls such as `"boot:cache"`.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn entries(log: &CallLog) -> Vec<String> {
    log.lock().unwrap().clone()
}

pub fn test_context() -> AppContext {
    test_context_with(AppConfig::default())
}

pub fn test_context_with(config: AppConfig) -> AppContext {
    AppContext::new(
        Arc::new(config),
        Arc::new(DeferredServices::new()),
        Arc::new(LocalEventBus::new()),
    )
}

#[derive(Default)]
pub struct HookCounts {
    pub register: AtomicUsize,
    pub boot: AtomicUsize,
    pub terminate: AtomicUsize,
}

/// Configurable provider that counts and logs every hook invocation.
pub struct TestProvider {
    id: String,
    priority: i32,
    deferred: bool,
    provides: Vec<String>,
    when: Vec<String>,
    terminable: bool,
    fail_register: bool,
    fail_boot: bool,
    fail_terminate: bool,
    hook_delay: Duration,
    terminate_delay: Duration,
    counts: HookCounts,
    log: Option<CallLog>,
}

impl TestProvider {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            priority: 200,
            deferred: false,
            provides: Vec::new(),
            when: Vec::new(),
            terminable: false,
            fail_register: false,
            fail_boot: false,
            fail_terminate: false,
            hook_delay: Duration::ZERO,
            terminate_delay: Duration::ZERO,
            counts: HookCounts::default(),
            log: None,
        }
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn deferred(mut self, services: &[&str]) -> Self {
        self.deferred = true;
        self.provides = services.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn when(mut self, events: &[&str]) -> Self {
        self.when = events.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn terminable(mut self) -> Self {
        self.terminable = true;
        self
    }

    pub fn failing_register(mut self) -> Self {
        self.fail_register = true;
        self
    }

    pub fn failing_boot(mut self) -> Self {
        self.fail_boot = true;
        self
    }

    pub fn failing_terminate(mut self) -> Self {
        self.fail_terminate = true;
        self
    }

    /// Delay applied inside `register` and `boot`, widening race windows.
    pub fn hook_delay(mut self, delay: Duration) -> Self {
        self.hook_delay = delay;
        self
    }

    pub fn terminate_delay(mut self, delay: Duration) -> Self {
        self.terminate_delay = delay;
        self
    }

    pub fn log(mut self, log: &CallLog) -> Self {
        self.log = Some(log.clone());
        self
    }

    pub fn registers(&self) -> usize {
        self.counts.register.load(Ordering::SeqCst)
    }

    pub fn boots(&self) -> usize {
        self.counts.boot.load(Ordering::SeqCst)
    }

    pub fn terminates(&self) -> usize {
        self.counts.terminate.load(Ordering::SeqCst)
    }

    fn record(&self, hook: &str) {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(format!("{}:{}", hook, self.id));
        }
    }
}

#[async_trait]
impl Provider for TestProvider {
    fn identity(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_deferred(&self) -> bool {
        self.deferred
    }

    fn provides(&self) -> Vec<String> {
        self.provides.clone()
    }

    fn when(&self) -> Vec<String> {
        self.when.clone()
    }

    fn terminable(&self) -> bool {
        self.terminable
    }

    async fn register(&self, _app: &AppContext) -> anyhow::Result<()> {
        self.counts.register.fetch_add(1, Ordering::SeqCst);
        self.record("register");
        if !self.hook_delay.is_zero() {
            tokio::time::sleep(self.hook_delay).await;
        }
        if self.fail_register {
            anyhow::bail!("register hook failed");
        }
        Ok(())
    }

    async fn boot(&self, _app: &AppContext) -> anyhow::Result<()> {
        self.counts.boot.fetch_add(1, Ordering::SeqCst);
        self.record("boot");
        if !self.hook_delay.is_zero() {
            tokio::time::sleep(self.hook_delay).await;
        }
        if self.fail_boot {
            anyhow::bail!("boot hook failed");
        }
        Ok(())
    }

    async fn terminate(&self, _deadline: Instant, _app: &AppContext) -> anyhow::Result<()> {
        self.counts.terminate.fetch_add(1, Ordering::SeqCst);
        self.record("terminate");
        if !self.terminate_delay.is_zero() {
            tokio::time::sleep(self.terminate_delay).await;
        }
        if self.fail_terminate {
            anyhow::bail!("terminate hook failed");
        }
        Ok(())
    }
}
