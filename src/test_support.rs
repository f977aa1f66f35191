// src/test_support.rs

//! In-memory stand-ins for the OS ports, shared by the unit tests.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use tempfile::TempDir;

use crate::{
    config::Settings,
    errors::{CommandError, ServiceError, StoreError},
    tweaks::{
        network::guard::{ConnectivityProbe, ProbeResult},
        SystemContext,
    },
    utils::{
        command::{CommandOutput, CommandRunner},
        registry::{full_path, ConfigurationStore, RegistryHive, RegistryKeyValue},
        services::{ServiceControl, ServiceState, StartupType},
    },
};

type KeyId = (RegistryHive, String);

/// Case-insensitive registry held in memory.
#[derive(Default)]
pub struct MemoryStore {
    keys: Mutex<BTreeMap<KeyId, BTreeMap<String, RegistryKeyValue>>>,
    failing_writes: Mutex<HashSet<String>>,
    failing_keys: Mutex<HashSet<KeyId>>,
    ignored_writes: Mutex<HashSet<String>>,
    failing_reads: Mutex<HashSet<String>>,
    writes: AtomicUsize,
}

fn key_id(hive: RegistryHive, path: &str) -> KeyId {
    (hive, path.trim_matches('\\').to_lowercase())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, hive: RegistryHive, path: &str, name: &str, value: RegistryKeyValue) {
        self.keys
            .lock()
            .unwrap()
            .entry(key_id(hive, path))
            .or_default()
            .insert(name.to_lowercase(), value);
    }

    pub fn get(&self, hive: RegistryHive, path: &str, name: &str) -> Option<RegistryKeyValue> {
        self.keys
            .lock()
            .unwrap()
            .get(&key_id(hive, path))
            .and_then(|values| values.get(&name.to_lowercase()).cloned())
    }

    pub fn create_key(&self, hive: RegistryHive, path: &str) {
        self.keys
            .lock()
            .unwrap()
            .entry(key_id(hive, path))
            .or_default();
    }

    /// Makes every write to a value called `name` fail.
    pub fn fail_writes_to(&self, name: &str) {
        self.failing_writes.lock().unwrap().insert(name.to_lowercase());
    }

    /// Makes every write or delete under the key at `path` fail.
    pub fn fail_writes_under(&self, hive: RegistryHive, path: &str) {
        self.failing_keys.lock().unwrap().insert(key_id(hive, path));
    }

    fn rejects(&self, hive: RegistryHive, path: &str, name: &str) -> bool {
        self.failing_writes.lock().unwrap().contains(&name.to_lowercase())
            || self.failing_keys.lock().unwrap().contains(&key_id(hive, path))
    }

    /// Accepts writes to `name` without storing them.
    pub fn ignore_writes_to(&self, name: &str) {
        self.ignored_writes.lock().unwrap().insert(name.to_lowercase());
    }

    pub fn fail_reads_of(&self, name: &str) {
        self.failing_reads.lock().unwrap().insert(name.to_lowercase());
    }

    /// Number of successful writes and deletes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ConfigurationStore for MemoryStore {
    fn key_exists(&self, hive: RegistryHive, path: &str) -> Result<bool, StoreError> {
        let (hive, path) = key_id(hive, path);
        let prefix = format!("{}\\", path);
        Ok(self
            .keys
            .lock()
            .unwrap()
            .keys()
            .any(|(h, p)| *h == hive && (*p == path || p.starts_with(&prefix))))
    }

    fn read_value(
        &self,
        hive: RegistryHive,
        path: &str,
        name: &str,
    ) -> Result<Option<RegistryKeyValue>, StoreError> {
        if self.failing_reads.lock().unwrap().contains(&name.to_lowercase()) {
            return Err(StoreError::ReadValueError {
                path: full_path(hive, path),
                name: name.to_string(),
                reason: "access denied".to_string(),
            });
        }
        Ok(self.get(hive, path, name))
    }

    fn write_value(
        &self,
        hive: RegistryHive,
        path: &str,
        name: &str,
        value: &RegistryKeyValue,
    ) -> Result<(), StoreError> {
        let lowered = name.to_lowercase();
        if self.rejects(hive, path, name) {
            return Err(StoreError::SetValueError {
                path: full_path(hive, path),
                name: name.to_string(),
                reason: "access denied".to_string(),
            });
        }
        if self.ignored_writes.lock().unwrap().contains(&lowered) {
            return Ok(());
        }
        self.set(hive, path, name, value.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete_value(&self, hive: RegistryHive, path: &str, name: &str) -> Result<(), StoreError> {
        let lowered = name.to_lowercase();
        if self.rejects(hive, path, name) {
            return Err(StoreError::DeleteValueError {
                path: full_path(hive, path),
                name: name.to_string(),
                reason: "access denied".to_string(),
            });
        }
        if let Some(values) = self.keys.lock().unwrap().get_mut(&key_id(hive, path)) {
            values.remove(&lowered);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn subkeys(&self, hive: RegistryHive, path: &str) -> Result<Vec<String>, StoreError> {
        let (hive, path) = key_id(hive, path);
        let prefix = format!("{}\\", path);
        let names: BTreeSet<String> = self
            .keys
            .lock()
            .unwrap()
            .keys()
            .filter(|(h, _)| *h == hive)
            .filter_map(|(_, p)| p.strip_prefix(&prefix))
            .filter_map(|rest| rest.split('\\').next())
            .map(str::to_string)
            .collect();
        Ok(names.into_iter().collect())
    }
}

#[derive(Debug, Clone)]
pub struct FakeService {
    pub state: ServiceState,
    pub startup: StartupType,
    /// `stop` never reaches Stopped within the timeout.
    pub stop_hangs: bool,
    pub force_stop_fails: bool,
    pub config_fails: bool,
}

impl FakeService {
    pub fn running(startup: StartupType) -> Self {
        Self {
            state: ServiceState::Running,
            startup,
            stop_hangs: false,
            force_stop_fails: false,
            config_fails: false,
        }
    }

    pub fn stopped(startup: StartupType) -> Self {
        Self {
            state: ServiceState::Stopped,
            ..Self::running(startup)
        }
    }
}

#[derive(Default)]
pub struct FakeServices {
    services: Mutex<HashMap<String, FakeService>>,
    calls: Mutex<Vec<String>>,
}

impl FakeServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(self, name: &str, service: FakeService) -> Self {
        self.services
            .lock()
            .unwrap()
            .insert(name.to_lowercase(), service);
        self
    }

    pub fn service(&self, name: &str) -> Option<FakeService> {
        self.services.lock().unwrap().get(&name.to_lowercase()).cloned()
    }

    /// Every mutating call, formatted as `"<op> <name>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn with_mut<T>(
        &self,
        op: &str,
        name: &str,
        f: impl FnOnce(&mut FakeService) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        self.calls.lock().unwrap().push(format!("{} {}", op, name));
        let mut services = self.services.lock().unwrap();
        let service = services
            .get_mut(&name.to_lowercase())
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))?;
        f(service)
    }
}

impl ServiceControl for FakeServices {
    fn exists(&self, name: &str) -> Result<bool, ServiceError> {
        Ok(self.service(name).is_some())
    }

    fn status(&self, name: &str) -> Result<ServiceState, ServiceError> {
        self.service(name)
            .map(|s| s.state)
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))
    }

    fn startup_type(&self, name: &str) -> Result<StartupType, ServiceError> {
        self.service(name)
            .map(|s| s.startup)
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))
    }

    fn set_startup_type(&self, name: &str, startup_type: StartupType) -> Result<(), ServiceError> {
        self.with_mut("config", name, |service| {
            if service.config_fails {
                return Err(ServiceError::ConfigError {
                    name: name.to_string(),
                    reason: "access denied".to_string(),
                });
            }
            service.startup = startup_type;
            Ok(())
        })
    }

    fn stop(&self, name: &str, _timeout: Duration) -> Result<bool, ServiceError> {
        self.with_mut("stop", name, |service| {
            if service.stop_hangs {
                return Ok(false);
            }
            service.state = ServiceState::Stopped;
            Ok(true)
        })
    }

    fn force_stop(&self, name: &str) -> Result<(), ServiceError> {
        self.with_mut("force_stop", name, |service| {
            if service.force_stop_fails {
                return Err(ServiceError::ControlError {
                    name: name.to_string(),
                    reason: "process not found".to_string(),
                });
            }
            service.state = ServiceState::Stopped;
            Ok(())
        })
    }

    fn start(&self, name: &str) -> Result<(), ServiceError> {
        self.with_mut("start", name, |service| {
            service.state = ServiceState::Running;
            Ok(())
        })
    }
}

type Handler = dyn Fn(&str, &[&str]) -> CommandOutput + Send + Sync;

/// Command runner that answers from a closure and records every invocation.
pub struct ScriptedRunner {
    handler: Box<Handler>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedRunner {
    pub fn new(handler: impl Fn(&str, &[&str]) -> CommandOutput + Send + Sync + 'static) -> Self {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Every command exits 0 with no output.
    pub fn succeeding() -> Self {
        Self::new(|_, _| ok(""))
    }

    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }

    /// True if `program` was run with `arg` among its arguments.
    pub fn ran(&self, program: &str, arg: &str) -> bool {
        self.calls()
            .iter()
            .any(|(p, args)| p == program && args.iter().any(|a| a == arg))
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        program: &str,
        args: &[&str],
        _timeout: Option<Duration>,
    ) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push((
            program.to_string(),
            args.iter().map(|a| a.to_string()).collect(),
        ));
        Ok((self.handler)(program, args))
    }
}

pub fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub fn failed(stdout: &str) -> CommandOutput {
    CommandOutput {
        exit_code: Some(1),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

pub struct FakeProbe {
    reachable: AtomicBool,
    hosts: Mutex<Vec<String>>,
}

impl FakeProbe {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: AtomicBool::new(reachable),
            hosts: Mutex::new(Vec::new()),
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn probed_hosts(&self) -> Vec<String> {
        self.hosts.lock().unwrap().clone()
    }
}

impl ConnectivityProbe for FakeProbe {
    fn probe(&self, host: &str, _timeout: Duration) -> ProbeResult {
        self.hosts.lock().unwrap().push(host.to_string());
        if self.reachable.load(Ordering::SeqCst) {
            ProbeResult {
                success: true,
                latency: Some(Duration::from_millis(12)),
            }
        } else {
            ProbeResult {
                success: false,
                latency: None,
            }
        }
    }
}

/// A `SystemContext` wired to fakes, with a temporary backup directory.
pub struct TestHarness {
    pub ctx: SystemContext,
    pub store: Arc<MemoryStore>,
    pub services: Arc<FakeServices>,
    pub runner: Arc<ScriptedRunner>,
    pub probe: Arc<FakeProbe>,
    pub dir: TempDir,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with(
            MemoryStore::new(),
            FakeServices::new(),
            ScriptedRunner::succeeding(),
        )
    }

    pub fn with(store: MemoryStore, services: FakeServices, runner: ScriptedRunner) -> Self {
        Self::with_shared(Arc::new(store), services, runner)
    }

    /// Like `with`, for runners whose scripted commands need to touch the store.
    pub fn with_shared(
        store: Arc<MemoryStore>,
        services: FakeServices,
        runner: ScriptedRunner,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let services = Arc::new(services);
        let runner = Arc::new(runner);
        let probe = Arc::new(FakeProbe::new(true));
        let settings = Settings {
            backup_dir: dir.path().to_path_buf(),
            ..Settings::default()
        };
        let ctx = SystemContext::new(
            settings,
            store.clone(),
            services.clone(),
            runner.clone(),
            probe.clone(),
        )
        .unwrap();
        Self {
            ctx,
            store,
            services,
            runner,
            probe,
            dir,
        }
    }
}
