//! Owner of the engine process and of everything inferred about it.

use chrono::Utc;
use gatewarden_channels::{CredentialCheck, FeishuProbe, UpstreamStatus};
use gatewarden_core::{Config, Error, Paths, Result};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::classify::{Classifier, EvidenceSource, Signal};
use crate::command::CommandRunner;
use crate::env::{engine_env, generate_token};
use crate::exit::{describe_exit, describe_spawn_error, ExitInfo};
use crate::fusion::{fuse, Connectivity};
use crate::health::{assess, needs_upstream, HealthAssessment};
use crate::installer::{InstallProgress, Installer};
use crate::log_buffer::{LogBuffer, LogEntry, LogStream};
use crate::logfile::LogFileTail;
use crate::native_config::write_native_config;
use crate::plugins::{parse_plugin_table, PluginRecord, PluginStatus};
use crate::port::{deregister_service, is_port_in_use, kill_port_owner, wait_for_port_release};
use crate::probe::HttpProbe;
use crate::resolver::{detect_version, EngineLocation, Resolver};
use crate::state::{EngineLifecycle, Lifecycle, StateStore, SupervisorState};

const STDERR_TAIL_LINES: usize = 10;
const READER_DRAIN: Duration = Duration::from_secs(2);

struct ChildHandle {
    pid: u32,
    generation: u64,
    kill_tx: Option<oneshot::Sender<()>>,
    exited: watch::Receiver<Option<ExitInfo>>,
}

enum StartOutcome {
    Running,
    Interrupted,
}

struct Inner {
    config: Config,
    paths: Paths,
    resolver: Resolver,
    classifier: Classifier,
    state: StateStore,
    logs: Mutex<LogBuffer>,
    log_tx: broadcast::Sender<LogEntry>,
    /// Engine subcommands share one on-disk config, so they never overlap.
    command_lock: Arc<tokio::sync::Mutex<()>>,
    /// Serializes `start` calls.
    start_lock: tokio::sync::Mutex<()>,
    token: String,
    child: Mutex<Option<ChildHandle>>,
    probe_task: Mutex<Option<JoinHandle<()>>>,
    generation: AtomicU64,
    /// Generation of the child most recently terminated on purpose.
    stopped_generation: AtomicU64,
    /// Bumped by every `stop`; a `start` that sees it move gives up.
    stop_epoch: AtomicU64,
    upstream: Option<Arc<dyn CredentialCheck>>,
    upstream_cache: Mutex<Option<(Instant, UpstreamStatus)>>,
    disposed: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Supervises one engine process. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(config: Config, paths: Paths) -> Self {
        let resolver = Resolver::new(&paths);
        let upstream: Option<Arc<dyn CredentialCheck>> = if config.channels.feishu.is_configured() {
            Some(Arc::new(FeishuProbe::new(&config.channels.feishu)))
        } else {
            None
        };
        Self::with_parts(config, paths, resolver, upstream)
    }

    pub fn with_parts(
        config: Config,
        paths: Paths,
        resolver: Resolver,
        upstream: Option<Arc<dyn CredentialCheck>>,
    ) -> Self {
        let engine = resolver.resolve(&config.engine.name);
        let initial = SupervisorState {
            engine_lifecycle: if engine.is_some() {
                EngineLifecycle::Installed
            } else {
                EngineLifecycle::NotInstalled
            },
            engine,
            ..SupervisorState::default()
        };
        let (log_tx, _) = broadcast::channel(256);

        Self {
            inner: Arc::new(Inner {
                classifier: Classifier::new(&config.classifier),
                logs: Mutex::new(LogBuffer::new(config.engine.log_buffer_capacity)),
                config,
                paths,
                resolver,
                state: StateStore::new(initial),
                log_tx,
                command_lock: Arc::new(tokio::sync::Mutex::new(())),
                start_lock: tokio::sync::Mutex::new(()),
                token: generate_token(),
                child: Mutex::new(None),
                probe_task: Mutex::new(None),
                generation: AtomicU64::new(0),
                stopped_generation: AtomicU64::new(0),
                stop_epoch: AtomicU64::new(0),
                upstream,
                upstream_cache: Mutex::new(None),
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.inner.state.snapshot()
    }

    /// Full snapshot on every change.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorState> {
        self.inner.state.subscribe()
    }

    /// Copy of the rolling output window.
    pub fn logs(&self) -> Vec<LogEntry> {
        lock(&self.inner.logs).snapshot()
    }

    pub fn subscribe_logs(&self) -> broadcast::Receiver<LogEntry> {
        self.inner.log_tx.subscribe()
    }

    /// Last `n` lines of the engine's own daily log file.
    pub fn engine_log_tail(&self, n: usize) -> Vec<String> {
        self.inner.log_file().tail(n)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.inner.disposed.load(Ordering::SeqCst) {
            return Err(Error::Other("supervisor has been disposed".to_string()));
        }
        Ok(())
    }

    pub async fn start(&self) -> Result<()> {
        self.ensure_alive()?;
        let _guard = self.inner.start_lock.lock().await;

        if self.inner.current_pid().is_some() && self.state().lifecycle == Lifecycle::Running {
            info!("Engine already running");
            return Ok(());
        }

        let name = &self.inner.config.engine.name;
        let location = match self.inner.resolver.resolve_required(name) {
            Ok(location) => location,
            Err(e) => {
                warn!(error = %e, "Cannot start engine");
                self.inner.state.update(|s| {
                    s.lifecycle = Lifecycle::Error;
                    s.engine_lifecycle = EngineLifecycle::NotInstalled;
                    s.engine = None;
                    s.last_error = Some(e.to_string());
                });
                return Err(e);
            }
        };

        let epoch = self.inner.stop_epoch.load(Ordering::SeqCst);
        lock(&self.inner.upstream_cache).take();
        self.inner.state.update(|s| {
            s.lifecycle = Lifecycle::Starting;
            s.engine_lifecycle = EngineLifecycle::Installed;
            s.engine = Some(location.clone());
            s.last_error = None;
            s.connectivity = Connectivity::unknown("starting");
            s.health_detail.clear();
        });

        match Inner::start_engine(&self.inner, location, epoch).await {
            Ok(StartOutcome::Running) => Ok(()),
            Ok(StartOutcome::Interrupted) => {
                info!("Start interrupted by stop");
                self.inner.state.update(|s| s.lifecycle = Lifecycle::Stopped);
                Err(Error::Other("start interrupted by stop".to_string()))
            }
            Err(e) => {
                error!(error = %e, "Engine failed to start");
                if let Some(handle) = self.inner.take_child() {
                    self.inner.terminate(handle, false).await;
                }
                self.inner.abort_probe();
                self.inner.state.update(|s| {
                    s.lifecycle = Lifecycle::Error;
                    s.last_error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    /// Stops the owned child and any externally started instance holding the
    /// port. A no-op when nothing is running.
    pub async fn stop(&self) -> Result<()> {
        let inner = &self.inner;
        inner.stop_epoch.fetch_add(1, Ordering::SeqCst);
        inner.abort_probe();

        let handle = inner.take_child();
        let had_child = handle.is_some();
        if let Some(handle) = handle {
            info!(pid = handle.pid, "Stopping engine");
            inner.terminate(handle, true).await;
        }

        let port = inner.config.engine.port;
        let port_busy = is_port_in_use(port).await;
        if had_child || port_busy {
            inner.stop_external().await;
        }

        inner.state.update(|s| {
            if had_child || port_busy || matches!(s.lifecycle, Lifecycle::Running | Lifecycle::Starting) {
                s.lifecycle = Lifecycle::Stopped;
                s.connectivity = Connectivity::unknown("stopped");
            }
        });
        Ok(())
    }

    pub async fn restart(&self) -> Result<()> {
        self.ensure_alive()?;
        self.stop().await?;
        self.start().await
    }

    /// Runs the probe, log-file and (when needed) upstream channels once and
    /// folds them into the shared state.
    pub async fn check_health(&self) -> HealthAssessment {
        self.inner.health_tick().await
    }

    pub async fn list_plugins(&self) -> Result<Vec<PluginRecord>> {
        self.ensure_alive()?;
        let runner = self.inner.runner()?;
        let output = runner.run_checked(&["plugins", "list"]).await?;
        let text = if output.stdout.trim().is_empty() {
            output.combined()
        } else {
            output.stdout
        };
        Ok(parse_plugin_table(&text))
    }

    pub async fn toggle_plugin(&self, id: &str, enabled: bool) -> Result<()> {
        self.ensure_alive()?;
        let runner = self.inner.runner()?;
        let action = if enabled { "enable" } else { "disable" };
        runner.run_checked(&["plugins", action, id]).await?;
        info!(plugin = id, action, "Plugin toggled");
        Ok(())
    }

    /// Runs `doctor --fix` on demand.
    pub async fn doctor(&self) -> Result<String> {
        self.ensure_alive()?;
        let runner = self.inner.runner()?;
        let output = runner.run_checked(&["doctor", "--fix"]).await?;
        Ok(output.combined())
    }

    pub async fn install(&self, progress: mpsc::Sender<InstallProgress>) -> Result<EngineLocation> {
        self.ensure_alive()?;
        let inner = &self.inner;
        inner
            .state
            .update(|s| s.engine_lifecycle = EngineLifecycle::Installing);

        let installer = Installer::new(inner.config.clone(), inner.paths.clone(), inner.resolver.clone());
        match installer.install(progress).await {
            Ok(mut location) => {
                let envs = inner.env_for(&location);
                location.version = detect_version(&location, &envs, inner.config.timeouts.command()).await;
                inner.state.update(|s| {
                    s.engine_lifecycle = EngineLifecycle::Installed;
                    s.engine = Some(location.clone());
                });
                Ok(location)
            }
            Err(e) => {
                inner.state.update(|s| {
                    s.engine_lifecycle = EngineLifecycle::InstallError;
                    s.last_error = Some(e.to_string());
                });
                Err(e)
            }
        }
    }

    /// Stops everything. Later calls other than `stop`/`state` fail.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.stop().await {
            warn!(error = %e, "Stop during dispose failed");
        }
        debug!("Supervisor disposed");
    }
}

impl Inner {
    fn current_pid(&self) -> Option<u32> {
        lock(&self.child).as_ref().map(|h| h.pid)
    }

    fn take_child(&self) -> Option<ChildHandle> {
        lock(&self.child).take()
    }

    fn abort_probe(&self) {
        if let Some(task) = lock(&self.probe_task).take() {
            task.abort();
        }
    }

    fn log_file(&self) -> LogFileTail {
        LogFileTail::new(
            self.config.engine.log_dir(),
            self.config.engine.name.clone(),
            self.config.engine.log_tail_lines,
        )
    }

    fn env_for(&self, location: &EngineLocation) -> HashMap<String, String> {
        engine_env(&self.config, &self.paths, &self.resolver, Some(location), &self.token)
    }

    fn runner_for(&self, location: &EngineLocation) -> CommandRunner {
        CommandRunner::new(
            location.path.clone(),
            self.env_for(location),
            self.config.timeouts.command(),
            self.command_lock.clone(),
        )
    }

    fn runner(&self) -> Result<CommandRunner> {
        let location = self.resolver.resolve_required(&self.config.engine.name)?;
        Ok(self.runner_for(&location))
    }

    fn push_log(&self, stream: LogStream, line: impl Into<String>) {
        let entry = LogEntry::new(stream, line);
        lock(&self.logs).push(entry.clone());
        let _ = self.log_tx.send(entry);
    }

    fn on_line(&self, generation: u64, stream: LogStream, line: String, ready: &Notify) {
        debug!(target: "engine", stream = ?stream, "{}", line);
        if self.classifier.is_ready(&line) {
            ready.notify_one();
        }
        let evidence = self.classifier.evidence(EvidenceSource::StreamTap, &line);
        self.push_log(stream, line);

        if evidence.signal == Signal::Unknown || self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        self.state.update(|s| {
            let outcome = fuse(&s.connectivity, std::slice::from_ref(&evidence));
            if outcome.changed_from(&s.connectivity) {
                debug!(signal = ?evidence.signal, connected = outcome.connectivity.connected, "Connectivity updated from output");
                s.connectivity = outcome.connectivity;
            }
        });
    }

    async fn start_engine(inner: &Arc<Inner>, mut location: EngineLocation, epoch: u64) -> Result<StartOutcome> {
        let envs = inner.env_for(&location);
        location.version = detect_version(&location, &envs, inner.config.timeouts.command()).await;
        if location.version.is_some() {
            let loc = location.clone();
            inner.state.update(|s| s.engine = Some(loc));
        }
        info!(path = %location.path.display(), version = ?location.version, "Starting engine");

        inner.clear_prior_instance().await;
        write_native_config(&inner.config, &inner.paths, &inner.token)?;
        inner.prepare(&inner.runner_for(&location)).await;

        if inner.stop_epoch.load(Ordering::SeqCst) != epoch {
            return Ok(StartOutcome::Interrupted);
        }

        let mut cmd = Command::new(&location.path);
        cmd.arg("gateway")
            .envs(&envs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Spawn(describe_spawn_error(&e, &location.path)))?;
        let pid = child
            .id()
            .ok_or_else(|| Error::Spawn("engine exited before reporting a pid".to_string()))?;
        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        info!(pid, generation, "Engine spawned");

        let ready = Arc::new(Notify::new());
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_reader(inner, generation, LogStream::Stdout, stdout, ready.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_reader(inner, generation, LogStream::Stderr, stderr, ready.clone()));
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let (kill_tx, kill_rx) = oneshot::channel::<()>();
        let watcher_inner = inner.clone();
        tokio::spawn(async move {
            let status = tokio::select! {
                status = child.wait() => status,
                _ = kill_rx => {
                    let _ = child.start_kill();
                    child.wait().await
                }
            };
            let info = status
                .map(ExitInfo::from_status)
                .unwrap_or(ExitInfo { code: None, signal: None });
            for reader in readers {
                let _ = tokio::time::timeout(READER_DRAIN, reader).await;
            }
            watcher_inner.handle_exit(generation, info);
            let _ = exit_tx.send(Some(info));
        });

        let mut exited = exit_rx.clone();
        *lock(&inner.child) = Some(ChildHandle {
            pid,
            generation,
            kill_tx: Some(kill_tx),
            exited: exit_rx,
        });

        let early_exit = tokio::select! {
            _ = ready.notified() => None,
            info = async { exited.wait_for(|e| e.is_some()).await.ok().and_then(|r| *r) } => {
                Some(info.unwrap_or(ExitInfo { code: None, signal: None }))
            }
            _ = tokio::time::sleep(inner.config.timeouts.ready()) => None,
        };

        if inner.stop_epoch.load(Ordering::SeqCst) != epoch {
            if let Some(handle) = inner.take_child() {
                inner.terminate(handle, false).await;
            }
            return Ok(StartOutcome::Interrupted);
        }

        let early_exit = early_exit.or_else(|| *exited.borrow());
        if let Some(info) = early_exit {
            let tail = lock(&inner.logs).tail_of(LogStream::Stderr, STDERR_TAIL_LINES);
            return Err(Error::RuntimeExit(describe_exit(&info, &tail)));
        }

        inner.state.update(|s| {
            s.lifecycle = Lifecycle::Running;
            s.pid = Some(pid);
            s.started_at = Some(Utc::now());
        });
        info!(pid, "Engine running");
        spawn_probe_loop(inner, generation);
        Ok(StartOutcome::Running)
    }

    /// Our own leftover child, a service-managed copy, then whatever owns the port.
    async fn clear_prior_instance(&self) {
        if let Some(handle) = self.take_child() {
            self.terminate(handle, true).await;
        }
        if let Some(label) = self.config.engine.service_label.as_deref() {
            deregister_service(label).await;
        }

        let port = self.config.engine.port;
        if !is_port_in_use(port).await {
            return;
        }
        let killed = kill_port_owner(port).await;
        self.push_log(
            LogStream::Supervisor,
            format!("port {} was in use; killed {:?}", port, killed),
        );
        let timeouts = &self.config.timeouts;
        if !wait_for_port_release(port, timeouts.port_release(), timeouts.port_poll()).await {
            warn!(port, "Port still in use after waiting");
            self.push_log(
                LogStream::Supervisor,
                format!("port {} still in use after {}ms", port, timeouts.port_release_ms),
            );
        }
    }

    async fn run_preparation(&self, runner: &CommandRunner, args: &[&str]) -> bool {
        match runner.run_checked(args).await {
            Ok(_) => {
                self.push_log(LogStream::Supervisor, format!("{}: ok", args.join(" ")));
                true
            }
            Err(e) => {
                let err = Error::Preparation(format!("'{}': {}", args.join(" "), e));
                warn!(error = %err, "Preparation step failed, continuing");
                self.push_log(LogStream::Supervisor, err.to_string());
                false
            }
        }
    }

    /// Best-effort: repair config, then make sure required plugins are enabled.
    /// Steps run strictly in order.
    async fn prepare(&self, runner: &CommandRunner) {
        self.run_preparation(runner, &["doctor", "--fix"]).await;

        let loaded: Vec<String> = match runner.run_checked(&["plugins", "list"]).await {
            Ok(output) => parse_plugin_table(&output.stdout)
                .into_iter()
                .filter(|r| r.status == PluginStatus::Loaded)
                .map(|r| r.id)
                .collect(),
            Err(e) => {
                let err = Error::Preparation(format!("'plugins list': {}", e));
                warn!(error = %err, "Preparation step failed, continuing");
                self.push_log(LogStream::Supervisor, err.to_string());
                Vec::new()
            }
        };

        for plugin in &self.config.engine.required_plugins {
            if loaded.iter().any(|id| id == plugin) {
                continue;
            }
            self.run_preparation(runner, &["plugins", "enable", plugin.as_str()]).await;
        }
    }

    /// Graceful signal first (unless `graceful` is false), forced kill after
    /// the stop timeout.
    async fn terminate(&self, handle: ChildHandle, graceful: bool) {
        let ChildHandle {
            pid,
            generation,
            kill_tx,
            mut exited,
        } = handle;
        self.stopped_generation.store(generation, Ordering::SeqCst);
        let limit = self.config.timeouts.stop();

        if graceful && cfg!(unix) {
            signal_group(pid, StopSignal::Term);
            if wait_exit(&mut exited, limit).await {
                return;
            }
            warn!(pid, "Engine ignored SIGTERM, killing");
        }

        signal_group(pid, StopSignal::Kill);
        if let Some(tx) = kill_tx {
            let _ = tx.send(());
        }
        if !wait_exit(&mut exited, limit).await {
            warn!(pid, "Engine did not exit after forced kill");
        }
    }

    /// Covers instances we did not spawn: the engine's own stop command,
    /// service manager, then the port owner.
    async fn stop_external(&self) {
        if let Some(location) = self.resolver.resolve(&self.config.engine.name) {
            let runner = self.runner_for(&location);
            if let Err(e) = runner.run(&["gateway", "stop"]).await {
                debug!(error = %e, "gateway stop failed");
            }
        }
        if let Some(label) = self.config.engine.service_label.as_deref() {
            deregister_service(label).await;
        }

        let port = self.config.engine.port;
        if is_port_in_use(port).await {
            kill_port_owner(port).await;
            let timeouts = &self.config.timeouts;
            if !wait_for_port_release(port, timeouts.port_release(), timeouts.port_poll()).await {
                warn!(port, "Port still in use after stop");
            }
        }
    }

    fn handle_exit(&self, generation: u64, info: ExitInfo) {
        {
            let mut slot = lock(&self.child);
            if slot.as_ref().map(|h| h.generation) == Some(generation) {
                slot.take();
            }
        }

        if self.stopped_generation.load(Ordering::SeqCst) == generation {
            self.push_log(LogStream::Supervisor, "engine stopped");
            return;
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }

        self.abort_probe();
        let tail = lock(&self.logs).tail_of(LogStream::Stderr, STDERR_TAIL_LINES);
        let message = describe_exit(&info, &tail);
        self.push_log(LogStream::Supervisor, message.clone());

        if info.is_failure() {
            error!(code = ?info.code, "{}", message);
            self.state.update(|s| {
                s.lifecycle = Lifecycle::Error;
                s.last_error = Some(message.clone());
                s.connectivity = Connectivity::unknown("engine exited");
            });
        } else {
            info!(code = ?info.code, signal = ?info.signal, "Engine exited");
            self.state.update(|s| {
                s.lifecycle = Lifecycle::Stopped;
                s.connectivity = Connectivity::unknown("engine exited");
            });
        }
    }

    /// Reuses a recent platform answer instead of asking on every tick.
    async fn upstream_status(&self, check: &dyn CredentialCheck) -> UpstreamStatus {
        let ttl = self.config.timeouts.upstream_cache();
        let cached = lock(&self.upstream_cache)
            .as_ref()
            .filter(|(at, _)| at.elapsed() < ttl)
            .map(|(_, status)| status.clone());
        if let Some(status) = cached {
            debug!("Using cached upstream check");
            return status;
        }

        let status = check.check().await;
        *lock(&self.upstream_cache) = Some((Instant::now(), status.clone()));
        status
    }

    async fn health_tick(&self) -> HealthAssessment {
        let probe = HttpProbe::new(self.config.engine.health_url(), Some(self.token.clone()))
            .check()
            .await;
        let file = self.log_file().read(&self.classifier);

        let current = self.state.snapshot().connectivity;
        let upstream = match self.upstream.as_ref() {
            Some(check) if needs_upstream(&fuse(&current, file.evidence()).connectivity) => {
                Some(self.upstream_status(check.as_ref()).await)
            }
            _ => None,
        };

        let mut result = None;
        self.state.update(|s| {
            let assessment = assess(&s.connectivity, Some(&probe), Some(&file), upstream.as_ref());
            s.connectivity = assessment.connectivity.clone();
            s.health_detail = assessment.detail();
            result = Some(assessment);
        });
        let assessment = result.unwrap_or_else(|| assess(&current, Some(&probe), Some(&file), upstream.as_ref()));
        debug!(verdict = ?assessment.verdict, detail = %assessment.detail(), "Health tick");
        assessment
    }
}

fn spawn_reader<R>(
    inner: &Arc<Inner>,
    generation: u64,
    stream: LogStream,
    pipe: R,
    ready: Arc<Notify>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let inner = inner.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            inner.on_line(generation, stream, line, &ready);
        }
    })
}

fn spawn_probe_loop(inner: &Arc<Inner>, generation: u64) {
    let weak: Weak<Inner> = Arc::downgrade(inner);
    let grace = inner.config.timeouts.probe_grace();
    let interval = inner.config.timeouts.probe_interval();
    let task = tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        loop {
            let Some(inner) = weak.upgrade() else {
                break;
            };
            if inner.generation.load(Ordering::SeqCst) != generation {
                break;
            }
            inner.health_tick().await;
            drop(inner);
            tokio::time::sleep(interval).await;
        }
    });
    if let Some(previous) = lock(&inner.probe_task).replace(task) {
        previous.abort();
    }
}

async fn wait_exit(exited: &mut watch::Receiver<Option<ExitInfo>>, limit: Duration) -> bool {
    let wait = async { exited.wait_for(|e| e.is_some()).await.is_ok() };
    matches!(tokio::time::timeout(limit, wait).await, Ok(true))
}

#[derive(Clone, Copy)]
enum StopSignal {
    Term,
    Kill,
}

/// The engine runs in its own process group so helpers it forks die with it.
#[cfg(unix)]
fn signal_group(pid: u32, signal: StopSignal) {
    let sig = match signal {
        StopSignal::Term => libc::SIGTERM,
        StopSignal::Kill => libc::SIGKILL,
    };
    let rc = unsafe { libc::kill(-(pid as i32), sig) };
    if rc != 0 {
        unsafe {
            libc::kill(pid as i32, sig);
        }
    }
}

#[cfg(not(unix))]
fn signal_group(_pid: u32, _signal: StopSignal) {}
