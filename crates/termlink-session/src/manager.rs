//! Session manager: registry-backed discovery, project-hint resolution,
//! structured-API fallback and transient-error retry.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use termlink_core::{
    Config, ControllerSettings, Error, ExtractorPatterns, Result, RetrySettings,
    SessionDescriptor, SessionRegistry, TransportKind,
};

use crate::controller::{ExecuteEvent, ExecuteStream, ExecutionResult, SessionController};
use crate::local::PaneTransport;
use crate::remote::BridgeTransport;
use crate::transport::Transport;

/// Structured-API agent used when no terminal session matches a request.
///
/// Implementations own their per-directory conversation state; the manager
/// only hands them the directory hint and the prompt.
#[async_trait]
pub trait FallbackAgent: Send + Sync {
    /// Run one prompt against the given working directory.
    async fn execute(&self, work_dir: &str, prompt: &str) -> Result<ExecutionResult>;

    /// Cancel the in-flight request for the given directory, if any.
    async fn interrupt(&self, _work_dir: &str) -> bool {
        false
    }
}

/// Owns every live [`SessionController`] and routes requests to them.
///
/// The controller map preserves registration order, which backs the
/// first-match semantics of [`resolve`](SessionManager::resolve). A single
/// lock guards the map; controllers themselves are shared out as `Arc`s so
/// executions never hold it.
pub struct SessionManager {
    registry: SessionRegistry,
    settings: ControllerSettings,
    patterns: ExtractorPatterns,
    retry: RetrySettings,
    controllers: Mutex<IndexMap<String, Arc<SessionController>>>,
    fallback: Option<Arc<dyn FallbackAgent>>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("registry", &self.registry.dir())
            .field("sessions", &self.known_projects())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager from configuration.
    pub fn new(config: &Config) -> Self {
        Self {
            registry: SessionRegistry::new(config.registry.dir.clone()),
            settings: config.controller.clone(),
            patterns: config.extractor.clone(),
            retry: config.retry.clone(),
            controllers: Mutex::new(IndexMap::new()),
            fallback: None,
        }
    }

    /// Attach a structured-API fallback agent.
    pub fn with_fallback(mut self, agent: Arc<dyn FallbackAgent>) -> Self {
        self.fallback = Some(agent);
        self
    }

    /// The registry this manager reads.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    fn lock_controllers(
        &self,
    ) -> std::sync::MutexGuard<'_, IndexMap<String, Arc<SessionController>>> {
        self.controllers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reconcile the controller map against the registry.
    ///
    /// Every descriptor is liveness-checked; dead ones are purged from the
    /// registry so the next refresh is cheaper. Returns the project names
    /// that appeared and disappeared.
    pub async fn refresh(&self) -> Result<(Vec<String>, Vec<String>)> {
        let descriptors = self.registry.load()?;
        let existing = self.lock_controllers().clone();

        let mut live: IndexMap<String, Arc<SessionController>> = IndexMap::new();
        let mut added = Vec::new();

        for desc in descriptors {
            if let Some(controller) = existing.get(&desc.project) {
                if controller.transport().is_alive().await {
                    live.insert(desc.project.clone(), Arc::clone(controller));
                    continue;
                }
                controller.transport().disconnect().await;
            }
            match self.open_transport(&desc).await {
                Ok(transport) => {
                    let controller = Arc::new(SessionController::new(
                        desc.project.clone(),
                        desc.work_dir.clone(),
                        transport,
                        self.settings.clone(),
                        self.patterns.clone(),
                    ));
                    if !existing.contains_key(&desc.project) {
                        info!("Discovered session '{}' at {}", desc.project, desc.endpoint());
                        added.push(desc.project.clone());
                    }
                    live.insert(desc.project.clone(), controller);
                }
                Err(e) => {
                    warn!("Session '{}' is unreachable ({}), purging", desc.project, e);
                    let _ = self.registry.remove(&desc.project);
                }
            }
        }

        let removed: Vec<String> = existing
            .keys()
            .filter(|name| !live.contains_key(*name))
            .cloned()
            .collect();
        for name in &removed {
            info!("Session '{}' is gone", name);
        }

        *self.lock_controllers() = live;
        Ok((added, removed))
    }

    async fn open_transport(&self, desc: &SessionDescriptor) -> Result<Transport> {
        match desc.kind {
            TransportKind::Local => {
                let pane = desc.pane.as_deref().ok_or_else(|| {
                    Error::Registry(format!("'{}': local descriptor without pane", desc.project))
                })?;
                let pane = PaneTransport::new(pane, &self.settings);
                if !pane.is_alive().await {
                    return Err(Error::DeadSession(desc.project.clone()));
                }
                Ok(Transport::Local(pane))
            }
            TransportKind::Remote => {
                let host = desc.host.as_deref().ok_or_else(|| {
                    Error::Registry(format!("'{}': remote descriptor without host", desc.project))
                })?;
                let port = desc.port.ok_or_else(|| {
                    Error::Registry(format!("'{}': remote descriptor without port", desc.project))
                })?;
                // The connect handshake doubles as the liveness check
                let bridge = BridgeTransport::connect(host, port).await?;
                Ok(Transport::Remote(bridge))
            }
            TransportKind::Structured => Err(Error::Registry(format!(
                "'{}': structured sessions are not registry-backed",
                desc.project
            ))),
        }
    }

    /// Resolve a project hint to a controller.
    ///
    /// Tried in order, first match wins, ties broken by registration order:
    /// exact project name, exact working directory, hint as a
    /// case-insensitive substring of a name, then a name as a substring of
    /// the hint.
    pub fn resolve(&self, hint: &str) -> Option<Arc<SessionController>> {
        let controllers = self.lock_controllers();

        if let Some(controller) = controllers.get(hint) {
            return Some(Arc::clone(controller));
        }
        if let Some(controller) = controllers.values().find(|c| c.work_dir() == Some(hint)) {
            return Some(Arc::clone(controller));
        }
        let lowered = hint.to_lowercase();
        if let Some(controller) = controllers
            .values()
            .find(|c| c.project().to_lowercase().contains(&lowered))
        {
            return Some(Arc::clone(controller));
        }
        controllers
            .values()
            .find(|c| lowered.contains(&c.project().to_lowercase()))
            .map(Arc::clone)
    }

    /// Project names currently known, in registration order.
    pub fn known_projects(&self) -> Vec<String> {
        self.lock_controllers().keys().cloned().collect()
    }

    /// Descriptors for the current sessions, for status displays.
    pub fn list_sessions(&self) -> Result<Vec<SessionDescriptor>> {
        let known = self.known_projects();
        Ok(self
            .registry
            .load()?
            .into_iter()
            .filter(|d| known.contains(&d.project))
            .collect())
    }

    /// Route a prompt to the session matching `hint`.
    ///
    /// Resolution failure triggers one registry refresh and a second attempt;
    /// if that also fails, the request goes to the fallback agent when one is
    /// attached, and otherwise fails with the known project names in the
    /// error.
    pub async fn execute(&self, hint: &str, prompt: &str) -> Result<ExecuteStream> {
        let controller = match self.resolve(hint) {
            Some(controller) => Some(controller),
            None => {
                debug!("No match for '{}', refreshing registry", hint);
                self.refresh().await?;
                self.resolve(hint)
            }
        };

        if let Some(controller) = controller {
            return controller.execute(prompt);
        }

        if let Some(fallback) = &self.fallback {
            info!("No terminal session for '{}', using structured fallback", hint);
            let (tx, rx) = mpsc::unbounded_channel();
            let fallback = Arc::clone(fallback);
            let work_dir = hint.to_string();
            let prompt = prompt.to_string();
            tokio::spawn(async move {
                let result = fallback.execute(&work_dir, &prompt).await;
                let _ = tx.send(ExecuteEvent::Final(result));
            });
            return Ok(ExecuteStream::new(rx));
        }

        Err(Error::NoSession {
            hint: hint.to_string(),
            known: self.known_projects(),
        })
    }

    /// Like [`execute`](Self::execute), but drain the stream to its final
    /// result.
    pub async fn execute_collect(&self, hint: &str, prompt: &str) -> Result<ExecutionResult> {
        self.execute(hint, prompt).await?.collect().await
    }

    /// Execute with retry on transient failures.
    ///
    /// Backs off exponentially (1s, 2s, ...) between attempts. Errors whose
    /// message carries no transient marker fail immediately.
    pub async fn execute_with_retry(&self, hint: &str, prompt: &str) -> Result<ExecutionResult> {
        self.retry_transient(self.retry.max_attempts, || self.execute_collect(hint, prompt))
            .await
    }

    /// Retry `call` up to `max_attempts` times while its errors look
    /// transient per the configured marker list.
    pub async fn retry_transient<F, Fut>(&self, max_attempts: u32, mut call: F) -> Result<ExecutionResult>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<ExecutionResult>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match call().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    if attempt >= max_attempts || !self.retry.is_transient(&e.to_string()) {
                        return Err(e);
                    }
                    let wait = Duration::from_secs(2u64.pow(attempt - 1));
                    warn!(
                        "Attempt {}/{} failed ({}), retrying in {:?}",
                        attempt, max_attempts, e, wait
                    );
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Interrupt the session matching `hint`. Returns false when nothing
    /// matched or nothing was running.
    pub async fn interrupt(&self, hint: &str) -> bool {
        match self.resolve(hint) {
            Some(controller) => controller.interrupt().await,
            None => match &self.fallback {
                Some(fallback) => fallback.interrupt(hint).await,
                None => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn manager_with_registry(dir: &std::path::Path) -> SessionManager {
        let mut config = Config::default();
        config.registry.dir = dir.to_path_buf();
        SessionManager::new(&config)
    }

    fn insert_stub(manager: &SessionManager, project: &str, work_dir: Option<&str>) {
        let settings = ControllerSettings::default();
        let controller = Arc::new(SessionController::new(
            project,
            work_dir.map(str::to_string),
            Transport::Local(PaneTransport::new("%0", &settings)),
            settings,
            ExtractorPatterns::default(),
        ));
        manager
            .lock_controllers()
            .insert(project.to_string(), controller);
    }

    #[tokio::test]
    async fn test_resolve_precedence() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager_with_registry(tmp.path());
        insert_stub(&manager, "web-app", Some("/home/dev/web-app"));
        insert_stub(&manager, "api-server", Some("/home/dev/api"));

        // Exact name
        assert_eq!(manager.resolve("api-server").unwrap().project(), "api-server");
        // Exact working directory
        assert_eq!(manager.resolve("/home/dev/api").unwrap().project(), "api-server");
        // Hint as substring of a name, case-insensitive
        assert_eq!(manager.resolve("web").unwrap().project(), "web-app");
        assert_eq!(manager.resolve("WEB").unwrap().project(), "web-app");
        // Name as substring of the hint
        assert_eq!(
            manager.resolve("the web-app project please").unwrap().project(),
            "web-app"
        );
        assert!(manager.resolve("nothing-matches-this").is_none());
    }

    #[tokio::test]
    async fn test_resolve_ties_break_by_registration_order() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager_with_registry(tmp.path());
        insert_stub(&manager, "app-one", None);
        insert_stub(&manager, "app-two", None);

        assert_eq!(manager.resolve("app").unwrap().project(), "app-one");
    }

    #[tokio::test]
    async fn test_execute_without_match_or_fallback() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager_with_registry(tmp.path());
        insert_stub(&manager, "web-app", None);

        let err = manager.execute("ghost", "hi").await.unwrap_err();
        match err {
            Error::NoSession { hint, known } => {
                assert_eq!(hint, "ghost");
                assert_eq!(known, vec!["web-app".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    struct CountingFallback {
        calls: AtomicU32,
    }

    #[async_trait]
    impl FallbackAgent for CountingFallback {
        async fn execute(&self, work_dir: &str, _prompt: &str) -> Result<ExecutionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(ExecutionResult {
                text: "from fallback".to_string(),
                tools_used: vec![],
                project: work_dir.to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_fallback_receives_unmatched_requests() {
        let tmp = tempfile::tempdir().unwrap();
        let fallback = Arc::new(CountingFallback {
            calls: AtomicU32::new(0),
        });
        let manager =
            manager_with_registry(tmp.path()).with_fallback(Arc::clone(&fallback) as Arc<dyn FallbackAgent>);

        let result = manager.execute_collect("/some/dir", "hi").await.unwrap();
        assert_eq!(result.text, "from fallback");
        assert_eq!(result.project, "/some/dir");
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_purges_unreachable_descriptors() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager_with_registry(tmp.path());
        manager
            .registry()
            .register(&SessionDescriptor::local("ghost", "%no-such-pane", None))
            .unwrap();

        let (added, removed) = manager.refresh().await.unwrap();
        assert!(added.is_empty());
        assert!(removed.is_empty());
        assert!(manager.known_projects().is_empty());
        // Dead descriptor was deleted from the registry
        assert!(manager.registry().load().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_transient_backs_off_then_gives_up() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager_with_registry(tmp.path());

        let start = tokio::time::Instant::now();
        let stamps = std::sync::Mutex::new(Vec::new());
        let err = manager
            .retry_transient(3, || {
                stamps.lock().unwrap().push(tokio::time::Instant::now() - start);
                async { Err(Error::Transport("connection reset".to_string())) }
            })
            .await
            .unwrap_err();

        // Attempt 1 immediately, then 1s and 2s of backoff
        assert_eq!(
            *stamps.lock().unwrap(),
            vec![
                Duration::from_secs(0),
                Duration::from_secs(1),
                Duration::from_secs(3),
            ]
        );
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_mid_way() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager_with_registry(tmp.path());

        let start = tokio::time::Instant::now();
        let attempts = AtomicU32::new(0);
        let result = manager
            .retry_transient(3, || {
                let n = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 1 {
                        Err(Error::Transport("request timeout".to_string()))
                    } else {
                        Ok(ExecutionResult {
                            text: "ok".to_string(),
                            tools_used: vec![],
                            project: "p".to_string(),
                        })
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result.text, "ok");
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        // One transient failure costs exactly the first 1s backoff
        assert_eq!(tokio::time::Instant::now() - start, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_non_transient_fails_immediately() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = manager_with_registry(tmp.path());

        let attempts = AtomicU32::new(0);
        let err = manager
            .retry_transient(3, || {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Other("invalid argument".to_string())) }
            })
            .await
            .unwrap_err();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(err, Error::Other(_)));
    }
}
