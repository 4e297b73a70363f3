//! Generation orchestrator.
//!
//! Holds the provider registry, walks the fallback order once to select an
//! active provider, and runs generation calls under a deadline.
//!
//! Initialization is the only exclusive section: concurrent callers join the
//! attempt already in flight instead of probing again. A generation deadline
//! is advisory. The provider call runs on its own task and keeps running
//! after the caller has been told it timed out.

use crate::provider::{GenerateOptions, GenerationProvider, ProviderState};
use crate::types::{ProviderId, ProviderTimeouts};
use futures::future::{BoxFuture, FutureExt, Shared};
use recall_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

type InitAttempt = Shared<BoxFuture<'static, Option<ProviderId>>>;

/// Text produced by a provider.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationOutput {
    pub text: String,
    pub provider: ProviderId,
    pub elapsed: Duration,
}

/// State of one registered provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub id: ProviderId,
    pub state: ProviderState,
}

/// Snapshot of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorStatus {
    /// An active provider is selected
    pub available: bool,
    pub provider: Option<ProviderId>,
    /// An initialization attempt is in flight
    pub loading: bool,
    pub fallback_order: Vec<ProviderId>,
    pub providers: Vec<ProviderStatus>,
}

/// Drop the `None` sentinel, unregistered ids and repeats, keeping order.
pub fn normalize_fallback_order(
    requested: &[ProviderId],
    is_registered: impl Fn(ProviderId) -> bool,
) -> Vec<ProviderId> {
    let mut order = Vec::with_capacity(requested.len());
    for &id in requested {
        if id == ProviderId::None || !is_registered(id) || order.contains(&id) {
            continue;
        }
        order.push(id);
    }
    order
}

/// Multi-provider generation with one-shot selection and per-call deadlines.
///
/// Cloning is cheap and clones share state.
#[derive(Clone)]
pub struct GenerationOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    registry: HashMap<ProviderId, Arc<GenerationProvider>>,
    /// Registration order, for status reports
    registered: Vec<ProviderId>,
    fallback_order: RwLock<Vec<ProviderId>>,
    states: Mutex<HashMap<ProviderId, ProviderState>>,
    active: RwLock<Option<ProviderId>>,
    /// Set once a walk found nothing; cleared when the order changes
    exhausted: RwLock<bool>,
    in_flight: Mutex<Option<(u64, InitAttempt)>>,
    attempts: AtomicU64,
    /// Bumped whenever the selection is invalidated
    epoch: AtomicU64,
    timeouts: ProviderTimeouts,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl GenerationOrchestrator {
    /// Build an orchestrator over `providers`, tried in `fallback_order`.
    pub fn new(
        providers: Vec<GenerationProvider>,
        fallback_order: &[ProviderId],
        timeouts: ProviderTimeouts,
    ) -> Self {
        let mut registry = HashMap::new();
        let mut registered = Vec::new();
        for provider in providers {
            let id = provider.id();
            if !registered.contains(&id) {
                registered.push(id);
            }
            registry.insert(id, Arc::new(provider));
        }

        let order = normalize_fallback_order(fallback_order, |id| registry.contains_key(&id));
        let states = registered
            .iter()
            .map(|&id| (id, ProviderState::Uninitialized))
            .collect();

        tracing::debug!(
            "Generation fallback order: [{}]",
            order.iter().map(ProviderId::as_str).collect::<Vec<_>>().join(", ")
        );

        Self {
            inner: Arc::new(Inner {
                registry,
                registered,
                fallback_order: RwLock::new(order),
                states: Mutex::new(states),
                active: RwLock::new(None),
                exhausted: RwLock::new(false),
                in_flight: Mutex::new(None),
                attempts: AtomicU64::new(0),
                epoch: AtomicU64::new(0),
                timeouts,
            }),
        }
    }

    /// Currently selected provider, if any.
    pub fn active_provider(&self) -> Option<ProviderId> {
        *read(&self.inner.active)
    }

    /// State of a registered provider.
    pub fn provider_state(&self, id: ProviderId) -> Option<ProviderState> {
        lock(&self.inner.states).get(&id).copied()
    }

    /// Select an active provider, or join the selection already in flight.
    ///
    /// Returns `None` when no provider in the fallback order could be
    /// initialized. That outcome is remembered until the order is changed or
    /// [`cleanup`](Self::cleanup) is called.
    pub async fn initialize(&self) -> Option<ProviderId> {
        if let Some(id) = self.active_provider() {
            return Some(id);
        }
        if *read(&self.inner.exhausted) {
            return None;
        }

        let (attempt_id, attempt) = self.inner.join_or_start();
        let selected = attempt.await;

        let mut slot = lock(&self.inner.in_flight);
        if matches!(slot.as_ref(), Some((id, _)) if *id == attempt_id) {
            *slot = None;
        }

        selected
    }

    /// Generate text with the active provider, initializing lazily.
    ///
    /// Never retries another provider. Errors are generation failures
    /// ([`AppError::is_generation_failure`]) the caller may recover from.
    pub async fn generate(&self, prompt: &str, options: GenerateOptions) -> AppResult<GenerationOutput> {
        let id = match self.active_provider() {
            Some(id) => id,
            None => self.initialize().await.ok_or_else(|| {
                AppError::GenerationUnavailable("No generation provider available".to_string())
            })?,
        };

        let provider = self.inner.registry.get(&id).cloned().ok_or_else(|| {
            AppError::GenerationUnavailable(format!("provider {} is not registered", id))
        })?;

        let timeout = options
            .timeout
            .unwrap_or_else(|| self.inner.timeouts.for_provider(id));
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

        tracing::debug!("Generating with {} (timeout {}ms)", id, timeout_ms);

        let started = Instant::now();
        let prompt = prompt.to_string();
        let call = tokio::spawn(async move { provider.generate(&prompt, &options).await });

        match tokio::time::timeout(timeout, call).await {
            Err(_) => {
                tracing::warn!(
                    "Generation with {} timed out after {}ms; the provider call continues in the background",
                    id,
                    timeout_ms
                );
                Err(AppError::GenerationTimeout {
                    provider: id.to_string(),
                    timeout_ms,
                })
            }
            Ok(Err(join_error)) => {
                self.inner.set_state(id, ProviderState::Failed);
                tracing::warn!("Generation task for {} aborted: {}", id, join_error);
                Err(AppError::Llm(format!(
                    "Generation task for {} aborted: {}",
                    id, join_error
                )))
            }
            Ok(Ok(Err(e))) => {
                self.inner.set_state(id, ProviderState::Failed);
                tracing::warn!("Generation with {} failed: {}", id, e);
                Err(e)
            }
            Ok(Ok(Ok(text))) => {
                self.inner.set_state(id, ProviderState::Ready);
                let elapsed = started.elapsed();
                tracing::debug!("Generated {} chars with {} in {:?}", text.len(), id, elapsed);
                Ok(GenerationOutput {
                    text,
                    provider: id,
                    elapsed,
                })
            }
        }
    }

    /// Replace the fallback order and forget the current selection.
    pub fn set_fallback_order(&self, order: &[ProviderId]) {
        let normalized =
            normalize_fallback_order(order, |id| self.inner.registry.contains_key(&id));
        tracing::info!(
            "Generation fallback order set to [{}]",
            normalized.iter().map(ProviderId::as_str).collect::<Vec<_>>().join(", ")
        );
        *write(&self.inner.fallback_order) = normalized;
        self.inner.reset_selection();
    }

    /// Release every provider and return to the uninitialized state.
    pub async fn cleanup(&self) {
        self.inner.reset_selection();
        for id in &self.inner.registered {
            if let Some(provider) = self.inner.registry.get(id) {
                provider.cleanup().await;
            }
            self.inner.set_state(*id, ProviderState::Uninitialized);
        }
        tracing::debug!("Generation providers cleaned up");
    }

    pub fn status(&self) -> OrchestratorStatus {
        let provider = self.active_provider();
        let states = lock(&self.inner.states);
        OrchestratorStatus {
            available: provider.is_some(),
            provider,
            loading: lock(&self.inner.in_flight).is_some(),
            fallback_order: read(&self.inner.fallback_order).clone(),
            providers: self
                .inner
                .registered
                .iter()
                .map(|&id| ProviderStatus {
                    id,
                    state: states.get(&id).copied().unwrap_or(ProviderState::Uninitialized),
                })
                .collect(),
        }
    }
}

impl Inner {
    fn join_or_start(self: &Arc<Self>) -> (u64, InitAttempt) {
        let mut slot = lock(&self.in_flight);
        if let Some((id, attempt)) = slot.as_ref() {
            tracing::debug!("Joining generation provider selection already in flight");
            return (*id, attempt.clone());
        }

        let attempt_id = self.attempts.fetch_add(1, Ordering::SeqCst);
        let epoch = self.epoch.load(Ordering::SeqCst);
        let inner = Arc::clone(self);
        let attempt = async move { inner.select_provider(epoch).await }
            .boxed()
            .shared();

        *slot = Some((attempt_id, attempt.clone()));
        (attempt_id, attempt)
    }

    async fn select_provider(&self, epoch: u64) -> Option<ProviderId> {
        let order = read(&self.fallback_order).clone();

        for id in order {
            let Some(provider) = self.registry.get(&id).cloned() else {
                continue;
            };

            self.set_state(id, ProviderState::Probing);
            tracing::debug!("Probing generation provider {}", id);

            if !provider.is_available().await {
                self.set_state(id, ProviderState::Unavailable);
                tracing::info!("Generation provider {} unavailable, trying next", id);
                continue;
            }

            if let Err(e) = provider.initialize().await {
                self.set_state(id, ProviderState::Unavailable);
                tracing::warn!("Generation provider {} failed to initialize: {}", id, e);
                continue;
            }

            if self.epoch.load(Ordering::SeqCst) != epoch {
                tracing::debug!("Discarding provider selection made under a stale fallback order");
                self.set_state(id, ProviderState::Uninitialized);
                return None;
            }

            self.set_state(id, ProviderState::Ready);
            *write(&self.active) = Some(id);
            tracing::info!("Generation provider {} active", id);
            return Some(id);
        }

        if self.epoch.load(Ordering::SeqCst) == epoch {
            *write(&self.exhausted) = true;
            tracing::warn!("No generation provider available; answers will be retrieval-only");
        }
        None
    }

    fn set_state(&self, id: ProviderId, state: ProviderState) {
        lock(&self.states).insert(id, state);
    }

    fn reset_selection(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *write(&self.active) = None;
        *write(&self.exhausted) = false;
        *lock(&self.in_flight) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
    use crate::providers::{
        Availability, LocalModelProvider, OnDeviceProvider, OnDeviceRuntime, OnDeviceSession,
        SessionOptions,
    };
    use crate::types::{LocalModelOptions, OnDeviceOptions};
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingClient {
        unreachable: bool,
        fail: bool,
        reachability_delay: Duration,
        reply_delay: Duration,
        availability_checks: AtomicUsize,
        calls: AtomicUsize,
        completed: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl LlmClient for CountingClient {
        fn provider_name(&self) -> &str {
            "counting"
        }

        async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.reply_delay).await;
            self.completed.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Llm("model crashed".to_string()));
            }
            Ok(LlmResponse {
                content: "Generated answer".to_string(),
                model: request.model.clone(),
                usage: LlmUsage::default(),
                done: true,
            })
        }

        async fn is_reachable(&self) -> bool {
            self.availability_checks.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.reachability_delay).await;
            !self.unreachable
        }
    }

    struct AbsentRuntime {
        availability_checks: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl OnDeviceRuntime for AbsentRuntime {
        async fn availability(&self) -> AppResult<Availability> {
            self.availability_checks.fetch_add(1, Ordering::SeqCst);
            Ok(Availability::No)
        }

        async fn create_session(&self, _options: &SessionOptions) -> AppResult<Box<dyn OnDeviceSession>> {
            Err(AppError::Llm("unsupported".to_string()))
        }
    }

    fn local(client: Arc<CountingClient>) -> GenerationProvider {
        let options = LocalModelOptions {
            require_model: false,
            ..LocalModelOptions::default()
        };
        GenerationProvider::LocalModel(LocalModelProvider::new(client, options, 150, 0.7))
    }

    fn on_device(runtime: Arc<AbsentRuntime>) -> GenerationProvider {
        GenerationProvider::OnDevice(OnDeviceProvider::new(Some(runtime), OnDeviceOptions::default()))
    }

    fn default_order() -> Vec<ProviderId> {
        vec![ProviderId::OnDevice, ProviderId::LocalModel]
    }

    #[test]
    fn test_normalize_fallback_order() {
        let registered = [ProviderId::OnDevice, ProviderId::LocalModel];
        let order = normalize_fallback_order(
            &[
                ProviderId::LocalModel,
                ProviderId::None,
                ProviderId::LocalModel,
                ProviderId::OnDevice,
            ],
            |id| registered.contains(&id),
        );
        assert_eq!(order, vec![ProviderId::LocalModel, ProviderId::OnDevice]);

        let only_local = normalize_fallback_order(&default_order(), |id| id == ProviderId::LocalModel);
        assert_eq!(only_local, vec![ProviderId::LocalModel]);
    }

    #[tokio::test]
    async fn test_falls_back_to_next_provider() {
        let runtime = Arc::new(AbsentRuntime {
            availability_checks: AtomicUsize::new(0),
        });
        let client = Arc::new(CountingClient::default());
        let orchestrator = GenerationOrchestrator::new(
            vec![on_device(runtime.clone()), local(client.clone()), GenerationProvider::None],
            &default_order(),
            ProviderTimeouts::default(),
        );

        assert_eq!(orchestrator.initialize().await, Some(ProviderId::LocalModel));
        assert_eq!(orchestrator.provider_state(ProviderId::OnDevice), Some(ProviderState::Unavailable));
        assert_eq!(orchestrator.provider_state(ProviderId::LocalModel), Some(ProviderState::Ready));
        assert_eq!(orchestrator.provider_state(ProviderId::None), Some(ProviderState::Uninitialized));

        // One-shot selection: no re-probing once active.
        orchestrator.initialize().await;
        assert_eq!(runtime.availability_checks.load(Ordering::SeqCst), 1);
        assert_eq!(client.availability_checks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_initialization_shares_one_attempt() {
        let client = Arc::new(CountingClient {
            reachability_delay: Duration::from_millis(50),
            ..CountingClient::default()
        });
        let orchestrator = GenerationOrchestrator::new(
            vec![local(client.clone())],
            &default_order(),
            ProviderTimeouts::default(),
        );

        let a = orchestrator.clone();
        let b = orchestrator.clone();
        let (first, second, third) =
            tokio::join!(a.initialize(), b.initialize(), orchestrator.initialize());

        assert_eq!(first, Some(ProviderId::LocalModel));
        assert_eq!(second, first);
        assert_eq!(third, first);
        assert_eq!(client.availability_checks.load(Ordering::SeqCst), 1);
        assert!(!orchestrator.status().loading);
    }

    #[tokio::test]
    async fn test_generate_initializes_lazily() {
        let client = Arc::new(CountingClient::default());
        let orchestrator = GenerationOrchestrator::new(
            vec![local(client.clone())],
            &default_order(),
            ProviderTimeouts::default(),
        );

        let output = orchestrator
            .generate("What is Rust?", GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(output.text, "Generated answer");
        assert_eq!(output.provider, ProviderId::LocalModel);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_provider_is_unavailable_and_remembered() {
        let client = Arc::new(CountingClient {
            unreachable: true,
            ..CountingClient::default()
        });
        let orchestrator = GenerationOrchestrator::new(
            vec![local(client.clone())],
            &default_order(),
            ProviderTimeouts::default(),
        );

        for _ in 0..3 {
            let result = orchestrator.generate("hi", GenerateOptions::default()).await;
            assert!(matches!(result, Err(AppError::GenerationUnavailable(_))));
        }
        assert_eq!(client.availability_checks.load(Ordering::SeqCst), 1);
        assert!(!orchestrator.status().available);
    }

    #[tokio::test]
    async fn test_timeout_is_advisory() {
        let client = Arc::new(CountingClient {
            reply_delay: Duration::from_millis(150),
            ..CountingClient::default()
        });
        let orchestrator = GenerationOrchestrator::new(
            vec![local(client.clone())],
            &default_order(),
            ProviderTimeouts::default(),
        );

        let options = GenerateOptions::default().with_timeout(Duration::from_millis(20));
        let result = orchestrator.generate("slow question", options).await;
        match result {
            Err(AppError::GenerationTimeout { provider, timeout_ms }) => {
                assert_eq!(provider, "local-model");
                assert_eq!(timeout_ms, 20);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(client.completed.load(Ordering::SeqCst), 0);

        // The provider call was not cancelled.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(client.completed.load(Ordering::SeqCst), 1);
        assert_eq!(orchestrator.provider_state(ProviderId::LocalModel), Some(ProviderState::Ready));
    }

    #[tokio::test]
    async fn test_failure_marks_failed_without_switching() {
        let failing = Arc::new(CountingClient {
            fail: true,
            ..CountingClient::default()
        });
        let orchestrator = GenerationOrchestrator::new(
            vec![local(failing.clone())],
            &[ProviderId::LocalModel],
            ProviderTimeouts::default(),
        );

        let result = orchestrator.generate("hi", GenerateOptions::default()).await;
        assert!(matches!(result, Err(AppError::Llm(_))));
        assert_eq!(orchestrator.provider_state(ProviderId::LocalModel), Some(ProviderState::Failed));
        assert_eq!(orchestrator.active_provider(), Some(ProviderId::LocalModel));
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_set_fallback_order_resets_selection() {
        let runtime = Arc::new(AbsentRuntime {
            availability_checks: AtomicUsize::new(0),
        });
        let client = Arc::new(CountingClient::default());
        let orchestrator = GenerationOrchestrator::new(
            vec![on_device(runtime), local(client.clone())],
            &default_order(),
            ProviderTimeouts::default(),
        );
        orchestrator.initialize().await;
        assert_eq!(orchestrator.active_provider(), Some(ProviderId::LocalModel));

        orchestrator.set_fallback_order(&[ProviderId::None, ProviderId::OnDevice]);
        assert_eq!(orchestrator.active_provider(), None);
        assert_eq!(orchestrator.status().fallback_order, vec![ProviderId::OnDevice]);
        assert_eq!(orchestrator.initialize().await, None);
    }

    #[tokio::test]
    async fn test_cleanup_returns_to_uninitialized() {
        let client = Arc::new(CountingClient::default());
        let orchestrator = GenerationOrchestrator::new(
            vec![local(client.clone())],
            &default_order(),
            ProviderTimeouts::default(),
        );
        orchestrator.initialize().await;
        orchestrator.cleanup().await;

        let status = orchestrator.status();
        assert!(!status.available);
        assert_eq!(
            status.providers,
            vec![ProviderStatus {
                id: ProviderId::LocalModel,
                state: ProviderState::Uninitialized
            }]
        );

        assert_eq!(orchestrator.initialize().await, Some(ProviderId::LocalModel));
        assert_eq!(client.availability_checks.load(Ordering::SeqCst), 2);
    }
}
