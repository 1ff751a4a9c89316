//! Session supervisor - owns the running generators.
//!
//! # Lifecycle
//!
//! ```text
//!  start(ids) ──► teardown(previous, Superseded) ──► launch ──► watcher
//!                                                      │           │
//!                           root token ◄───────────────┘           │
//!                            ├─ child token ─► Generator(a)        │
//!                            ├─ child token ─► Generator(b)        │
//!                            └─ ...                                 │
//!  stop() ───────────► teardown(current, Manual)                   │
//!  deadline ◄──────────────────────────────────────────────────────┘
//!            └──────► teardown(this session only, Deadline)
//! ```
//!
//! At most one session exists. Its entity table lives in
//! [`SupervisorState`] behind a single `std::sync::Mutex`, which is held
//! only while the table is read or swapped, never across a flush or an
//! await. Control operations (start, stop, deadline teardown) are
//! serialized by an async gate so that an old session's generators have
//! finished (final flush included) before a new session is installed.
//!
//! Removing the session from the table under the lock is the one-shot
//! latch: whichever of stop, supersede or deadline takes it first cancels
//! the root token and joins the generators; everyone else finds nothing
//! to do.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use driftlog_env::DriftContext;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;
use crate::error::{DriftError, Result};
use crate::generator::Generator;
use crate::storage::SampleStore;

// ============================================================================
// REPORTS
// ============================================================================

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit stop request
    Manual,
    /// A newer start replaced it
    Superseded,
    /// `session_duration` elapsed
    Deadline,
    /// Process is exiting
    Shutdown,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Manual => "manual",
            Self::Superseded => "superseded",
            Self::Deadline => "deadline",
            Self::Shutdown => "shutdown",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartReport {
    pub session_id: u64,
    /// Entities that got a generator, in request order
    pub entities: Vec<String>,
    /// Ids dropped as empty or duplicate
    pub skipped: usize,
    pub duration: Duration,
}

/// Outcome of a teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopReport {
    pub session_id: u64,
    pub reason: StopReason,
    pub entities: Vec<String>,
}

// ============================================================================
// STATE
// ============================================================================

/// Per-entity cancellation capability, owned by the entity table.
struct GenerationHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Session {
    id: u64,
    root: CancellationToken,
    handles: HashMap<String, GenerationHandle>,
}

/// The entity table plus the current session reference.
#[derive(Default)]
pub struct SupervisorState {
    session: Option<Session>,
    next_session_id: u64,
}

/// Filters a start request: drops empty ids and repeats, keeps order.
fn partition_ids<I, S>(entity_ids: I) -> (Vec<String>, usize)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut seen = HashSet::new();
    let mut entities = Vec::new();
    let mut skipped = 0;

    for id in entity_ids {
        let id = id.into();
        if id.is_empty() {
            warn!("Skipping empty entity id in start request");
            skipped += 1;
        } else if !seen.insert(id.clone()) {
            warn!(entity = %id, "Skipping duplicate entity id in start request");
            skipped += 1;
        } else {
            entities.push(id);
        }
    }
    (entities, skipped)
}

// ============================================================================
// SUPERVISOR
// ============================================================================

struct Inner<Ctx: DriftContext> {
    context: Arc<Ctx>,
    store: Arc<dyn SampleStore>,
    config: SimulationConfig,
    state: Mutex<SupervisorState>,
    gate: tokio::sync::Mutex<()>,
}

/// Starts, tracks and tears down one generator per entity.
///
/// Cheap to clone; clones share the same state.
pub struct SessionSupervisor<Ctx: DriftContext> {
    inner: Arc<Inner<Ctx>>,
}

impl<Ctx: DriftContext> Clone for SessionSupervisor<Ctx> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<Ctx: DriftContext> SessionSupervisor<Ctx> {
    /// Creates a supervisor with no active session.
    pub fn new(context: Arc<Ctx>, store: Arc<dyn SampleStore>, config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                context,
                store,
                config,
                state: Mutex::new(SupervisorState::default()),
                gate: tokio::sync::Mutex::new(()),
            }),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.inner.config
    }

    /// Replaces any running session with a new one covering `entity_ids`.
    ///
    /// Empty ids and repeats are skipped. If nothing is left the request
    /// fails with [`DriftError::EmptyInput`] and the running session, if
    /// any, is left alone: ids are checked before teardown, not after.
    ///
    /// Returns once the previous session is fully torn down and the new
    /// generators are scheduled; generator failures never surface here.
    pub async fn start<I, S>(&self, entity_ids: I) -> Result<StartReport>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (entities, skipped) = partition_ids(entity_ids);
        if entities.is_empty() {
            return Err(DriftError::EmptyInput);
        }

        let _gate = self.inner.gate.lock().await;
        self.inner.teardown(None, StopReason::Superseded).await;

        let duration = self.inner.config.session_duration;
        let (session_id, root) = self.inner.launch(&entities);
        info!(
            session = session_id,
            entities = entities.len(),
            skipped,
            ?duration,
            "Session started"
        );

        let watcher = self.clone();
        self.inner.context.spawn("session-deadline", async move {
            watcher.watch_deadline(session_id, root, duration).await;
        });

        Ok(StartReport {
            session_id,
            entities,
            skipped,
            duration,
        })
    }

    /// Stops the current session. A no-op returning `None` when idle.
    pub async fn stop(&self) -> Option<StopReport> {
        self.stop_with(StopReason::Manual).await
    }

    /// Stops the current session on process exit.
    pub async fn shutdown(&self) -> Option<StopReport> {
        self.stop_with(StopReason::Shutdown).await
    }

    async fn stop_with(&self, reason: StopReason) -> Option<StopReport> {
        let _gate = self.inner.gate.lock().await;
        let report = self.inner.teardown(None, reason).await;
        if report.is_none() {
            debug!("Stop requested, but no simulations are currently active");
        }
        report
    }

    async fn watch_deadline(&self, session_id: u64, root: CancellationToken, duration: Duration) {
        tokio::select! {
            _ = root.cancelled() => {
                debug!(session = session_id, "Deadline watcher released by earlier teardown");
            }
            _ = self.inner.context.sleep(duration) => {
                let _gate = self.inner.gate.lock().await;
                if self.inner.teardown(Some(session_id), StopReason::Deadline).await.is_some() {
                    info!(session = session_id, ?duration, "Simulation duration reached, stopped automatically");
                }
            }
        }
    }

    /// Entities with a registered generator, sorted.
    pub fn active_entities(&self) -> Vec<String> {
        let state = self.inner.lock_state();
        let mut entities: Vec<String> = state
            .session
            .as_ref()
            .map(|s| s.handles.keys().cloned().collect())
            .unwrap_or_default();
        entities.sort();
        entities
    }

    pub fn is_active(&self) -> bool {
        self.inner.lock_state().session.is_some()
    }

    pub fn session_id(&self) -> Option<u64> {
        self.inner.lock_state().session.as_ref().map(|s| s.id)
    }

    /// Generators that are registered, not cancelled and not finished.
    pub fn live_generators(&self) -> usize {
        self.inner
            .lock_state()
            .session
            .as_ref()
            .map(|s| {
                s.handles
                    .values()
                    .filter(|h| !h.cancel.is_cancelled() && !h.task.is_finished())
                    .count()
            })
            .unwrap_or(0)
    }
}

impl<Ctx: DriftContext> Inner<Ctx> {
    fn lock_state(&self) -> MutexGuard<'_, SupervisorState> {
        // Every mutation leaves the table consistent, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Installs a new session and spawns its generators.
    ///
    /// Caller holds the gate and has already torn down any previous session.
    fn launch(&self, entities: &[String]) -> (u64, CancellationToken) {
        let mut state = self.lock_state();
        state.next_session_id += 1;
        let session_id = state.next_session_id;
        let root = CancellationToken::new();

        let mut handles = HashMap::with_capacity(entities.len());
        for (slot, entity_id) in entities.iter().enumerate() {
            let cancel = root.child_token();
            let rng = self.context.derive_rng((session_id << 32) | slot as u64);
            let generator = Generator::new(
                entity_id.clone(),
                Arc::clone(&self.context),
                Arc::clone(&self.store),
                self.config.clone(),
                rng,
            );

            let run_token = cancel.clone();
            let task = self.context.spawn(&format!("generator-{entity_id}"), async move {
                generator.run(run_token).await;
            });
            handles.insert(entity_id.clone(), GenerationHandle { cancel, task });
        }

        state.session = Some(Session {
            id: session_id,
            root: root.clone(),
            handles,
        });
        (session_id, root)
    }

    /// Removes the session from the table, cancels it and waits for every
    /// generator to finish its final flush.
    ///
    /// With `expected` set, only that session is torn down.
    async fn teardown(&self, expected: Option<u64>, reason: StopReason) -> Option<StopReport> {
        let session = {
            let mut state = self.lock_state();
            let matches = match (&state.session, expected) {
                (Some(current), Some(id)) => current.id == id,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if !matches {
                return None;
            }
            let session = state.session.take()?;
            session.root.cancel();
            session
        };

        info!(
            session = session.id,
            %reason,
            entities = session.handles.len(),
            "Stopping active simulations"
        );

        let mut entities = Vec::with_capacity(session.handles.len());
        for (entity_id, handle) in session.handles {
            if let Err(e) = handle.task.await {
                warn!(entity = %entity_id, error = %e, "Generator task ended abnormally");
            }
            entities.push(entity_id);
        }
        entities.sort();

        info!(session = session.id, %reason, "All simulations stopped");
        Some(StopReport {
            session_id: session.id,
            reason,
            entities,
        })
    }
}
