// Client-side draft mirror: authoritative refresh, optimistic pick
// submission, and the polling loop.
//
// The mirror is a cache with full-replace-on-refresh semantics. It never
// merges incrementally: a successful refresh discards whatever was held
// before, optimistic overlays included, so the client can never drift from
// the backend of record for longer than one refresh.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::constraints::{
    summarize, validate, PickRequest, RosterConstraint, RosterLimits, RuleViolation,
};
use super::pick::PickRecord;
use crate::backend::{BackendError, DraftBackend};
use crate::config::LeagueSelection;
use crate::protocol::{DraftSnapshotPayload, DriverPayload, PickOutcomePayload, TurnStatePayload};

/// Errors surfaced by the session client.
///
/// Clone so every caller of a coalesced refresh receives the same outcome.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SessionError {
    #[error("not your turn (team {current_team_id} is on the clock)")]
    NotYourTurn { current_team_id: String },

    #[error("pick rejected: {}", summarize(.0))]
    ConstraintViolation(Vec<RuleViolation>),

    #[error("draft is already complete")]
    DraftAlreadyComplete,

    #[error("local state is stale; refresh required")]
    StaleState,

    #[error("backend error: {message}")]
    Backend { message: String, retryable: bool },
}

impl SessionError {
    pub fn retryable(&self) -> bool {
        matches!(self, SessionError::Backend { retryable: true, .. })
    }
}

impl From<BackendError> for SessionError {
    fn from(e: BackendError) -> Self {
        SessionError::Backend {
            retryable: e.retryable(),
            message: e.to_string(),
        }
    }
}

/// Local mirror of the authoritative draft state.
#[derive(Debug, Clone, Default)]
pub struct DraftMirror {
    /// Last authoritative snapshot, possibly with an optimistic overlay.
    pub snapshot: Option<DraftSnapshotPayload>,
    /// The race's driver pool (drafted drivers included; availability is
    /// derived from the pick history).
    pub drivers: Vec<DriverPayload>,
    /// True while an optimistic turn advance is awaiting reconciliation.
    pub optimistic: bool,
}

type RefreshResult = Result<DraftSnapshotPayload, SessionError>;

struct Inner {
    mirror: DraftMirror,
    /// Receiver for the in-flight refresh, if one is outstanding. Callers
    /// that find this populated coalesce onto it instead of issuing a second
    /// request.
    pending: Option<watch::Receiver<Option<RefreshResult>>>,
}

enum RefreshRole {
    Leader(watch::Sender<Option<RefreshResult>>),
    Follower(watch::Receiver<Option<RefreshResult>>),
}

/// Bridges the backend of record and local view state for one draft session.
pub struct DraftSessionClient {
    backend: Arc<dyn DraftBackend>,
    league_id: String,
    race_id: String,
    team_id: String,
    limits: RosterLimits,
    inner: Mutex<Inner>,
}

impl DraftSessionClient {
    pub fn new(
        backend: Arc<dyn DraftBackend>,
        league: LeagueSelection,
        limits: RosterLimits,
    ) -> Self {
        DraftSessionClient {
            backend,
            league_id: league.league_id,
            race_id: league.race_id,
            team_id: league.team_id,
            limits,
            inner: Mutex::new(Inner {
                mirror: DraftMirror::default(),
                pending: None,
            }),
        }
    }

    pub fn team_id(&self) -> &str {
        &self.team_id
    }

    /// A clone of the current mirror.
    pub async fn mirror(&self) -> DraftMirror {
        self.inner.lock().await.mirror.clone()
    }

    /// Fetch the authoritative turn state + pick history and fully replace
    /// the local mirror.
    ///
    /// On failure the last-known-good mirror is preserved and a retryable
    /// error surfaced. Concurrent calls coalesce: whoever arrives while a
    /// refresh is outstanding awaits that refresh's result rather than
    /// issuing a second request.
    pub async fn refresh(&self) -> RefreshResult {
        let role = {
            let mut inner = self.inner.lock().await;
            match &inner.pending {
                Some(rx) => RefreshRole::Follower(rx.clone()),
                None => {
                    let (tx, rx) = watch::channel(None);
                    inner.pending = Some(rx);
                    RefreshRole::Leader(tx)
                }
            }
        };

        match role {
            RefreshRole::Follower(mut rx) => loop {
                if let Some(result) = rx.borrow_and_update().clone() {
                    return result;
                }
                if rx.changed().await.is_err() {
                    return Err(SessionError::Backend {
                        message: "refresh aborted before completing".into(),
                        retryable: true,
                    });
                }
            },
            RefreshRole::Leader(tx) => {
                let result = self.fetch_and_replace().await;
                self.inner.lock().await.pending = None;
                let _ = tx.send(Some(result.clone()));
                result
            }
        }
    }

    async fn fetch_and_replace(&self) -> RefreshResult {
        match self.backend.fetch_draft(&self.league_id, &self.race_id).await {
            Ok(snapshot) => {
                let mut inner = self.inner.lock().await;
                inner.mirror.snapshot = Some(snapshot.clone());
                inner.mirror.optimistic = false;
                debug!(
                    "mirror replaced: {} picks, complete={}",
                    snapshot.turn.total_picks_made, snapshot.turn.is_complete
                );
                Ok(snapshot)
            }
            Err(e) => {
                warn!("draft refresh failed, keeping last-known-good mirror: {e}");
                Err(SessionError::from(e))
            }
        }
    }

    /// Replace the mirrored driver pool.
    pub async fn refresh_drivers(&self) -> Result<usize, SessionError> {
        let drivers = self
            .backend
            .list_drivers(&self.league_id, &self.race_id)
            .await
            .map_err(SessionError::from)?;
        let count = drivers.len();
        self.inner.lock().await.mirror.drivers = drivers;
        Ok(count)
    }

    /// Submit a pick for this client's team.
    ///
    /// Pre-validates against the mirror for fast local feedback, eagerly
    /// advances the mirrored turn, then submits. Acceptance is reconciled by
    /// an immediate refresh; any rejection rolls the eager advance back and
    /// surfaces the specific violations.
    pub async fn submit_pick(&self, driver_id: &str) -> RefreshResult {
        let saved_turn = self.prevalidate_and_advance(driver_id).await?;

        match self
            .backend
            .submit_pick(&self.league_id, &self.race_id, driver_id)
            .await
        {
            Ok(PickOutcomePayload::Accepted { snapshot }) => {
                {
                    let mut inner = self.inner.lock().await;
                    inner.mirror.snapshot = Some(snapshot);
                    inner.mirror.optimistic = false;
                }
                info!("pick {driver_id} accepted; reconciling");
                self.refresh().await
            }
            Ok(PickOutcomePayload::NotYourTurn { current_team_id }) => {
                self.rollback(saved_turn).await;
                Err(SessionError::NotYourTurn { current_team_id })
            }
            Ok(PickOutcomePayload::DraftComplete) => {
                self.rollback(saved_turn).await;
                Err(SessionError::DraftAlreadyComplete)
            }
            Ok(PickOutcomePayload::Rejected { violations }) => {
                self.rollback(saved_turn).await;
                Err(SessionError::ConstraintViolation(violations))
            }
            Err(e) => {
                self.rollback(saved_turn).await;
                Err(SessionError::from(e))
            }
        }
    }

    /// Validate against the mirror, then apply the eager advance. Returns the
    /// pre-advance turn state for rollback.
    async fn prevalidate_and_advance(
        &self,
        driver_id: &str,
    ) -> Result<TurnStatePayload, SessionError> {
        let mut inner = self.inner.lock().await;

        let snapshot = match &inner.mirror.snapshot {
            Some(snapshot) => snapshot,
            None => return Err(SessionError::StaleState),
        };
        if snapshot.turn.is_complete {
            return Err(SessionError::DraftAlreadyComplete);
        }
        match snapshot.turn.current_team_id.as_deref() {
            Some(team) if team == self.team_id => {}
            Some(team) => {
                return Err(SessionError::NotYourTurn {
                    current_team_id: team.to_string(),
                })
            }
            None => return Err(SessionError::StaleState),
        }

        let driver = match inner.mirror.drivers.iter().find(|d| d.driver_id == driver_id) {
            Some(driver) => driver,
            None => {
                return Err(SessionError::ConstraintViolation(vec![
                    RuleViolation::DriverUnavailable {
                        driver_id: driver_id.to_string(),
                    },
                ]))
            }
        };

        let picks: Vec<PickRecord> = snapshot.picks.iter().map(PickRecord::from).collect();
        let constraint =
            RosterConstraint::derive(&self.team_id, &picks, &inner.mirror.drivers, &self.limits);
        let drafted: HashSet<String> =
            snapshot.picks.iter().map(|p| p.driver_id.clone()).collect();
        let request = PickRequest {
            team_id: self.team_id.clone(),
            driver_id: driver.driver_id.clone(),
            constructor_id: driver.constructor_id.clone(),
            price: driver.price,
        };
        validate(&request, &constraint, &drafted).map_err(SessionError::ConstraintViolation)?;

        let saved_turn = snapshot.turn.clone();
        if let Some(snapshot) = inner.mirror.snapshot.as_mut() {
            snapshot.turn.total_picks_made += 1;
            snapshot.turn.timer_deadline = None;
        }
        inner.mirror.optimistic = true;
        Ok(saved_turn)
    }

    async fn rollback(&self, saved_turn: TurnStatePayload) {
        let mut inner = self.inner.lock().await;
        if let Some(snapshot) = inner.mirror.snapshot.as_mut() {
            snapshot.turn = saved_turn;
        }
        inner.mirror.optimistic = false;
    }

    /// Start the fixed-interval polling loop.
    ///
    /// The task refreshes until the draft completes or the handle is stopped
    /// or dropped; nothing polls after teardown.
    pub fn spawn_polling(self: &Arc<Self>, interval: Duration) -> PollHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let client = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match client.refresh().await {
                            Ok(snapshot) if snapshot.turn.is_complete => {
                                info!("draft complete; stopping poll loop");
                                break;
                            }
                            Ok(_) => {}
                            Err(e) if e.retryable() => {
                                debug!("poll refresh failed, will retry: {e}");
                            }
                            Err(e) => {
                                warn!("poll refresh failed: {e}");
                            }
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            debug!("poll loop shut down");
                            break;
                        }
                    }
                }
            }
        });
        PollHandle {
            shutdown: shutdown_tx,
            task: Some(task),
        }
    }
}

/// Handle to a running poll loop. Dropping it aborts the task.
pub struct PollHandle {
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Signal the loop to stop and wait for it to finish.
    pub async fn stop(mut self) {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(JoinHandle::is_finished).unwrap_or(true)
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}
