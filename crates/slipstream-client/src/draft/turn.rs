// Draft turn state machine: whose turn it is, timer deadlines, and the
// pick/timeout/completion transitions.
//
// The backend of record runs this machine authoritatively; the client keeps a
// read-only mirror of its snapshots (see draft::session). It is also what the
// in-process test backend drives.

use std::collections::HashSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use super::constraints::{
    summarize, validate, PickRequest, RosterConstraint, RosterLimits, RuleViolation,
};
use super::order::{DraftOrder, DraftOrderEntry};
use super::pick::PickRecord;
use crate::protocol::DriverPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftPhase {
    NotStarted,
    InProgress,
    Complete,
}

#[derive(Debug, Error, PartialEq)]
pub enum TurnError {
    #[error("draft has not started")]
    NotStarted,

    #[error("draft has already started")]
    AlreadyStarted,

    #[error("draft is already complete")]
    DraftAlreadyComplete,

    #[error("team {team_id} is not on the clock (current team: {current_team_id})")]
    NotYourTurn {
        team_id: String,
        current_team_id: String,
    },

    #[error("pick rejected: {}", summarize(.0))]
    ConstraintViolation(Vec<RuleViolation>),

    #[error("no available driver satisfies the constraints for an auto-pick")]
    NoEligibleDriver,
}

/// A point-in-time view of the turn state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnSnapshot {
    pub current_round: u32,
    pub current_position: u32,
    pub total_picks_made: u32,
    pub is_complete: bool,
    pub current_team_id: Option<String>,
    pub timer_deadline: Option<DateTime<Utc>>,
}

/// The turn state machine for one draft session.
pub struct TurnMachine {
    order: DraftOrder,
    picks_per_team: u32,
    limits: RosterLimits,
    pick_timer: Duration,
    phase: DraftPhase,
    picks: Vec<PickRecord>,
    timer_deadline: Option<DateTime<Utc>>,
}

impl TurnMachine {
    pub fn new(
        order: DraftOrder,
        picks_per_team: u32,
        limits: RosterLimits,
        pick_timer: Duration,
    ) -> Self {
        TurnMachine {
            order,
            picks_per_team,
            limits,
            pick_timer,
            phase: DraftPhase::NotStarted,
            picks: Vec::new(),
            timer_deadline: None,
        }
    }

    /// Open the draft and put the first team on the clock.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TurnError> {
        match self.phase {
            DraftPhase::NotStarted => {
                self.phase = DraftPhase::InProgress;
                self.timer_deadline = Some(now + self.pick_timer);
                Ok(())
            }
            _ => Err(TurnError::AlreadyStarted),
        }
    }

    pub fn phase(&self) -> DraftPhase {
        self.phase
    }

    pub fn order(&self) -> &DraftOrder {
        &self.order
    }

    pub fn picks(&self) -> &[PickRecord] {
        &self.picks
    }

    /// Total picks the session will contain once complete.
    pub fn total_picks(&self) -> u32 {
        self.order.team_count() * self.picks_per_team
    }

    /// The team on the clock, if the draft is in progress.
    pub fn current_team(&self) -> Option<&DraftOrderEntry> {
        if self.phase != DraftPhase::InProgress {
            return None;
        }
        let (round, position) = self.order.slot_for_pick(self.picks.len() as u32);
        self.order.team_at(round, position)
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        let total_picks_made = self.picks.len() as u32;
        let is_complete = self.phase == DraftPhase::Complete;
        let (current_round, current_position) = if is_complete {
            (self.picks_per_team, self.order.team_count())
        } else {
            self.order.slot_for_pick(total_picks_made)
        };
        TurnSnapshot {
            current_round,
            current_position,
            total_picks_made,
            is_complete,
            current_team_id: self.current_team().map(|e| e.team_id.clone()),
            timer_deadline: self.timer_deadline,
        }
    }

    /// Commit a pick for the team on the clock.
    ///
    /// Rejects with `NotYourTurn` (no state mutated) when `team_id` is not
    /// current, and with `ConstraintViolation` carrying every violated rule
    /// when the pick is illegal. On success the pick history gains a dense
    /// record, the clock moves to the next slot, and the timer re-arms (or
    /// the draft completes on the final pick).
    pub fn submit_pick(
        &mut self,
        team_id: &str,
        driver_id: &str,
        pool: &[DriverPayload],
        now: DateTime<Utc>,
    ) -> Result<&PickRecord, TurnError> {
        let current = match self.phase {
            DraftPhase::NotStarted => return Err(TurnError::NotStarted),
            DraftPhase::Complete => return Err(TurnError::DraftAlreadyComplete),
            DraftPhase::InProgress => match self.current_team() {
                Some(entry) => entry.clone(),
                None => return Err(TurnError::DraftAlreadyComplete),
            },
        };

        if current.team_id != team_id {
            return Err(TurnError::NotYourTurn {
                team_id: team_id.to_string(),
                current_team_id: current.team_id,
            });
        }

        let driver = pool
            .iter()
            .find(|d| d.driver_id == driver_id)
            .ok_or_else(|| {
                TurnError::ConstraintViolation(vec![RuleViolation::DriverUnavailable {
                    driver_id: driver_id.to_string(),
                }])
            })?;

        let constraint = RosterConstraint::derive(&current.team_id, &self.picks, pool, &self.limits);
        let drafted = self.drafted_ids();
        let request = PickRequest {
            team_id: current.team_id.clone(),
            driver_id: driver.driver_id.clone(),
            constructor_id: driver.constructor_id.clone(),
            price: driver.price,
        };
        validate(&request, &constraint, &drafted).map_err(TurnError::ConstraintViolation)?;

        let (round, _) = self.order.slot_for_pick(self.picks.len() as u32);
        let record = PickRecord {
            round,
            pick_number: self.picks.len() as u32 + 1,
            team_id: current.team_id,
            driver_id: driver.driver_id.clone(),
            is_auto_pick: false,
            created_at: now,
        };
        Ok(self.commit(record, now))
    }

    /// Run the timeout transition if the deadline has passed.
    ///
    /// Returns `Ok(None)` when there is nothing to do (not in progress, no
    /// deadline, or the deadline is still in the future). Otherwise performs
    /// the auto-pick and advances exactly as a manual pick would.
    ///
    /// Auto-pick policy, deterministic by construction: among available
    /// drivers whose pick passes every constraint for the team on the clock,
    /// take the highest season average points; break ties by lowest price,
    /// then lexicographically smallest driver id.
    pub fn expire_timer(
        &mut self,
        now: DateTime<Utc>,
        pool: &[DriverPayload],
    ) -> Result<Option<&PickRecord>, TurnError> {
        if self.phase != DraftPhase::InProgress {
            return Ok(None);
        }
        let deadline = match self.timer_deadline {
            Some(deadline) => deadline,
            None => return Ok(None),
        };
        if now < deadline {
            return Ok(None);
        }
        let current = match self.current_team() {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };

        let constraint = RosterConstraint::derive(&current.team_id, &self.picks, pool, &self.limits);
        let drafted = self.drafted_ids();

        let mut candidates: Vec<&DriverPayload> = pool
            .iter()
            .filter(|d| {
                if drafted.contains(&d.driver_id) {
                    return false;
                }
                let request = PickRequest {
                    team_id: current.team_id.clone(),
                    driver_id: d.driver_id.clone(),
                    constructor_id: d.constructor_id.clone(),
                    price: d.price,
                };
                validate(&request, &constraint, &drafted).is_ok()
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.avg_points_tenths
                .cmp(&a.avg_points_tenths)
                .then(a.price.cmp(&b.price))
                .then(a.driver_id.cmp(&b.driver_id))
        });
        let driver = candidates.first().ok_or(TurnError::NoEligibleDriver)?;

        info!(
            "timer expired for {}; auto-picking {}",
            current.team_id, driver.driver_id
        );

        let (round, _) = self.order.slot_for_pick(self.picks.len() as u32);
        let record = PickRecord {
            round,
            pick_number: self.picks.len() as u32 + 1,
            team_id: current.team_id,
            driver_id: driver.driver_id.clone(),
            is_auto_pick: true,
            created_at: now,
        };
        Ok(Some(self.commit(record, now)))
    }

    /// Every driver id already committed in this session.
    pub fn drafted_ids(&self) -> HashSet<String> {
        self.picks.iter().map(|p| p.driver_id.clone()).collect()
    }

    fn commit(&mut self, record: PickRecord, now: DateTime<Utc>) -> &PickRecord {
        self.picks.push(record);
        if self.picks.len() as u32 == self.total_picks() {
            self.phase = DraftPhase::Complete;
            self.timer_deadline = None;
            info!("draft complete after {} picks", self.picks.len());
        } else {
            self.timer_deadline = Some(now + self.pick_timer);
        }
        // Just pushed, so last() is always present.
        self.picks.last().unwrap()
    }
}
