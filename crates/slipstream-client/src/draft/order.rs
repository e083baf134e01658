// Draft order generation: random, sequential, and snake resolution.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum OrderError {
    #[error("a draft needs at least 2 teams, got {0}")]
    TooFewTeams(usize),

    #[error("duplicate team id in draft order input: {0}")]
    DuplicateTeam(String),
}

/// How the base draft order is produced and how it repeats across rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DraftMethod {
    /// Uniformly random permutation of the team set.
    Random,
    /// Caller-supplied order, repeated every round.
    Sequential,
    /// Sequential order in odd rounds, fully reversed in even rounds.
    Snake,
}

/// One slot in the base draft order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftOrderEntry {
    /// 1-indexed slot in the base order.
    pub position: u32,
    pub team_id: String,
    pub user_id: String,
}

/// The immutable draft order for a session.
///
/// Rounds are never materialized: the team on the clock for any
/// `(round, position)` is resolved on demand from the base order and, for
/// snake drafts, the round's parity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftOrder {
    method: DraftMethod,
    entries: Vec<DraftOrderEntry>,
}

impl DraftOrder {
    /// Generate a draft order from `(team_id, user_id)` pairs.
    ///
    /// Random orders draw from the thread RNG, so two consecutive calls are
    /// not deterministically identical. Use [`DraftOrder::generate_seeded`]
    /// when reproducibility matters.
    pub fn generate(
        teams: &[(String, String)],
        method: DraftMethod,
    ) -> Result<Self, OrderError> {
        let mut rng = rand::rng();
        Self::generate_with_rng(teams, method, &mut rng)
    }

    /// Deterministic variant for tests and replays.
    pub fn generate_seeded(
        teams: &[(String, String)],
        method: DraftMethod,
        seed: u64,
    ) -> Result<Self, OrderError> {
        let mut rng = StdRng::seed_from_u64(seed);
        Self::generate_with_rng(teams, method, &mut rng)
    }

    fn generate_with_rng<R: Rng>(
        teams: &[(String, String)],
        method: DraftMethod,
        rng: &mut R,
    ) -> Result<Self, OrderError> {
        if teams.len() < 2 {
            return Err(OrderError::TooFewTeams(teams.len()));
        }
        let mut seen = HashSet::new();
        for (team_id, _) in teams {
            if !seen.insert(team_id.as_str()) {
                return Err(OrderError::DuplicateTeam(team_id.clone()));
            }
        }

        let mut ordered: Vec<(String, String)> = teams.to_vec();
        if method == DraftMethod::Random {
            ordered.shuffle(rng);
        }

        let entries = ordered
            .into_iter()
            .enumerate()
            .map(|(i, (team_id, user_id))| DraftOrderEntry {
                position: i as u32 + 1,
                team_id,
                user_id,
            })
            .collect();

        Ok(DraftOrder { method, entries })
    }

    pub fn method(&self) -> DraftMethod {
        self.method
    }

    /// The base order (round 1 order for every method).
    pub fn entries(&self) -> &[DraftOrderEntry] {
        &self.entries
    }

    pub fn team_count(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Resolve the team on the clock for a 1-indexed `(round, position)`.
    ///
    /// For snake drafts, even rounds walk the base order in reverse; other
    /// methods use the base order every round. Out-of-range inputs return
    /// `None`.
    pub fn team_at(&self, round: u32, position: u32) -> Option<&DraftOrderEntry> {
        let n = self.team_count();
        if round == 0 || position == 0 || position > n {
            return None;
        }
        let index = if self.method == DraftMethod::Snake && round % 2 == 0 {
            n - position
        } else {
            position - 1
        };
        self.entries.get(index as usize)
    }

    /// Map a 0-indexed overall pick index to a 1-indexed `(round, position)`.
    pub fn slot_for_pick(&self, pick_index: u32) -> (u32, u32) {
        let n = self.team_count();
        (pick_index / n + 1, pick_index % n + 1)
    }
}
