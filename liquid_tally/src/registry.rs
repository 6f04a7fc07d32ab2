//! Serialization of the tally runs and publication of their outcome.
//!
//! At most one tally runs at a time for a given election. The outcome of a
//! run is computed aside and swapped in at the end; a run started before the
//! election was re-opened is discarded.

use log::{info, warn};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::config::*;

#[derive(Debug, Default)]
struct RunState {
    running: HashSet<u64>,
    // Bumped every time an election is re-opened.
    generations: HashMap<u64, u64>,
}

#[derive(Debug, Default)]
pub struct TallyRegistry {
    state: Mutex<RunState>,
    published: RwLock<HashMap<u64, Arc<TallyOutcome>>>,
}

/// Exclusive right to tally one election. Dropping the guard without
/// committing releases the election.
#[derive(Debug)]
pub struct TallyGuard<'a> {
    registry: &'a TallyRegistry,
    election_id: u64,
    generation: u64,
}

impl TallyRegistry {
    pub fn new() -> TallyRegistry {
        TallyRegistry::default()
    }

    pub fn begin(&self, election_id: u64) -> Result<TallyGuard<'_>, TallyErrors> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.running.insert(election_id) {
            warn!("begin: election {}: a tally is already running", election_id);
            return ConcurrentTallyConflictSnafu { election_id }.fail();
        }
        let generation = state.generations.get(&election_id).cloned().unwrap_or(0);
        Ok(TallyGuard {
            registry: self,
            election_id,
            generation,
        })
    }

    /// Invalidates the published outcome and any run in flight.
    pub fn reopen(&self, election_id: u64) {
        // Locks are always taken in the same order: state, then published.
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *state.generations.entry(election_id).or_insert(0) += 1;
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&election_id);
        drop(state);
        info!("reopen: election {}: published tally withdrawn", election_id);
    }

    /// Tallies the election and publishes the outcome.
    pub fn run(
        &self,
        election: &Election,
        electorate: &[String],
        events: &[Event],
        rules: &TallyRules,
    ) -> Result<Arc<TallyOutcome>, TallyErrors> {
        let guard = self.begin(election.id)?;
        let outcome = crate::run_tally(election, electorate, events, rules)?;
        guard.commit(outcome)
    }

    pub fn result(&self, election_id: u64) -> Option<Arc<TallyOutcome>> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&election_id)
            .cloned()
    }

    pub fn delegate_counts_for_election(&self, election_id: u64) -> Vec<DelegateElectionCount> {
        self.result(election_id)
            .map(|o| o.delegate_counts.clone())
            .unwrap_or_default()
    }

    /// The delegate counts of all the published elections of an agora,
    /// ordered by election.
    pub fn delegate_counts_for_agora(&self, agora_id: u64) -> Vec<DelegateElectionCount> {
        let published = self
            .published
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut outcomes: Vec<&Arc<TallyOutcome>> = published
            .values()
            .filter(|o| o.agora_id == agora_id)
            .collect();
        outcomes.sort_by_key(|o| o.election_id);
        outcomes
            .iter()
            .flat_map(|o| o.delegate_counts.iter().cloned())
            .collect()
    }
}

impl<'a> TallyGuard<'a> {
    /// Publishes the outcome, unless the election was re-opened since the
    /// guard was taken.
    pub fn commit(self, outcome: TallyOutcome) -> Result<Arc<TallyOutcome>, TallyErrors> {
        let election_id = self.election_id;
        // Held until the outcome is published.
        let state = self
            .registry
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let current = state.generations.get(&election_id).cloned().unwrap_or(0);
        if current != self.generation {
            drop(state);
            warn!(
                "commit: election {}: re-opened during the tally, discarding the outcome",
                election_id
            );
            return TallyAbandonedSnafu { election_id }.fail();
        }
        let outcome = Arc::new(outcome);
        self.registry
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(election_id, outcome.clone());
        drop(state);
        info!(
            "commit: election {}: published tally {}",
            election_id, outcome.result_hash
        );
        Ok(outcome)
    }
}

impl<'a> Drop for TallyGuard<'a> {
    fn drop(&mut self) {
        let mut state = self
            .registry
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        state.running.remove(&self.election_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn election(id: u64, agora_id: u64) -> Election {
        Election {
            id,
            agora_id,
            questions: vec![Question {
                question: "Yes or no?".to_string(),
                tally_type: ONE_CHOICE.to_string(),
                min: 0,
                max: 1,
                answers: ["yes", "no"]
                    .iter()
                    .map(|v| Answer {
                        value: v.to_string(),
                        details: "".to_string(),
                    })
                    .collect(),
            }],
        }
    }

    fn electorate() -> Vec<String> {
        vec!["a".to_string(), "b".to_string()]
    }

    fn events() -> Vec<Event> {
        vec![
            Event::direct_vote("a", &[vec!["yes".to_string()]], 1),
            Event::delegation("b", "a", 2),
        ]
    }

    #[test]
    fn second_run_conflicts_while_first_in_flight() {
        let registry = TallyRegistry::new();
        let guard = registry.begin(1).unwrap();
        assert_eq!(
            registry.begin(1).unwrap_err(),
            TallyErrors::ConcurrentTallyConflict { election_id: 1 }
        );
        // Other elections are independent.
        assert!(registry.begin(2).is_ok());
        drop(guard);
        assert!(registry.begin(1).is_ok());
    }

    #[test]
    fn commit_publishes_and_queries() {
        let registry = TallyRegistry::new();
        let outcome = registry
            .run(&election(1, 10), &electorate(), &events(), &TallyRules::DEFAULT_RULES)
            .unwrap();
        assert_eq!(registry.result(1), Some(outcome.clone()));
        let rows = registry.delegate_counts_for_election(1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].delegate, "a");

        registry
            .run(&election(2, 11), &electorate(), &events(), &TallyRules::DEFAULT_RULES)
            .unwrap();
        assert_eq!(registry.delegate_counts_for_agora(10).len(), 1);
        assert_eq!(registry.delegate_counts_for_agora(11).len(), 1);
        assert!(registry.delegate_counts_for_agora(12).is_empty());
        // The lock is released after a run.
        assert!(registry.begin(1).is_ok());
    }

    #[test]
    fn reopened_election_discards_the_run() {
        let registry = TallyRegistry::new();
        let guard = registry.begin(1).unwrap();
        let outcome = crate::run_tally(
            &election(1, 10),
            &electorate(),
            &events(),
            &TallyRules::DEFAULT_RULES,
        )
        .unwrap();
        registry.reopen(1);
        assert_eq!(
            guard.commit(outcome),
            Err(TallyErrors::TallyAbandoned { election_id: 1 })
        );
        assert!(registry.result(1).is_none());
        assert!(registry.begin(1).is_ok());
    }

    #[test]
    fn reopen_racing_with_commit_never_leaves_a_stale_tally() {
        let registry = TallyRegistry::new();
        let outcome = crate::run_tally(
            &election(1, 10),
            &electorate(),
            &events(),
            &TallyRules::DEFAULT_RULES,
        )
        .unwrap();
        let guard = registry.begin(1).unwrap();
        let published = registry.published.write().unwrap();
        std::thread::scope(|s| {
            // Blocks on the publication, after its generation check.
            let committer = s.spawn(move || guard.commit(outcome));
            std::thread::sleep(std::time::Duration::from_millis(50));
            let reopener = s.spawn(|| registry.reopen(1));
            std::thread::sleep(std::time::Duration::from_millis(50));
            drop(published);
            let committed = committer.join().unwrap();
            reopener.join().unwrap();
            assert!(
                matches!(committed, Ok(_) | Err(TallyErrors::TallyAbandoned { .. })),
                "{:?}",
                committed
            );
        });
        assert!(registry.result(1).is_none());
        assert!(registry.begin(1).is_ok());
    }

    #[test]
    fn rerun_is_idempotent() {
        let registry = TallyRegistry::new();
        let first = registry
            .run(&election(1, 10), &electorate(), &events(), &TallyRules::DEFAULT_RULES)
            .unwrap();
        let second = registry
            .run(&election(1, 10), &electorate(), &events(), &TallyRules::DEFAULT_RULES)
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.result_hash, second.result_hash);
    }
}
