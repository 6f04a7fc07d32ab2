mod aggregator;
pub mod builder;
mod config;
mod events;
pub mod manual;
pub mod registry;
mod resolver;

use log::{debug, info};

pub use crate::config::*;
pub use crate::registry::{TallyGuard, TallyRegistry};

/// Runs the tally of an election over its frozen event log.
///
/// Arguments:
/// * `election` the questions and identifiers of the election
/// * `electorate` the members whose votes may be counted
/// * `events` the votes, delegations and cancellations. The order matters only
/// for events sharing the same timestamp: the later one wins.
/// * `rules` the rules that govern delegations and delegate counts
///
/// The function is pure: running it twice on the same input gives the same
/// outcome. Use a [`TallyRegistry`] to serialize and publish runs.
pub fn run_tally(
    election: &Election,
    electorate: &[String],
    events: &[Event],
    rules: &TallyRules,
) -> Result<TallyOutcome, TallyErrors> {
    info!(
        "run_tally: election {}: processing {:?} events, {:?} members, rules: {:?}",
        election.id,
        events.len(),
        electorate.len(),
        rules
    );
    aggregator::check_tally_types(election)?;

    let log = events::read_event_log(election, electorate, events, rules)?;
    let resolutions = resolver::resolve_votes(&log, rules);
    let result = aggregator::aggregate(election, &resolutions.members)?;
    let delegate_counts = aggregator::delegate_counts(
        election,
        &result,
        &resolutions.members,
        &resolutions.external_terminals,
        rules,
    );
    let result_hash = compute_result_hash(&result, &delegate_counts);
    debug!("run_tally: election {}: hash {}", election.id, result_hash);

    for q in result.counts.iter() {
        info!("Question: {} (winners: {:?})", q.question, q.winners);
        for a in q.answers.iter() {
            info!(
                "    {:>6} {} ({} direct, {} delegated)",
                a.total_count, a.value, a.by_direct_vote_count, a.by_delegation_count
            );
        }
    }

    Ok(TallyOutcome {
        election_id: election.id,
        agora_id: election.agora_id,
        result,
        delegate_counts,
        resolutions: resolutions.members,
        result_hash,
    })
}

// The debug representation only contains vectors, so it is stable across runs.
fn compute_result_hash(result: &TallyResult, delegate_counts: &[DelegateElectionCount]) -> String {
    sha256::digest(format!("{:?}{:?}", result, delegate_counts))
}
