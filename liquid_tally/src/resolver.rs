// Resolution of the delegation graph.
//
// Every member gets exactly one ResolvedVote. Chains are walked iteratively,
// the results are memoized so that each voter is resolved once.

use log::{debug, info};

use std::collections::{HashMap, HashSet};

use crate::config::*;
use crate::events::{DelegationAxis, EventLog, Stamp, VoteAxis};

/// The present intent of a voter, after comparing both axes.
#[derive(Debug, Clone, Copy)]
enum Intent<'a> {
    Vote { ballot: &'a Ballot, is_public: bool },
    Delegate { delegate: &'a str, is_public: bool },
    Nothing,
}

#[derive(Debug, Clone)]
enum Resolution<'a> {
    Direct(&'a Ballot),
    Delegated {
        delegate: &'a str,
        chain_length: u32,
        terminal: &'a str,
        ballot: &'a Ballot,
    },
    NoVote,
}

#[derive(Debug, Clone)]
pub(crate) struct Resolutions {
    /// One entry per member, sorted by voter.
    pub(crate) members: Vec<(String, ResolvedVote)>,
    /// The ballots of the non-members that ended a delegation chain.
    pub(crate) external_terminals: HashMap<String, Ballot>,
}

fn live_vote(axis: Option<&(Stamp, VoteAxis)>) -> Option<(Stamp, &Ballot, bool)> {
    match axis {
        Some((stamp, VoteAxis::Cast { ballot, is_public })) => Some((*stamp, ballot, *is_public)),
        _ => None,
    }
}

fn live_delegation(axis: Option<&(Stamp, DelegationAxis)>) -> Option<(Stamp, &str, bool)> {
    match axis {
        Some((
            stamp,
            DelegationAxis::Delegated {
                delegate,
                is_public,
            },
        )) => Some((*stamp, delegate.as_str(), *is_public)),
        _ => None,
    }
}

// A cancelled axis carries no intent: the other axis governs, whatever the
// timestamps. When both axes are live, the most recent one wins.
fn intent_of<'a>(log: &'a EventLog, voter: &str) -> Intent<'a> {
    if !log.is_member(voter) {
        return match live_vote(log.external_votes.get(voter)) {
            Some((_, ballot, is_public)) => Intent::Vote { ballot, is_public },
            None => Intent::Nothing,
        };
    }
    let vote = live_vote(log.votes.get(voter));
    let delegation = live_delegation(log.delegations.get(voter));
    match (vote, delegation) {
        (Some((vote_stamp, ballot, is_public)), Some((deleg_stamp, delegate, deleg_public))) => {
            if deleg_stamp > vote_stamp {
                Intent::Delegate {
                    delegate,
                    is_public: deleg_public,
                }
            } else {
                Intent::Vote { ballot, is_public }
            }
        }
        (Some((_, ballot, is_public)), None) => Intent::Vote { ballot, is_public },
        (None, Some((_, delegate, is_public))) => Intent::Delegate {
            delegate,
            is_public,
        },
        (None, None) => Intent::Nothing,
    }
}

pub(crate) fn resolve_votes(log: &EventLog, rules: &TallyRules) -> Resolutions {
    let secret_breaks = rules.secret_vote_policy == SecretVotePolicy::BreaksDelegation;
    let allow_external = rules.non_member_delegates == NonMemberDelegates::AllowPublicDirectVotes;
    // A chain cannot be longer than the number of voters that may appear in it.
    let max_steps = log.electorate.len() + log.external_votes.len();

    let mut resolved: HashMap<&str, Resolution> = HashMap::new();
    let mut external_terminals: HashMap<String, Ballot> = HashMap::new();

    for voter in log.electorate.iter() {
        let voter = voter.as_str();
        if resolved.contains_key(voter) {
            continue;
        }
        let first_delegate = match intent_of(log, voter) {
            Intent::Vote { ballot, .. } => {
                resolved.insert(voter, Resolution::Direct(ballot));
                continue;
            }
            Intent::Nothing => {
                resolved.insert(voter, Resolution::NoVote);
                continue;
            }
            // The publicity of the first delegation is irrelevant: only the
            // votes that are inherited must be public.
            Intent::Delegate { delegate, .. } => delegate,
        };

        // Members waiting for a resolution, in chain order.
        let mut chain: Vec<&str> = vec![voter];
        let mut visited: HashSet<&str> = HashSet::from([voter]);
        // The immediate delegate of each chain member.
        let mut next_hops: Vec<&str> = vec![first_delegate];
        let mut current: &str = first_delegate;

        // (terminal, ballot, hops already resolved past the chain)
        let end: Option<(&str, &Ballot, u32)> = loop {
            if chain.len() > max_steps {
                debug!("resolve_votes: {}: step bound reached", voter);
                break None;
            }
            if visited.contains(current) {
                debug!("resolve_votes: {}: cycle through {}", voter, current);
                break None;
            }
            let is_member = log.is_member(current);
            if !is_member && !allow_external {
                debug!("resolve_votes: {}: delegate {} is not a member", voter, current);
                break None;
            }
            match intent_of(log, current) {
                Intent::Nothing => {
                    debug!("resolve_votes: {}: {} has no vote", voter, current);
                    if is_member {
                        resolved.insert(current, Resolution::NoVote);
                    }
                    break None;
                }
                Intent::Vote { ballot, is_public } => {
                    if is_member {
                        resolved.insert(current, Resolution::Direct(ballot));
                    }
                    // Only the public ballot of a non-member may end a chain.
                    if !is_member && !is_public {
                        debug!(
                            "resolve_votes: {}: the vote of non-member {} is secret",
                            voter, current
                        );
                        break None;
                    }
                    if !is_public && secret_breaks {
                        debug!("resolve_votes: {}: the vote of {} is secret", voter, current);
                        break None;
                    }
                    if !is_member {
                        external_terminals.insert(current.to_string(), ballot.clone());
                    }
                    break Some((current, ballot, 0));
                }
                Intent::Delegate {
                    delegate,
                    is_public,
                } => {
                    if !is_public && secret_breaks {
                        debug!(
                            "resolve_votes: {}: the delegation of {} is secret",
                            voter, current
                        );
                        break None;
                    }
                    match resolved.get(current) {
                        Some(Resolution::Delegated {
                            chain_length,
                            terminal,
                            ballot,
                            ..
                        }) => break Some((*terminal, *ballot, *chain_length)),
                        Some(_) => break None,
                        None => {
                            chain.push(current);
                            visited.insert(current);
                            next_hops.push(delegate);
                            current = delegate;
                        }
                    }
                }
            }
        };

        match end {
            Some((terminal, ballot, base_length)) => {
                let num = chain.len();
                for (idx, (member, delegate)) in chain.iter().zip(next_hops.iter()).enumerate() {
                    let chain_length = (num - idx) as u32 + base_length;
                    debug!(
                        "resolve_votes: {} -> {} ({} hops to {})",
                        member, delegate, chain_length, terminal
                    );
                    resolved.insert(
                        *member,
                        Resolution::Delegated {
                            delegate: *delegate,
                            chain_length,
                            terminal,
                            ballot,
                        },
                    );
                }
            }
            None => {
                for member in chain {
                    resolved.insert(member, Resolution::NoVote);
                }
            }
        }
    }

    let num_questions = log.num_questions;
    let members: Vec<(String, ResolvedVote)> = log
        .electorate
        .iter()
        .map(|voter| {
            let rv = match resolved.get(voter.as_str()) {
                Some(Resolution::Direct(ballot)) if ballot.is_dirty() => ResolvedVote::Blank,
                Some(Resolution::Direct(ballot)) => ResolvedVote::Direct {
                    ballot: (*ballot).clone(),
                },
                Some(Resolution::Delegated {
                    delegate,
                    chain_length,
                    terminal,
                    ballot,
                }) => ResolvedVote::DelegatedFrom {
                    delegate: delegate.to_string(),
                    chain_length: *chain_length,
                    terminal_delegate: terminal.to_string(),
                    ballot: if ballot.is_dirty() {
                        Ballot::blank(num_questions)
                    } else {
                        (*ballot).clone()
                    },
                },
                Some(Resolution::NoVote) | None => ResolvedVote::NoVote,
            };
            (voter.clone(), rv)
        })
        .collect();

    info!(
        "resolve_votes: {} members, {} direct, {} delegated, {} without vote",
        members.len(),
        members
            .iter()
            .filter(|(_, rv)| matches!(rv, ResolvedVote::Direct { .. } | ResolvedVote::Blank))
            .count(),
        members
            .iter()
            .filter(|(_, rv)| matches!(rv, ResolvedVote::DelegatedFrom { .. }))
            .count(),
        members
            .iter()
            .filter(|(_, rv)| matches!(rv, ResolvedVote::NoVote))
            .count(),
    );

    Resolutions {
        members,
        external_terminals,
    }
}
