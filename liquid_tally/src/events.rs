// Normalizes the raw event stream into the latest state of each voter, on two
// independent axes: the vote axis and the delegation axis.

use log::{debug, info, warn};
use snafu::ensure;

use std::collections::{HashMap, HashSet};

use crate::config::*;

/// Position of an event in time. Ties on the timestamp are broken by the
/// position of the event in the stream.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Ord, PartialOrd)]
pub(crate) struct Stamp {
    pub(crate) timestamp: Timestamp,
    pub(crate) seq: usize,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub(crate) enum VoteAxis {
    Cast { ballot: Ballot, is_public: bool },
    Cancelled,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub(crate) enum DelegationAxis {
    Delegated { delegate: String, is_public: bool },
    Cancelled,
}

#[derive(Debug, Clone)]
pub(crate) struct EventLog {
    /// Sorted and deduplicated.
    pub(crate) electorate: Vec<String>,
    pub(crate) votes: HashMap<String, (Stamp, VoteAxis)>,
    pub(crate) delegations: HashMap<String, (Stamp, DelegationAxis)>,
    /// Latest vote axis of voters outside of the electorate. Only filled when
    /// non-member delegates are allowed.
    pub(crate) external_votes: HashMap<String, (Stamp, VoteAxis)>,
    pub(crate) num_questions: usize,
}

impl EventLog {
    pub(crate) fn is_member(&self, voter: &str) -> bool {
        self.electorate
            .binary_search_by(|v| v.as_str().cmp(voter))
            .is_ok()
    }
}

/// Reads the events of an election.
///
/// The events from non-members are dropped, except the votes of potential
/// delegates when the rules allow them. Ballots are validated against the
/// questions of the election: an unknown answer aborts the whole reading.
pub(crate) fn read_event_log(
    election: &Election,
    electorate: &[String],
    events: &[Event],
    rules: &TallyRules,
) -> Result<EventLog, TallyErrors> {
    let mut sorted_electorate: Vec<String> = electorate.to_vec();
    sorted_electorate.sort();
    sorted_electorate.dedup();
    let members: HashSet<&str> = sorted_electorate.iter().map(|s| s.as_str()).collect();
    let keep_external =
        rules.non_member_delegates == NonMemberDelegates::AllowPublicDirectVotes;

    let mut votes: HashMap<String, (Stamp, VoteAxis)> = HashMap::new();
    let mut delegations: HashMap<String, (Stamp, DelegationAxis)> = HashMap::new();
    let mut external_votes: HashMap<String, (Stamp, VoteAxis)> = HashMap::new();
    let mut dropped: usize = 0;

    for (seq, event) in events.iter().enumerate() {
        let stamp = Stamp {
            timestamp: event.timestamp,
            seq,
        };
        let is_member = members.contains(event.voter.as_str());
        if !is_member {
            let is_external_vote = matches!(
                event.kind,
                EventKind::DirectVote { .. } | EventKind::CancelVote
            );
            if !(keep_external && is_external_vote) {
                debug!(
                    "read_event_log: dropping event {:?} from non-member {}",
                    event.kind, event.voter
                );
                dropped += 1;
                continue;
            }
        }

        match &event.kind {
            EventKind::DirectVote { answers, is_public } => {
                let ballot = validate_ballot(&event.voter, answers, &election.questions)?;
                let target = if is_member {
                    &mut votes
                } else {
                    &mut external_votes
                };
                update_axis(
                    target,
                    &event.voter,
                    stamp,
                    VoteAxis::Cast {
                        ballot,
                        is_public: *is_public,
                    },
                );
            }
            EventKind::CancelVote => {
                let target = if is_member {
                    &mut votes
                } else {
                    &mut external_votes
                };
                update_axis(target, &event.voter, stamp, VoteAxis::Cancelled);
            }
            EventKind::Delegation {
                delegate,
                is_public,
            } => {
                update_axis(
                    &mut delegations,
                    &event.voter,
                    stamp,
                    DelegationAxis::Delegated {
                        delegate: delegate.clone(),
                        is_public: *is_public,
                    },
                );
            }
            EventKind::CancelDelegation => {
                update_axis(
                    &mut delegations,
                    &event.voter,
                    stamp,
                    DelegationAxis::Cancelled,
                );
            }
        }
    }

    if dropped > 0 {
        warn!(
            "read_event_log: election {}: dropped {} events from non-members",
            election.id, dropped
        );
    }
    info!(
        "read_event_log: election {}: {} events, {} members, {} vote states, {} delegation states",
        election.id,
        events.len(),
        sorted_electorate.len(),
        votes.len(),
        delegations.len()
    );

    Ok(EventLog {
        electorate: sorted_electorate,
        votes,
        delegations,
        external_votes,
        num_questions: election.questions.len(),
    })
}

// Most recent wins.
fn update_axis<T>(axis: &mut HashMap<String, (Stamp, T)>, voter: &str, stamp: Stamp, state: T) {
    match axis.get(voter) {
        Some((current, _)) if *current > stamp => {
            debug!(
                "update_axis: voter {}: keeping state at {:?} over older {:?}",
                voter, current, stamp
            );
        }
        _ => {
            axis.insert(voter.to_string(), (stamp, state));
        }
    }
}

fn validate_ballot(
    voter: &str,
    answers: &[Vec<String>],
    questions: &[Question],
) -> Result<Ballot, TallyErrors> {
    ensure!(
        answers.len() == questions.len(),
        MalformedEventSnafu {
            voter,
            reason: format!(
                "the ballot has {} entries but the election has {} questions",
                answers.len(),
                questions.len()
            ),
        }
    );

    let mut marks: Vec<Mark> = Vec::new();
    for (idx, (choices, question)) in answers.iter().zip(questions.iter()).enumerate() {
        let filled: Vec<String> = choices.iter().filter(|c| !c.is_empty()).cloned().collect();
        for c in filled.iter() {
            ensure!(
                question.answers.iter().any(|a| a.value == *c),
                MalformedEventSnafu {
                    voter,
                    reason: format!("question {}: unknown answer {:?}", idx, c),
                }
            );
        }
        let num_choices = filled.len();
        let mark = if filled.is_empty() {
            Mark::Blank
        } else if num_choices < question.min as usize || num_choices > question.max as usize {
            Mark::Invalid
        } else {
            Mark::Answers(filled)
        };
        marks.push(mark);
    }
    Ok(Ballot { marks })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn election() -> Election {
        Election {
            id: 1,
            agora_id: 1,
            questions: vec![Question {
                question: "Do you prefer foo or bar?".to_string(),
                tally_type: ONE_CHOICE.to_string(),
                min: 0,
                max: 1,
                answers: ["foo", "bar"]
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
        vec!["b".to_string(), "a".to_string(), "a".to_string()]
    }

    fn ans(s: &str) -> Vec<Vec<String>> {
        vec![vec![s.to_string()]]
    }

    #[test]
    fn latest_event_wins_per_axis() {
        let events = vec![
            Event::direct_vote("a", &ans("foo"), 1),
            Event::delegation("a", "b", 2),
            Event::direct_vote("a", &ans("bar"), 3),
            Event::cancel_delegation("a", 4),
        ];
        let log = read_event_log(&election(), &electorate(), &events, &TallyRules::DEFAULT_RULES)
            .unwrap();
        assert_eq!(log.electorate, vec!["a".to_string(), "b".to_string()]);
        let (stamp, state) = log.votes.get("a").unwrap();
        assert_eq!(stamp.timestamp, 3);
        assert_eq!(
            *state,
            VoteAxis::Cast {
                ballot: Ballot {
                    marks: vec![Mark::Answers(vec!["bar".to_string()])]
                },
                is_public: true
            }
        );
        assert_eq!(
            log.delegations.get("a").map(|p| p.1.clone()),
            Some(DelegationAxis::Cancelled)
        );
    }

    #[test]
    fn stream_position_breaks_timestamp_ties() {
        let events = vec![
            Event::direct_vote("a", &ans("foo"), 5),
            Event::cancel_vote("a", 5),
        ];
        let log = read_event_log(&election(), &electorate(), &events, &TallyRules::DEFAULT_RULES)
            .unwrap();
        assert_eq!(log.votes.get("a").unwrap().1, VoteAxis::Cancelled);
    }

    #[test]
    fn out_of_order_events_keep_the_most_recent() {
        let events = vec![
            Event::cancel_vote("a", 9),
            Event::direct_vote("a", &ans("foo"), 2),
        ];
        let log = read_event_log(&election(), &electorate(), &events, &TallyRules::DEFAULT_RULES)
            .unwrap();
        assert_eq!(log.votes.get("a").unwrap().1, VoteAxis::Cancelled);
    }

    #[test]
    fn non_member_events_are_dropped() {
        let events = vec![
            Event::direct_vote("z", &ans("foo"), 1),
            Event::delegation("z", "a", 2),
        ];
        let log = read_event_log(&election(), &electorate(), &events, &TallyRules::DEFAULT_RULES)
            .unwrap();
        assert!(log.votes.is_empty());
        assert!(log.delegations.is_empty());
        assert!(log.external_votes.is_empty());
    }

    #[test]
    fn non_member_votes_kept_when_allowed() {
        let rules = TallyRules {
            non_member_delegates: NonMemberDelegates::AllowPublicDirectVotes,
            ..TallyRules::DEFAULT_RULES
        };
        let events = vec![
            Event::direct_vote("z", &ans("foo"), 1),
            Event::delegation("z", "a", 2),
        ];
        let log = read_event_log(&election(), &electorate(), &events, &rules).unwrap();
        assert!(log.votes.is_empty());
        assert!(log.delegations.is_empty());
        assert!(log.external_votes.contains_key("z"));
        assert!(!log.is_member("z"));
    }

    #[test]
    fn unknown_answer_is_malformed() {
        let events = vec![Event::direct_vote("a", &ans("baz"), 1)];
        let res = read_event_log(&election(), &electorate(), &events, &TallyRules::DEFAULT_RULES);
        assert!(matches!(res, Err(TallyErrors::MalformedEvent { voter, .. }) if voter == "a"));
    }

    #[test]
    fn wrong_number_of_entries_is_malformed() {
        let events = vec![Event::direct_vote("a", &[], 1)];
        let res = read_event_log(&election(), &electorate(), &events, &TallyRules::DEFAULT_RULES);
        assert!(matches!(res, Err(TallyErrors::MalformedEvent { .. })));
    }

    #[test]
    fn one_entry_for_two_questions_is_malformed() {
        let mut e = election();
        let second = e.questions[0].clone();
        e.questions.push(second);
        let events = vec![Event::direct_vote("a", &ans("foo"), 1)];
        let res = read_event_log(&e, &electorate(), &events, &TallyRules::DEFAULT_RULES);
        assert!(matches!(res, Err(TallyErrors::MalformedEvent { voter, .. }) if voter == "a"));
    }

    #[test]
    fn marks_are_checked_per_question() {
        let mut e = election();
        let mut second = e.questions[0].clone();
        second.min = 2;
        second.max = 2;
        e.questions.push(second);
        let answers = vec![vec!["foo".to_string()], vec!["bar".to_string()]];
        let ballot = validate_ballot("a", &answers, &e.questions).unwrap();
        assert_eq!(
            ballot.marks,
            vec![Mark::Answers(vec!["foo".to_string()]), Mark::Invalid]
        );
        assert!(!ballot.is_dirty());
    }

    #[test]
    fn blank_and_overfilled_marks() {
        let blank = validate_ballot("a", &ans(""), &election().questions).unwrap();
        assert_eq!(blank.marks, vec![Mark::Blank]);
        assert!(blank.is_dirty());

        let both = vec![vec!["foo".to_string(), "bar".to_string()]];
        let over = validate_ballot("a", &both, &election().questions).unwrap();
        assert_eq!(over.marks, vec![Mark::Invalid]);
        assert!(over.is_dirty());
    }
}
