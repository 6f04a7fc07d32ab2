use log::{debug, info};

use std::collections::HashMap;

use crate::config::*;

/// Counts the marks of one question.
trait QuestionTally {
    fn add_mark(&mut self, mark: &Mark, is_delegated: bool);
    fn finish(self: Box<Self>) -> QuestionResult;
}

/// Simple plurality: a valid mark gives one vote to the first of its choices,
/// in the order of the answers of the question.
struct OneChoiceTally {
    result: QuestionResult,
    positions: HashMap<String, usize>,
}

impl OneChoiceTally {
    fn new(question: &Question) -> OneChoiceTally {
        let answers: Vec<AnswerResult> = question
            .answers
            .iter()
            .map(|a| AnswerResult {
                value: a.value.clone(),
                details: a.details.clone(),
                by_direct_vote_count: 0,
                by_delegation_count: 0,
                total_count: 0,
                total_count_percentage: 0.0,
            })
            .collect();
        let positions = question
            .answers
            .iter()
            .enumerate()
            .map(|(idx, a)| (a.value.clone(), idx))
            .collect();
        OneChoiceTally {
            result: QuestionResult {
                question: question.question.clone(),
                tally_type: question.tally_type.clone(),
                min: question.min,
                max: question.max,
                answers,
                winners: vec![],
                total_votes: 0,
                dirty_votes: 0,
            },
            positions,
        }
    }
}

impl QuestionTally for OneChoiceTally {
    fn add_mark(&mut self, mark: &Mark, is_delegated: bool) {
        let position = match mark {
            Mark::Answers(choices) => choices
                .iter()
                .filter_map(|c| self.positions.get(c).copied())
                .min(),
            Mark::Blank | Mark::Invalid => None,
        };
        match position {
            Some(idx) => {
                let answer = &mut self.result.answers[idx];
                answer.total_count += 1;
                if is_delegated {
                    answer.by_delegation_count += 1;
                } else {
                    answer.by_direct_vote_count += 1;
                }
                self.result.total_votes += 1;
            }
            None => {
                self.result.dirty_votes += 1;
            }
        }
    }

    fn finish(self: Box<Self>) -> QuestionResult {
        let mut result = self.result;
        let total_votes = result.total_votes;
        for answer in result.answers.iter_mut() {
            answer.total_count_percentage = percentage(answer.total_count, total_votes);
        }
        let best = result
            .answers
            .iter()
            .map(|a| a.total_count)
            .max()
            .unwrap_or(0);
        if best > 0 {
            result.winners = result
                .answers
                .iter()
                .filter(|a| a.total_count == best)
                .map(|a| a.value.clone())
                .collect();
        }
        result
    }
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        (count as f64) * 100.0 / (total as f64)
    }
}

fn create_tally(idx: usize, question: &Question) -> Result<Box<dyn QuestionTally>, TallyErrors> {
    match question.tally_type.as_str() {
        ONE_CHOICE => Ok(Box::new(OneChoiceTally::new(question))),
        x => UnsupportedTallyTypeSnafu {
            question: idx,
            tally_type: x,
        }
        .fail(),
    }
}

/// Fails early if one of the questions cannot be counted.
pub(crate) fn check_tally_types(election: &Election) -> Result<(), TallyErrors> {
    for (idx, q) in election.questions.iter().enumerate() {
        create_tally(idx, q)?;
    }
    Ok(())
}

pub(crate) fn aggregate(
    election: &Election,
    resolutions: &[(String, ResolvedVote)],
) -> Result<TallyResult, TallyErrors> {
    let mut tallies: Vec<Box<dyn QuestionTally>> = Vec::new();
    for (idx, q) in election.questions.iter().enumerate() {
        tallies.push(create_tally(idx, q)?);
    }

    let mut total_direct_votes: u64 = 0;
    let mut total_delegated_votes: u64 = 0;
    let mut dirty_votes: u64 = 0;
    let blank = Ballot::blank(election.questions.len());

    for (voter, rv) in resolutions.iter() {
        let (ballot, is_delegated) = match rv {
            ResolvedVote::Direct { ballot } => (ballot, false),
            ResolvedVote::Blank => (&blank, false),
            ResolvedVote::DelegatedFrom { ballot, .. } => (ballot, true),
            ResolvedVote::NoVote => continue,
        };
        debug!(
            "aggregate: {}: delegated: {} ballot: {:?}",
            voter, is_delegated, ballot
        );
        if is_delegated {
            total_delegated_votes += 1;
        } else {
            total_direct_votes += 1;
        }
        if ballot.is_dirty() {
            dirty_votes += 1;
        }
        for (tally, mark) in tallies.iter_mut().zip(ballot.marks.iter()) {
            tally.add_mark(mark, is_delegated);
        }
    }

    let counts: Vec<QuestionResult> = tallies.into_iter().map(|t| t.finish()).collect();
    let res = TallyResult {
        counts,
        total_votes: total_direct_votes + total_delegated_votes,
        total_direct_votes,
        total_delegated_votes,
        dirty_votes,
        electorate_count: resolutions.len() as u64,
    };
    info!(
        "aggregate: election {}: {} votes ({} direct, {} delegated, {} dirty) out of {} members",
        election.id,
        res.total_votes,
        res.total_direct_votes,
        res.total_delegated_votes,
        res.dirty_votes,
        res.electorate_count
    );
    Ok(res)
}

/// Computes how many effective votes went through each delegate, and ranks
/// the delegates.
pub(crate) fn delegate_counts(
    election: &Election,
    result: &TallyResult,
    resolutions: &[(String, ResolvedVote)],
    external_terminals: &HashMap<String, Ballot>,
    rules: &TallyRules,
) -> Vec<DelegateElectionCount> {
    let mut counts: HashMap<&str, u64> = HashMap::new();

    match rules.delegate_count_mode {
        DelegateCountMode::TerminalDelegateOnly => {
            for (_, rv) in resolutions.iter() {
                if let ResolvedVote::DelegatedFrom {
                    terminal_delegate, ..
                } = rv
                {
                    *counts.entry(terminal_delegate.as_str()).or_insert(0) += 1;
                }
            }
        }
        DelegateCountMode::EveryDelegateOnChain => {
            // The longest chains come first, so that the votes flowing through
            // a delegator are known before they are passed to its delegate.
            let mut delegated: Vec<(&str, &str, u32)> = resolutions
                .iter()
                .filter_map(|(voter, rv)| match rv {
                    ResolvedVote::DelegatedFrom {
                        delegate,
                        chain_length,
                        ..
                    } => Some((voter.as_str(), delegate.as_str(), *chain_length)),
                    _ => None,
                })
                .collect();
            delegated.sort_by(|a, b| b.2.cmp(&a.2).then(a.0.cmp(b.0)));
            for (voter, delegate, _) in delegated {
                let received = counts.get(voter).cloned().unwrap_or(0);
                *counts.entry(delegate).or_insert(0) += received + 1;
            }
        }
    }

    let own_votes: HashMap<&str, &ResolvedVote> = resolutions
        .iter()
        .map(|(voter, rv)| (voter.as_str(), rv))
        .collect();

    let mut rows: Vec<DelegateElectionCount> = counts
        .iter()
        .filter(|(_, count)| **count > 0)
        .map(|(delegate, count)| {
            let rank = counts.values().filter(|c| **c >= *count).count() as u32;
            let delegate_vote = match (own_votes.get(delegate), external_terminals.get(*delegate))
            {
                (Some(rv), _) => (*rv).clone(),
                (None, Some(ballot)) => ResolvedVote::Direct {
                    ballot: ballot.clone(),
                },
                (None, None) => ResolvedVote::NoVote,
            };
            DelegateElectionCount {
                election_id: election.id,
                agora_id: election.agora_id,
                delegate: delegate.to_string(),
                count: *count,
                count_percentage: percentage(*count, result.total_votes),
                rank,
                delegate_vote,
            }
        })
        .collect();
    rows.sort_by(|a, b| a.rank.cmp(&b.rank).then(a.delegate.cmp(&b.delegate)));

    debug!("delegate_counts: {:?}", rows);
    rows
}
