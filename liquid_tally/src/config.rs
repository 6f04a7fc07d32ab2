// ********* Input data structures ***********

use snafu::Snafu;

/// Moment at which an event was recorded. Any monotonic unit works (seconds
/// since the epoch, logical clock, ...), as long as all the events of an
/// election use the same one.
pub type Timestamp = u64;

/// The identifier of the only counting method currently implemented.
pub const ONE_CHOICE: &str = "ONE_CHOICE";

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Answer {
    pub value: String,
    pub details: String,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Question {
    pub question: String,
    /// The counting method. Only `ONE_CHOICE` is supported.
    pub tally_type: String,
    /// Minimum number of choices for the mark to be valid.
    pub min: u32,
    /// Maximum number of choices for the mark to be valid.
    pub max: u32,
    pub answers: Vec<Answer>,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Election {
    pub id: u64,
    /// The group that owns the election and its membership roster.
    pub agora_id: u64,
    pub questions: Vec<Question>,
}

/// What happened in an event.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum EventKind {
    /// A ballot cast by the voter. There is one entry per question, each
    /// entry being the list of chosen answer values. An empty entry (or an
    /// entry with only empty strings) is a blank mark.
    DirectVote {
        answers: Vec<Vec<String>>,
        is_public: bool,
    },
    /// The voter hands their vote over to `delegate`.
    Delegation { delegate: String, is_public: bool },
    /// Withdraws the direct vote previously cast.
    CancelVote,
    /// Withdraws the delegation previously set.
    CancelDelegation,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct Event {
    pub voter: String,
    pub timestamp: Timestamp,
    pub kind: EventKind,
}

impl Event {
    pub fn direct_vote(voter: &str, answers: &[Vec<String>], timestamp: Timestamp) -> Event {
        Event {
            voter: voter.to_string(),
            timestamp,
            kind: EventKind::DirectVote {
                answers: answers.to_vec(),
                is_public: true,
            },
        }
    }

    pub fn delegation(voter: &str, delegate: &str, timestamp: Timestamp) -> Event {
        Event {
            voter: voter.to_string(),
            timestamp,
            kind: EventKind::Delegation {
                delegate: delegate.to_string(),
                is_public: true,
            },
        }
    }

    pub fn cancel_vote(voter: &str, timestamp: Timestamp) -> Event {
        Event {
            voter: voter.to_string(),
            timestamp,
            kind: EventKind::CancelVote,
        }
    }

    pub fn cancel_delegation(voter: &str, timestamp: Timestamp) -> Event {
        Event {
            voter: voter.to_string(),
            timestamp,
            kind: EventKind::CancelDelegation,
        }
    }

    /// Marks the vote or the delegation carried by this event as secret.
    pub fn secret(mut self) -> Event {
        match &mut self.kind {
            EventKind::DirectVote { is_public, .. } | EventKind::Delegation { is_public, .. } => {
                *is_public = false;
            }
            EventKind::CancelVote | EventKind::CancelDelegation => {}
        }
        self
    }
}

// ******** Output data structures *********

/// The state of a ballot for one question, after validation.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum Mark {
    /// The chosen answers, in the order of the ballot.
    Answers(Vec<String>),
    /// Nothing was chosen.
    Blank,
    /// The number of choices is outside of the `min`/`max` bounds of the question.
    Invalid,
}

impl Mark {
    pub fn is_dirty(&self) -> bool {
        !matches!(self, Mark::Answers(_))
    }
}

/// A validated ballot, with one mark per question.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Ballot {
    pub marks: Vec<Mark>,
}

impl Ballot {
    /// A ballot is dirty when none of its marks can be counted.
    pub fn is_dirty(&self) -> bool {
        self.marks.iter().all(|m| m.is_dirty())
    }

    pub(crate) fn blank(num_questions: usize) -> Ballot {
        Ballot {
            marks: vec![Mark::Blank; num_questions],
        }
    }
}

/// The effective vote of a member of the electorate.
#[derive(Eq, PartialEq, Debug, Clone)]
pub enum ResolvedVote {
    /// The voter cast this ballot themselves.
    Direct { ballot: Ballot },
    /// The vote follows a chain of delegations ending on the direct ballot of
    /// `terminal_delegate`. `chain_length` counts the delegation hops (1 if the
    /// immediate delegate voted directly).
    DelegatedFrom {
        delegate: String,
        chain_length: u32,
        terminal_delegate: String,
        ballot: Ballot,
    },
    /// The voter cast directly a ballot without any valid mark.
    Blank,
    /// Nothing counts for this voter: no intent, a cancelled intent, or a
    /// broken delegation chain.
    NoVote,
}

#[derive(PartialEq, Debug, Clone)]
pub struct AnswerResult {
    pub value: String,
    pub details: String,
    pub by_direct_vote_count: u64,
    pub by_delegation_count: u64,
    pub total_count: u64,
    /// Share of the valid votes of the question.
    pub total_count_percentage: f64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct QuestionResult {
    pub question: String,
    pub tally_type: String,
    pub min: u32,
    pub max: u32,
    pub answers: Vec<AnswerResult>,
    /// The answers with the highest non-zero count, in answer order.
    pub winners: Vec<String>,
    /// Number of valid marks for this question.
    pub total_votes: u64,
    /// Number of blank or invalid marks for this question.
    pub dirty_votes: u64,
}

#[derive(PartialEq, Debug, Clone)]
pub struct TallyResult {
    pub counts: Vec<QuestionResult>,
    /// All the counted ballots, including the dirty ones.
    pub total_votes: u64,
    pub total_direct_votes: u64,
    pub total_delegated_votes: u64,
    pub dirty_votes: u64,
    pub electorate_count: u64,
}

/// How many effective votes went through a delegate in a given election.
#[derive(PartialEq, Debug, Clone)]
pub struct DelegateElectionCount {
    pub election_id: u64,
    pub agora_id: u64,
    pub delegate: String,
    pub count: u64,
    pub count_percentage: f64,
    /// Number of delegates with a count greater than or equal to this one.
    pub rank: u32,
    /// The vote of the delegate themselves.
    pub delegate_vote: ResolvedVote,
}

#[derive(PartialEq, Debug, Clone)]
pub struct TallyOutcome {
    pub election_id: u64,
    pub agora_id: u64,
    pub result: TallyResult,
    pub delegate_counts: Vec<DelegateElectionCount>,
    /// The effective vote of every member of the electorate, sorted by voter.
    pub resolutions: Vec<(String, ResolvedVote)>,
    /// SHA-256 digest of the result and the delegate counts.
    pub result_hash: String,
}

/// Errors that prevent a tally from completing.
#[derive(Eq, PartialEq, Debug, Clone, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TallyErrors {
    #[snafu(display("Malformed event from voter {voter}: {reason}"))]
    MalformedEvent { voter: String, reason: String },
    #[snafu(display("Question {question}: tally type {tally_type} is not supported"))]
    UnsupportedTallyType { question: usize, tally_type: String },
    #[snafu(display("A tally is already running for election {election_id}"))]
    ConcurrentTallyConflict { election_id: u64 },
    #[snafu(display("The tally of election {election_id} was abandoned: the election was re-opened"))]
    TallyAbandoned { election_id: u64 },
}

// ********* Configuration **********

/// Which delegates are credited with a delegated vote.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum DelegateCountMode {
    /// Every delegate between the voter and the terminal delegate (included)
    /// gets one. The same vote is counted by several delegates.
    EveryDelegateOnChain,
    /// Only the delegate whose ballot is finally used.
    TerminalDelegateOnly,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum SecretVotePolicy {
    /// A secret ballot, or a secret delegation of an intermediate delegate,
    /// cannot be inherited. The delegating voters end up with no vote.
    BreaksDelegation,
    Inheritable,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum NonMemberDelegates {
    /// Delegating to someone outside of the electorate is a non-vote.
    Reject,
    /// The public direct ballot of a non-member may end a delegation chain.
    /// The non-member is never counted themselves.
    AllowPublicDirectVotes,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct TallyRules {
    pub delegate_count_mode: DelegateCountMode,
    pub secret_vote_policy: SecretVotePolicy,
    pub non_member_delegates: NonMemberDelegates,
}

impl TallyRules {
    pub const DEFAULT_RULES: TallyRules = TallyRules {
        delegate_count_mode: DelegateCountMode::EveryDelegateOnChain,
        secret_vote_policy: SecretVotePolicy::BreaksDelegation,
        non_member_delegates: NonMemberDelegates::Reject,
    };
}

impl Default for TallyRules {
    fn default() -> Self {
        TallyRules::DEFAULT_RULES
    }
}
