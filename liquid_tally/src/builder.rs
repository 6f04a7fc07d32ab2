pub use crate::config::*;

/// A builder for recording the events of an election.
///
/// Events added through the simple methods are stamped with a logical clock,
/// in the order of the calls. Events with explicit timestamps can be mixed in
/// with `add_event`.
///
/// ```
/// use liquid_tally::builder::Builder;
/// use liquid_tally::{Answer, Election, Question, TallyRules, ONE_CHOICE};
///
/// let election = Election {
///     id: 1,
///     agora_id: 1,
///     questions: vec![Question {
///         question: "Foo or bar?".to_string(),
///         tally_type: ONE_CHOICE.to_string(),
///         min: 0,
///         max: 1,
///         answers: vec![
///             Answer { value: "foo".to_string(), details: "".to_string() },
///             Answer { value: "bar".to_string(), details: "".to_string() },
///         ],
///     }],
/// };
/// let mut builder = Builder::new(&election).electorate(&["anna", "bob"]);
/// builder.add_vote_simple("anna", &["foo"]);
/// builder.delegate("bob", "anna");
///
/// let outcome = builder.run(&TallyRules::DEFAULT_RULES)?;
/// assert_eq!(outcome.result.counts[0].answers[0].total_count, 2);
/// # Ok::<(), liquid_tally::TallyErrors>(())
/// ```
#[derive(Debug, Clone)]
pub struct Builder {
    pub(crate) _election: Election,
    pub(crate) _electorate: Vec<String>,
    pub(crate) _events: Vec<Event>,
    _clock: Timestamp,
}

impl Builder {
    pub fn new(election: &Election) -> Builder {
        Builder {
            _election: election.clone(),
            _electorate: Vec::new(),
            _events: Vec::new(),
            _clock: 0,
        }
    }

    pub fn electorate<S: AsRef<str>>(self, members: &[S]) -> Builder {
        Builder {
            _electorate: members.iter().map(|m| m.as_ref().to_string()).collect(),
            ..self
        }
    }

    fn tick(&mut self) -> Timestamp {
        self._clock += 1;
        self._clock
    }

    /// Adds a public vote for an election with a single question.
    ///
    /// It is the simplest use case for most cases. An empty string is a
    /// blank choice.
    pub fn add_vote_simple(&mut self, voter: &str, choices: &[&str]) {
        let answers = vec![choices.iter().map(|c| c.to_string()).collect()];
        self.add_vote(voter, &answers, true);
    }

    /// Adds a vote, with one entry per question.
    pub fn add_vote(&mut self, voter: &str, answers: &[Vec<String>], is_public: bool) {
        let timestamp = self.tick();
        let event = Event::direct_vote(voter, answers, timestamp);
        self._events.push(if is_public { event } else { event.secret() });
    }

    pub fn delegate(&mut self, voter: &str, delegate: &str) {
        let timestamp = self.tick();
        self._events
            .push(Event::delegation(voter, delegate, timestamp));
    }

    pub fn cancel_vote(&mut self, voter: &str) {
        let timestamp = self.tick();
        self._events.push(Event::cancel_vote(voter, timestamp));
    }

    pub fn cancel_delegation(&mut self, voter: &str) {
        let timestamp = self.tick();
        self._events.push(Event::cancel_delegation(voter, timestamp));
    }

    /// Adds an event with its own timestamp. Later calls to the simple
    /// methods are stamped after it.
    pub fn add_event(&mut self, event: Event) {
        self._clock = self._clock.max(event.timestamp);
        self._events.push(event);
    }

    pub fn events(&self) -> &[Event] {
        &self._events
    }

    pub fn run(&self, rules: &TallyRules) -> Result<TallyOutcome, TallyErrors> {
        crate::run_tally(&self._election, &self._electorate, &self._events, rules)
    }
}
