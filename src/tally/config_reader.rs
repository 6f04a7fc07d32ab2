use crate::tally::*;

use serde::{Deserialize, Serialize};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputSettings {
    #[serde(rename = "electionName")]
    pub election_name: String,
    #[serde(rename = "outputDirectory")]
    pub output_directory: Option<String>,
}

/// The description of the election written at the top of the summary.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub election: String,
    pub election_id: u64,
    pub agora_id: u64,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    pub value: String,
    pub details: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct QuestionConfig {
    pub question: String,
    #[serde(rename = "tallyType")]
    pub tally_type: Option<String>,
    pub min: Option<u32>,
    pub max: Option<u32>,
    pub answers: Vec<AnswerConfig>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSettings {
    pub id: u64,
    #[serde(rename = "agoraId")]
    pub agora_id: u64,
    pub questions: Vec<QuestionConfig>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct FileSource {
    pub provider: String,
    #[serde(rename = "filePath")]
    pub file_path: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    #[serde(rename = "delegateCountMode")]
    pub delegate_count_mode: Option<String>,
    #[serde(rename = "secretVotePolicy")]
    pub secret_vote_policy: Option<String>,
    #[serde(rename = "nonMemberDelegates")]
    pub non_member_delegates: Option<String>,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct TallyConfig {
    #[serde(rename = "outputSettings")]
    pub output_settings: OutputSettings,
    pub election: ElectionSettings,
    #[serde(default)]
    pub electorate: Vec<String>,
    #[serde(rename = "eventSources", default)]
    pub event_sources: Vec<FileSource>,
    pub rules: Option<RulesConfig>,
}

pub fn read_summary(path: String) -> TallyCliResult<JSValue> {
    let contents = fs::read_to_string(&path).context(OpeningFileSnafu { path })?;
    debug!("read content: {:?}", contents);
    let js: JSValue = serde_json::from_str(contents.as_str()).context(ParsingJsonSnafu {})?;
    Ok(js)
}

pub fn validate_election(settings: &ElectionSettings) -> TallyCliResult<Election> {
    let mut questions: Vec<Question> = Vec::new();
    for (idx, qc) in settings.questions.iter().enumerate() {
        let min = qc.min.unwrap_or(0);
        let max = qc.max.unwrap_or(1);
        if min > max {
            whatever!("Question {}: min {} is larger than max {}", idx, min, max)
        }
        if qc.answers.is_empty() {
            whatever!("Question {}: no answers", idx)
        }
        questions.push(Question {
            question: qc.question.clone(),
            tally_type: qc
                .tally_type
                .clone()
                .unwrap_or_else(|| ONE_CHOICE.to_string()),
            min,
            max,
            answers: qc
                .answers
                .iter()
                .map(|a| Answer {
                    value: a.value.clone(),
                    details: a.details.clone().unwrap_or_default(),
                })
                .collect(),
        });
    }
    Ok(Election {
        id: settings.id,
        agora_id: settings.agora_id,
        questions,
    })
}

pub fn validate_rules(rules_config: &Option<RulesConfig>) -> TallyCliResult<TallyRules> {
    let rc = match rules_config {
        Some(rc) => rc,
        None => return Ok(TallyRules::DEFAULT_RULES),
    };
    let defaults = TallyRules::DEFAULT_RULES;
    let res = TallyRules {
        delegate_count_mode: match rc.delegate_count_mode.as_deref() {
            None => defaults.delegate_count_mode,
            Some("everyDelegateOnChain") => DelegateCountMode::EveryDelegateOnChain,
            Some("terminalDelegateOnly") => DelegateCountMode::TerminalDelegateOnly,
            Some(x) => {
                whatever!("Cannot use delegate count mode {:?}: not implemented", x)
            }
        },
        secret_vote_policy: match rc.secret_vote_policy.as_deref() {
            None => defaults.secret_vote_policy,
            Some("breaksDelegation") => SecretVotePolicy::BreaksDelegation,
            Some("inheritable") => SecretVotePolicy::Inheritable,
            Some(x) => {
                whatever!("Cannot use secret vote policy {:?}: not implemented", x)
            }
        },
        non_member_delegates: match rc.non_member_delegates.as_deref() {
            None => defaults.non_member_delegates,
            Some("reject") => NonMemberDelegates::Reject,
            Some("allowPublicDirectVotes") => NonMemberDelegates::AllowPublicDirectVotes,
            Some(x) => {
                whatever!("Cannot use non-member delegates option {:?}: not implemented", x)
            }
        },
    };
    Ok(res)
}
