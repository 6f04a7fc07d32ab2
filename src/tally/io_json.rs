// Primitives for reading JSON event logs.

use serde::Deserialize;

use crate::tally::*;

#[derive(Debug, Clone, Deserialize)]
struct JsonEvent {
    #[serde(rename = "type")]
    event_type: String,
    voter: String,
    answers: Option<Vec<Vec<String>>>,
    delegate: Option<String>,
    timestamp: Timestamp,
    #[serde(rename = "isPublic")]
    is_public: Option<bool>,
}

pub fn read_json_events(path: &str) -> TallyCliResult<Vec<ParsedEvent>> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    parse_json_events(&contents)
}

fn parse_json_events(contents: &str) -> TallyCliResult<Vec<ParsedEvent>> {
    let events: Vec<JsonEvent> = serde_json::from_str(contents).context(ParsingJsonSnafu {})?;
    let res: Vec<ParsedEvent> = events
        .into_iter()
        .enumerate()
        .map(|(idx, je)| ParsedEvent {
            lineno: idx + 1,
            voter: je.voter,
            event_type: je.event_type,
            answers: je.answers,
            delegate: je.delegate,
            timestamp: je.timestamp,
            is_public: je.is_public,
        })
        .collect();
    debug!("parse_json_events: {} events", res.len());
    Ok(res)
}
