// Primitives for reading CSV event logs.

use serde::Deserialize;

use crate::tally::{io_common::split_answers, *};

// The header line names the columns. The `public` column is optional.
#[derive(Debug, Clone, Deserialize)]
struct CsvRow {
    voter: String,
    #[serde(rename = "type")]
    event_type: String,
    payload: Option<String>,
    timestamp: Timestamp,
    public: Option<bool>,
}

pub fn read_csv_events(path: &str) -> TallyCliResult<Vec<ParsedEvent>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .context(CsvOpenSnafu {})?;
    read_csv_rows(rdr)
}

fn read_csv_rows<R: std::io::Read>(mut rdr: csv::Reader<R>) -> TallyCliResult<Vec<ParsedEvent>> {
    let mut res: Vec<ParsedEvent> = Vec::new();
    for (idx, line_r) in rdr.deserialize::<CsvRow>().enumerate() {
        // The header is line 1.
        let lineno = idx + 2;
        let row = line_r.context(CsvLineParseSnafu {})?;
        debug!("read_csv_rows: lineno: {:?} row: {:?}", lineno, row);
        let payload = row.payload.unwrap_or_default();
        let (answers, delegate) = match row.event_type.as_str() {
            "vote" => (Some(split_answers(&payload)), None),
            "delegation" => (None, Some(payload)),
            _ => (None, None),
        };
        res.push(ParsedEvent {
            lineno,
            voter: row.voter,
            event_type: row.event_type,
            answers,
            delegate,
            timestamp: row.timestamp,
            is_public: row.public,
        });
    }
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(data: &str) -> TallyCliResult<Vec<ParsedEvent>> {
        let rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(data.as_bytes());
        read_csv_rows(rdr)
    }

    #[test]
    fn read_rows() {
        let data = "voter,type,payload,timestamp,public\n\
                    david,delegation,user1,1,\n\
                    user3,vote,bar|first;second,3,false\n\
                    user6,vote,,4,\n";
        let events = read(data).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].delegate, Some("user1".to_string()));
        assert_eq!(events[0].answers, None);
        assert_eq!(
            events[1].answers,
            Some(vec![
                vec!["bar".to_string()],
                vec!["first".to_string(), "second".to_string()]
            ])
        );
        assert_eq!(events[1].is_public, Some(false));
        assert_eq!(events[1].lineno, 3);
        assert_eq!(events[2].answers, Some(vec![vec![]]));
        assert_eq!(events[2].is_public, None);
    }

    #[test]
    fn optional_public_column() {
        let events = read("voter,type,payload,timestamp\nuser2,cancel_vote,,4\n").unwrap();
        assert_eq!(events[0].event_type, "cancel_vote");
        assert_eq!(events[0].timestamp, 4);
    }

    #[test]
    fn bad_timestamp() {
        assert!(matches!(
            read("voter,type,payload,timestamp\nuser2,cancel_vote,,soon\n"),
            Err(TallyCliError::CsvLineParse { .. })
        ));
    }
}
