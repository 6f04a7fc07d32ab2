pub mod config_reader;
mod io_common;
mod io_csv;
mod io_json;

use log::{debug, info, warn};

use liquid_tally::*;
use snafu::{prelude::*, Snafu};

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::json;
use serde_json::Map as JSMap;
use serde_json::Value as JSValue;
use text_diff::print_diff;

use crate::tally::config_reader::*;

#[derive(Debug, Snafu)]
pub enum TallyCliError {
    #[snafu(display("Error opening file {path}"))]
    OpeningFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error writing file {path}"))]
    WritingFile {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing JSON: {source}"))]
    ParsingJson { source: serde_json::Error },
    #[snafu(display("Error opening CSV file: {source}"))]
    CsvOpen { source: csv::Error },
    #[snafu(display("Error parsing CSV line: {source}"))]
    CsvLineParse { source: csv::Error },
    #[snafu(display("{source_name}, event {lineno}: {reason}"))]
    InvalidEvent {
        source_name: String,
        lineno: usize,
        reason: String,
    },
    #[snafu(display("The configuration file has no parent directory"))]
    MissingParentDir {},
    #[snafu(display("Tally failed: {source}"))]
    Tally { source: TallyErrors },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type TallyCliResult<T> = Result<T, TallyCliError>;

/// An event, as parsed by the readers.
/// This is before checking its type and its payload.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct ParsedEvent {
    /// Position of the event in its source, starting at 1.
    pub lineno: usize,
    pub voter: String,
    pub event_type: String,
    pub answers: Option<Vec<Vec<String>>>,
    pub delegate: Option<String>,
    pub timestamp: Timestamp,
    pub is_public: Option<bool>,
}

fn marks_to_json(ballot: &Ballot) -> JSValue {
    let marks: Vec<JSValue> = ballot
        .marks
        .iter()
        .map(|m| match m {
            Mark::Answers(l) => json!(l),
            Mark::Blank => json!([]),
            Mark::Invalid => JSValue::Null,
        })
        .collect();
    json!(marks)
}

fn resolved_vote_to_json(rv: &ResolvedVote) -> JSValue {
    match rv {
        ResolvedVote::Direct { ballot } => json!({
            "a": "direct",
            "answers": marks_to_json(ballot)
        }),
        ResolvedVote::DelegatedFrom {
            delegate,
            chain_length,
            terminal_delegate,
            ballot,
        } => json!({
            "a": "delegated",
            "delegate": delegate,
            "chain_length": chain_length,
            "terminal_delegate": terminal_delegate,
            "answers": marks_to_json(ballot)
        }),
        ResolvedVote::Blank => json!({"a": "blank"}),
        ResolvedVote::NoVote => json!({"a": "no_vote"}),
    }
}

fn result_to_json(res: &TallyResult) -> JSValue {
    let counts: Vec<JSValue> = res
        .counts
        .iter()
        .map(|q| {
            let answers: Vec<JSValue> = q
                .answers
                .iter()
                .map(|a| {
                    json!({
                        "a": format!("answer/result/{}", q.tally_type),
                        "value": a.value,
                        "details": a.details,
                        "by_direct_vote_count": a.by_direct_vote_count,
                        "by_delegation_count": a.by_delegation_count,
                        "total_count": a.total_count,
                        "total_count_percentage": a.total_count_percentage
                    })
                })
                .collect();
            json!({
                "a": format!("question/result/{}", q.tally_type),
                "question": q.question,
                "tally_type": q.tally_type,
                "min": q.min,
                "max": q.max,
                "winners": q.winners,
                "answers": answers,
                "total_votes": q.total_votes,
                "dirty_votes": q.dirty_votes
            })
        })
        .collect();
    json!({
        "a": "result",
        "counts": counts,
        "total_votes": res.total_votes,
        "total_direct_votes": res.total_direct_votes,
        "total_delegated_votes": res.total_delegated_votes,
        "dirty_votes": res.dirty_votes,
        "electorate_count": res.electorate_count
    })
}

fn delegate_counts_to_json(rows: &[DelegateElectionCount]) -> Vec<JSValue> {
    rows.iter()
        .map(|r| {
            json!({
                "election_id": r.election_id,
                "agora_id": r.agora_id,
                "delegate": r.delegate,
                "count": r.count,
                "count_percentage": r.count_percentage,
                "rank": r.rank,
                "delegate_vote": resolved_vote_to_json(&r.delegate_vote)
            })
        })
        .collect()
}

fn build_summary_js(config: &TallyConfig, outcome: &TallyOutcome) -> JSValue {
    let c = OutputConfig {
        election: config.output_settings.election_name.clone(),
        election_id: outcome.election_id,
        agora_id: outcome.agora_id,
    };
    let mut resolutions: JSMap<String, JSValue> = JSMap::new();
    for (voter, rv) in outcome.resolutions.iter() {
        resolutions.insert(voter.clone(), resolved_vote_to_json(rv));
    }
    json!({
        "config": c,
        "result": result_to_json(&outcome.result),
        "delegate_counts": delegate_counts_to_json(&outcome.delegate_counts),
        "resolutions": resolutions,
        "result_hash": outcome.result_hash
    })
}

/// Checks the type and the payload of the parsed events.
fn validate_events(parsed_events: &[ParsedEvent], source_name: &str) -> TallyCliResult<Vec<Event>> {
    let mut res: Vec<Event> = Vec::new();
    for pe in parsed_events.iter() {
        let invalid = |reason: &str| InvalidEventSnafu {
            source_name: source_name.to_string(),
            lineno: pe.lineno,
            reason: reason.to_string(),
        };
        ensure!(!pe.voter.is_empty(), invalid("missing voter"));
        let event = match pe.event_type.as_str() {
            "vote" => {
                let answers = pe.answers.clone().context(invalid("vote without answers"))?;
                Event::direct_vote(&pe.voter, &answers, pe.timestamp)
            }
            "delegation" => {
                let delegate = match pe.delegate.as_deref() {
                    Some(d) if !d.is_empty() => d,
                    _ => return invalid("delegation without delegate").fail(),
                };
                Event::delegation(&pe.voter, delegate, pe.timestamp)
            }
            "cancel_vote" => Event::cancel_vote(&pe.voter, pe.timestamp),
            "cancel_delegation" => Event::cancel_delegation(&pe.voter, pe.timestamp),
            x => {
                return invalid(&format!("unknown event type {:?}", x)).fail();
            }
        };
        let event = if pe.is_public == Some(false) {
            event.secret()
        } else {
            event
        };
        debug!("validate_events: {}: {:?}", source_name, event);
        res.push(event);
    }
    Ok(res)
}

fn read_events(root_path: &Path, cfs: &FileSource) -> TallyCliResult<Vec<Event>> {
    let p: PathBuf = root_path.join(&cfs.file_path);
    let path = p.to_string_lossy().to_string();
    info!("read_events: provider {:?}, path {:?}", cfs.provider, path);
    let parsed_events = match cfs.provider.as_str() {
        "json" => io_json::read_json_events(&path)?,
        "csv" => io_csv::read_csv_events(&path)?,
        x => {
            whatever!("Provider not implemented {:?}", x)
        }
    };
    let source_name = io_common::simplify_file_name(&path);
    validate_events(&parsed_events, &source_name)
}

fn read_electorate_file(path: &str) -> TallyCliResult<Vec<String>> {
    let contents = fs::read_to_string(path).context(OpeningFileSnafu { path })?;
    Ok(contents
        .lines()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .map(|l| l.to_string())
        .collect())
}

// Fields that legitimately differ between two runs of the same election.
fn strip_volatile_fields(js: &JSValue) -> JSValue {
    let mut js = js.clone();
    if let Some(m) = js.as_object_mut() {
        m.remove("result_hash");
    }
    js
}

fn write_summary(
    config: &TallyConfig,
    config_dir: &Path,
    override_out_path: Option<String>,
    pretty_js_stats: &str,
) -> TallyCliResult<()> {
    let out_path: Option<PathBuf> = match override_out_path {
        Some(p) if p == "stdout" => None,
        Some(p) => Some(PathBuf::from(p)),
        None => config
            .output_settings
            .output_directory
            .as_ref()
            .map(|d| {
                config_dir
                    .join(d)
                    .join(format!("{}_summary.json", config.output_settings.election_name))
            }),
    };
    match out_path {
        Some(p) => {
            let path = p.to_string_lossy().to_string();
            info!("write_summary: writing summary to {:?}", path);
            fs::write(&p, pretty_js_stats).context(WritingFileSnafu { path })?;
        }
        None => println!("{}", pretty_js_stats),
    }
    Ok(())
}

/// Runs an election described by a configuration file.
///
/// Arguments:
/// * `config_path` the JSON configuration of the election
/// * `check_summary_path` a reference summary. The run fails if the computed
/// summary differs from it.
/// * `override_out_path` where to write the summary ('stdout' prints it)
/// * `override_input_path` an event log to read instead of the sources of the configuration
/// * `override_input_type` the provider of `override_input_path` (json by default)
/// * `override_electorate_path` a file with one member per line, instead of the
/// electorate of the configuration
pub fn run_election(
    config_path: &str,
    check_summary_path: Option<String>,
    override_out_path: Option<String>,
    override_input_path: Option<String>,
    override_input_type: Option<String>,
    override_electorate_path: Option<String>,
) -> TallyCliResult<JSValue> {
    let config_p = Path::new(config_path);
    let config_str = fs::read_to_string(config_path).context(OpeningFileSnafu { path: config_path })?;
    let config: TallyConfig = serde_json::from_str(&config_str).context(ParsingJsonSnafu {})?;
    info!("config: {:?}", config);

    let election = validate_election(&config.election)?;
    let rules = validate_rules(&config.rules)?;

    let root_p = config_p.parent().context(MissingParentDirSnafu {})?;

    let electorate: Vec<String> = match override_electorate_path {
        Some(p) => read_electorate_file(&p)?,
        None => config.electorate.clone(),
    };

    let (sources, sources_root): (Vec<FileSource>, &Path) = match override_input_path {
        Some(p) => (
            vec![FileSource {
                provider: override_input_type.unwrap_or_else(|| "json".to_string()),
                file_path: p,
            }],
            Path::new(""),
        ),
        None => (config.event_sources.clone(), root_p),
    };
    if sources.is_empty() {
        warn!("run_election: no event sources, the election has no votes");
    }

    let mut events: Vec<Event> = Vec::new();
    for cfs in sources.iter() {
        let mut file_events = read_events(sources_root, cfs)?;
        events.append(&mut file_events);
    }
    info!("run_election: {} events read", events.len());

    let registry = TallyRegistry::new();
    let outcome = registry
        .run(&election, &electorate, &events, &rules)
        .context(TallySnafu {})?;

    // Assemble the final json
    let result_js = build_summary_js(&config, &outcome);
    let pretty_js_stats = serde_json::to_string_pretty(&result_js).context(ParsingJsonSnafu {})?;
    write_summary(&config, root_p, override_out_path, &pretty_js_stats)?;

    // The reference summary, if provided for comparison
    if let Some(summary_p) = check_summary_path {
        let summary_ref = read_summary(summary_p)?;
        debug!("summary: {:?}", summary_ref);
        let pretty_js_summary_ref = serde_json::to_string_pretty(&strip_volatile_fields(&summary_ref))
            .context(ParsingJsonSnafu {})?;
        let pretty_js_computed = serde_json::to_string_pretty(&strip_volatile_fields(&result_js))
            .context(ParsingJsonSnafu {})?;
        if pretty_js_summary_ref != pretty_js_computed {
            warn!("Found differences with the reference summary");
            print_diff(
                pretty_js_summary_ref.as_str(),
                pretty_js_computed.as_str(),
                "\n",
            );
            whatever!("Difference detected between calculated summary and reference summary")
        }
    }

    Ok(result_js)
}

#[cfg(test)]
fn run_election_test(test_name: &str, config_lpath: &str, summary_lpath: &str) {
    let test_dir = format!("{}/tests", env!("CARGO_MANIFEST_DIR"));
    info!("Running test {}", test_name);
    let res = run_election(
        &format!("{}/{}/{}", test_dir, test_name, config_lpath),
        Some(format!("{}/{}/{}", test_dir, test_name, summary_lpath)),
        Some("stdout".to_string()),
        None,
        None,
        None,
    );
    if let Err(e) = res {
        eprintln!("An error occurred {}", e);
        if let Some(bt) = snafu::ErrorCompat::backtrace(&e) {
            eprintln!("trace: {}", bt);
        }
        panic!("test {} failed: {}", test_name, e);
    }
}

#[cfg(test)]
pub fn test_wrapper(test_name: &str) {
    run_election_test(
        test_name,
        format!("{}_config.json", test_name).as_str(),
        format!("{}_expected_summary.json", test_name).as_str(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn test_dir(test_name: &str) -> String {
        format!("{}/tests/{}", env!("CARGO_MANIFEST_DIR"), test_name)
    }

    fn parsed(event_type: &str) -> ParsedEvent {
        ParsedEvent {
            lineno: 3,
            voter: "anna".to_string(),
            event_type: event_type.to_string(),
            answers: None,
            delegate: None,
            timestamp: 10,
            is_public: None,
        }
    }

    #[test]
    fn delegate_election_count() {
        init();
        test_wrapper("delegate_election_count");
    }

    #[test]
    fn delegate_election_count_csv() {
        init();
        run_election_test(
            "delegate_election_count",
            "delegate_election_count_csv_config.json",
            "delegate_election_count_expected_summary.json",
        );
    }

    #[test]
    fn delegation_cycle() {
        init();
        test_wrapper("delegation_cycle");
    }

    #[test]
    fn two_questions_from_csv() {
        init();
        let dir = test_dir("two_questions");
        let js = run_election(
            &format!("{}/two_questions_config.json", dir),
            None,
            Some("stdout".to_string()),
            None,
            None,
            None,
        )
        .unwrap();
        let result = &js["result"];
        // dora is blank on both questions, bob only on the second one.
        assert_eq!(result["total_votes"], json!(4));
        assert_eq!(result["total_delegated_votes"], json!(1));
        assert_eq!(result["dirty_votes"], json!(1));

        let first = &result["counts"][0];
        assert_eq!(first["total_votes"], json!(3));
        assert_eq!(first["dirty_votes"], json!(1));
        assert_eq!(first["answers"][0]["total_count"], json!(2));
        assert_eq!(first["answers"][0]["by_delegation_count"], json!(1));
        assert_eq!(first["answers"][1]["total_count"], json!(1));

        let second = &result["counts"][1];
        assert_eq!(second["total_votes"], json!(2));
        assert_eq!(second["dirty_votes"], json!(2));
        assert_eq!(second["winners"], json!(["bar"]));
        assert_eq!(second["answers"][1]["total_count_percentage"], json!(100.0));

        assert_eq!(
            js["resolutions"]["bob"],
            json!({"a": "direct", "answers": [["bar"], []]})
        );
        assert_eq!(js["resolutions"]["dora"], json!({"a": "blank"}));
    }

    #[test]
    fn input_and_electorate_overrides() {
        init();
        let dir = test_dir("delegate_election_count");
        let js = run_election(
            &format!("{}/delegate_election_count_config.json", dir),
            None,
            Some("stdout".to_string()),
            Some(format!("{}/events.csv", dir)),
            Some("csv".to_string()),
            Some(format!("{}/small_electorate.txt", dir)),
        )
        .unwrap();
        // Only user4 and user5 are left: two direct votes for bar.
        assert_eq!(js["result"]["total_votes"], json!(2));
        assert_eq!(js["result"]["electorate_count"], json!(2));
        assert_eq!(js["result"]["counts"][0]["winners"], json!(["bar"]));
        assert_eq!(js["delegate_counts"], json!([]));
    }

    #[test]
    fn mismatched_reference_fails() {
        init();
        let dir = test_dir("delegate_election_count");
        let res = run_election(
            &format!("{}/delegate_election_count_config.json", dir),
            Some(format!("{}/../delegation_cycle/delegation_cycle_expected_summary.json", dir)),
            Some("stdout".to_string()),
            None,
            None,
            None,
        );
        assert!(matches!(res, Err(TallyCliError::Whatever { .. })));
    }

    #[test]
    fn missing_config_file() {
        init();
        let res = run_election("/nonexistent/config.json", None, None, None, None, None);
        assert!(matches!(res, Err(TallyCliError::OpeningFile { .. })));
    }

    #[test]
    fn validate_vote_and_delegation_events() {
        let mut vote = parsed("vote");
        vote.answers = Some(vec![vec!["foo".to_string()]]);
        vote.is_public = Some(false);
        let mut delegation = parsed("delegation");
        delegation.delegate = Some("bob".to_string());
        let events = validate_events(&[vote, delegation, parsed("cancel_vote")], "src").unwrap();
        assert_eq!(
            events,
            vec![
                Event::direct_vote("anna", &[vec!["foo".to_string()]], 10).secret(),
                Event::delegation("anna", "bob", 10),
                Event::cancel_vote("anna", 10),
            ]
        );
    }

    #[test]
    fn invalid_events() {
        for pe in [parsed("delegation"), parsed("vote"), parsed("abstain")] {
            let res = validate_events(&[pe], "src");
            assert!(
                matches!(res, Err(TallyCliError::InvalidEvent { lineno: 3, .. })),
                "{:?}",
                res
            );
        }
    }

    #[test]
    fn strip_hash_only() {
        let js = json!({"result_hash": "abc", "result": {"result_hash": "kept"}});
        assert_eq!(
            strip_volatile_fields(&js),
            json!({"result": {"result_hash": "kept"}})
        );
    }
}
