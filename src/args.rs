use clap::Parser;

/// This is a tallying program for elections with vote delegation.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The file containing the election description in JSON format: questions,
    /// electorate, event sources and rules. See the manual of liquid_tally for the format.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference file containing the outcome of an election in JSON format. If provided,
    /// agoratally will check that the tallied output matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) If specified, the summary of the election will be written in JSON
    /// format to the given location. Setting this option overrides the output directory that may be
    /// specified with the --config option.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (file path or empty) If specified, the event log to read. Setting this option overrides the
    /// event sources of the --config option.
    #[clap(short, long, value_parser)]
    pub input: Option<String>,

    /// (default json) The type of the input: json or csv. Only used with --input.
    #[clap(long, value_parser)]
    pub input_type: Option<String>,

    /// (file path or empty) If specified, a file with one member of the electorate per line. Setting
    /// this option overrides the electorate of the --config option.
    #[clap(long, value_parser)]
    pub electorate: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
