mod args;
mod tally;

use clap::Parser;
use log::{debug, info};
use snafu::ErrorCompat;

use crate::args::Args;

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    debug!("args: {:?}", args);

    let res = tally::run_election(
        &args.config,
        args.reference.clone(),
        args.out.clone(),
        args.input.clone(),
        args.input_type.clone(),
        args.electorate.clone(),
    );

    match res {
        Ok(_) => info!("Tally completed"),
        Err(e) => {
            eprintln!("An error occurred: {}", e);
            if let Some(bt) = ErrorCompat::backtrace(&e) {
                eprintln!("trace: {}", bt);
            }
            std::process::exit(1);
        }
    }
}
