use std::process::ExitCode;

use clap::Parser;
use elastic_log::{argparse::Cli, logger::init_logger, run};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{}", err);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
