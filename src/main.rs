use std::process::ExitCode;

use clap::Parser;

use callgraph_db::cli::{run, Cli};
use callgraph_db::observability::init_logging;

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match run(&cli, &mut out) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
