mod cli;
mod logging;

use std::process;

use clap::Parser;
use cli::args::Cli;
use pat_core::error::PatError;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    logging::init(cli.verbose);

    match cli::run(cli) {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<PatError>().and_then(PatError::exit_code) {
            Some(code) => {
                eprintln!("error: {err}");
                process::exit(code);
            }
            None => Err(err),
        },
    }
}
