#![forbid(unsafe_code)]

//! ccmh: climate-control HIL test harness CLI entry point.

use clap::Parser;

mod cli_app;

fn main() {
    let args = cli_app::Cli::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("CCMH_LOG", cli_app::log_level(&args).as_str()),
    )
    .init();

    if let Err(e) = cli_app::run(&args) {
        eprintln!("ccmh: {e}");
        std::process::exit(e.exit_code());
    }
}
