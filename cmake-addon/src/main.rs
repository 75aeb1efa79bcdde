//! cmake-addon - build native Node.js, Electron and NW.js addons with CMake

mod cli;
mod commands;

use cli::LogLevel;

fn init_logging(level: Option<LogLevel>) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = level {
        builder.filter_level(level.filter());
    }
    builder.format_timestamp(None).format_target(false).init();
}

#[tokio::main]
async fn main() {
    let args = cli::parse_command_line_args();
    init_logging(args.log_level);
    let verbose = args.log_level.map(|l| l.is_verbose()).unwrap_or(false);

    if let Err(e) = commands::run(args).await {
        if verbose {
            log::error!("{:?}", e);
        } else {
            log::error!("{:#}", e);
        }
        std::process::exit(1);
    }
}
