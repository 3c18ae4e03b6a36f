use clap::Parser;
use log::{error, info};

use remindr::{App, Cli, Commands, Config};

pub fn initialize_logger(default_filter: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp_secs()
        .format_module_path(true)
        .init();

    info!("Logger initialized");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // One-shot commands stay quiet unless asked; the daemon reports what it does.
    let default_filter = match (&cli.command, cli.verbose) {
        (_, true) => "debug",
        (Commands::Run, false) | (Commands::Add { wait: true, .. }, false) => "info",
        _ => "warn",
    };
    initialize_logger(default_filter);

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let mut config = match Config::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(data_dir) = cli.data_dir.clone() {
        config.data_dir = data_dir;
    }

    let mut app = App::new(config, config_path, cli.verbose);
    if let Err(e) = app.run(cli.command).await {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
