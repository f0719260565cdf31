use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use votechain_core::VoteError;

mod cli;
mod commands;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("votechain=info"));
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = config::Config::load(&args.config)?;
    ensure_data_dirs(&config);

    if let Err(err) = commands::run(args.command, config).await {
        match err.downcast_ref::<VoteError>() {
            Some(vote_err) => {
                tracing::error!(code = vote_err.error_code(), "{vote_err}");
                eprintln!("error [{}]: {vote_err}", vote_err.error_code());
            }
            None => {
                tracing::error!("{err:#}");
                eprintln!("error: {err:#}");
            }
        }
        std::process::exit(1);
    }
    Ok(())
}

/// Create parent directories for the local database, session and preferences.
fn ensure_data_dirs(config: &config::Config) {
    let mut files = vec![config.session_path(), config.prefs_path()];
    if let Some(db_path) = config::sqlite_file_path(&config.store.database_url) {
        files.push(db_path);
    }
    for file in files {
        let Some(dir) = file.parent().filter(|d| !d.as_os_str().is_empty()) else {
            continue;
        };
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!("could not create data directory {}: {}", dir.display(), e);
        }
    }
}
