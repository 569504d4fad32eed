//! Config validation CLI tool
//!
//! Validates a shiftd configuration file and reports any errors.

use shiftlog_util::default_config_path;
use std::path::PathBuf;
use std::process::ExitCode;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a shiftd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match shiftlog_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", shiftlog_config::CURRENT_CONFIG_VERSION);
            println!("  Office endpoint: {}", settings.office.endpoint);
            println!(
                "  Request timeout: {}s",
                settings.office.request_timeout.as_secs()
            );
            println!(
                "  Reconciliation poll: every {}s",
                settings.sync.poll_interval.as_secs()
            );
            println!("  Socket: {}", settings.service.socket_path.display());
            println!("  Data dir: {}", settings.service.data_dir.display());
            ExitCode::SUCCESS
        }
        Err(shiftlog_config::ConfigError::ValidationFailed { errors }) => {
            eprintln!("✗ Configuration has {} error(s):", errors.len());
            for error in errors {
                eprintln!("  - {}", error);
            }
            ExitCode::from(1)
        }
        Err(e) => {
            eprintln!("✗ Failed to load configuration: {}", e);
            ExitCode::from(1)
        }
    }
}
