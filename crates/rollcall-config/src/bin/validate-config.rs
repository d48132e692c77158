//! Config validation CLI tool
//!
//! Validates a rollcall configuration file and reports any errors.

use rollcall_util::default_config_path;
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
            eprintln!("Validates a rollcall configuration file.");
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match rollcall_config::load_config(&config_path) {
        Ok(config) => {
            let rules = &config.rules;
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", rollcall_config::CURRENT_CONFIG_VERSION);
            println!("  Data dir: {}", config.service.data_dir.display());
            println!("  Sessions per class per day: {}", rules.max_sessions_per_day);
            println!(
                "  Registration closes: {} min before start",
                rules.registration_lead.num_minutes()
            );
            println!("  Late window: {} min", rules.late_window.num_minutes());
            println!("  Face match threshold: {:.2}", rules.face_match_threshold);
            match &config.face_matcher {
                Some(matcher) => println!("  Face matcher: {}", matcher.endpoint),
                None => println!("  Face matcher: not configured"),
            }

            if !config.classes.is_empty() {
                println!();
                println!("Classes:");
                for class in &config.classes {
                    let location = match class.reference_point {
                        Some(p) => format!("{} @ {:.5},{:.5}", class.location, p.latitude, p.longitude),
                        None => class.location.clone(),
                    };
                    println!("  - {}: {} [{}]", class.code, class.name, location);
                }
            }

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                rollcall_config::ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                rollcall_config::ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                rollcall_config::ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                rollcall_config::ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver,
                        rollcall_config::CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
