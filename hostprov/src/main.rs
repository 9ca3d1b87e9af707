//! hostprov - Entry Point
//!
//! Registers hosts and provisions user accounts on them over SSH.
//! Runs the HTTP API by default; `--register` and `--provision` run a
//! single operation from the command line.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use secrecy::SecretString;
use tracing::{error, info, warn};

use hostprov::app::options::AppOptions;
use hostprov::app::run::run;
use hostprov::app::state::AppState;
use hostprov::errors::ProvisionError;
use hostprov::filesys::file::File;
use hostprov::logs::{init_logging, LogOptions};
use hostprov::provision::report::ReportEntry;
use hostprov::provision::Provisioner;
use hostprov::storage::layout::StorageLayout;
use hostprov::storage::settings::Settings;
use hostprov::utils::version_info;

const PASSWORD_ENV: &str = "HOSTPROV_ROOT_PASSWORD";

#[tokio::main]
async fn main() -> ExitCode {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return ExitCode::SUCCESS;
    }

    let layout = match cli_args.get("data-dir") {
        Some(dir) => StorageLayout::new(dir),
        None => StorageLayout::default(),
    };

    // Retrieve the settings file
    let settings_file = match cli_args.get("config") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };
    let settings = match load_settings(&settings_file).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file {:?}: {}", settings_file.path(), e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.log_json,
        log_dir: settings
            .log_to_file
            .then(|| layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(&settings, layout);

    if cli_args.contains_key("register") {
        return register(&cli_args, &options).await;
    }
    if cli_args.contains_key("provision") {
        return provision(&cli_args, &options).await;
    }

    info!("Running hostprov with options: {:?}", options);
    match run(options, await_shutdown_signal()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to run hostprov: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn load_settings(file: &File) -> Result<Settings, ProvisionError> {
    if !file.exists().await {
        return Ok(Settings::default());
    }
    file.read_json::<Settings>().await
}

async fn provisioner(options: &AppOptions) -> Result<Arc<Provisioner>, ProvisionError> {
    let state = AppState::init(options).await?;
    Ok(state.provisioner)
}

fn required<'a>(cli_args: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    match cli_args.get(key).map(String::as_str) {
        Some(value) if !value.is_empty() => Some(value),
        _ => {
            eprintln!("{} --{}=<value> is required", "error:".red().bold(), key);
            None
        }
    }
}

async fn register(cli_args: &HashMap<String, String>, options: &AppOptions) -> ExitCode {
    let (Some(host), Some(root_user)) = (
        required(cli_args, "host"),
        required(cli_args, "root-user"),
    ) else {
        return ExitCode::FAILURE;
    };

    let password = match cli_args.get("root-password") {
        Some(password) => {
            warn!("Passing the root password on the command line exposes it to other local users; prefer {}", PASSWORD_ENV);
            password.clone()
        }
        None => match env::var(PASSWORD_ENV) {
            Ok(password) => password,
            Err(_) => {
                eprintln!(
                    "{} pass the root password with --root-password=<value> or {}",
                    "error:".red().bold(),
                    PASSWORD_ENV
                );
                return ExitCode::FAILURE;
            }
        },
    };

    let provisioner = match provisioner(options).await {
        Ok(provisioner) => provisioner,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    match provisioner
        .register_host(host, root_user, SecretString::from(password))
        .await
    {
        Ok(()) => {
            println!("{} {}", "Registered".green().bold(), host.trim());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn provision(cli_args: &HashMap<String, String>, options: &AppOptions) -> ExitCode {
    let (Some(host), Some(csv_path)) = (required(cli_args, "host"), required(cli_args, "csv"))
    else {
        return ExitCode::FAILURE;
    };

    let csv = match File::new(csv_path).read_bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{} cannot read {}: {}", "error:".red().bold(), csv_path, e);
            return ExitCode::FAILURE;
        }
    };

    let provisioner = match provisioner(options).await {
        Ok(provisioner) => provisioner,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let report = match provisioner.provision(host, csv.as_slice()).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    for entry in report.entries() {
        let text = entry.text().trim_end_matches('\n');
        match entry {
            ReportEntry::Skipped(_) | ReportEntry::Notice(_) => println!("{}", text.yellow()),
            ReportEntry::Failure(_) | ReportEntry::RegistryFailure(_) => {
                println!("{}", text.red().bold())
            }
            ReportEntry::Output(_) => println!("{}", text),
        }
    }

    if report.is_success() {
        println!(
            "{} {} account(s) on {}",
            "Recorded".green().bold(),
            report.recorded.len(),
            report.host_id
        );
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    warn!("Unable to install signal handlers, falling back to Ctrl+C");
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!("Failed to listen for Ctrl+C: {}", e);
                    }
                    return;
                }
            };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
