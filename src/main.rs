//! oauth-relay - OAuth 2.0 Authorization Code middleware
//!
//! Exchanges authorization codes for tokens on behalf of browser-only SPAs
//! and delivers the result in the redirect fragment.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::error;

use oauth_relay::{
    cli::{Cli, Command},
    reload,
    server::{Relay, RelayOptions},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Check) => run_check(&cli.config),
        Some(Command::Serve) | None => run_server(cli).await,
    }
}

/// Validate a configuration file and report what it contains.
fn run_check(path: &Path) -> ExitCode {
    match check_config(path) {
        Ok(summary) => {
            println!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{}: {e}", path.display());
            ExitCode::FAILURE
        }
    }
}

/// Decode a configuration file into a one-line summary.
fn check_config(path: &Path) -> oauth_relay::Result<String> {
    let doc = reload::load_document(path)?;
    Ok(format!(
        "{}: ok ({} tenant(s), port {}, sample period {}s)",
        path.display(),
        doc.tenants.len(),
        doc.local.http_port,
        doc.local.config_sample_period
    ))
}

/// Run the relay server until shutdown.
async fn run_server(cli: Cli) -> ExitCode {
    let relay = Relay::new(RelayOptions {
        config_path: cli.config,
        host: cli.host,
        port_override: cli.port,
        crash_on_bind: cli.crash_on_bind,
    });

    if let Err(e) = relay.run().await {
        error!("Relay error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("oauth_relay_main_{}_{name}", std::process::id()))
    }

    // =====================================================================
    // check_config
    // =====================================================================

    #[test]
    fn check_accepts_valid_config() {
        let path = temp_path("check_ok.json");
        std::fs::write(&path, r#"[{"port": 3000}]"#).unwrap();
        let summary = check_config(&path).unwrap();
        assert!(summary.contains("0 tenant(s), port 3000"), "got: {summary}");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn check_rejects_broken_config() {
        let path = temp_path("check_bad.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(check_config(&path).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn check_rejects_missing_file() {
        assert!(check_config(&temp_path("check_absent.json")).is_err());
    }

    // =====================================================================
    // CLI parsing
    // =====================================================================

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["oauth-relay"]);
        assert_eq!(cli.config, PathBuf::from("build/config.json"));
        assert_eq!(cli.host, "127.0.0.1");
        assert_eq!(cli.port, None);
        assert!(!cli.crash_on_bind);
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_port_override() {
        let cli = Cli::parse_from(["oauth-relay", "--port", "8080"]);
        assert_eq!(cli.port, Some(8080));
    }

    #[test]
    fn cli_check_subcommand() {
        let cli = Cli::parse_from(["oauth-relay", "check", "--config", "x.json"]);
        assert!(matches!(cli.command, Some(Command::Check)));
        assert_eq!(cli.config, PathBuf::from("x.json"));
    }

    #[test]
    fn cli_serve_subcommand_is_explicit_default() {
        let cli = Cli::parse_from(["oauth-relay", "serve"]);
        assert!(matches!(cli.command, Some(Command::Serve)));
    }

    #[test]
    fn cli_host_log_and_bind_flags() {
        let cli = Cli::parse_from([
            "oauth-relay",
            "--host",
            "0.0.0.0",
            "--log-level",
            "debug",
            "--log-format",
            "json",
            "--crash-on-bind",
        ]);
        assert_eq!(cli.host, "0.0.0.0");
        assert_eq!(cli.log_level, "debug");
        assert_eq!(cli.log_format.as_deref(), Some("json"));
        assert!(cli.crash_on_bind);
    }

    #[test]
    fn check_summary_counts_tenants() {
        let path = temp_path("check_tenants.json");
        std::fs::write(
            &path,
            r#"[{"port": 8080},
                {"tokenUri":"t","clientId":"c","clientSecret":"s","redirectBackHosts":[]}]"#,
        )
        .unwrap();
        let summary = check_config(&path).unwrap();
        assert!(summary.contains("1 tenant(s), port 8080"), "got: {summary}");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn check_never_prints_the_secret() {
        let path = temp_path("check_secret.json");
        std::fs::write(
            &path,
            r#"[{"tokenUri":"t","clientId":"c","clientSecret":"tops3cr3t",
                "redirectBackHosts":[]}]"#,
        )
        .unwrap();
        let summary = check_config(&path).unwrap();
        assert!(!summary.contains("tops3cr3t"));
        std::fs::remove_file(&path).ok();
    }
}
