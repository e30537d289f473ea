// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Administrative CLI for graphdb-trust.
//!
//! This binary is operational tooling around the library core — verifying an
//! audit directory's hash chain, issuing a bootstrap admin token, and
//! inspecting an API key snapshot file. It does not expose the HTTP route
//! surface; that lives in the host server that embeds this crate.

use clap::{Parser, Subcommand};
use graphdb_trust::audit::export::{self, ExportFilter};
use graphdb_trust::audit::persistent::verify_integrity;
use graphdb_trust::error::ErrorBuilder;
use graphdb_trust::{ApiKeyStore, Role, TokenManager};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "graphdb-trust", version, about = "Trust/access/audit admin tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Audit log operations.
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },
    /// Issue a bootstrap local access token for an administrator.
    IssueBootstrapToken {
        /// Base64 or raw UTF-8 HMAC secret, at least 32 bytes.
        #[arg(long)]
        secret: String,
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        username: String,
    },
    /// Inspect an API key snapshot file, listing keys for one owner.
    InspectSnapshot {
        #[arg(long)]
        path: PathBuf,
        #[arg(long)]
        owner: String,
    },
}

#[derive(Subcommand)]
enum AuditCommand {
    /// Verify the hash chain of a single audit segment file.
    Verify {
        #[arg(long)]
        segment: PathBuf,
    },
    /// Export matching events from an audit directory.
    Export {
        #[arg(long)]
        dir: PathBuf,
        #[arg(long, value_enum, default_value = "ndjson")]
        format: ExportFormat,
        #[arg(long)]
        username: Option<String>,
        /// 0 = unlimited.
        #[arg(long, default_value_t = 0)]
        max_results: usize,
    },
}

#[derive(Clone, clap::ValueEnum)]
enum ExportFormat {
    Json,
    Ndjson,
    Csv,
    Syslog,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if let Err(err) = run(cli) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(cli: Cli) -> Result<(), String> {
    match cli.command {
        Command::Audit { command } => run_audit(command),
        Command::IssueBootstrapToken { secret, user_id, username } => {
            let manager = TokenManager::new(secret.into_bytes())
                .map_err(|e| ErrorBuilder::new("Cannot build token manager").cause(e.to_string()).build())?;
            let token = manager
                .issue_access_token(&user_id, &username, Role::Admin)
                .map_err(|e| ErrorBuilder::new("Cannot issue bootstrap token").cause(e.to_string()).build())?;
            println!("{token}");
            Ok(())
        }
        Command::InspectSnapshot { path, owner } => {
            let loaded = ApiKeyStore::load_snapshot(&path).map_err(|e| {
                ErrorBuilder::new("Cannot load snapshot")
                    .cause(e.to_string())
                    .fix("Check the --path argument")
                    .build()
            })?;
            println!("{:#?}", loaded.list_for_owner(&owner));
            Ok(())
        }
    }
}

fn run_audit(command: AuditCommand) -> Result<(), String> {
    match command {
        AuditCommand::Verify { segment } => {
            verify_integrity(&segment).map_err(|e| {
                ErrorBuilder::new("Audit segment failed integrity check")
                    .cause(e.to_string())
                    .fix("Inspect the segment for truncation or tampering")
                    .build()
            })?;
            println!("ok: {} is intact", segment.display());
            Ok(())
        }
        AuditCommand::Export { dir, format, username, max_results } => {
            let filter = ExportFilter {
                username,
                max_results,
                ..Default::default()
            };
            let events = export::scan_segments(&dir, &filter)
                .map_err(|e| ErrorBuilder::new("Cannot scan audit directory").cause(e.to_string()).build())?;
            let rendered = match format {
                ExportFormat::Json => export::export_json_array(&events),
                ExportFormat::Ndjson => export::export_ndjson(&events),
                ExportFormat::Csv => export::export_csv(&events),
                ExportFormat::Syslog => export::export_syslog(&events),
            }
            .map_err(|e| ErrorBuilder::new("Cannot render export").cause(e.to_string()).build())?;
            println!("{rendered}");
            Ok(())
        }
    }
}
