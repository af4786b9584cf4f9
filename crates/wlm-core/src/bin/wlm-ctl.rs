// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! WLM Control CLI
//!
//! Offline checks for workload group definitions and settings.
//!
//! Usage:
//!   wlm-ctl <command> [options]
//!
//! Commands:
//!   validate <file.json>          Validate a list of workload group definitions
//!   check-setting <name> <value>  Validate one search-setting override
//!   settings                      List overridable search settings
//!   config                        Print the resolved WLM configuration

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info};
use wlm_core::config::WlmConfig;
use wlm_core::fragment::MutableWorkloadGroupFragment;
use wlm_core::group::WorkloadGroup;
use wlm_core::metadata::WorkloadGroupMetadata;
use wlm_core::resource::ResourceType;
use wlm_core::search_settings::WlmSearchSetting;

fn print_usage() {
    eprintln!(
        r#"Usage: wlm-ctl <command> [options]

Check workload group definitions offline.

COMMANDS:
    validate <file.json>            Validate workload group definitions
    check-setting <name> <value>    Validate a search-setting override
    settings                        List overridable search settings
    config                          Print the resolved configuration

DEFINITION FILE:
    A JSON array of groups. Entries without an "id" are treated as new
    groups and get a generated id.

    [
      {{"name": "analytics", "resiliency_mode": "enforced",
        "resource_limits": {{"cpu": 0.4, "memory": 0.2}},
        "search_settings": {{"timeout": "30s"}}}}
    ]

ENVIRONMENT:
    WLM_MODE                          enabled | disabled | monitor_only (default: enabled)
    WLM_SWEEP_INTERVAL_MS             Sweep period (default: 1000)
    WLM_GROUP_SWEEP_TIMEOUT_MS        Per-group cancellation bound (default: 500)
    WLM_NODE_CPU_DURESS_THRESHOLD     Node CPU duress ratio (default: 0.9)
    WLM_NODE_MEMORY_DURESS_THRESHOLD  Node memory duress ratio (default: 0.9)
    WLM_DURESS_STREAK                 Breaching samples before duress (default: 3)

EXAMPLES:
    wlm-ctl validate ./groups.json
    wlm-ctl check-setting batched_reduce_size 64
"#
    );
}

#[derive(Debug, PartialEq)]
enum Command {
    Validate { path: String },
    CheckSetting { name: String, value: String },
    Settings,
    Config,
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from_vec(&args)
}

fn parse_args_from_vec(args: &[String]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err("No command specified".to_string());
    }

    match args[1].as_str() {
        "help" | "--help" | "-h" => {
            print_usage();
            std::process::exit(0);
        }
        "validate" => {
            let path = args.get(2).ok_or("Definition file required")?.clone();
            Ok(Command::Validate { path })
        }
        "check-setting" => {
            let name = args.get(2).ok_or("Setting name required")?.clone();
            let value = args.get(3).ok_or("Setting value required")?.clone();
            Ok(Command::CheckSetting { name, value })
        }
        "settings" => Ok(Command::Settings),
        "config" => Ok(Command::Config),
        cmd => Err(format!("Unknown command: {}", cmd)),
    }
}

fn main() -> ExitCode {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = "wlm_core=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cmd = match parse_args() {
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    match execute_command(cmd) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn execute_command(cmd: Command) -> Result<()> {
    match cmd {
        Command::Validate { path } => {
            let metadata = load_definitions(Path::new(&path))?;
            println!("{} workload group(s) valid", metadata.len());
            for resource in ResourceType::ALL {
                println!(
                    "  {:<8} allocated {:.2} of 1.00",
                    resource.name(),
                    metadata.allocated(resource)
                );
            }
        }

        Command::CheckSetting { name, value } => {
            let setting = WlmSearchSetting::from_key(&name)
                .with_context(|| format!("Unknown search setting: {}", name))?;
            setting.validate(&value)?;
            println!("{}={} is valid ({})", name, value, setting.merge_strategy());
        }

        Command::Settings => {
            for setting in WlmSearchSetting::ALL {
                println!("{:<32} {}", setting.name(), setting.merge_strategy());
            }
        }

        Command::Config => {
            let config = WlmConfig::from_env()?;
            info!(mode = %config.mode, "Configuration loaded");
            println!("mode                      {}", config.mode);
            println!("sweep_interval_ms         {}", config.sweep_interval.as_millis());
            println!("group_sweep_timeout_ms    {}", config.group_sweep_timeout.as_millis());
            println!("cpu_duress_threshold      {}", config.duress.cpu_threshold);
            println!("memory_duress_threshold   {}", config.duress.memory_threshold);
            println!("duress_streak             {}", config.duress.streak);
        }
    }
    Ok(())
}

/// Read and validate a definition file.
fn load_definitions(path: &Path) -> Result<WorkloadGroupMetadata> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let entries: Vec<Value> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array", path.display()))?;

    let mut groups = Vec::with_capacity(entries.len());
    for (index, entry) in entries.iter().enumerate() {
        let group = parse_definition(entry)
            .with_context(|| format!("Invalid workload group at index {}", index))?;
        debug!(workload_group_id = %group.id(), name = %group.name(), "Parsed definition");
        groups.push(group);
    }

    Ok(WorkloadGroupMetadata::validated(groups)?)
}

fn parse_definition(entry: &Value) -> Result<WorkloadGroup> {
    if entry.get("id").is_some() {
        return Ok(serde_json::from_value(entry.clone())?);
    }
    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .context("name is required")?;
    let fragment = MutableWorkloadGroupFragment::from_json(entry)?;
    Ok(WorkloadGroup::create(name, fragment)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    // Helper to create args vector from string slice
    fn args(a: &[&str]) -> Vec<String> {
        a.iter().map(|s| s.to_string()).collect()
    }

    fn definition_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_args_from_vec(&args(&["wlm-ctl", "validate", "groups.json"])).unwrap(),
            Command::Validate {
                path: "groups.json".to_string()
            }
        );
        assert_eq!(
            parse_args_from_vec(&args(&["wlm-ctl", "check-setting", "timeout", "30s"])).unwrap(),
            Command::CheckSetting {
                name: "timeout".to_string(),
                value: "30s".to_string()
            }
        );
        assert_eq!(
            parse_args_from_vec(&args(&["wlm-ctl", "settings"])).unwrap(),
            Command::Settings
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_args_from_vec(&args(&["wlm-ctl"])).is_err());
        assert!(parse_args_from_vec(&args(&["wlm-ctl", "validate"])).is_err());
        assert!(parse_args_from_vec(&args(&["wlm-ctl", "check-setting", "timeout"])).is_err());
        let err = parse_args_from_vec(&args(&["wlm-ctl", "frobnicate"])).unwrap_err();
        assert!(err.contains("frobnicate"));
    }

    #[test]
    fn test_load_valid_definitions() {
        let file = definition_file(
            r#"[
                {"name": "analytics", "resiliency_mode": "enforced",
                 "resource_limits": {"cpu": 0.4, "memory": 0.2},
                 "search_settings": {"timeout": "30s"}},
                {"id": "fixed-id", "name": "users", "resiliency_mode": "soft",
                 "resource_limits": {"cpu": 0.6},
                 "created_at": "2025-01-01T00:00:00Z"}
            ]"#,
        );

        let metadata = load_definitions(file.path()).unwrap();
        assert_eq!(metadata.len(), 2);
        assert!(metadata.contains("fixed-id"));
        assert!(metadata.find_by_name("analytics").is_some());
    }

    #[test]
    fn test_load_rejects_over_allocation() {
        let file = definition_file(
            r#"[
                {"name": "a", "resiliency_mode": "soft", "resource_limits": {"cpu": 0.7}},
                {"name": "b", "resiliency_mode": "soft", "resource_limits": {"cpu": 0.4}}
            ]"#,
        );
        let err = load_definitions(file.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("cpu"));
    }

    #[test]
    fn test_load_reports_bad_entry() {
        let file = definition_file(
            r#"[{"name": "a", "resiliency_mode": "soft",
                 "search_settings": {"batched_reduce_size": "1"}}]"#,
        );
        let err = format!("{:#}", load_definitions(file.path()).unwrap_err());
        assert!(err.contains("index 0"));
        assert!(err.contains("must be >= 2"));

        let file = definition_file(r#"{"name": "a"}"#);
        assert!(load_definitions(file.path()).is_err());
    }
}
