//! Config command - shows the resolved configuration and paths

use crate::cli::context::{resolve_config, GlobalArgs};
use modflow_orchestrator::config::{default_config_path, logs_dir, modflow_home};
use modflow_orchestrator::OrchestratorConfig;
use serde_json::{json, Value};

#[derive(Debug)]
pub struct ConfigArgs {
    /// Show resolved configuration in JSON format
    pub json: bool,
}

fn redacted(config: &OrchestratorConfig) -> Option<&'static str> {
    config.api_key.as_ref().map(|_| "<redacted>")
}

fn to_json(config: &OrchestratorConfig, args: &GlobalArgs) -> Value {
    let config_file = args.config.clone().unwrap_or_else(default_config_path);
    let logs = logs_dir();
    json!({
        "home": modflow_home().to_string_lossy(),
        "config_file": {
            "path": config_file.to_string_lossy(),
            "exists": config_file.exists(),
        },
        "logs": {
            "path": logs.to_string_lossy(),
            "exists": logs.exists(),
        },
        "service": {
            "base_url": config.base_url,
            "api_key": redacted(config),
            "poll_interval_secs": config.poll_interval_secs,
            "timeout_secs": config.timeout_secs,
            "request_timeout_secs": config.request_timeout_secs,
        },
    })
}

/// Run the config command
pub fn run(args: ConfigArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    let config = resolve_config(global)?;
    let resolved = to_json(&config, global);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&resolved)?);
        return Ok(());
    }

    let exists = |value: &Value| if value.as_bool() == Some(true) { "exists" } else { "not found" };
    println!("MODFLOW CONFIGURATION");
    println!("=====================");
    println!();
    println!("Home:        {}", modflow_home().display());
    println!(
        "Config file: {} ({})",
        resolved["config_file"]["path"].as_str().unwrap_or_default(),
        exists(&resolved["config_file"]["exists"])
    );
    println!(
        "Logs:        {} ({})",
        resolved["logs"]["path"].as_str().unwrap_or_default(),
        exists(&resolved["logs"]["exists"])
    );
    println!();
    println!("Service:     {}", config.base_url);
    println!("API key:     {}", redacted(&config).unwrap_or("(none)"));
    println!("Poll every:  {}s", config.poll_interval_secs);
    println!("Give up at:  {}s", config.timeout_secs);
    println!("Per request: {}s", config.request_timeout_secs);
    Ok(())
}
