use serde::Serialize;

use crate::cli::ConfigCommands;
use crate::config::{default_config_path, CliConfig};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ConfigView<'a> {
    path: String,
    remote_url: Option<&'a str>,
    api_token: Option<&'static str>,
    owner_id: Option<&'a str>,
    timeout_secs: u64,
    retry_limit: u32,
}

pub fn run_config(command: ConfigCommands, effective: &CliConfig) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            remote_url,
            api_token,
            owner_id,
            timeout_secs,
            retry_limit,
        } => {
            let path = default_config_path();
            let mut config = CliConfig::load_from_path(&path).map_err(CliError::Config)?;
            merge_init_values(
                &mut config,
                remote_url,
                api_token,
                owner_id,
                timeout_secs,
                retry_limit,
            );
            config.validate().map_err(CliError::Config)?;
            let saved_to = config.save().map_err(CliError::Config)?;
            println!("Saved configuration to {}", saved_to.display());
            Ok(())
        }
        ConfigCommands::Show { json } => show_config(effective, json),
    }
}

/// Explicit flags win; unset flags keep the stored value
pub fn merge_init_values(
    config: &mut CliConfig,
    remote_url: Option<String>,
    api_token: Option<String>,
    owner_id: Option<String>,
    timeout_secs: Option<u64>,
    retry_limit: Option<u32>,
) {
    if remote_url.is_some() {
        config.remote_url = remote_url;
    }
    if api_token.is_some() {
        config.api_token = api_token;
    }
    if owner_id.is_some() {
        config.owner_id = owner_id;
    }
    if timeout_secs.is_some() {
        config.timeout_secs = timeout_secs;
    }
    if retry_limit.is_some() {
        config.retry_limit = retry_limit;
    }
}

fn show_config(config: &CliConfig, as_json: bool) -> Result<(), CliError> {
    let sync_config = config.sync_config();
    let view = ConfigView {
        path: default_config_path().display().to_string(),
        remote_url: config.remote_url.as_deref(),
        api_token: config.api_token.as_ref().map(|_| "[redacted]"),
        owner_id: config.owner_id.as_deref(),
        timeout_secs: sync_config.remote_timeout.as_secs(),
        retry_limit: sync_config.retry_limit,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("config:       {}", view.path);
    println!("remote_url:   {}", view.remote_url.unwrap_or("(not set)"));
    println!("api_token:    {}", view.api_token.unwrap_or("(not set)"));
    println!("owner_id:     {}", view.owner_id.unwrap_or("(not set)"));
    println!("timeout_secs: {}", view.timeout_secs);
    println!("retry_limit:  {}", view.retry_limit);
    Ok(())
}
