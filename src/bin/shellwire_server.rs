//!
//! shellwire server binary
//! -----------------------
//! Command-line entry point for starting the shellwire shell service.
//! Supports configuration via CLI flags and environment variables; flags win.

use anyhow::Result;
use std::env;

use shellwire::config::{AuthStrategy, ShellConfig};
use shellwire::server::{self, ShellState};

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    let mut i = 0;
    while i < args.len() {
        if args[i] == flag && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        i += 1;
    }
    None
}

fn parse_csv_arg(args: &[String], flag: &str) -> Option<Vec<String>> {
    let raw = parse_str_arg(args, flag)?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

#[tokio::main]
async fn main() -> Result<()> {
    println!(
        r"     _          _ _          _
 ___| |__   ___| | |_      _(_)_ __ ___
/ __| '_ \ / _ \ | \ \ /\ / / | '__/ _ \
\__ \ | | |  __/ | |\ V  V /| | | |  __/
|___/_| |_|\___|_|_| \_/\_/ |_|_|  \___|"
    );

    // Initialize tracing subscriber with env filter if provided
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let args: Vec<String> = env::args().collect();

    if has_flag(&args, "--help") || has_flag(&args, "-h") {
        println!("shellwire server\n\nUSAGE:\n  shellwire_server [--bind ADDR] [--user NAME] [--secret SECRET] [--authorities A,B] [--prompt TEXT]\n\nOPTIONS:\n  --bind ADDR         Listen address (env: SHELLWIRE_BIND, default 127.0.0.1:2222)\n  --user NAME         Fixed-credential user (env: SHELLWIRE_USER, default shellwire)\n  --secret SECRET     Fixed-credential secret (env: SHELLWIRE_SECRET, default shellwire)\n  --authorities A,B   Authorities granted to the fixed user (env: SHELLWIRE_AUTHORITIES, default ADMIN)\n  --prompt TEXT       Prompt text (env: SHELLWIRE_PROMPT, default 'shellwire> ')\n\nDelegated authentication (SHELLWIRE_AUTH=delegated) is only reachable by\nembedding the library and supplying an external authenticator in code.\n");
        return Ok(());
    }

    // Environment first, then CLI overrides
    let mut config = ShellConfig::from_env();
    if let Some(v) = parse_str_arg(&args, "--bind") {
        config.bind = v;
    }
    if let Some(v) = parse_str_arg(&args, "--prompt") {
        config.prompt = v;
    }
    if let AuthStrategy::Fixed {
        ref mut user,
        ref mut secret,
        ref mut authorities,
    } = config.auth
    {
        if let Some(v) = parse_str_arg(&args, "--user") {
            *user = v;
        }
        if let Some(v) = parse_str_arg(&args, "--secret") {
            *secret = v;
        }
        if let Some(v) = parse_csv_arg(&args, "--authorities") {
            *authorities = v;
        }
    }

    println!("shellwire starting on {}", config.bind);
    tracing::info!("shellwire starting on {}", config.bind);

    let state = ShellState::from_config(config)?;
    server::run(state).await
}
