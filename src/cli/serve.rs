// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! Appliance run and status commands

use anyhow::{Context, Result};
use decoy::config::AppConfig;
use decoy::lifecycle::Coordinator;

/// Start the interception appliance and serve until interrupted
pub async fn run(config: AppConfig) -> Result<()> {
    let mut coordinator = Coordinator::new(config);

    coordinator
        .start()
        .await
        .context("failed to start appliance")?;

    coordinator.run().await
}

/// Print the effective configuration and redirect table
pub fn status(config: &AppConfig) {
    println!("Current configuration:");
    println!("  Log level:        {}", config.log_level);
    println!("  Proxy upstream:   {}", config.proxy.upstream_url);
    println!("  Proxy port:       {}", config.proxy_port());
    println!("  DNS upstream:     {}", config.upstream_dns());
    println!("  DNS auto-manage:  {}", config.dns.auto_manage_system);

    if !config.proxy.headers.is_empty() {
        println!("  Proxy headers:");
        for (name, value) in &config.proxy.headers {
            println!("    {name}: {value}");
        }
    }

    println!("  DNS redirects ({} total):", config.dns.redirects.len());
    for (i, redirect) in config.dns.redirects.iter().enumerate() {
        let marker = if redirect.enabled { "on " } else { "off" };
        println!(
            "    {}. [{}] {} -> {} ({})",
            i + 1,
            marker,
            redirect.domain,
            redirect.target,
            redirect.description
        );
    }

    if config.simple_mode.enabled {
        println!("  Simple mode:      enabled ({})", config.simple_mode.domain);
    } else {
        println!("  Simple mode:      disabled");
    }
}
