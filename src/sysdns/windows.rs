// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! Windows system-DNS management via `netsh interface ipv4`

use anyhow::{Context, Result};
use std::net::IpAddr;

use super::{run_tool, DnsSnapshot};

const LOCAL_DNS: &str = "127.0.0.1";

/// Enumerate interfaces and their statically configured IPv4 resolvers.
/// Interfaces whose resolvers come from DHCP are recorded with an empty
/// list.
pub fn capture() -> Result<DnsSnapshot> {
    let output = run_tool("netsh", &["interface", "ipv4", "show", "dnsservers"])
        .context("failed to get Windows DNS settings")?;
    Ok(parse_dnsservers_output(&output))
}

/// Point every captured interface at the local resolver. Returns the number
/// of interfaces successfully mutated.
pub fn apply(snapshot: &DnsSnapshot) -> Result<usize> {
    let mut mutated = 0;
    for interface in snapshot.keys() {
        match run_tool(
            "netsh",
            &[
                "interface",
                "ipv4",
                "set",
                "dnsservers",
                interface.as_str(),
                "static",
                LOCAL_DNS,
                "primary",
            ],
        ) {
            Ok(_) => {
                tracing::debug!("Set DNS for interface {} to {}", interface, LOCAL_DNS);
                mutated += 1;
            }
            Err(e) => tracing::warn!("Failed to set DNS for interface {}: {}", interface, e),
        }
    }
    Ok(mutated)
}

/// Write the captured settings back: DHCP for interfaces captured empty,
/// primary plus indexed secondaries otherwise
pub fn restore(snapshot: &DnsSnapshot) {
    for (interface, servers) in snapshot {
        for args in restore_commands(interface, servers) {
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            if let Err(e) = run_tool("netsh", &args) {
                tracing::warn!("Failed to restore DNS for interface {}: {}", interface, e);
            }
        }
    }
}

/// Set every enumerable interface back to DHCP DNS. Returns the number of
/// interfaces reset.
pub fn reset_all() -> Result<usize> {
    let snapshot = capture()?;
    let mut reset = 0;
    for interface in snapshot.keys() {
        match run_tool(
            "netsh",
            &[
                "interface",
                "ipv4",
                "set",
                "dnsservers",
                interface.as_str(),
                "dhcp",
            ],
        ) {
            Ok(_) => reset += 1,
            Err(e) => tracing::warn!("Failed to reset DNS for interface {}: {}", interface, e),
        }
    }
    Ok(reset)
}

/// The netsh invocations that put one interface back to its captured state
fn restore_commands(interface: &str, servers: &[String]) -> Vec<Vec<String>> {
    fn owned(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    if servers.is_empty() {
        return vec![owned(&[
            "interface", "ipv4", "set", "dnsservers", interface, "dhcp",
        ])];
    }

    let mut commands = vec![owned(&[
        "interface",
        "ipv4",
        "set",
        "dnsservers",
        interface,
        "static",
        servers[0].as_str(),
        "primary",
    ])];

    for (i, server) in servers[1..].iter().enumerate() {
        let mut command = owned(&[
            "interface", "ipv4", "add", "dnsservers", interface, server.as_str(),
        ]);
        command.push(format!("index={}", i + 2));
        commands.push(command);
    }

    commands
}

/// Parse `netsh interface ipv4 show dnsservers` output. Every interface
/// gets an entry; only statically configured servers are recorded, so
/// DHCP-managed interfaces come out empty.
fn parse_dnsservers_output(output: &str) -> DnsSnapshot {
    let mut snapshot = DnsSnapshot::new();
    let mut current: Option<String> = None;
    let mut in_static_block = false;

    for line in output.lines() {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("Configuration for interface") {
            let name = rest.trim().trim_matches('"').to_string();
            if !name.is_empty() {
                snapshot.entry(name.clone()).or_default();
                current = Some(name);
                in_static_block = false;
            }
            continue;
        }

        let Some(interface) = current.clone() else {
            continue;
        };

        if let Some((label, value)) = line.split_once(':') {
            in_static_block = label.contains("Statically Configured DNS Servers");
            if in_static_block {
                if let Ok(ip) = value.trim().parse::<IpAddr>() {
                    snapshot.entry(interface).or_default().push(ip.to_string());
                }
            }
            continue;
        }

        // Continuation lines carry additional servers of the same block
        if in_static_block {
            if let Ok(ip) = line.parse::<IpAddr>() {
                snapshot.entry(interface).or_default().push(ip.to_string());
            }
        }
    }

    snapshot
}
