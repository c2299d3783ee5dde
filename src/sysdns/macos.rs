// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! macOS system-DNS management via `networksetup`
//!
//! Capture walks the active network services. When no service yields a
//! usable snapshot, the host resolver file and `scutil --dns` serve as
//! read-only fallbacks; those entries live under reserved keys and are
//! never written back.

use anyhow::{Context, Result};

use super::{is_reserved_key, run_tool, DnsSnapshot};

const LOCAL_DNS: &str = "127.0.0.1";

/// The `networksetup -getdnsservers` sentinel for automatic (DHCP) mode
const NO_SERVERS_SENTINEL: &str = "aren't any";

pub fn capture() -> Result<DnsSnapshot> {
    let listing = run_tool("networksetup", &["-listallnetworkservices"])
        .context("failed to list network services")?;

    let mut snapshot = DnsSnapshot::new();

    for service in parse_service_list(&listing) {
        if !is_service_active(&service) {
            tracing::debug!("Skipping inactive service: {}", service);
            continue;
        }

        let Ok(output) = run_tool("networksetup", &["-getdnsservers", service.as_str()]) else {
            continue;
        };
        let mut output = output;

        // A service already pointing at localhost means a previous run never
        // restored; reset it to automatic and re-read before capturing.
        if output.contains(LOCAL_DNS) && !output.contains(NO_SERVERS_SENTINEL) {
            tracing::warn!(
                "Service {} already has localhost DNS - resetting to recover from a previous run",
                service
            );
            if let Err(e) = run_tool("sudo", &["networksetup", "-setdnsservers", service.as_str(), "empty"])
            {
                tracing::warn!("Failed to reset DNS for service {}: {}", service, e);
                continue;
            }
            tracing::info!("Reset {} to automatic DNS", service);
            match run_tool("networksetup", &["-getdnsservers", service.as_str()]) {
                Ok(fresh) => output = fresh,
                Err(e) => {
                    tracing::debug!("Failed to re-query DNS for {} after reset: {}", service, e);
                    continue;
                }
            }
        }

        match parse_dns_servers(&output) {
            Some(servers) => {
                tracing::debug!("Captured DNS for service {}: {:?}", service, servers);
                snapshot.insert(service, servers);
            }
            None => continue,
        }
    }

    if snapshot.is_empty() {
        tracing::debug!("No manageable network services found, trying system resolver");
        capture_fallback(&mut snapshot);
    }

    Ok(snapshot)
}

/// Point every captured real service at the local resolver. Returns the
/// number of services successfully mutated.
pub fn apply(snapshot: &DnsSnapshot) -> Result<usize> {
    let mut mutated = 0;

    for service in snapshot.keys() {
        if is_reserved_key(service) {
            continue;
        }
        if !is_service_active(service) {
            tracing::debug!("Skipping inactive service: {}", service);
            continue;
        }

        match run_tool(
            "sudo",
            &["networksetup", "-setdnsservers", service.as_str(), LOCAL_DNS],
        ) {
            Ok(_) => {
                tracing::debug!("Set DNS for service {} to {}", service, LOCAL_DNS);
                mutated += 1;
            }
            Err(e) => tracing::warn!("Failed to set DNS for service {}: {}", service, e),
        }
    }

    Ok(mutated)
}

/// Write the captured settings back: `empty` (automatic) for services
/// captured without static servers, the original list otherwise
pub fn restore(snapshot: &DnsSnapshot) {
    for (service, servers) in snapshot {
        if is_reserved_key(service) {
            continue;
        }

        let mut args: Vec<&str> = vec!["networksetup", "-setdnsservers", service.as_str()];
        if servers.is_empty() {
            args.push("empty");
        } else {
            args.extend(servers.iter().map(String::as_str));
        }

        match run_tool("sudo", &args) {
            Ok(_) => tracing::debug!("Restored DNS for service {}", service),
            Err(e) => tracing::warn!("Failed to restore DNS for service {}: {}", service, e),
        }
    }
}

/// Set every listed service back to automatic DNS. Returns the number of
/// services reset.
pub fn reset_all() -> Result<usize> {
    let listing = run_tool("networksetup", &["-listallnetworkservices"])
        .context("failed to list network services")?;

    let mut reset = 0;
    for service in parse_service_list(&listing) {
        match run_tool("sudo", &["networksetup", "-setdnsservers", service.as_str(), "empty"]) {
            Ok(_) => {
                tracing::debug!("Reset {} to automatic DNS", service);
                reset += 1;
            }
            Err(e) => tracing::warn!("Failed to reset DNS for service {}: {}", service, e),
        }
    }

    Ok(reset)
}

/// A service is active when it has an address assigned, or failing that,
/// when its resolver settings can at least be queried (VPN-style services
/// report no standard address info)
fn is_service_active(service: &str) -> bool {
    if let Ok(info) = run_tool("networksetup", &["-getinfo", service]) {
        if getinfo_reports_address(&info) {
            return true;
        }
        if info.contains("not connected") || info.contains("disabled") || info.contains("inactive")
        {
            return false;
        }
    }

    run_tool("networksetup", &["-getdnsservers", service]).is_ok()
}

/// Read the fallback snapshot sources into their reserved keys
fn capture_fallback(snapshot: &mut DnsSnapshot) {
    match std::fs::read_to_string("/etc/resolv.conf") {
        Ok(content) => {
            let servers = parse_resolv_conf(&content);
            if !servers.is_empty() {
                tracing::debug!("Found system DNS via resolv.conf: {:?}", servers);
                snapshot.insert("resolv.conf".to_string(), servers);
            }
        }
        Err(_) => {
            let Ok(output) = run_tool("scutil", &["--dns"]) else {
                return;
            };
            let servers = parse_scutil_dns(&output);
            if !servers.is_empty() {
                tracing::debug!("Found system DNS via scutil: {:?}", servers);
                snapshot.insert("system".to_string(), servers);
            }
        }
    }
}

/// Service names from `-listallnetworkservices`, skipping the explanatory
/// header and disabled (asterisk-prefixed) entries
fn parse_service_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('*') && !line.contains("asterisk"))
        .map(str::to_string)
        .collect()
}

/// Server list from `-getdnsservers`: the sentinel means automatic mode
/// (captured as empty), otherwise one server per line
fn parse_dns_servers(output: &str) -> Option<Vec<String>> {
    let output = output.trim();
    if output.contains(NO_SERVERS_SENTINEL) {
        return Some(Vec::new());
    }

    let servers: Vec<String> = output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if servers.is_empty() {
        None
    } else {
        Some(servers)
    }
}

/// Whether `-getinfo` output shows an assigned IP address
fn getinfo_reports_address(output: &str) -> bool {
    output
        .lines()
        .any(|line| line.contains("IP address:") && !line.contains("none"))
}

fn parse_resolv_conf(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with("nameserver"))
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(str::to_string)
        .collect()
}

/// Nameserver entries from `scutil --dns` (`nameserver[0] : 8.8.8.8`)
fn parse_scutil_dns(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| line.contains("nameserver[") && line.contains(':'))
        .filter_map(|line| line.split(':').nth(1))
        .map(str::trim)
        .filter(|server| !server.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_list_skips_header_and_disabled() {
        let output = "An asterisk (*) denotes that a network service is disabled.\n\
                      Wi-Fi\n\
                      *Thunderbolt Bridge\n\
                      Tailscale\n\n";

        let services = parse_service_list(output);
        assert_eq!(services, vec!["Wi-Fi", "Tailscale"]);
    }

    #[test]
    fn test_parse_dns_servers_sentinel_is_automatic() {
        let output = "There aren't any DNS Servers set on Wi-Fi.\n";
        assert_eq!(parse_dns_servers(output), Some(Vec::new()));
    }

    #[test]
    fn test_parse_dns_servers_static_list() {
        let output = "8.8.8.8\n8.8.4.4\n";
        assert_eq!(
            parse_dns_servers(output),
            Some(vec!["8.8.8.8".to_string(), "8.8.4.4".to_string()])
        );
    }

    #[test]
    fn test_parse_dns_servers_blank_output() {
        assert_eq!(parse_dns_servers("\n\n"), None);
    }

    #[test]
    fn test_getinfo_detects_assigned_address() {
        let connected = "DHCP Configuration\nIP address: 192.168.1.10\nSubnet mask: 255.255.255.0\n";
        let unconfigured = "DHCP Configuration\nIP address: none\n";

        assert!(getinfo_reports_address(connected));
        assert!(!getinfo_reports_address(unconfigured));
    }

    #[test]
    fn test_parse_resolv_conf() {
        let content = "# comment\nnameserver 8.8.8.8\nnameserver 1.1.1.1\nsearch local\n";
        assert_eq!(parse_resolv_conf(content), vec!["8.8.8.8", "1.1.1.1"]);
    }

    #[test]
    fn test_parse_scutil_dns() {
        let output = "DNS configuration\n\
                      resolver #1\n\
                      \u{20}\u{20}nameserver[0] : 192.168.1.1\n\
                      \u{20}\u{20}nameserver[1] : 8.8.8.8\n\
                      \u{20}\u{20}flags    : Request A records\n";

        assert_eq!(parse_scutil_dns(output), vec!["192.168.1.1", "8.8.8.8"]);
    }

    #[test]
    fn test_restore_skips_reserved_keys() {
        // Only fallback entries present: restore must not invoke any tool,
        // so this completes without touching the system
        let mut snapshot = DnsSnapshot::new();
        snapshot.insert("system".to_string(), vec!["8.8.8.8".to_string()]);
        snapshot.insert("resolv.conf".to_string(), vec!["1.1.1.1".to_string()]);

        restore(&snapshot);
    }
}
