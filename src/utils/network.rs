// src/utils/network.rs

use std::{net::Ipv4Addr, time::Duration};

use anyhow::{Context, Result};

use crate::utils::{
    command::CommandRunner,
    registry::{ConfigurationStore, RegistryHive, RegistryKeyValue},
};

/// Per-adapter TCP/IP parameters, one subkey per interface GUID.
pub const INTERFACES_PATH: &str = r"SYSTEM\CurrentControlSet\Services\Tcpip\Parameters\Interfaces";

pub fn interface_path(guid: &str) -> String {
    format!("{}\\{}", INTERFACES_PATH, guid)
}

fn is_usable_address(address: &str) -> bool {
    address
        .trim()
        .parse::<Ipv4Addr>()
        .map(|ip| !ip.is_unspecified())
        .unwrap_or(false)
}

/// Lists interface GUIDs that hold an IPv4 address, either leased over DHCP or static.
pub fn active_interface_guids(store: &dyn ConfigurationStore) -> Result<Vec<String>> {
    let guids = store
        .subkeys(RegistryHive::LocalMachine, INTERFACES_PATH)
        .context("Failed to enumerate network interfaces")?;

    let mut active = Vec::new();
    for guid in guids {
        let path = interface_path(&guid);
        let dhcp = store
            .read_value(RegistryHive::LocalMachine, &path, "DhcpIPAddress")
            .ok()
            .flatten();
        let dhcp_active = dhcp
            .as_ref()
            .and_then(RegistryKeyValue::as_str)
            .is_some_and(is_usable_address);

        let static_active = match store
            .read_value(RegistryHive::LocalMachine, &path, "IPAddress")
            .ok()
            .flatten()
        {
            Some(RegistryKeyValue::MultiString(addresses)) => {
                addresses.iter().any(|a| is_usable_address(a))
            }
            Some(RegistryKeyValue::String(address)) => is_usable_address(&address),
            _ => false,
        };

        if dhcp_active || static_active {
            active.push(guid);
        }
    }
    tracing::debug!("Found {} active network interface(s).", active.len());
    Ok(active)
}

/// Clears the resolver cache so new name servers take effect immediately.
pub fn flush_dns(runner: &dyn CommandRunner) -> Result<()> {
    let output = runner
        .run("ipconfig", &["/flushdns"], Some(Duration::from_secs(15)))
        .context("Failed to run ipconfig")?;
    if !output.success() {
        anyhow::bail!("ipconfig /flushdns failed: {}", output.stdout.trim());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{failed, MemoryStore, ScriptedRunner};

    #[test]
    fn test_active_interfaces() {
        let store = MemoryStore::new();
        let hklm = RegistryHive::LocalMachine;
        store.set(
            hklm,
            &interface_path("{dhcp}"),
            "DhcpIPAddress",
            RegistryKeyValue::String("192.168.1.20".to_string()),
        );
        store.set(
            hklm,
            &interface_path("{static}"),
            "IPAddress",
            RegistryKeyValue::MultiString(vec!["10.0.0.4".to_string()]),
        );
        store.set(
            hklm,
            &interface_path("{idle}"),
            "DhcpIPAddress",
            RegistryKeyValue::String("0.0.0.0".to_string()),
        );
        store.create_key(hklm, &interface_path("{empty}"));

        let active = active_interface_guids(&store).unwrap();
        assert_eq!(active, vec!["{dhcp}", "{static}"]);
    }

    #[test]
    fn test_flush_dns_failure() {
        let runner = ScriptedRunner::new(|_, _| failed("access denied"));
        assert!(flush_dns(&runner).is_err());
        assert!(runner.ran("ipconfig", "/flushdns"));
    }
}
