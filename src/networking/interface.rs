use if_addrs::{get_if_addrs, IfAddr};
use log::{debug, info, warn};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use crate::error::DiscoveryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterfaceType {
    Ethernet,
    Wifi,
    Other,
}

impl InterfaceType {
    /// Determines if this is likely a WiFi interface
    fn is_wifi(name: &str) -> bool {
        name.contains("wlan") ||
        name.contains("wifi") ||
        name.contains("wi-fi") ||
        name.starts_with("wl")
    }

    /// Determines if this is likely an Ethernet interface
    fn is_ethernet(name: &str) -> bool {
        name.contains("eth") ||
        name.starts_with("en")
    }

    /// Detect the interface type from its name
    pub fn detect(name: &str) -> Self {
        if Self::is_wifi(name) {
            InterfaceType::Wifi
        } else if Self::is_ethernet(name) {
            InterfaceType::Ethernet
        } else {
            InterfaceType::Other
        }
    }

    /// Scan order: wired links first, then wireless, then everything else
    fn rank(self) -> u8 {
        match self {
            InterfaceType::Ethernet => 0,
            InterfaceType::Wifi => 1,
            InterfaceType::Other => 2,
        }
    }
}

/// One IPv4 address assigned to a local interface, with its subnet mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfacePrefix {
    pub interface_name: String,
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
    pub interface_type: InterfaceType,
}

impl InterfacePrefix {
    pub fn new(interface_name: String, ip: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        let interface_type = InterfaceType::detect(&interface_name);
        Self {
            interface_name,
            ip,
            netmask,
            interface_type,
        }
    }

    /// Number of leading one bits in the mask
    pub fn prefix_len(&self) -> u32 {
        u32::from(self.netmask).leading_ones()
    }
}

impl fmt::Display for InterfacePrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:?}) {}/{}",
            self.interface_name,
            self.interface_type,
            self.ip,
            self.prefix_len()
        )
    }
}

/// An address as reported by the operating system, before filtering.
#[derive(Debug, Clone)]
pub struct LocalAddress {
    pub interface_name: String,
    pub ip: IpAddr,
    /// Only present for IPv4 addresses
    pub netmask: Option<Ipv4Addr>,
}

impl From<if_addrs::Interface> for LocalAddress {
    fn from(interface: if_addrs::Interface) -> Self {
        match interface.addr {
            IfAddr::V4(addr) => Self {
                interface_name: interface.name,
                ip: IpAddr::V4(addr.ip),
                netmask: Some(addr.netmask),
            },
            IfAddr::V6(addr) => Self {
                interface_name: interface.name,
                ip: IpAddr::V6(addr.ip),
                netmask: None,
            },
        }
    }
}

/// List every address assigned to a local interface
pub fn list_local_addresses() -> Result<Vec<LocalAddress>, DiscoveryError> {
    let addrs = get_if_addrs().map_err(DiscoveryError::InterfaceListing)?;
    Ok(addrs.into_iter().map(LocalAddress::from).collect())
}

/// Pick the IPv4 prefixes to scan out of a raw address listing.
///
/// With `device` set only that interface is considered, and it must be present in
/// the listing. The listing only holds interfaces with at least one address, so an
/// interface without any address is reported as not found. Loopback, unspecified
/// and IPv6 addresses contribute nothing. Ethernet prefixes come first, then Wi-Fi,
/// each group keeping the listing order.
pub fn select_prefixes(
    addresses: Vec<LocalAddress>,
    device: Option<&str>,
) -> Result<Vec<InterfacePrefix>, DiscoveryError> {
    if let Some(name) = device {
        if !addresses.iter().any(|a| a.interface_name == name) {
            return Err(DiscoveryError::InterfaceNotFound(name.to_string()));
        }
    }

    let mut prefixes = Vec::new();
    for address in addresses {
        if device.is_some_and(|name| name != address.interface_name) {
            continue;
        }

        let (ip, netmask) = match (address.ip, address.netmask) {
            (IpAddr::V4(ip), Some(netmask)) => (ip, netmask),
            _ => {
                debug!("Ignoring non-IPv4 address {} on {}", address.ip, address.interface_name);
                continue;
            }
        };

        if ip.is_loopback() || ip.is_unspecified() {
            debug!("Ignoring {} on {}", ip, address.interface_name);
            continue;
        }

        prefixes.push(InterfacePrefix::new(address.interface_name, ip, netmask));
    }

    prefixes.sort_by_key(|p| p.interface_type.rank());

    for (idx, prefix) in prefixes.iter().enumerate() {
        info!("Interface #{}: {}", idx + 1, prefix);
    }

    if prefixes.is_empty() {
        warn!("No usable IPv4 interfaces found!");
    }

    Ok(prefixes)
}

/// Discover the IPv4 prefixes of the local interfaces to scan
pub fn discover_prefixes(device: Option<&str>) -> Result<Vec<InterfacePrefix>, DiscoveryError> {
    select_prefixes(list_local_addresses()?, device)
}
