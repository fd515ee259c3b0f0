use std::net::Ipv4Addr;

use super::interface::InterfacePrefix;

/// A contiguous IPv4 range given by a base address and a mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Prefix {
    base: u32,
    mask: u32,
}

impl Ipv4Prefix {
    /// Build the prefix containing `ip`. Host bits of `ip` are cleared.
    pub fn new(ip: Ipv4Addr, netmask: Ipv4Addr) -> Self {
        let mask = u32::from(netmask);
        Self {
            base: u32::from(ip) & mask,
            mask,
        }
    }

    pub fn base(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.base)
    }

    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        u32::from(addr) & self.mask == self.base
    }

    /// Every address in the prefix, network and broadcast included, in increasing order.
    pub fn hosts(&self) -> Hosts {
        Hosts {
            prefix: *self,
            next: Some(self.base),
        }
    }
}

impl From<&InterfacePrefix> for Ipv4Prefix {
    fn from(prefix: &InterfacePrefix) -> Self {
        Self::new(prefix.ip, prefix.netmask)
    }
}

/// Walks a prefix one address at a time and stops at the first address outside it.
#[derive(Debug, Clone)]
pub struct Hosts {
    prefix: Ipv4Prefix,
    next: Option<u32>,
}

impl Iterator for Hosts {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        let current = Ipv4Addr::from(self.next?);
        if !self.prefix.contains(current) {
            self.next = None;
            return None;
        }
        // 255.255.255.255 has no successor
        self.next = u32::from(current).checked_add(1);
        Some(current)
    }
}

/// Candidate addresses for one interface prefix.
///
/// The interface's own address is dropped unless `include_self` is set.
pub fn candidate_addresses(prefix: &InterfacePrefix, include_self: bool) -> Vec<Ipv4Addr> {
    Ipv4Prefix::from(prefix)
        .hosts()
        .filter(|addr| include_self || *addr != prefix.ip)
        .collect()
}
