mod linux;
mod windows;

use self::linux::IpRoute2InterfaceScanner;
use self::windows::PowerShellInterfaceScanner;
use crate::process::ProcessError;
use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use mockall::automock;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use thiserror::Error;

/// Picks the first scanner that works on the current machine.
pub async fn interface_scanner() -> Result<Box<dyn InterfaceScanner>, InterfaceScanError> {
    let scanners: Vec<Box<dyn InterfaceScanner>> = vec![
        Box::new(PowerShellInterfaceScanner),
        Box::new(IpRoute2InterfaceScanner),
    ];
    futures_util::stream::iter(scanners)
        .filter(|s| s.supports_current_operating_system())
        .next()
        .await
        .ok_or(InterfaceScanError::UnsupportedOperatingSystem)
}

#[derive(Error, Debug)]
pub enum InterfaceScanError {
    #[error("No way to enumerate network interfaces on this operating system")]
    UnsupportedOperatingSystem,

    #[error("Failed in running an external command")]
    ChildProcess(#[from] ProcessError),

    #[error("Failed to parse the CSV output of a child process")]
    ParseCsv(#[from] csv::Error),

    #[error("Failed to parse the JSON output of a child process")]
    ParseJson(#[from] serde_json::Error),
}

#[automock]
pub trait InterfaceScanner: Send + Sync {
    fn supports_current_operating_system(&self) -> BoxFuture<'static, bool>;
    fn scan(&self) -> BoxFuture<'static, Result<Vec<InterfaceAddress>, InterfaceScanError>>;
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct InterfaceFlags {
    pub up: bool,
    pub loopback: bool,
    pub broadcast: bool,
    pub multicast: bool,
}

/// One address assigned to a network interface.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct InterfaceAddress {
    pub interface_index: u32,
    pub interface_name: String,
    pub address: IpAddr,
    pub prefix_length: u8,
    /// Broadcast address reported by the operating system, if any.
    pub broadcast: Option<Ipv4Addr>,
    pub flags: InterfaceFlags,
}

impl InterfaceAddress {
    /// Directed broadcast address of this address's IPv4 subnet.
    ///
    /// Point-to-point prefixes (/31, /32) have none unless the system reports one.
    pub fn subnet_broadcast(&self) -> Option<Ipv4Addr> {
        let IpAddr::V4(ipv4) = self.address else {
            return None;
        };
        if !self.flags.broadcast || self.flags.loopback {
            return None;
        }
        if let Some(broadcast) = self.broadcast {
            return Some(broadcast);
        }
        if self.prefix_length >= 31 {
            return None;
        }
        let host_mask = u32::MAX >> self.prefix_length;
        Some(Ipv4Addr::from(u32::from(ipv4) | host_mask))
    }

    pub fn is_ipv6_link_local(&self) -> bool {
        match self.address {
            IpAddr::V6(ipv6) => ipv6.segments()[0] & 0xFFC0 == 0xFE80,
            IpAddr::V4(_) => false,
        }
    }
}
