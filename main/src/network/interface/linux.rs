use super::InterfaceAddress;
use super::InterfaceFlags;
use super::InterfaceScanError;
use super::InterfaceScanner;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Deserialize;
use std::net::IpAddr;
use std::net::Ipv4Addr;

pub struct IpRoute2InterfaceScanner;

impl IpRoute2InterfaceScanner {
    async fn scan() -> Result<Vec<InterfaceAddress>, InterfaceScanError> {
        let output = crate::process::run("ip", &["-json", "address"]).await?;
        Self::parse_output(&output)
    }

    fn parse_output(output: &[u8]) -> Result<Vec<InterfaceAddress>, InterfaceScanError> {
        let links: Vec<Link> = serde_json::from_slice(output)?;
        links
            .iter()
            .for_each(|l| log::debug!("Scanned IP link: {:?}", l));

        let addresses: Vec<_> = links
            .into_iter()
            .flat_map(|link| {
                let flags = link.flags();
                link.addr_info.into_iter().filter_map(move |info| {
                    Some(InterfaceAddress {
                        interface_index: link.ifindex,
                        interface_name: link.ifname.clone(),
                        address: info.local?,
                        prefix_length: info.prefixlen?,
                        broadcast: info.broadcast,
                        flags,
                    })
                })
            })
            .collect();
        addresses
            .iter()
            .for_each(|a| log::info!("Found interface address: {:?}", a));

        Ok(addresses)
    }
}

impl InterfaceScanner for IpRoute2InterfaceScanner {
    fn supports_current_operating_system(&self) -> BoxFuture<'static, bool> {
        crate::process::probe("ip", &["-Version"]).boxed()
    }

    fn scan(&self) -> BoxFuture<'static, Result<Vec<InterfaceAddress>, InterfaceScanError>> {
        Self::scan().boxed()
    }
}

#[derive(Deserialize, Debug)]
struct Link {
    ifindex: u32,
    ifname: String,
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default)]
    addr_info: Vec<AddressInfo>,
}

impl Link {
    fn flags(&self) -> InterfaceFlags {
        let has = |flag: &str| self.flags.iter().any(|f| f == flag);
        InterfaceFlags {
            up: has("UP"),
            loopback: has("LOOPBACK"),
            broadcast: has("BROADCAST"),
            multicast: has("MULTICAST"),
        }
    }
}

// Some kernels emit lifetime-only entries without an address.
#[derive(Deserialize, Debug)]
struct AddressInfo {
    local: Option<IpAddr>,
    prefixlen: Option<u8>,
    broadcast: Option<Ipv4Addr>,
}
