use super::InterfaceAddress;
use super::InterfaceFlags;
use super::InterfaceScanError;
use super::InterfaceScanner;
use csv::Reader;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Deserialize;
use std::net::IpAddr;

pub struct PowerShellInterfaceScanner;

impl PowerShellInterfaceScanner {
    async fn scan() -> Result<Vec<InterfaceAddress>, InterfaceScanError> {
        let stdout = crate::process::eval(
            "pwsh",
            &["-Command", "-"],
            include_bytes!("./Print-NetIpAddresses.ps1"),
        )
        .await?;
        Self::parse_output(&stdout).map_err(Into::into)
    }

    fn parse_output(output: &[u8]) -> Result<Vec<InterfaceAddress>, csv::Error> {
        let rows = Reader::from_reader(output)
            .deserialize()
            .collect::<Result<Vec<NetIpAddress>, _>>()?;
        rows.iter()
            .for_each(|r| log::debug!("Scanned IP address: {:?}", r));

        let addresses: Vec<_> = rows.into_iter().filter_map(NetIpAddress::parse).collect();
        addresses
            .iter()
            .for_each(|a| log::info!("Found interface address: {:?}", a));

        Ok(addresses)
    }
}

impl InterfaceScanner for PowerShellInterfaceScanner {
    fn supports_current_operating_system(&self) -> BoxFuture<'static, bool> {
        crate::process::probe("pwsh", &["-Command", "Get-Command Get-NetIPAddress"]).boxed()
    }

    fn scan(&self) -> BoxFuture<'static, Result<Vec<InterfaceAddress>, InterfaceScanError>> {
        Self::scan().boxed()
    }
}

#[derive(Deserialize, Debug)]
#[allow(non_snake_case)]
struct NetIpAddress {
    InterfaceIndex: u32,
    InterfaceAlias: String,
    IPAddress: String,
    PrefixLength: u8,
}

impl NetIpAddress {
    fn parse(self) -> Option<InterfaceAddress> {
        // Link-local addresses carry a `%zone` suffix.
        let address: IpAddr = match self.IPAddress.split('%').next()?.parse() {
            Ok(a) => a,
            Err(_) => {
                log::debug!("Skipping unparsable address {}", self.IPAddress);
                return None;
            }
        };
        let loopback = address.is_loopback();
        Some(InterfaceAddress {
            interface_index: self.InterfaceIndex,
            interface_name: self.InterfaceAlias,
            address,
            prefix_length: self.PrefixLength,
            broadcast: None,
            flags: InterfaceFlags {
                up: true,
                loopback,
                broadcast: address.is_ipv4() && !loopback,
                multicast: true,
            },
        })
    }
}
