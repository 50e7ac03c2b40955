use std::net::IpAddr;
use std::net::Ipv6Addr;

/// 16-byte address field carried by beacons and search messages.
///
/// IPv4 addresses travel in their IPv4-mapped IPv6 form.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct WireAddress(pub [u8; 16]);

impl WireAddress {
    pub fn to_ip_addr(self) -> IpAddr {
        let ipv6 = Ipv6Addr::from(self.0);
        match ipv6.to_ipv4_mapped() {
            Some(ipv4) => IpAddr::V4(ipv4),
            None => IpAddr::V6(ipv6),
        }
    }
}

impl From<IpAddr> for WireAddress {
    fn from(value: IpAddr) -> Self {
        let ipv6 = match value {
            IpAddr::V4(ipv4) => ipv4.to_ipv6_mapped(),
            IpAddr::V6(ipv6) => ipv6,
        };
        Self(ipv6.octets())
    }
}

impl From<WireAddress> for IpAddr {
    fn from(value: WireAddress) -> Self {
        value.to_ip_addr()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn ipv4_is_mapped() {
        let ip = IpAddr::V4(Ipv4Addr::new(192, 0, 2, 5));

        // When
        let address = WireAddress::from(ip);

        // Then
        assert_eq!(
            address.0,
            [0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0xFF, 0xFF, 192, 0, 2, 5]
        );
        assert_eq!(address.to_ip_addr(), ip);
    }

    #[test]
    fn ipv6_is_kept() {
        let ip: IpAddr = "fe80::1".parse().unwrap();

        // When
        let address = WireAddress::from(ip);

        // Then
        assert_eq!(IpAddr::from(address), ip);
    }
}
