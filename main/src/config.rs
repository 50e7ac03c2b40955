use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::time::Duration;

/// UDP port on which search requests are received and beacons are sent.
pub const DISCOVERY_PORT: u16 = 5076;

/// Loopback multicast group shared by co-located servers.
pub const LOCAL_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(224, 0, 0, 128);

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Address of the TCP server being advertised.
    /// An unspecified IP makes every interface advertise its own address.
    pub server_address: SocketAddr,
    pub discovery_port: u16,
    /// `None` disables the loopback multicast listener.
    pub local_multicast_group: Option<Ipv4Addr>,
    /// Whether to bind dedicated sockets on subnet broadcast addresses.
    pub subnet_broadcast_listeners: bool,
    pub schedule: BeaconSchedule,
}

impl DiscoveryConfig {
    pub fn new(server_address: SocketAddr) -> Self {
        Self {
            server_address,
            discovery_port: DISCOVERY_PORT,
            local_multicast_group: Some(LOCAL_MULTICAST_GROUP),
            // Windows delivers broadcasts to sockets bound on the unicast address
            // and refuses to bind on a broadcast address.
            subnet_broadcast_listeners: cfg!(unix),
            schedule: BeaconSchedule::default(),
        }
    }
}

/// Beacon timing: a burst of fast beacons after start-up, then a slower steady rate.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct BeaconSchedule {
    pub startup_period: Duration,
    pub startup_count: u32,
    pub steady_period: Duration,
}

impl BeaconSchedule {
    /// Period of the timer after `ticks_sent` beacon ticks have fired.
    pub fn period(&self, ticks_sent: u32) -> Duration {
        if ticks_sent < self.startup_count {
            self.startup_period
        } else {
            self.steady_period
        }
    }
}

impl Default for BeaconSchedule {
    fn default() -> Self {
        Self {
            startup_period: Duration::from_secs(1),
            startup_count: 15,
            steady_period: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn startup_then_steady_period() {
        let schedule = BeaconSchedule::default();

        for ticks_sent in 0..15 {
            assert_eq!(schedule.period(ticks_sent), Duration::from_secs(1));
        }
        for ticks_sent in 15..100 {
            assert_eq!(schedule.period(ticks_sent), Duration::from_secs(5));
        }
    }

    #[test]
    fn wildcard_defaults() {
        let config = DiscoveryConfig::new("0.0.0.0:5075".parse().unwrap());

        assert_eq!(config.discovery_port, 5076);
        assert_eq!(config.local_multicast_group, Some(LOCAL_MULTICAST_GROUP));
        assert!(config.server_address.ip().is_unspecified());
    }
}
