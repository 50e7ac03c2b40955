use crate::config::DiscoveryConfig;
use crate::network::interface::InterfaceAddress;
use std::net::IpAddr;
use std::net::Ipv4Addr;
use std::net::Ipv6Addr;
use std::net::SocketAddr;
use std::net::SocketAddrV6;

/// All-nodes link-local multicast group.
const ALL_NODES: Ipv6Addr = Ipv6Addr::new(0xFF02, 0, 0, 0, 0, 0, 0, 1);

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PlanOptions {
    pub discovery_port: u16,
    pub local_multicast_group: Option<Ipv4Addr>,
    pub subnet_broadcast_listeners: bool,
}

impl From<&DiscoveryConfig> for PlanOptions {
    fn from(value: &DiscoveryConfig) -> Self {
        Self {
            discovery_port: value.discovery_port,
            local_multicast_group: value.local_multicast_group,
            subnet_broadcast_listeners: value.subnet_broadcast_listeners,
        }
    }
}

/// Outbound path for beacons.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct BeaconRoute {
    /// Interface address the beacon socket binds to, with an ephemeral port.
    pub local_address: SocketAddr,
    pub destination: SocketAddr,
}

impl BeaconRoute {
    /// Address to put in a beacon sent over this route.
    pub fn advertised_address(&self, configured: Option<IpAddr>) -> IpAddr {
        configured.unwrap_or_else(|| self.local_address.ip())
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ListenKind {
    Unicast,
    SubnetBroadcast,
    LocalMulticast { group: Ipv4Addr },
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct ListenEndpoint {
    pub kind: ListenKind,
    pub bind_address: SocketAddr,
    /// Unicast endpoint of the interface receiving the traffic.
    /// Replies are sent from it and carry its address.
    pub interface_address: SocketAddr,
}

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub struct TopologyPlan {
    /// Address advertised on every route, or `None` when each route advertises its own.
    pub advertised_address: Option<IpAddr>,
    pub beacon_routes: Vec<BeaconRoute>,
    pub listen_endpoints: Vec<ListenEndpoint>,
}

impl TopologyPlan {
    pub fn new(interfaces: &[InterfaceAddress], server_ip: IpAddr, options: &PlanOptions) -> Self {
        let port = options.discovery_port;
        let mut plan = Self {
            advertised_address: Some(server_ip).filter(|ip| !ip.is_unspecified()),
            ..Default::default()
        };

        for interface in interfaces.iter().filter(|i| i.flags.up) {
            let local_address = socket_address(interface, 0);
            let interface_address = socket_address(interface, port);

            if let Some(route) = beacon_destination(interface, port).map(|destination| BeaconRoute {
                local_address,
                destination,
            }) {
                push_unique(&mut plan.beacon_routes, route, |r| r);
            }

            push_unique(
                &mut plan.listen_endpoints,
                ListenEndpoint {
                    kind: ListenKind::Unicast,
                    bind_address: interface_address,
                    interface_address,
                },
                |e| &e.bind_address,
            );

            if let Some(broadcast) = interface
                .subnet_broadcast()
                .filter(|_| options.subnet_broadcast_listeners)
            {
                push_unique(
                    &mut plan.listen_endpoints,
                    ListenEndpoint {
                        kind: ListenKind::SubnetBroadcast,
                        bind_address: (broadcast, port).into(),
                        interface_address,
                    },
                    |e| &e.bind_address,
                );
            }
        }

        if let Some(group) = options.local_multicast_group {
            let loopback = interfaces
                .iter()
                .find(|i| i.flags.up && i.flags.loopback && i.address.is_ipv4());
            if let Some(loopback) = loopback {
                plan.listen_endpoints.push(ListenEndpoint {
                    kind: ListenKind::LocalMulticast { group },
                    bind_address: (group, port).into(),
                    interface_address: socket_address(loopback, port),
                });
            }
        }

        plan
    }
}

fn beacon_destination(interface: &InterfaceAddress, port: u16) -> Option<SocketAddr> {
    match interface.address {
        IpAddr::V4(_) => interface
            .subnet_broadcast()
            .map(|broadcast| (broadcast, port).into()),
        IpAddr::V6(_) => {
            let multicast_capable = interface.flags.multicast && !interface.flags.loopback;
            (multicast_capable && interface.is_ipv6_link_local()).then(|| {
                SocketAddrV6::new(ALL_NODES, port, 0, interface.interface_index).into()
            })
        }
    }
}

fn socket_address(interface: &InterfaceAddress, port: u16) -> SocketAddr {
    match interface.address {
        IpAddr::V4(ipv4) => (ipv4, port).into(),
        IpAddr::V6(ipv6) => {
            let scope_id = if interface.is_ipv6_link_local() {
                interface.interface_index
            } else {
                0
            };
            SocketAddrV6::new(ipv6, port, 0, scope_id).into()
        }
    }
}

fn push_unique<T, K: PartialEq + ?Sized>(items: &mut Vec<T>, item: T, key: impl Fn(&T) -> &K) {
    if !items.iter().any(|i| key(i) == key(&item)) {
        items.push(item);
    }
}
