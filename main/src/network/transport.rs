use crate::beacon::BeaconTarget;
use crate::network::datagram::DatagramReceiver;
use crate::network::datagram::DatagramSender;
use crate::network::datagram::TokioDatagramReceiver;
use crate::network::datagram::TokioDatagramSender;
use crate::network::topology::ListenEndpoint;
use crate::network::topology::ListenKind;
use crate::network::topology::TopologyPlan;
use bytes::Bytes;
use bytes::BytesMut;
use std::collections::HashMap;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;

const RECEIVE_BUFFER_SIZE: usize = 65_535;

/// One received datagram, handled like a short-lived connection.
pub struct PseudoConnection {
    pub payload: BytesMut,
    pub remote_address: SocketAddr,
    /// Address of the interface that received the datagram.
    pub local_address: SocketAddr,
    reply: Arc<dyn DatagramSender>,
}

impl PseudoConnection {
    pub fn new(
        payload: BytesMut,
        remote_address: SocketAddr,
        local_address: SocketAddr,
        reply: Arc<dyn DatagramSender>,
    ) -> Self {
        Self {
            payload,
            remote_address,
            local_address,
            reply,
        }
    }

    pub async fn send_to(&self, data: Bytes, destination: SocketAddr) -> std::io::Result<()> {
        self.reply.send_to(data, destination).await
    }
}

/// Receiving side of one [`ListenEndpoint`]. Dropping it closes the socket.
pub struct Listener {
    receiver: Arc<dyn DatagramReceiver>,
    endpoint: ListenEndpoint,
    reply: Arc<dyn DatagramSender>,
    /// Spare capacity is reused once handlers drop earlier datagrams.
    buffer: BytesMut,
}

impl Listener {
    pub fn new(
        receiver: Arc<dyn DatagramReceiver>,
        endpoint: ListenEndpoint,
        reply: Arc<dyn DatagramSender>,
    ) -> Self {
        Self {
            receiver,
            endpoint,
            reply,
            buffer: BytesMut::with_capacity(RECEIVE_BUFFER_SIZE),
        }
    }

    pub async fn accept(&mut self) -> std::io::Result<PseudoConnection> {
        let mut buffer = std::mem::take(&mut self.buffer);
        buffer.reserve(RECEIVE_BUFFER_SIZE);
        let (mut buffer, remote_address) = self.receiver.receive(buffer).await?;
        let payload = buffer.split();
        self.buffer = buffer;
        Ok(PseudoConnection::new(
            payload,
            remote_address,
            self.endpoint.interface_address,
            self.reply.clone(),
        ))
    }

    pub fn local_address(&self) -> SocketAddr {
        self.receiver
            .local_address()
            .unwrap_or(self.endpoint.bind_address)
    }
}

pub struct Transport {
    pub listeners: Vec<Listener>,
    pub beacon_targets: Vec<BeaconTarget>,
}

impl Transport {
    /// Binds every socket of `plan`. Any failure aborts the whole binding.
    pub fn bind(plan: &TopologyPlan) -> Result<Self, BindError> {
        let mut reply_senders: HashMap<SocketAddr, Arc<dyn DatagramSender>> = HashMap::new();
        let mut listeners = Vec::with_capacity(plan.listen_endpoints.len());

        for endpoint in plan
            .listen_endpoints
            .iter()
            .filter(|e| e.kind == ListenKind::Unicast)
        {
            let socket = Arc::new(bind_listener(endpoint)?);
            let sender: Arc<dyn DatagramSender> = Arc::new(TokioDatagramSender::new(socket.clone()));
            reply_senders.insert(endpoint.interface_address, sender.clone());
            listeners.push(Listener::new(
                Arc::new(TokioDatagramReceiver::new(socket)),
                *endpoint,
                sender,
            ));
        }

        for endpoint in plan
            .listen_endpoints
            .iter()
            .filter(|e| e.kind != ListenKind::Unicast)
        {
            let reply = reply_senders
                .get(&endpoint.interface_address)
                .cloned()
                .ok_or(BindError::NoReplySocket(endpoint.interface_address))?;
            let socket = Arc::new(bind_listener(endpoint)?);
            listeners.push(Listener::new(
                Arc::new(TokioDatagramReceiver::new(socket)),
                *endpoint,
                reply,
            ));
        }

        let beacon_targets = plan
            .beacon_routes
            .iter()
            .map(|route| {
                let socket = crate::network::datagram::new_beacon_socket(route.local_address)
                    .map_err(|source| BindError::Socket {
                        address: route.local_address,
                        source,
                    })?;
                let sender: Arc<dyn DatagramSender> =
                    Arc::new(TokioDatagramSender::new(Arc::new(socket)));
                Ok(BeaconTarget {
                    route: *route,
                    sender,
                })
            })
            .collect::<Result<_, BindError>>()?;

        Ok(Self {
            listeners,
            beacon_targets,
        })
    }

    pub fn beacon_destinations(&self) -> Vec<SocketAddr> {
        self.beacon_targets
            .iter()
            .map(|t| t.route.destination)
            .collect()
    }
}

fn bind_listener(endpoint: &ListenEndpoint) -> Result<UdpSocket, BindError> {
    let result = match (endpoint.kind, endpoint.interface_address.ip()) {
        (ListenKind::LocalMulticast { group }, IpAddr::V4(interface)) => {
            crate::network::datagram::new_local_multicast_socket(
                group,
                interface,
                endpoint.bind_address.port(),
            )
        }
        (ListenKind::LocalMulticast { .. }, IpAddr::V6(_)) => {
            return Err(BindError::NoReplySocket(endpoint.interface_address))
        }
        _ => crate::network::datagram::new_listener_socket(endpoint.bind_address),
    };
    let socket = result.map_err(|source| BindError::Socket {
        address: endpoint.bind_address,
        source,
    })?;
    log::info!(
        "Listening for {:?} search requests at {}",
        endpoint.kind,
        endpoint.bind_address
    );
    Ok(socket)
}

#[derive(Error, Debug)]
pub enum BindError {
    #[error("Failed to bind a socket at {address}")]
    Socket {
        address: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("No IPv4 unicast socket at {0} to reply from")]
    NoReplySocket(SocketAddr),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::topology::BeaconRoute;

    fn loopback_plan() -> TopologyPlan {
        let address: SocketAddr = "127.0.0.1:0".parse().unwrap();
        TopologyPlan {
            advertised_address: None,
            beacon_routes: vec![BeaconRoute {
                local_address: address,
                destination: "127.0.0.1:5076".parse().unwrap(),
            }],
            listen_endpoints: vec![ListenEndpoint {
                kind: ListenKind::Unicast,
                bind_address: address,
                interface_address: address,
            }],
        }
    }

    #[tokio::test]
    async fn bind_and_accept() -> anyhow::Result<()> {
        crate::test::init();

        let mut transport = Transport::bind(&loopback_plan())?;
        let listener = &mut transport.listeners[0];
        let client = UdpSocket::bind("127.0.0.1:0").await?;

        // When
        client.send_to(&[1, 2, 3], listener.local_address()).await?;
        let connection = listener.accept().await?;

        // Then
        assert_eq!(&connection.payload[..], &[1, 2, 3]);
        assert_eq!(connection.remote_address, client.local_addr()?);
        assert_eq!(
            transport.beacon_destinations(),
            vec!["127.0.0.1:5076".parse::<SocketAddr>()?]
        );

        Ok(())
    }

    #[tokio::test]
    async fn consecutive_datagrams_stay_separate() -> anyhow::Result<()> {
        crate::test::init();

        let mut transport = Transport::bind(&loopback_plan())?;
        let listener = &mut transport.listeners[0];
        let client = UdpSocket::bind("127.0.0.1:0").await?;
        let address = listener.local_address();

        // When
        client.send_to(&[1, 2, 3, 4], address).await?;
        let first = listener.accept().await?;
        client.send_to(&[5], address).await?;
        let second = listener.accept().await?;
        drop(first);
        client.send_to(&[6, 7], address).await?;
        let third = listener.accept().await?;

        // Then
        assert_eq!(&second.payload[..], &[5]);
        assert_eq!(&third.payload[..], &[6, 7]);

        Ok(())
    }

    #[tokio::test]
    async fn reply_goes_back_to_sender() -> anyhow::Result<()> {
        crate::test::init();

        let mut transport = Transport::bind(&loopback_plan())?;
        let listener = &mut transport.listeners[0];
        let client = UdpSocket::bind("127.0.0.1:0").await?;
        client.send_to(&[0], listener.local_address()).await?;
        let connection = listener.accept().await?;

        // When
        connection
            .send_to(Bytes::from_static(&[4, 5]), connection.remote_address)
            .await?;

        // Then
        let mut buffer = [0; 8];
        let (size, from) = client.recv_from(&mut buffer).await?;
        assert_eq!(&buffer[..size], &[4, 5]);
        assert_eq!(from, listener.local_address());

        Ok(())
    }

    #[test]
    fn missing_reply_socket() {
        let plan = TopologyPlan {
            listen_endpoints: vec![ListenEndpoint {
                kind: ListenKind::SubnetBroadcast,
                bind_address: "127.255.255.255:0".parse().unwrap(),
                interface_address: "127.0.0.1:0".parse().unwrap(),
            }],
            ..Default::default()
        };

        assert!(matches!(
            Transport::bind(&plan),
            Err(BindError::NoReplySocket(_))
        ));
    }
}
