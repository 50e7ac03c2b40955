use bytes::Bytes;
use bytes::BytesMut;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use mockall::automock;
use socket2::Domain;
use socket2::Protocol;
use socket2::Socket;
use socket2::Type;
use std::net::Ipv4Addr;
use std::net::SocketAddr;
use std::net::UdpSocket as StdUdpSocket;
use std::sync::Arc;
use tokio::net::UdpSocket;

/// Sends one datagram. The seam through which every beacon and search response leaves.
#[automock]
pub trait DatagramSender: Send + Sync {
    fn send_to(&self, data: Bytes, destination: SocketAddr) -> BoxFuture<'static, std::io::Result<()>>;
}

pub struct TokioDatagramSender {
    socket: Arc<UdpSocket>,
}

impl TokioDatagramSender {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

impl DatagramSender for TokioDatagramSender {
    fn send_to(&self, data: Bytes, destination: SocketAddr) -> BoxFuture<'static, std::io::Result<()>> {
        let socket = self.socket.clone();
        async move {
            socket.send_to(&data, destination).await?;
            Ok(())
        }
        .boxed()
    }
}

#[automock]
pub trait DatagramReceiver: Send + Sync {
    /// Receives one datagram into the spare capacity of `buffer` and hands the buffer back.
    fn receive(
        &self,
        buffer: BytesMut,
    ) -> BoxFuture<'static, std::io::Result<(BytesMut, SocketAddr)>>;

    fn local_address(&self) -> std::io::Result<SocketAddr>;
}

pub struct TokioDatagramReceiver {
    socket: Arc<UdpSocket>,
}

impl TokioDatagramReceiver {
    pub fn new(socket: Arc<UdpSocket>) -> Self {
        Self { socket }
    }
}

impl DatagramReceiver for TokioDatagramReceiver {
    fn receive(
        &self,
        mut buffer: BytesMut,
    ) -> BoxFuture<'static, std::io::Result<(BytesMut, SocketAddr)>> {
        let socket = self.socket.clone();
        async move {
            let (_, remote_address) = socket.recv_buf_from(&mut buffer).await?;
            Ok((buffer, remote_address))
        }
        .boxed()
    }

    fn local_address(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

/// Socket for sending beacons from one interface address.
pub fn new_beacon_socket(local_address: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = new_socket(local_address)?;
    match local_address {
        SocketAddr::V4(_) => socket.set_broadcast(true)?,
        SocketAddr::V6(v6) => socket.set_multicast_if_v6(v6.scope_id())?,
    }
    socket.bind(&local_address.into())?;
    log::debug!("Bound beacon socket at {}", local_address);
    new_async_socket(socket)
}

/// Socket receiving discovery traffic on `bind_address`.
///
/// The port is shared with other servers on the same host.
pub fn new_listener_socket(bind_address: SocketAddr) -> std::io::Result<UdpSocket> {
    let socket = new_socket(bind_address)?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    if let SocketAddr::V4(_) = bind_address {
        socket.set_broadcast(true)?;
    }
    socket.bind(&bind_address.into())?;
    new_async_socket(socket)
}

/// Socket joined to a multicast group on the loopback interface.
pub fn new_local_multicast_socket(
    group: Ipv4Addr,
    interface: Ipv4Addr,
    port: u16,
) -> std::io::Result<UdpSocket> {
    let bind_address = SocketAddr::from((group, port));
    let socket = new_socket(bind_address)?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_multicast_if_v4(&interface)?;
    socket.set_multicast_loop_v4(true)?;

    // Windows cannot bind on a multicast address.
    #[cfg(windows)]
    let bind_address = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    socket.bind(&bind_address.into())?;

    socket.join_multicast_v4(&group, &interface)?;
    log::info!(
        "Joined multicast group {} on interface {}",
        group,
        interface
    );
    new_async_socket(socket)
}

fn new_socket(address: SocketAddr) -> std::io::Result<Socket> {
    let socket = Socket::new(Domain::for_address(address), Type::DGRAM, Some(Protocol::UDP))?;
    if address.is_ipv6() {
        socket.set_only_v6(true)?;
    }
    Ok(socket)
}

fn new_async_socket(socket: Socket) -> std::io::Result<UdpSocket> {
    socket.set_nonblocking(true)?;
    let socket: StdUdpSocket = socket.into();
    UdpSocket::from_std(socket)
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn send_over_loopback() -> anyhow::Result<()> {
        crate::test::init();

        let receiver = UdpSocket::bind("127.0.0.1:0").await?;
        let sender_socket = new_beacon_socket("127.0.0.1:0".parse()?)?;
        let sender = TokioDatagramSender::new(Arc::new(sender_socket));
        let expected_data = Bytes::from_static(&[1, 2, 3]);

        // When
        sender
            .send_to(expected_data.clone(), receiver.local_addr()?)
            .await?;

        // Then
        let mut buffer = [0; 16];
        let (size, _) = receiver.recv_from(&mut buffer).await?;
        assert_eq!(&buffer[..size], &expected_data[..]);

        Ok(())
    }

    #[tokio::test]
    async fn listeners_share_a_port() -> anyhow::Result<()> {
        crate::test::init();

        let first = new_listener_socket("127.0.0.1:0".parse()?)?;
        let address = first.local_addr()?;

        // When
        let second = new_listener_socket(address);

        // Then
        assert!(second.is_ok(), "Port must be reusable: {:?}", second.err());

        Ok(())
    }
}
