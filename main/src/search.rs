use crate::connection::Connection;
use crate::connection::ConnectionError;
use crate::directory::ChannelDirectory;
use crate::network::transport::Listener;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use mockall::automock;
use pva_discovery_protocol::Command;
use pva_discovery_protocol::Guid;
use pva_discovery_protocol::SearchRequest;
use pva_discovery_protocol::SearchResponse;
use pva_discovery_protocol::FLAG_FROM_SERVER;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Whether a search result must be sent.
///
/// A negative result is only sent when the client asked for a reply.
pub fn should_respond(found: bool, reply_required: bool) -> bool {
    found || reply_required
}

/// Hand-off of search requests to other servers sharing this host.
///
/// A relaying implementation clears the unicast flag of the request, points
/// its response address at the original sender and tags it with an origin
/// marker before forwarding it to the local multicast group.
#[automock]
pub trait SearchRelay: Send + Sync {
    fn relay(
        &self,
        request: &SearchRequest,
        origin: SocketAddr,
    ) -> BoxFuture<'static, std::io::Result<()>>;
}

/// Relay that forwards nothing.
pub struct DisabledSearchRelay;

impl SearchRelay for DisabledSearchRelay {
    fn relay(
        &self,
        _request: &SearchRequest,
        _origin: SocketAddr,
    ) -> BoxFuture<'static, std::io::Result<()>> {
        async { Ok(()) }.boxed()
    }
}

pub struct SearchResponder {
    guid: Guid,
    server_port: u16,
    directory: Arc<dyn ChannelDirectory>,
    relay: Arc<dyn SearchRelay>,
}

impl SearchResponder {
    pub fn new(guid: Guid, server_port: u16, directory: Arc<dyn ChannelDirectory>) -> Self {
        Self {
            guid,
            server_port,
            directory,
            relay: Arc::new(DisabledSearchRelay),
        }
    }

    pub fn with_relay(mut self, relay: Arc<dyn SearchRelay>) -> Self {
        self.relay = relay;
        self
    }

    /// Accepts datagrams from `listener` until cancelled, handling each in its own task.
    ///
    /// A receive error is fatal to this listener only.
    pub async fn serve(
        self: Arc<Self>,
        mut listener: Listener,
        cancel: CancellationToken,
    ) -> std::io::Result<()> {
        let local_address = listener.local_address();
        let result = loop {
            let connection = tokio::select! {
                biased;
                _ = cancel.cancelled() => break Ok(()),
                connection = listener.accept() => connection,
            };
            match connection {
                Ok(connection) => {
                    let connection = Connection::new(connection, FLAG_FROM_SERVER);
                    tokio::spawn(self.clone().handle_connection(connection));
                }
                Err(e) => break Err(e),
            }
        };
        match &result {
            Ok(()) => log::debug!("Stopped listening for search requests at {}", local_address),
            Err(e) => log::error!(
                "Error listening for search requests at {}: {}",
                local_address,
                e
            ),
        }
        result
    }

    async fn handle_connection(self: Arc<Self>, connection: Connection) {
        let remote_address = connection.remote_address();
        match self.handle(connection).await {
            Ok(()) | Err(ConnectionError::EndOfStream) => {}
            Err(e) => log::warn!("Error handling UDP packet from {}: {}", remote_address, e),
        }
    }

    /// Handles the first message of `connection`. The connection is closed when this returns.
    async fn handle(&self, mut connection: Connection) -> Result<(), ConnectionError> {
        let message = connection.next_message()?;
        if message.header.command != Command::SearchRequest {
            log::debug!(
                "Ignoring {:?} from {}",
                message.header.command,
                connection.remote_address()
            );
            return Ok(());
        }

        let request: SearchRequest = message.decode_payload()?;
        log::debug!(
            "Search request received from {}: {:?}",
            connection.remote_address(),
            request
        );

        if let Err(e) = self.relay.relay(&request, connection.remote_address()).await {
            log::warn!("Failed to relay search {}: {}", request.sequence_id, e);
        }

        let response = self.resolve(&request, connection.local_address().ip());
        if !should_respond(response.found, request.reply_required()) {
            return Ok(());
        }
        let destination = response_destination(&request, connection.remote_address());
        if destination != connection.remote_address() {
            log::debug!("Response address {} is not honored yet", destination);
        }
        connection
            .send_app(Command::SearchResponse, &response)
            .await
    }

    /// Builds the answer to `request` as seen from the interface at `local_ip`.
    pub fn resolve(&self, request: &SearchRequest, local_ip: IpAddr) -> SearchResponse {
        let found: Vec<u32> = request
            .channels
            .iter()
            .filter(|c| self.directory.lookup(&c.name).is_some())
            .map(|c| c.instance_id)
            .collect();
        let (found, instance_ids) = if found.is_empty() {
            (false, request.channels.iter().map(|c| c.instance_id).collect())
        } else {
            (true, found)
        };
        SearchResponse {
            guid: self.guid,
            sequence_id: request.sequence_id,
            server_address: local_ip.into(),
            server_port: self.server_port,
            protocol: "tcp".into(),
            found,
            instance_ids,
        }
    }
}

/// Where the response to `request` goes.
///
/// TODO: Send to `request.response_address` when it is set, once relayed
/// requests from co-located servers are supported.
fn response_destination(_request: &SearchRequest, remote_address: SocketAddr) -> SocketAddr {
    remote_address
}
