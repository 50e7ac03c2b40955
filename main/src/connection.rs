use crate::network::transport::PseudoConnection;
use pva_discovery_protocol::encode_application_message;
use pva_discovery_protocol::Command;
use pva_discovery_protocol::DecodeError;
use pva_discovery_protocol::Frame;
use pva_discovery_protocol::PvaCodec;
use pva_discovery_protocol::WireEncode;
use std::net::SocketAddr;
use thiserror::Error;
use tokio_util::codec::Decoder;

/// pvAccess framing over a [`PseudoConnection`].
pub struct Connection {
    inner: PseudoConnection,
    codec: PvaCodec,
    flags: u8,
}

impl Connection {
    /// `flags` are set on every message sent, e.g. `FLAG_FROM_SERVER`.
    pub fn new(inner: PseudoConnection, flags: u8) -> Self {
        Self {
            inner,
            codec: PvaCodec,
            flags,
        }
    }

    pub fn local_address(&self) -> SocketAddr {
        self.inner.local_address
    }

    pub fn remote_address(&self) -> SocketAddr {
        self.inner.remote_address
    }

    /// Reads the next application message, skipping control messages.
    pub fn next_message(&mut self) -> Result<Frame, ConnectionError> {
        loop {
            match self.codec.decode_eof(&mut self.inner.payload)? {
                None => return Err(ConnectionError::EndOfStream),
                Some(frame) if frame.header.is_control() => {
                    log::debug!(
                        "Skipping control message {:?} from {}",
                        frame.header.command,
                        self.inner.remote_address
                    );
                }
                Some(frame) => return Ok(frame),
            }
        }
    }

    pub async fn send_app(
        &self,
        command: Command,
        message: &impl WireEncode,
    ) -> Result<(), ConnectionError> {
        let data = encode_application_message(command, self.flags, message);
        self.inner
            .send_to(data, self.inner.remote_address)
            .await
            .map_err(ConnectionError::Send)
    }
}

#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("No more messages in the datagram")]
    EndOfStream,

    #[error("Malformed message")]
    Decode(#[from] DecodeError),

    #[error("Failed to send a message")]
    Send(#[source] std::io::Error),
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::network::datagram::MockDatagramSender;
    use bytes::BufMut;
    use bytes::BytesMut;
    use futures_util::FutureExt;
    use pva_discovery_protocol::SearchRequest;
    use pva_discovery_protocol::FLAG_CONTROL;
    use pva_discovery_protocol::FLAG_FROM_SERVER;
    use pva_discovery_protocol::MAGIC;
    use pva_discovery_protocol::PROTOCOL_VERSION;
    use std::sync::Arc;

    fn connection(payload: BytesMut, sender: MockDatagramSender) -> Connection {
        Connection::new(
            PseudoConnection::new(
                payload,
                "192.0.2.9:40000".parse().unwrap(),
                "192.0.2.5:5076".parse().unwrap(),
                Arc::new(sender),
            ),
            FLAG_FROM_SERVER,
        )
    }

    #[test]
    fn skips_control_messages() {
        let request = SearchRequest {
            sequence_id: 3,
            ..Default::default()
        };
        let mut payload = BytesMut::new();
        payload.put_slice(&[MAGIC, PROTOCOL_VERSION, FLAG_CONTROL, 0x02, 0, 0, 0, 0]);
        payload.put(encode_application_message(Command::SearchRequest, 0, &request));
        let mut connection = connection(payload, MockDatagramSender::new());

        // When
        let frame = connection.next_message().unwrap();

        // Then
        assert_eq!(frame.header.command, Command::SearchRequest);
        assert!(matches!(
            connection.next_message(),
            Err(ConnectionError::EndOfStream)
        ));
    }

    #[test]
    fn empty_datagram_is_end_of_stream() {
        let mut connection = connection(BytesMut::new(), MockDatagramSender::new());

        assert!(matches!(
            connection.next_message(),
            Err(ConnectionError::EndOfStream)
        ));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let payload = BytesMut::from(&b"not pvAccess at all"[..]);
        let mut connection = connection(payload, MockDatagramSender::new());

        assert!(matches!(
            connection.next_message(),
            Err(ConnectionError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn send_app_answers_the_remote() {
        let request = SearchRequest::default();
        let expected =
            encode_application_message(Command::SearchRequest, FLAG_FROM_SERVER, &request);
        let mut sender = MockDatagramSender::new();
        sender
            .expect_send_to()
            .withf(move |data, destination| {
                *data == expected && *destination == "192.0.2.9:40000".parse::<SocketAddr>().unwrap()
            })
            .times(1)
            .returning(|_, _| async { Ok(()) }.boxed());
        let connection = connection(BytesMut::new(), sender);

        // When
        connection
            .send_app(Command::SearchRequest, &request)
            .await
            .unwrap();
    }
}
