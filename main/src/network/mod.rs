pub mod datagram;
pub mod interface;
pub mod topology;
pub mod transport;
