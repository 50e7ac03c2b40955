pub mod beacon;
pub mod config;
pub mod connection;
pub mod directory;
pub mod id;
pub mod network;
mod process;
pub mod search;
mod server;

pub use config::BeaconSchedule;
pub use config::DiscoveryConfig;
pub use directory::ChannelDirectory;
pub use directory::EmptyChannelDirectory;
pub use directory::StaticChannelDirectory;
pub use server::serve;
pub use server::DiscoveryError;
