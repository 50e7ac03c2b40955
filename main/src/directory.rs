use mockall::automock;
use std::collections::HashMap;

/// Resolves channel names to local channel IDs.
#[automock]
pub trait ChannelDirectory: Send + Sync {
    fn lookup(&self, channel_name: &str) -> Option<u32>;
}

/// Directory of a server that hosts no channels.
#[derive(Default)]
pub struct EmptyChannelDirectory;

impl ChannelDirectory for EmptyChannelDirectory {
    fn lookup(&self, _channel_name: &str) -> Option<u32> {
        None
    }
}

/// Fixed set of channel names, numbered in the order given.
#[derive(Default, Debug)]
pub struct StaticChannelDirectory {
    channels: HashMap<String, u32>,
}

impl StaticChannelDirectory {
    pub fn new(channel_names: impl IntoIterator<Item = String>) -> Self {
        let mut channels = HashMap::new();
        for name in channel_names {
            let next_id = channels.len() as u32 + 1;
            channels.entry(name).or_insert(next_id);
        }
        Self { channels }
    }
}

impl ChannelDirectory for StaticChannelDirectory {
    fn lookup(&self, channel_name: &str) -> Option<u32> {
        self.channels.get(channel_name).copied()
    }
}
