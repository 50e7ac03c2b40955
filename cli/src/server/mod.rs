use crate::ServeOptions;
use pva_discovery::ChannelDirectory;
use pva_discovery::DiscoveryConfig;
use pva_discovery::DiscoveryError;
use pva_discovery::EmptyChannelDirectory;
use pva_discovery::StaticChannelDirectory;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub async fn serve(options: ServeOptions) -> anyhow::Result<()> {
    let config = new_config(&options)?;
    let directory: Arc<dyn ChannelDirectory> = if options.channels.is_empty() {
        Arc::new(EmptyChannelDirectory)
    } else {
        log::info!("Hosting channels {:?}", options.channels);
        Arc::new(StaticChannelDirectory::new(options.channels))
    };

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => log::info!("Shutting down"),
            Err(e) => log::error!("Failed to listen for Ctrl-C: {}", e),
        }
        cancel_on_signal.cancel();
    });

    match pva_discovery::serve(config, directory, cancel).await {
        Ok(()) | Err(DiscoveryError::Cancelled) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn new_config(options: &ServeOptions) -> anyhow::Result<DiscoveryConfig> {
    let mut config = DiscoveryConfig::new(options.address);
    if options.no_local_multicast {
        config.local_multicast_group = None;
    }
    if let Some(seconds) = options.beacon_period {
        if seconds == 0 {
            anyhow::bail!("Beacon period must be at least 1 second");
        }
        config.schedule.steady_period = Duration::from_secs(seconds);
    }
    Ok(config)
}

#[cfg(test)]
mod test {
    use super::*;

    fn options() -> ServeOptions {
        ServeOptions {
            address: "192.0.2.5:5075".parse().unwrap(),
            channels: vec![],
            beacon_period: None,
            no_local_multicast: false,
        }
    }

    #[test]
    fn default_config() {
        let config = new_config(&options()).unwrap();

        assert_eq!(config.server_address, options().address);
        assert!(config.local_multicast_group.is_some());
        assert_eq!(config.schedule.steady_period, Duration::from_secs(5));
    }

    #[test]
    fn overrides() {
        let options = ServeOptions {
            beacon_period: Some(30),
            no_local_multicast: true,
            ..options()
        };

        let config = new_config(&options).unwrap();

        assert!(config.local_multicast_group.is_none());
        assert_eq!(config.schedule.steady_period, Duration::from_secs(30));
    }

    #[test]
    fn zero_beacon_period_is_rejected() {
        let options = ServeOptions {
            beacon_period: Some(0),
            ..options()
        };

        assert!(new_config(&options).is_err());
    }
}
