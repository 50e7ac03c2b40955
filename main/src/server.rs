use crate::beacon::BeaconScheduler;
use crate::config::DiscoveryConfig;
use crate::directory::ChannelDirectory;
use crate::id::GuidError;
use crate::id::GuidGenerator;
use crate::id::RandomGuidGenerator;
use crate::network::interface::InterfaceScanError;
use crate::network::interface::InterfaceScanner;
use crate::network::topology::TopologyPlan;
use crate::network::transport::BindError;
use crate::network::transport::Transport;
use crate::search::SearchResponder;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Runs discovery for the server at `config.server_address` until `cancel` fires.
///
/// Only returns with an error. Cancellation is reported as [`DiscoveryError::Cancelled`].
pub async fn serve(
    config: DiscoveryConfig,
    directory: Arc<dyn ChannelDirectory>,
    cancel: CancellationToken,
) -> Result<(), DiscoveryError> {
    let scanner = crate::network::interface::interface_scanner().await?;
    serve_with(
        config,
        directory,
        &RandomGuidGenerator,
        scanner.as_ref(),
        cancel,
    )
    .await
}

async fn serve_with(
    config: DiscoveryConfig,
    directory: Arc<dyn ChannelDirectory>,
    guid_generator: &dyn GuidGenerator,
    scanner: &dyn InterfaceScanner,
    cancel: CancellationToken,
) -> Result<(), DiscoveryError> {
    let guid = guid_generator.generate()?;
    log::info!("Server GUID: {:?}", guid);

    let interfaces = scanner.scan().await?;
    log::debug!("Network interfaces: {:?}", interfaces);
    let plan = TopologyPlan::new(&interfaces, config.server_address.ip(), &(&config).into());
    if plan.listen_endpoints.is_empty() {
        return Err(DiscoveryError::NoListenEndpoints);
    }

    let transport = Transport::bind(&plan)?;
    log::info!(
        "Sending beacons to {:?}",
        transport.beacon_destinations()
    );

    let responder = Arc::new(SearchResponder::new(
        guid,
        config.server_address.port(),
        directory,
    ));
    let responders: Vec<_> = transport
        .listeners
        .into_iter()
        .map(|listener| tokio::spawn(responder.clone().serve(listener, cancel.child_token())))
        .collect();

    let scheduler = BeaconScheduler::new(
        guid,
        config.server_address,
        transport.beacon_targets,
        config.schedule,
    );
    let result = scheduler.run(cancel.clone()).await;

    cancel.cancel();
    for responder in futures_util::future::join_all(responders).await {
        if let Err(e) = responder {
            log::error!("Search responder task failed: {}", e);
        }
    }
    result
}

#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("Failed to generate the server GUID")]
    Identity(#[from] GuidError),

    #[error("Failed to enumerate network interfaces")]
    InterfaceScan(#[from] InterfaceScanError),

    #[error("Failed to bind discovery sockets")]
    Bind(#[from] BindError),

    #[error("No network interface to listen on")]
    NoListenEndpoints,

    #[error("Discovery was cancelled")]
    Cancelled,
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::directory::EmptyChannelDirectory;
    use crate::id::MockGuidGenerator;
    use crate::network::interface::InterfaceAddress;
    use crate::network::interface::InterfaceFlags;
    use crate::network::interface::MockInterfaceScanner;
    use futures_util::FutureExt;
    use pva_discovery_protocol::Guid;
    use std::time::Duration;

    fn config() -> DiscoveryConfig {
        let mut config = DiscoveryConfig::new("0.0.0.0:5075".parse().unwrap());
        config.discovery_port = 0;
        config.local_multicast_group = None;
        config.subnet_broadcast_listeners = false;
        config
    }

    fn guid_generator() -> MockGuidGenerator {
        let mut generator = MockGuidGenerator::new();
        generator.expect_generate().returning(|| Ok(Guid([1; 12])));
        generator
    }

    fn scanner(interfaces: Vec<InterfaceAddress>) -> MockInterfaceScanner {
        let mut scanner = MockInterfaceScanner::new();
        scanner
            .expect_scan()
            .returning(move || futures_util::future::ok(interfaces.clone()).boxed());
        scanner
    }

    fn loopback(up: bool) -> InterfaceAddress {
        InterfaceAddress {
            interface_index: 1,
            interface_name: "lo".into(),
            address: "127.0.0.1".parse().unwrap(),
            prefix_length: 8,
            broadcast: None,
            flags: InterfaceFlags {
                up,
                loopback: true,
                broadcast: false,
                multicast: true,
            },
        }
    }

    #[tokio::test]
    async fn identity_failure_is_fatal() {
        let mut generator = MockGuidGenerator::new();
        generator.expect_generate().returning(|| {
            Err(GuidError::from(getrandom::Error::UNSUPPORTED))
        });
        let mut scanner = MockInterfaceScanner::new();
        scanner.expect_scan().never();

        // When
        let result = serve_with(
            config(),
            Arc::new(EmptyChannelDirectory),
            &generator,
            &scanner,
            CancellationToken::new(),
        )
        .await;

        // Then
        assert!(matches!(result, Err(DiscoveryError::Identity(_))));
    }

    #[tokio::test]
    async fn nothing_to_listen_on() {
        // When
        let result = serve_with(
            config(),
            Arc::new(EmptyChannelDirectory),
            &guid_generator(),
            &scanner(vec![loopback(false)]),
            CancellationToken::new(),
        )
        .await;

        // Then
        assert!(matches!(result, Err(DiscoveryError::NoListenEndpoints)));
    }

    #[tokio::test]
    async fn runs_until_cancelled() {
        crate::test::init();

        let cancel = CancellationToken::new();
        let cancel_later = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel_later.cancel();
        });

        // When
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            serve_with(
                config(),
                Arc::new(EmptyChannelDirectory),
                &guid_generator(),
                &scanner(vec![loopback(true)]),
                cancel,
            ),
        )
        .await
        .unwrap();

        // Then
        assert!(matches!(result, Err(DiscoveryError::Cancelled)));
    }

    #[tokio::test]
    async fn serve_runs_in_a_spawned_task() {
        crate::test::init();

        let cancel = CancellationToken::new();
        cancel.cancel();

        // When
        let task = tokio::spawn(serve(config(), Arc::new(EmptyChannelDirectory), cancel));

        // Then
        let result = tokio::time::timeout(Duration::from_secs(10), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_err(), "Discovery only stops with an error");
    }
}
