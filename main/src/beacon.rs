use crate::config::BeaconSchedule;
use crate::network::datagram::DatagramSender;
use crate::network::topology::BeaconRoute;
use crate::DiscoveryError;
use pva_discovery_protocol::encode_application_message;
use pva_discovery_protocol::BeaconMessage;
use pva_discovery_protocol::Command;
use pva_discovery_protocol::Guid;
use pva_discovery_protocol::FLAG_FROM_SERVER;
use std::net::IpAddr;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio::time::Interval;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub struct BeaconTarget {
    pub route: BeaconRoute,
    pub sender: Arc<dyn DatagramSender>,
}

pub struct BeaconScheduler {
    template: BeaconMessage,
    /// `None` when every route advertises its own local address.
    advertised_address: Option<IpAddr>,
    targets: Vec<BeaconTarget>,
    schedule: BeaconSchedule,
}

impl BeaconScheduler {
    pub fn new(
        guid: Guid,
        server_address: SocketAddr,
        targets: Vec<BeaconTarget>,
        schedule: BeaconSchedule,
    ) -> Self {
        let advertised_address = Some(server_address.ip()).filter(|ip| !ip.is_unspecified());
        let template = BeaconMessage {
            guid,
            server_address: server_address.ip().into(),
            server_port: server_address.port(),
            protocol: "tcp".into(),
            ..Default::default()
        };
        Self {
            template,
            advertised_address,
            targets,
            schedule,
        }
    }

    /// Sends beacons until `cancel` fires, which is reported as [`DiscoveryError::Cancelled`].
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), DiscoveryError> {
        let mut ticks_sent = 0u32;
        let mut timer = new_timer(self.schedule.period(ticks_sent));
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::debug!("Beacon scheduler stopped after {} ticks", ticks_sent);
                    return Err(DiscoveryError::Cancelled);
                }
                _ = timer.tick() => {
                    self.tick().await;
                    ticks_sent = ticks_sent.saturating_add(1);
                    if ticks_sent == self.schedule.startup_count {
                        let period = self.schedule.period(ticks_sent);
                        log::debug!("Beacon period is now {:?}", period);
                        timer = new_timer(period);
                    }
                }
            }
        }
    }

    async fn tick(&mut self) {
        self.template.sequence_id = self.template.sequence_id.wrapping_add(1);
        for target in &self.targets {
            let mut beacon = self.template.clone();
            beacon.server_address = target
                .route
                .advertised_address(self.advertised_address)
                .into();
            let data = encode_application_message(Command::Beacon, FLAG_FROM_SERVER, &beacon);
            if let Err(e) = target.sender.send_to(data, target.route.destination).await {
                log::warn!(
                    "Failed to send beacon {} to {}: {}",
                    beacon.sequence_id,
                    target.route.destination,
                    e
                );
            }
        }
    }
}

/// Timer whose first tick fires one full period from now.
fn new_timer(period: Duration) -> Interval {
    let mut timer = tokio::time::interval_at(Instant::now() + period, period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    timer
}
