mod server;

use clap::Parser;
use clap::Subcommand;
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    match Cli::parse().command {
        Command::Serve(options) => crate::server::serve(options).await?,
    };
    Ok(())
}

#[derive(Parser)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Announces a pvAccess server and answers searches for its channels.
    Serve(ServeOptions),
}

#[derive(clap::Args)]
pub struct ServeOptions {
    /// Address of the TCP server to advertise. An unspecified IP advertises each interface's own address.
    #[arg(long, default_value = "0.0.0.0:5075")]
    address: SocketAddr,

    /// Name of a channel hosted by the server. May be repeated.
    #[arg(long = "channel")]
    channels: Vec<String>,

    /// Seconds between beacons once the start-up burst is over.
    #[arg(long, env = "EPICS_PVA_BEACON_PERIOD")]
    beacon_period: Option<u64>,

    /// Do not join the loopback multicast group shared by servers on this host.
    #[arg(long)]
    no_local_multicast: bool,
}

#[cfg(test)]
mod test {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_defaults() {
        let Command::Serve(options) = Cli::parse_from(["pva-discovery", "serve"]).command;

        assert_eq!(options.address, "0.0.0.0:5075".parse().unwrap());
        assert!(options.channels.is_empty());
        assert!(!options.no_local_multicast);
    }

    #[test]
    fn repeated_channels() {
        let Command::Serve(options) = Cli::parse_from([
            "pva-discovery",
            "serve",
            "--channel",
            "ring:current",
            "--channel",
            "ring:energy",
            "--beacon-period",
            "15",
        ])
        .command;

        assert_eq!(options.channels, vec!["ring:current", "ring:energy"]);
        assert_eq!(options.beacon_period, Some(15));
    }
}
