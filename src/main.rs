use clap::{Parser, Subcommand};
use netregio::{
    config::{RelayConfigCli, ServerConfigCli},
    relay::RegioRelay,
    server::RegioServer,
};

/// Main entry point for the regio command-line tool.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Arguments {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the regio registration server.
    Server(ServerConfigCli),
    /// Run the regio broker relay.
    Relay(RelayConfigCli),
}

fn main() {
    let args = Arguments::parse();
    match args.mode {
        Mode::Server(server_cli) => {
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .unwrap()
                .block_on(async {
                    RegioServer::main(server_cli).await;
                });
        }
        Mode::Relay(relay_cli) => {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap()
                .block_on(async {
                    RegioRelay::main(relay_cli).await;
                });
        }
    }
}
