use clap::Parser;

use gameap_daemon::Args;

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = gameap_daemon::run(args).await {
        eprintln!("gameap-daemon: {:#}", e);
        std::process::exit(1);
    }
}
