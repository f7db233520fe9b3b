use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parcel_client::cli;
use parcel_client::sender::{Sender, SenderError, DEFAULT_HELLO_RETRIES, DEFAULT_PING_RETRIES};
use parcel_logging::TracingLogger;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

const RECONNECT_ATTEMPTS: u32 = 3;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let default_filter = if cli.debug {
        "parcel_client=debug,parcel_net=debug,parcel_protocol=debug"
    } else {
        "parcel_client=info,parcel_net=info,parcel_protocol=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let protocol = cli.protocol();
    let chunk_size = cli.chunk;
    let timeout = Duration::from_millis(cli.timeout);
    let logger: Arc<dyn parcel_logging::TransferLogger> = Arc::new(TracingLogger);

    let targets = parcel_net::resolve_target(&cli.ip, cli.port).await?;
    let target = *targets
        .first()
        .ok_or_else(|| anyhow::anyhow!("no address resolved for {}", cli.ip))?;

    let mut sender = Sender::connect(protocol, target, chunk_size, timeout, logger).await?;

    if cli.ping {
        let results = sender.ping(DEFAULT_PING_RETRIES).await;
        let mut ok = 0;
        for (attempt, result) in results.iter().enumerate() {
            match result {
                Ok(rtt) => {
                    ok += 1;
                    println!("reply from {target}: attempt={} time={}ms", attempt + 1, rtt.as_millis());
                }
                Err(err) => println!("no reply from {target}: attempt={} ({err})", attempt + 1),
            }
        }
        if ok == 0 {
            std::process::exit(1);
        }
        return Ok(());
    }

    if !reconnect_until_alive(&mut sender, RECONNECT_ATTEMPTS).await {
        error!("could not reach {target}");
        std::process::exit(1);
    }

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    println!("enter a file path to send, or @exit/@quit/@q to stop");
    loop {
        print!("> ");
        use std::io::Write;
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "@exit" | "@quit" | "@q") {
            break;
        }

        if !reconnect_until_alive(&mut sender, RECONNECT_ATTEMPTS).await {
            println!("receiver unreachable, try again later");
            continue;
        }

        match sender.send_file(Path::new(line)).await {
            Ok(()) => info!("sent {line}"),
            Err(err) => println!("failed to send {line}: {err}"),
        }
    }

    Ok(())
}

/// Re-run the hello probe, attempting `reconnect` up to `attempts` times on
/// failure before giving up.
async fn reconnect_until_alive(sender: &mut Sender, attempts: u32) -> bool {
    for attempt in 0..attempts {
        if sender.hello_probe(DEFAULT_HELLO_RETRIES).await.is_ok() {
            return true;
        }
        if attempt + 1 < attempts {
            let _: Result<(), SenderError> = sender.reconnect().await;
        }
    }
    false
}
