use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use parcel_logging::{TracingLogger, TransferEvent, TransferLog, TransferLogger};
use parcel_server::cli;
use parcel_server::handlers::{self, HelloHandler, ServerContext, TransferHandler};
use parcel_server::reaper;
use parcel_server::sandbox;
use parcel_server::session;
use parcel_server::supervisor;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let default_filter = if cli.debug {
        "parcel_server=debug,parcel_net=debug,parcel_protocol=debug"
    } else {
        "parcel_server=info,parcel_net=info,parcel_protocol=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let (host, port) = cli.host_and_port()?;
    let host = if cli.listen_all { None } else { host };
    let protocol = cli.protocol();
    let chunk_size = cli.chunk as usize;
    let timeout = Duration::from_millis(cli.timeout);

    let save_root = sandbox::ensure_save_root(&cli.dir).await?;
    info!("save root: {}", save_root.display());

    let logger: Arc<dyn parcel_logging::TransferLogger> = Arc::new(TracingLogger);
    let table = Arc::new(session::SessionTable::new());
    let ctx = Arc::new(ServerContext {
        table: table.clone(),
        save_root,
        logger: logger.clone(),
    });
    let handlers: Arc<Vec<Arc<dyn handlers::Handler>>> =
        Arc::new(vec![Arc::new(HelloHandler), Arc::new(TransferHandler)]);

    let candidates = parcel_net::resolve_bind_addrs(host.as_deref(), port);
    let bound = supervisor::bind_all(&candidates, protocol, &logger)?;

    let running = Arc::new(AtomicBool::new(true));
    let live_time = reaper::default_live_time(timeout);
    let check_interval = reaper::default_check_interval(live_time);

    let mut serving_tasks = Vec::new();
    for (addr, socket) in bound {
        let handlers = handlers.clone();
        let ctx = ctx.clone();
        let running = running.clone();
        serving_tasks.push(tokio::spawn(async move {
            supervisor::serve(addr, socket, handlers, ctx, running, chunk_size, timeout).await;
        }));
    }

    let reaper_task = tokio::spawn(reaper::run(
        table,
        live_time,
        check_interval,
        logger.clone(),
        running.clone(),
    ));

    let reason = shutdown_signal().await;
    logger.log(TransferLog {
        component: "supervisor",
        session_id: None,
        event: TransferEvent::ShuttingDown {
            reason: reason.to_string(),
        },
    });
    running.store(false, Ordering::Release);

    for task in serving_tasks {
        let _ = task.await;
    }
    let _ = reaper_task.await;

    Ok(())
}

/// Waits for the process's shutdown signal and reports which one arrived,
/// for the caller to log through the shared logging trait.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => "received Ctrl+C",
            _ = sigterm.recv() => "received SIGTERM",
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        "received Ctrl+C"
    }
}
