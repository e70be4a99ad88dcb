//! Interactive run loop.

use super::commands::{HostCommand, HELP};
use super::services::Services;
use dropmate_config_and_utils::{Config, Paths};
use dropmate_realtime::RealtimeEvent;
use dropmate_sync::{RealtimeSync, SyncHandle};
use dropmate_types::{ListFilters, ShipmentStatus};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

pub struct RunOptions {
    pub email: String,
    pub password: Option<String>,
    pub offline: bool,
}

pub async fn run(
    config: Config,
    paths: Paths,
    options: RunOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let services = Services::build(&config, &paths, &options).await?;

    let sync = RealtimeSync::start(
        services.session.clone(),
        services.controller.clone(),
        services.reconciler.clone(),
        services.app_state.clone(),
    );
    let _stale = services
        .shipments
        .cache()
        .on_invalidate(|key| info!(key = %key, "Cache entry stale"));

    sync.flush().await;
    println!("dropmate running; {HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match HostCommand::parse(&line) {
                    Ok(HostCommand::Quit) => break,
                    Ok(command) => handle(&services, &sync, command).await,
                    Err(message) => println!("{message}"),
                }
            }
        }
    }

    sync.shutdown().await;
    services.provider_watch.stop();
    info!("dropmate stopped");
    Ok(())
}

async fn handle(services: &Services, sync: &SyncHandle, command: HostCommand) {
    match command {
        HostCommand::SetState(state) => {
            services.app_state.set(state);
            sync.flush().await;
            print_status(services);
        }
        HostCommand::Status => print_status(services),
        HostCommand::List => match services.shipments.list(&ListFilters::default()).await {
            Ok(shipments) => {
                for shipment in shipments {
                    println!(
                        "{}  {:<16}  {}  {}",
                        shipment.id,
                        shipment.status.as_str(),
                        shipment.tracking_no,
                        shipment.nickname.as_deref().unwrap_or("")
                    );
                }
            }
            Err(e) => {
                warn!(error = %e, "Listing shipments failed");
                println!("list failed: {e}");
            }
        },
        HostCommand::Deliver(id) => match &services.loopback {
            Some(loopback) => {
                let pushed = loopback.push(RealtimeEvent::ShipmentStatusChanged {
                    shipment_id: id,
                    status: ShipmentStatus::Delivered,
                });
                if !pushed {
                    println!("realtime channel is not connected");
                }
            }
            None => println!("deliver is only available with --offline"),
        },
        HostCommand::Notice(id) => {
            let touched = services.reconciler.apply_push_notice(&id);
            println!("{} cache entries marked stale", touched.len());
        }
        HostCommand::Help => println!("{HELP}"),
        HostCommand::Quit => {}
    }
}

fn print_status(services: &Services) {
    let session = services.session.snapshot();
    let connection = services.controller.connection();
    let cache = services.shipments.cache();
    let stale = cache
        .keys()
        .iter()
        .filter(|key| cache.is_stale(key) == Some(true))
        .count();

    println!(
        "{}",
        serde_json::json!({
            "session": session.status,
            "user_id": session.user_id(),
            "app_state": services.app_state.current().as_str(),
            "channel": {
                "connected": connection.is_connected,
                "connection_id": connection.connection_id,
            },
            "cache": { "entries": cache.len(), "stale": stale },
        })
    );
}
