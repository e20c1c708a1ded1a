//! Presenced daemon entry point.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::signal;
use tokio::sync::mpsc;

use presenced::notify::{ChannelSink, LogAnnouncer, Notifier};
use presenced::{ChangeEvent, Config, Poller, RecordStore, RestStore, WatchTarget};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    // Load configuration
    let cfg = Config::load()?;
    info!("Starting presenced with config: {:?}", cfg);
    let poll = cfg.poll_config();
    poll.validate()?;

    let store = Arc::new(RestStore::new(poll.request_timeout)?);

    if cfg.publish_status {
        match store
            .set_status(&poll, &poll.self_id, &poll.presence.available)
            .await
        {
            Ok(()) => info!("Marked {} as {}", poll.self_id, poll.presence.available),
            Err(e) => warn!("Could not publish own status: {}", e.summary()),
        }
    }

    let target = match cfg.track.clone() {
        Some(id) => WatchTarget::Entity(id),
        None => WatchTarget::Available,
    };
    let tracking = matches!(target, WatchTarget::Entity(_));

    // Event channel
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let notifier = Notifier::new(Arc::new(ChannelSink::new(event_tx)))
        .with_announcer(Arc::new(LogAnnouncer));

    let poller = Poller::new(store.clone(), notifier);
    poller.start(poll.clone(), target)?;

    let consumer_handle = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            log_event(&event, tracking);
        }
    });

    // Graceful Shutdown
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, shutting down...");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    poller.stop();
    consumer_handle.abort();

    if cfg.publish_status {
        if let Err(e) = store
            .set_status(&poll, &poll.self_id, &poll.presence.offline)
            .await
        {
            warn!("Could not publish offline status: {}", e.summary());
        }
    }

    info!("Shutdown complete.");
    Ok(())
}

fn log_event(event: &ChangeEvent, tracking: bool) {
    match event {
        ChangeEvent::Added { id, record } | ChangeEvent::Changed { id, record } if tracking => {
            match record.coordinates() {
                Some((lat, lng)) => info!(
                    "{} ({}) is at {:.6}, {:.6}",
                    record.display_name(),
                    id,
                    lat,
                    lng
                ),
                None => info!("{} ({}) has no known position", record.display_name(), id),
            }
        }
        ChangeEvent::Added { id, record } => {
            info!("{} ({}) is available", record.display_name(), id);
        }
        ChangeEvent::Changed { id, record } => {
            info!("{} ({}) updated their profile", record.display_name(), id);
        }
        ChangeEvent::Removed { id } if tracking => info!("{} is no longer reachable", id),
        ChangeEvent::Removed { id } => info!("{} is no longer available", id),
    }
}
