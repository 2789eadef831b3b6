//! `chainevents run` and `chainevents info`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chainevents_core::{
    EventFilter, EventSource, EventSubscriber, NetworkConfig, ShutdownSummary,
};
use chainevents_ws::{WsEventSource, WsSourceConfig};

use crate::config::AppConfig;

async fn connect(network: &NetworkConfig) -> Result<WsEventSource> {
    tracing::info!(
        endpoint = %network.endpoint,
        channel = %network.channel,
        user = %network.user,
        org = %network.org,
        "connecting to Fabric network"
    );
    let config = WsSourceConfig {
        request_timeout: network.request_timeout(),
    };
    WsEventSource::connect(&network.endpoint, &network.channel, config)
        .await
        .with_context(|| format!("connecting to {}", network.endpoint))
}

pub async fn info(config: &AppConfig) -> Result<()> {
    let source = connect(&config.network).await?;
    let info = source
        .query_info()
        .await
        .context("querying blockchain info")?;
    println!("blockchain info: {info}");
    Ok(())
}

pub async fn run(config: AppConfig) -> Result<()> {
    let source = connect(&config.network).await?;
    let info = source
        .query_info()
        .await
        .context("querying blockchain info")?;
    println!("blockchain info: {info}");

    let source: Arc<dyn EventSource> = Arc::new(source);
    let (mut subscriber, mut reports) = EventSubscriber::new(source, config.subscriber.clone());

    subscriber
        .subscribe(EventFilter::Block)
        .await
        .context("subscribing to block events")?;
    subscriber
        .subscribe(config.network.chaincode_filter())
        .await
        .with_context(|| {
            format!(
                "subscribing to chaincode events for {}",
                config.network.chaincode_id
            )
        })?;

    let printer = tokio::spawn(async move {
        while let Some(report) = reports.recv().await {
            println!("{report}");
        }
    });

    let summary = subscriber.run_until(stop_signal(config.network.run_duration())).await;
    drop(subscriber);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "report printer failed");
    }

    print_summary(&summary);
    Ok(())
}

/// Completes after `duration` or on Ctrl-C, whichever comes first.
async fn stop_signal(duration: Duration) {
    let elapsed = tokio::time::sleep(duration);
    tokio::pin!(elapsed);
    tokio::select! {
        _ = &mut elapsed => {
            tracing::info!(secs = duration.as_secs(), "run duration elapsed");
        }
        res = tokio::signal::ctrl_c() => match res {
            Ok(()) => tracing::info!("interrupted"),
            Err(e) => {
                tracing::warn!(error = %e, "cannot listen for Ctrl-C, waiting for run duration");
                elapsed.await;
            }
        },
    }
}

fn print_summary(summary: &ShutdownSummary) {
    println!("\nshutdown complete: {} registration(s) released", summary.released);
    for (id, category, exit) in &summary.listeners {
        println!("  {id} {:<9} {exit}", category.to_string());
    }
    let m = &summary.metrics;
    println!(
        "  blocks:    received {} accepted {} skipped {} closures {}",
        m.block.received, m.block.accepted, m.block.skipped, m.block.closures
    );
    println!(
        "  chaincode: received {} accepted {} skipped {} closures {}",
        m.chaincode.received, m.chaincode.accepted, m.chaincode.skipped, m.chaincode.closures
    );
    if !summary.is_clean() {
        tracing::warn!("some listeners stopped before shutdown");
    }
}
