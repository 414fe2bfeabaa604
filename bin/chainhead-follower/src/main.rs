//! Chain-head follower
//!
//! Follows a node's chain head through the `chainHead` JSON-RPC methods and
//! logs every block it sees pinned, becoming best or getting finalized.

mod args;
mod config;
mod errors;

use std::{sync::Arc, time::Duration};

use args::{Args, EnvArgs};
use config::resolve_config;
use errors::Result;
use strata_chainhead_rpc::WsTransport;
use strata_chainhead_tracker::{ChainHeadError, ChainHeadNotification, ChainHeadTracker};
use strata_common::logging::{self, LoggingInitConfig};
use strata_config::Config;
use tokio::{
    select, signal,
    sync::broadcast::{self, error::RecvError},
    time::{interval, sleep},
};
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "chainhead-follower";

/// How often we check that the follow session is still alive.
const SESSION_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Delay before following again after the node stopped our subscription.
const REFOLLOW_DELAY: Duration = Duration::from_secs(2);

fn main() -> Result<()> {
    let args: Args = argh::from_env();
    if let Err(e) = main_inner(args) {
        eprintln!("FATAL ERROR: {e}");

        return Err(e);
    }

    Ok(())
}

fn main_inner(args: Args) -> Result<()> {
    let config = resolve_config(&args, &EnvArgs::from_env())?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("follower-rt")
        .build()?;

    {
        // The OTLP exporter spawns onto the current runtime.
        let _g = runtime.enter();
        init_logging(&config)?;
    }

    let res = runtime.block_on(run(config));
    if let Err(err) = &res {
        error!(%err, "follower exited with error");
    }

    logging::finalize();
    res
}

fn init_logging(config: &Config) -> Result<()> {
    let logging = &config.logging;
    logging::init_logging_from_config(LoggingInitConfig {
        service_base_name: SERVICE_NAME,
        service_label: logging.service_label.as_deref(),
        service_version: Some(env!("CARGO_PKG_VERSION")),
        otlp_url: logging.otlp_url.as_deref(),
        otlp_timeout: logging.otlp_timeout_secs.map(Duration::from_secs),
        log_dir: logging.log_dir.as_ref(),
        log_file_prefix: logging.log_file_prefix.as_deref(),
        json_format: logging.json_format,
        default_log_prefix: SERVICE_NAME,
        directives: &logging.directives,
    })?;
    Ok(())
}

async fn run(config: Config) -> Result<()> {
    let follower = &config.follower;
    info!(rpc_url = %follower.rpc_url, "connecting to node");
    let transport = Arc::new(WsTransport::connect(&follower.rpc_url).await?);

    let mut builder = ChainHeadTracker::builder(transport)
        .with_method_group(follower.method_group.clone())
        .with_notification_capacity(follower.notification_capacity);
    if let Some(versions) = &follower.supported_versions {
        builder = builder.with_supported_versions(versions.clone());
    }
    if let Some(version) = &follower.fixed_version {
        builder = builder.with_fixed_version(version.clone());
    }
    let tracker = builder.build();

    let version = tracker.methods().version().await.map_err(ChainHeadError::from)?;
    info!(group = %follower.method_group, %version, "using method group");

    let notifications = tracker.subscribe_notifications();
    tracker.follow(follower.with_runtime).await?;
    log_session(&tracker);

    select! {
        res = signal::ctrl_c() => {
            if let Err(err) = res {
                warn!(%err, "failed to listen for ctrl-c");
            }
            info!("received shutdown signal");
        }
        _ = log_notifications(notifications) => {}
        res = keep_following(&tracker, follower.with_runtime) => res?,
    }

    if let Err(err) = tracker.unfollow() {
        warn!(%err, "unfollow on shutdown");
    }
    Ok(())
}

fn log_session(tracker: &ChainHeadTracker<WsTransport>) {
    if let (Ok(best), Ok(finalized)) = (tracker.best_hash(), tracker.finalized_hash()) {
        info!(
            subscription_id = ?tracker.subscription_id(),
            %best,
            %finalized,
            "following chain"
        );
    }
}

async fn log_notifications(mut notifications: broadcast::Receiver<ChainHeadNotification>) {
    loop {
        match notifications.recv().await {
            Ok(ChainHeadNotification::NewBlock { hash, runtime }) => {
                let spec_version = runtime.map(|r| r.spec_version);
                info!(%hash, ?spec_version, "new block");
            }
            Ok(ChainHeadNotification::BestBlock { hash, runtime }) => {
                let spec_version = runtime.map(|r| r.spec_version);
                info!(%hash, ?spec_version, "best block");
            }
            Ok(ChainHeadNotification::FinalizedBlock { hash, runtime }) => {
                let spec_version = runtime.map(|r| r.spec_version);
                info!(%hash, ?spec_version, "finalized block");
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "notification logger lagging");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Follows again whenever the node stops our subscription.
async fn keep_following(tracker: &ChainHeadTracker<WsTransport>, with_runtime: bool) -> Result<()> {
    let mut check = interval(SESSION_CHECK_INTERVAL);
    loop {
        check.tick().await;
        if tracker.is_following() {
            continue;
        }

        if !tracker.methods().transport().is_connected() {
            error!("connection to node lost");
            return Err(ChainHeadError::SubscriptionStopped.into());
        }

        warn!("follow session ended, following again");
        sleep(REFOLLOW_DELAY).await;
        match tracker.follow(with_runtime).await {
            Ok(()) => log_session(tracker),
            Err(err) => warn!(%err, "failed to follow again"),
        }
    }
}
