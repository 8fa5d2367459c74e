//! The long-running bot: startup, update polling and shutdown.

use std::sync::Arc;
use std::time::Duration;

use miette::{IntoDiagnostic, Result};
use teloxide::prelude::*;
use teloxide::types::AllowedUpdate;
use teloxide::update_listeners::Polling;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use cadence_scheduler::{DeliveryCallback, SchedulerCore};
use cadence_store::SqliteStore;
use cadence_telegram::{POLL_TIMEOUT, TelegramBot};

use crate::config::BotConfig;
use crate::delivery::ImageDelivery;
use crate::gallery::Gallery;
use crate::handler::Handler;
use crate::transport::ChatTransport;

/// Pause between attempts to stop a dispatcher that is still starting.
const SHUTDOWN_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Run the bot until ctrl-c.
pub async fn run(config: BotConfig) -> Result<()> {
    let store = Arc::new(
        SqliteStore::open(&config.db_path)
            .map_err(|e| miette::miette!("failed to open database: {}", e))?,
    );

    let gallery = Arc::new(
        Gallery::load(&config.images_dir, Arc::clone(&store))
            .await
            .map_err(|e| miette::miette!("failed to load images: {}", e))?,
    );

    let telegram = Arc::new(
        TelegramBot::new(&config.api_url, &config.bot_token, config.request_timeout)
            .into_diagnostic()?,
    );
    let me = telegram
        .get_me()
        .await
        .map_err(|e| miette::miette!("failed to authorize bot: {}", e))?;
    info!(
        username = me.user.username.as_deref().unwrap_or(&me.user.first_name),
        "authorized on account"
    );

    let scheduler = SchedulerCore::new(store, config.scheduler.clone()).into_diagnostic()?;

    let transport: Arc<dyn ChatTransport> = telegram.clone();
    let delivery = Arc::new(ImageDelivery::new(gallery, Arc::clone(&transport)));

    let callback: Arc<dyn DeliveryCallback> = delivery.clone();
    scheduler
        .reschedule_existing(callback)
        .await
        .map_err(|e| miette::miette!("failed to restore subscriptions: {}", e))?;

    let handler = Arc::new(Handler::new(
        scheduler.clone(),
        delivery,
        transport,
        config.command_cooldown,
    ));

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Handle shutdown signals
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    dispatch_updates(telegram.bot().clone(), handler, shutdown_rx).await;

    info!("stopping subscription workers");
    scheduler.shutdown().await;
    info!("bot stopped");
    Ok(())
}

/// Long-poll for updates and hand every message to the handler until
/// shutdown. Updates from one chat are handled in order; chats run
/// concurrently.
async fn dispatch_updates(
    bot: Bot,
    handler: Arc<Handler>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let message_handler = Update::filter_message().endpoint(move |msg: Message| {
        let handler = Arc::clone(&handler);
        async move {
            if msg.from.as_ref().is_some_and(|u| u.is_bot) {
                warn!(chat_id = msg.chat.id.0, "ignoring message from a bot");
                return respond(());
            }
            handler
                .handle(msg.chat.id.0, msg.text().unwrap_or_default())
                .await;
            respond(())
        }
    });

    let mut dispatcher = Dispatcher::builder(bot.clone(), dptree::entry().branch(message_handler))
        .default_handler(|_| async { debug!("ignoring non-message update") })
        .build();
    let shutdown_token = dispatcher.shutdown_token();

    let shutdown_handle = tokio::spawn(async move {
        while shutdown_rx.changed().await.is_ok() {
            if !*shutdown_rx.borrow() {
                continue;
            }
            // The token refuses to stop a dispatcher that has not started yet.
            loop {
                match shutdown_token.shutdown() {
                    Ok(stopped) => {
                        stopped.await;
                        return;
                    }
                    Err(e) => {
                        debug!(error = ?e, "dispatcher idle, retrying shutdown");
                        tokio::time::sleep(SHUTDOWN_RETRY_DELAY).await;
                    }
                }
            }
        }
    });

    let polling = Polling::builder(bot)
        .timeout(POLL_TIMEOUT)
        .allowed_updates(vec![AllowedUpdate::Message])
        .build();

    info!("polling for updates");
    dispatcher
        .dispatch_with_listener(
            polling,
            teloxide::error_handlers::LoggingErrorHandler::with_custom_text(
                "failed to poll updates",
            ),
        )
        .await;

    shutdown_handle.abort();
}
