//! Per-message command handling.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SubsecRound, Utc};
use moka::sync::Cache;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use cadence_scheduler::{
    DeliveryCallback, SchedulerCore, SchedulerError, SubscriberId, Subscription,
};

use crate::commands::{Command, HELP_TEXT, Invocation, WELCOME_TEXT, validate_period};
use crate::delivery::ImageDelivery;
use crate::duration::format_short;
use crate::transport::ChatTransport;

/// How long a bare `/sub` waits for the period in a follow-up message.
const PENDING_INPUT_TTL: Duration = Duration::from_secs(60);

/// Upper bound on chats tracked by each per-chat cache.
const MAX_TRACKED_CHATS: u64 = 100_000;

const NOT_FOUND_TEXT: &str = "No active subscription found!";
const PLAIN_TEXT_REPLY: &str = "I can only handle listed commands in this chat!";

/// Routes chat messages to scheduler operations and replies.
pub struct Handler {
    scheduler: SchedulerCore,
    delivery: Arc<ImageDelivery>,
    transport: Arc<dyn ChatTransport>,
    cooldown: Duration,
    /// Entries expire once the cooldown has run out.
    last_command_at: Cache<SubscriberId, Instant>,
    /// Entries expire once the pending `/sub` has lapsed.
    awaiting_period: Cache<SubscriberId, Instant>,
}

impl Handler {
    pub fn new(
        scheduler: SchedulerCore,
        delivery: Arc<ImageDelivery>,
        transport: Arc<dyn ChatTransport>,
        cooldown: Duration,
    ) -> Self {
        Self {
            scheduler,
            delivery,
            transport,
            cooldown,
            last_command_at: Cache::builder()
                .max_capacity(MAX_TRACKED_CHATS)
                .time_to_live(cooldown)
                .build(),
            awaiting_period: Cache::builder()
                .max_capacity(MAX_TRACKED_CHATS)
                .time_to_live(PENDING_INPUT_TTL)
                .build(),
        }
    }

    /// Handle one incoming message.
    #[tracing::instrument(skip(self, text))]
    pub async fn handle(&self, chat_id: SubscriberId, text: &str) {
        match Invocation::parse(text) {
            Some(invocation) => self.handle_command(chat_id, invocation).await,
            None => self.handle_plain_text(chat_id, text).await,
        }
    }

    async fn handle_command(&self, chat_id: SubscriberId, invocation: Invocation) {
        if let Some(wait) = self.cooldown_remaining(chat_id) {
            debug!(wait_ms = wait.as_millis() as u64, "command on cooldown");
            self.reply(
                chat_id,
                &format!("Command on cooldown for {:.1} sec", wait.as_secs_f64()),
            )
            .await;
            return;
        }

        self.awaiting_period.invalidate(&chat_id);

        match invocation.command {
            Command::Start => self.reply(chat_id, WELCOME_TEXT).await,
            Command::Peepo => self.send_image(chat_id).await,
            Command::Subscribe => {
                if invocation.args.is_empty() {
                    self.awaiting_period.insert(chat_id, Instant::now());
                }
                self.subscribe(chat_id, &invocation.args).await;
            }
            Command::Unsubscribe => self.unsubscribe(chat_id).await,
            Command::SubscriptionInfo => self.subscription_info(chat_id).await,
            Command::Help => self.reply(chat_id, HELP_TEXT).await,
            Command::Unknown => self.reply(chat_id, "Unknown command").await,
        }
    }

    async fn handle_plain_text(&self, chat_id: SubscriberId, text: &str) {
        let pending = self
            .awaiting_period
            .get(&chat_id)
            .is_some_and(|since| since.elapsed() < PENDING_INPUT_TTL);

        if !pending {
            self.awaiting_period.invalidate(&chat_id);
            self.reply(chat_id, PLAIN_TEXT_REPLY).await;
            return;
        }

        if self.subscribe(chat_id, text).await {
            self.awaiting_period.invalidate(&chat_id);
        }
    }

    /// Time left on the chat's command cooldown. Starts a new cooldown
    /// when none is running.
    ///
    /// Updates from one chat are handled in order, so the read and the
    /// write below never race for the same chat.
    fn cooldown_remaining(&self, chat_id: SubscriberId) -> Option<Duration> {
        let now = Instant::now();
        if let Some(last) = self.last_command_at.get(&chat_id) {
            let elapsed = now.duration_since(last);
            if elapsed < self.cooldown {
                return Some(self.cooldown - elapsed);
            }
        }
        self.last_command_at.insert(chat_id, now);
        None
    }

    async fn send_image(&self, chat_id: SubscriberId) {
        if let Err(e) = self.delivery.send_random(chat_id).await {
            warn!(error = %e, "failed to send image");
            self.reply(chat_id, "Can not send an image monkaS").await;
        }
    }

    /// Create a subscription from `input`. Returns whether it was created.
    async fn subscribe(&self, chat_id: SubscriberId, input: &str) -> bool {
        let period = match validate_period(input, self.scheduler.config()) {
            Ok(period) => period,
            Err(e) => {
                self.reply(chat_id, &e.to_string()).await;
                return false;
            }
        };

        let subscription = Subscription::new(chat_id, Utc::now().trunc_subsecs(0), period);
        let callback: Arc<dyn DeliveryCallback> = self.delivery.clone();

        match self.scheduler.create(subscription, callback).await {
            Ok(()) => {
                info!(period = %format_short(period), "chat subscribed");
                self.reply(chat_id, "Subscription created successfully!").await;
                true
            }
            Err(e) => {
                error!(error = %e, "failed to create subscription");
                self.reply(chat_id, "Can not create subscription :d").await;
                false
            }
        }
    }

    async fn unsubscribe(&self, chat_id: SubscriberId) {
        match self.scheduler.delete(chat_id).await {
            Ok(()) => self.reply(chat_id, "Subscription deleted successfully!").await,
            Err(SchedulerError::NotFound(_)) => self.reply(chat_id, NOT_FOUND_TEXT).await,
            Err(e) => {
                error!(error = %e, "failed to delete subscription");
                self.reply(chat_id, "Can not delete subscription :d").await;
            }
        }
    }

    async fn subscription_info(&self, chat_id: SubscriberId) {
        match self.scheduler.get(chat_id).await {
            Ok(subscription) => {
                let text = subscription_info_text(&subscription, Utc::now());
                self.reply(chat_id, &text).await;
            }
            Err(SchedulerError::NotFound(_)) => self.reply(chat_id, NOT_FOUND_TEXT).await,
            Err(e) => {
                error!(error = %e, "failed to get subscription");
                self.reply(chat_id, "Error getting subscription :d").await;
            }
        }
    }

    async fn reply(&self, chat_id: SubscriberId, text: &str) {
        if let Err(e) = self.transport.send_text(chat_id, text).await {
            warn!(chat_id, error = %e, "failed to send reply");
        }
    }
}

fn format_time(time: DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn subscription_info_text(subscription: &Subscription, now: DateTime<Utc>) -> String {
    format!(
        "Current subscription info:\nCreated at: {}\nPeriod: {}\nNext peepo: {}",
        format_time(subscription.created_at),
        format_short(subscription.period),
        format_time(subscription.next_delivery_at(now)),
    )
}
