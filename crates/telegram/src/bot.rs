use std::{sync::Arc, time::Duration};

use {
    relaydesk_channels::COMMAND_LIST,
    relaydesk_relay::RelayEngine,
    secrecy::{ExposeSecret, Secret},
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use relaydesk_metrics::{counter, telegram as tg_metrics};

use crate::{
    Result,
    handlers::{self, UpdateContext},
};

/// Long-poll timeout in seconds; the HTTP client timeout must exceed it.
const POLL_TIMEOUT_SECS: u32 = 30;
const CLIENT_TIMEOUT: Duration = Duration::from_secs(45);
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Build a bot whose HTTP client outlives the long-poll timeout.
pub fn build_bot(token: &Secret<String>) -> Result<Bot> {
    let client = teloxide::net::default_reqwest_settings()
        .timeout(CLIENT_TIMEOUT)
        .build()?;
    Ok(Bot::with_client(token.expose_secret(), client))
}

/// A running polling loop.
pub struct PollingHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    pub username: Option<String>,
}

impl PollingHandle {
    /// Cancelled on shutdown, or by the loop itself when another instance
    /// took over the token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop polling and wait for the loop to exit. Updates already handed to
    /// the engine keep running.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "telegram polling task panicked");
        }
    }
}

/// Verify the token, register commands and start polling.
///
/// Each update is classified and handed to the engine on its own task.
pub async fn start_polling(bot: Bot, engine: Arc<RelayEngine>) -> Result<PollingHandle> {
    let me = bot.get_me().await?;
    let username = me.username.clone();

    // Long polling does not work while a webhook is set.
    bot.delete_webhook().await?;

    let commands: Vec<BotCommand> = COMMAND_LIST
        .iter()
        .map(|(name, description)| BotCommand::new(*name, *description))
        .collect();
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!("failed to register bot commands: {e}");
    }

    info!(username = ?username, "telegram bot connected (webhook cleared)");

    let ctx = UpdateContext::new(engine.settings().shared_chat, engine.operators().clone());
    let cancel = CancellationToken::new();
    let task = tokio::spawn(poll_loop(bot, engine, ctx, cancel.clone()));

    Ok(PollingHandle {
        cancel,
        task,
        username,
    })
}

async fn poll_loop(
    bot: Bot,
    engine: Arc<RelayEngine>,
    ctx: UpdateContext,
    cancel: CancellationToken,
) {
    info!("starting telegram polling loop");
    let mut offset: i32 = 0;

    loop {
        let request = bot
            .get_updates()
            .offset(offset)
            .timeout(POLL_TIMEOUT_SECS)
            .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery]);

        let result = tokio::select! {
            () = cancel.cancelled() => break,
            result = request.send() => result,
        };

        match result {
            Ok(updates) => {
                debug!(count = updates.len(), "got telegram updates");
                for update in updates {
                    offset = update.id.as_offset();
                    #[cfg(feature = "metrics")]
                    counter!(tg_metrics::UPDATES_RECEIVED_TOTAL).increment(1);

                    let event = match update.kind {
                        UpdateKind::Message(msg) => handlers::classify_message(&msg, &ctx),
                        UpdateKind::CallbackQuery(query) => {
                            let event = handlers::classify_callback(&query);
                            if event.is_none() {
                                // Dismiss the spinner on buttons we do not own.
                                let _ = bot.answer_callback_query(query.id.clone()).await;
                            }
                            event
                        },
                        other => {
                            debug!("ignoring update: {other:?}");
                            None
                        },
                    };

                    if let Some(event) = event {
                        let engine = Arc::clone(&engine);
                        tokio::spawn(async move {
                            let _ = engine.handle(event).await;
                        });
                    }
                }
            },
            Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                warn!(
                    "telegram polling disabled: another instance is already running with this token"
                );
                cancel.cancel();
                break;
            },
            Err(e) => {
                #[cfg(feature = "metrics")]
                counter!(tg_metrics::POLLING_ERRORS_TOTAL).increment(1);
                warn!(error = %e, "telegram getUpdates failed");
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(POLL_ERROR_BACKOFF) => {},
                }
            },
        }
    }

    info!("telegram polling stopped");
}
