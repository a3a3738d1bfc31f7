use std::{future::Future, time::Duration};

use {
    async_trait::async_trait,
    relaydesk_channels::{Affordances, DeliveryError, DeliverySink, EditKind, Result},
    relaydesk_common::{
        Content, MessageRef, PeerId,
        text::{self, CAPTION_LIMIT, TEXT_LIMIT},
    },
    teloxide::{
        ApiError, RequestError,
        payloads::{
            AnswerCallbackQuerySetters, EditMessageCaptionSetters, EditMessageTextSetters,
            SendAudioSetters, SendDocumentSetters, SendMessageSetters, SendPhotoSetters,
            SendVideoSetters, SendVoiceSetters,
        },
        prelude::*,
        types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MessageId},
    },
    tracing::{debug, warn},
};

#[cfg(feature = "metrics")]
use relaydesk_metrics::{counter, telegram as tg_metrics};

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// [`DeliverySink`] backed by the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    /// Run `request`, sleeping through `RetryAfter` responses a bounded
    /// number of times.
    async fn run_with_retry<T, F, Fut>(
        &self,
        chat: PeerId,
        operation: &'static str,
        mut request: F,
    ) -> std::result::Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, RequestError>>,
    {
        let mut retries = 0usize;

        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(wait) = retry_after_duration(&err) else {
                        return Err(err);
                    };

                    if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                        warn!(
                            chat_id = %chat,
                            operation,
                            retries,
                            retry_after_secs = wait.as_secs(),
                            "telegram rate limit persisted after retries"
                        );
                        return Err(err);
                    }

                    retries += 1;
                    #[cfg(feature = "metrics")]
                    counter!(tg_metrics::RETRIES_TOTAL, "operation" => operation).increment(1);
                    warn!(
                        chat_id = %chat,
                        operation,
                        retries,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limited, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                },
            }
        }
    }
}

fn keyboard(affordances: &Affordances) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(affordances.rows.iter().map(|row| {
        row.iter()
            .map(|a| InlineKeyboardButton::callback(a.label.clone(), a.data.clone()))
            .collect::<Vec<_>>()
    }))
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

fn is_message_not_modified_error(error: &RequestError) -> bool {
    matches!(error, RequestError::Api(ApiError::MessageNotModified))
}

/// Map a Bot API failure onto the transport-neutral error.
fn delivery_error(chat: PeerId, operation: &'static str, error: RequestError) -> DeliveryError {
    match error {
        RequestError::Api(
            ref api @ (ApiError::BotBlocked
            | ApiError::BotKicked
            | ApiError::BotKickedFromSupergroup
            | ApiError::ChatNotFound
            | ApiError::UserDeactivated
            | ApiError::CantInitiateConversation),
        ) => DeliveryError::unreachable(chat, api),
        RequestError::Api(
            ref api @ (ApiError::MessageCantBeEdited
            | ApiError::MessageToEditNotFound
            | ApiError::MessageToDeleteNotFound
            | ApiError::MessageCantBeDeleted),
        ) => DeliveryError::not_modifiable(api),
        other => DeliveryError::external(format!("telegram {operation}"), other),
    }
}

/// Shorten `body` to `limit`, logging when anything is cut.
fn within_limit(chat: PeerId, body: &str, limit: usize) -> String {
    let units = text::units(body);
    if units > limit {
        warn!(chat_id = %chat, units, limit, "telegram message too long, shortening");
    }
    text::fit(body, limit).into_owned()
}

fn caption_of(chat: PeerId, content: &Content) -> Option<String> {
    content
        .body()
        .map(|body| within_limit(chat, body, CAPTION_LIMIT))
}

#[async_trait]
impl DeliverySink for TelegramOutbound {
    async fn send(
        &self,
        to: PeerId,
        content: &Content,
        affordances: Option<&Affordances>,
    ) -> Result<MessageRef> {
        let chat_id = ChatId(to.0);
        let markup = affordances.filter(|a| !a.is_empty()).map(keyboard);
        let caption = caption_of(to, content);
        let bot = &self.bot;

        let sent = match content {
            Content::Text { text } => {
                let text = within_limit(to, text, TEXT_LIMIT);
                self.run_with_retry(to, "send message", || {
                    let mut req = bot.send_message(chat_id, text.clone());
                    if let Some(ref markup) = markup {
                        req = req.reply_markup(markup.clone());
                    }
                    async move { req.await }
                })
                .await
            },
            Content::Photo { file_id, .. } => {
                self.run_with_retry(to, "send photo", || {
                    let mut req = bot.send_photo(chat_id, InputFile::file_id(file_id.clone()));
                    if let Some(ref caption) = caption {
                        req = req.caption(caption.clone());
                    }
                    if let Some(ref markup) = markup {
                        req = req.reply_markup(markup.clone());
                    }
                    async move { req.await }
                })
                .await
            },
            Content::Document { file_id, .. } => {
                self.run_with_retry(to, "send document", || {
                    let mut req =
                        bot.send_document(chat_id, InputFile::file_id(file_id.clone()));
                    if let Some(ref caption) = caption {
                        req = req.caption(caption.clone());
                    }
                    if let Some(ref markup) = markup {
                        req = req.reply_markup(markup.clone());
                    }
                    async move { req.await }
                })
                .await
            },
            Content::Voice { file_id, .. } => {
                self.run_with_retry(to, "send voice", || {
                    let mut req = bot.send_voice(chat_id, InputFile::file_id(file_id.clone()));
                    if let Some(ref caption) = caption {
                        req = req.caption(caption.clone());
                    }
                    if let Some(ref markup) = markup {
                        req = req.reply_markup(markup.clone());
                    }
                    async move { req.await }
                })
                .await
            },
            Content::Video { file_id, .. } => {
                self.run_with_retry(to, "send video", || {
                    let mut req = bot.send_video(chat_id, InputFile::file_id(file_id.clone()));
                    if let Some(ref caption) = caption {
                        req = req.caption(caption.clone());
                    }
                    if let Some(ref markup) = markup {
                        req = req.reply_markup(markup.clone());
                    }
                    async move { req.await }
                })
                .await
            },
            Content::Audio { file_id, .. } => {
                self.run_with_retry(to, "send audio", || {
                    let mut req = bot.send_audio(chat_id, InputFile::file_id(file_id.clone()));
                    if let Some(ref caption) = caption {
                        req = req.caption(caption.clone());
                    }
                    if let Some(ref markup) = markup {
                        req = req.reply_markup(markup.clone());
                    }
                    async move { req.await }
                })
                .await
            },
            Content::Unsupported { description } => {
                return Err(DeliveryError::invalid_input(format!(
                    "cannot send unsupported content ({description})"
                )));
            },
        };

        let message = sent.map_err(|e| delivery_error(to, "send", e))?;
        debug!(chat_id = %to, message_id = message.id.0, kind = %content.kind(), "telegram message sent");
        Ok(MessageRef::new(to, message.id.0))
    }

    async fn edit(
        &self,
        message: &MessageRef,
        kind: EditKind,
        text: &str,
        affordances: Option<&Affordances>,
    ) -> Result<()> {
        let chat_id = ChatId(message.chat.0);
        let message_id = MessageId(message.message_id);
        let markup = affordances.filter(|a| !a.is_empty()).map(keyboard);
        let limit = match kind {
            EditKind::Text => TEXT_LIMIT,
            EditKind::Caption => CAPTION_LIMIT,
        };
        let text = within_limit(message.chat, text, limit);
        let text = text.as_str();
        let bot = &self.bot;

        let result = match kind {
            EditKind::Text => self
                .run_with_retry(message.chat, "edit text", || {
                    let mut req = bot.edit_message_text(chat_id, message_id, text);
                    if let Some(ref markup) = markup {
                        req = req.reply_markup(markup.clone());
                    }
                    async move { req.await }
                })
                .await
                .map(|_| ()),
            EditKind::Caption => self
                .run_with_retry(message.chat, "edit caption", || {
                    let mut req = bot.edit_message_caption(chat_id, message_id).caption(text);
                    if let Some(ref markup) = markup {
                        req = req.reply_markup(markup.clone());
                    }
                    async move { req.await }
                })
                .await
                .map(|_| ()),
        };

        match result {
            Ok(()) => Ok(()),
            // Already shows the requested text.
            Err(e) if is_message_not_modified_error(&e) => Ok(()),
            Err(e) => Err(delivery_error(message.chat, "edit", e)),
        }
    }

    async fn delete(&self, message: &MessageRef) -> Result<()> {
        let chat_id = ChatId(message.chat.0);
        let message_id = MessageId(message.message_id);
        let bot = &self.bot;
        self.run_with_retry(message.chat, "delete message", || {
            let req = bot.delete_message(chat_id, message_id);
            async move { req.await }
        })
        .await
        .map(|_| ())
        .map_err(|e| delivery_error(message.chat, "delete", e))
    }

    async fn answer_action(&self, action_id: &str, text: Option<&str>, alert: bool) -> Result<()> {
        let mut req = self.bot.answer_callback_query(action_id.to_string());
        if let Some(text) = text {
            req = req.text(text).show_alert(alert);
        }
        req.await
            .map(|_| ())
            .map_err(|e| DeliveryError::external("telegram answer callback", e))
    }
}
