//! The relay orchestrator.
//!
//! [`RelayEngine`] consumes [`InboundEvent`]s, consults the rate limiter,
//! session store and reply router, and issues outbound instructions through a
//! [`DeliverySink`]. Every outbound call is time-bounded; a timeout is a
//! delivery failure like any other.

use std::{future::Future, sync::Arc, time::Duration};

use {
    relaydesk_channels::{
        ActionKind, DeliveryError, DeliverySink, EditKind, InboundEvent, NotificationBody,
        NotificationRef, OperatorSet, Result as DeliveryResult, Sender,
    },
    relaydesk_common::{
        Content, MessageKind, MessageRef, OperatorId, PeerId, UserId, time::now_ms,
    },
    relaydesk_config::RelayConfig,
    relaydesk_routing::{ReplyRoute, ReplyRouter},
    relaydesk_sessions::{
        AuditAction, HistoryCounts, HistorySink, MessageSnapshot, SessionStore, UserSession,
        bounded,
    },
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use relaydesk_metrics::{counter, histogram, relay as relay_metrics};

use crate::{
    audit::AuditLog,
    error::{RelayError, Result},
    notify,
    rate_limit::{Admission, RateLimiter},
};

/// Source of "now" in epoch milliseconds.
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Tunables for one relay instance.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Where user notifications are posted and operators reply.
    pub shared_chat: PeerId,
    pub max_messages: usize,
    pub window: Duration,
    pub broadcast_delay: Duration,
    pub delivery_timeout: Duration,
    pub storage_timeout: Duration,
    pub route_timeout: Duration,
    pub session_inactivity: Duration,
}

impl RelaySettings {
    /// Defaults for everything but the shared chat.
    pub fn new(shared_chat: PeerId) -> Self {
        Self {
            shared_chat,
            max_messages: 10,
            window: Duration::from_secs(60),
            broadcast_delay: Duration::from_millis(50),
            delivery_timeout: Duration::from_secs(10),
            storage_timeout: Duration::from_secs(5),
            route_timeout: Duration::from_secs(30 * 60),
            session_inactivity: Duration::from_secs(24 * 60 * 60),
        }
    }

    /// Returns `None` when the shared chat is not configured.
    pub fn from_config(config: &RelayConfig) -> Option<Self> {
        let shared_chat = PeerId(config.telegram.shared_chat_id?);
        Some(Self {
            shared_chat,
            max_messages: config.limits.max_messages,
            window: config.limits.window(),
            broadcast_delay: config.limits.broadcast_delay(),
            delivery_timeout: config.limits.delivery_timeout(),
            storage_timeout: config.limits.storage_timeout(),
            route_timeout: config.cleanup.route_timeout(),
            session_inactivity: config.cleanup.session_inactivity(),
        })
    }
}

/// Outcome of deleting a user's outbound history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: usize,
    pub failed: usize,
}

impl DeleteReport {
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.deleted + self.failed
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions_evicted: usize,
    pub routes_expired: usize,
    pub windows_pruned: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub active_sessions: usize,
    pub active_routes: usize,
    pub tracked_windows: usize,
    /// `None` when the history sink could not be queried.
    pub history: Option<HistoryCounts>,
    pub uptime_ms: u64,
}

/// What happened to an accepted user message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserMessageOutcome {
    /// The notification posted in the shared channel, if that succeeded.
    pub notification: Option<MessageRef>,
    /// Operators reached directly after the shared channel failed.
    pub fallback_delivered: usize,
    pub acknowledged: bool,
}

/// What happened to an operator message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// The operator has no route; the message is not a reply.
    NoRoute,
    /// The operator wrote privately while holding a route.
    WrongChat,
    /// Nothing relayable in the message.
    Unsupported,
    Delivered { target: UserId, message: MessageRef },
}

pub struct RelayEngine {
    sink: Arc<dyn DeliverySink>,
    operators: OperatorSet,
    sessions: SessionStore,
    router: ReplyRouter,
    limiter: RateLimiter,
    audit: AuditLog,
    settings: RelaySettings,
    clock: Clock,
    started_at: u64,
}

impl RelayEngine {
    pub fn new(
        sink: Arc<dyn DeliverySink>,
        operators: OperatorSet,
        history: Arc<dyn HistorySink>,
        settings: RelaySettings,
    ) -> Self {
        let clock: Clock = Arc::new(now_ms);
        Self {
            sink,
            operators,
            sessions: SessionStore::new(Arc::clone(&history), settings.storage_timeout),
            router: ReplyRouter::new(),
            limiter: RateLimiter::new(settings.max_messages, settings.window),
            audit: AuditLog::new(history, settings.storage_timeout)
                .with_clock(Arc::clone(&clock)),
            started_at: clock(),
            settings,
            clock,
        }
    }

    /// Replace the wall clock, e.g. with a manual clock in tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.started_at = clock();
        self.audit = self.audit.with_clock(Arc::clone(&clock));
        self.clock = clock;
        self
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn router(&self) -> &ReplyRouter {
        &self.router
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    pub fn operators(&self) -> &OperatorSet {
        &self.operators
    }

    pub fn settings(&self) -> &RelaySettings {
        &self.settings
    }

    pub fn now(&self) -> u64 {
        (self.clock)()
    }

    /// Process one inbound event. Errors are logged here; the caller only
    /// needs the result for tests or bookkeeping.
    pub async fn handle(&self, event: InboundEvent) -> Result<()> {
        let label = event.label();
        #[cfg(feature = "metrics")]
        let start = std::time::Instant::now();

        let result = match event {
            InboundEvent::UserMessage { sender, content } => {
                self.on_user_message(&sender, &content).await.map(|_| ())
            },
            InboundEvent::OperatorMessage {
                sender,
                content,
                in_shared_channel,
            } => self
                .on_operator_message(&sender, &content, in_shared_channel)
                .await
                .map(|_| ()),
            InboundEvent::OperatorAction {
                sender,
                action,
                target,
                action_id,
                notification,
            } => {
                self.on_action(&sender, action, target, &action_id, notification.as_ref())
                    .await
            },
            InboundEvent::Command {
                sender,
                chat,
                command,
            } => self.on_command(&sender, chat, command).await,
            InboundEvent::InvalidCommand {
                sender,
                chat,
                error,
            } => match self.authorize(sender.id) {
                Ok(_) => {
                    self.send_text(chat, error.to_string()).await;
                    Ok(())
                },
                Err(e) => {
                    self.send_text(chat, notify::UNAUTHORIZED_COMMAND).await;
                    Err(e)
                },
            },
            InboundEvent::CleanupTick => {
                self.sweep();
                Ok(())
            },
        };

        #[cfg(feature = "metrics")]
        histogram!(relay_metrics::EVENT_DURATION_SECONDS, "event" => label)
            .record(start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            match e {
                RelayError::Delivery(_) | RelayError::Persistence { .. } => {
                    warn!(event = label, kind = e.kind(), error = %e, "event handling failed");
                },
                _ => debug!(event = label, kind = e.kind(), error = %e, "event rejected"),
            }
        }
        result
    }

    // ── User → support ──────────────────────────────────────────────────────

    /// Admit, record, notify the shared channel (or every operator directly
    /// when that fails), then acknowledge to the user.
    pub async fn on_user_message(
        &self,
        sender: &Sender,
        content: &Content,
    ) -> Result<UserMessageOutcome> {
        let user = sender.id.as_user();
        let now = self.now();

        if let Admission::Denied { retry_after } = self.limiter.check(user, now) {
            #[cfg(feature = "metrics")]
            counter!(relay_metrics::THROTTLED_TOTAL).increment(1);
            info!(user_id = %user, retry_after_ms = retry_after.as_millis() as u64, "user throttled");
            self.send_text(sender.id, notify::throttled(retry_after)).await;
            return Err(RelayError::AdmissionDenied { retry_after });
        }

        #[cfg(feature = "metrics")]
        counter!(relay_metrics::USER_MESSAGES_TOTAL).increment(1);

        let session = self.sessions.get_or_create(user, &sender.profile, now);
        let session = self
            .sessions
            .update_snapshot(user, &MessageSnapshot::of(content, now))
            .unwrap_or(session);
        if let Err(e) = self.sessions.persist(&session).await {
            warn!(user_id = %user, error = %e, "failed to persist session");
        }

        let mut outcome = UserMessageOutcome::default();
        let notification = notify::user_notification(&session, content, now);
        let buttons = notify::action_buttons(user);
        match self
            .deliver(
                "notify",
                self.sink
                    .send(self.settings.shared_chat, &notification, Some(&buttons)),
            )
            .await
        {
            Ok(message) => outcome.notification = Some(message),
            Err(e) => {
                warn!(user_id = %user, error = %e, "shared channel unreachable, notifying operators directly");
                outcome.fallback_delivered = self.notify_operators_directly(&session, content).await;
            },
        }

        if let Some(ack) = self.send_text(sender.id, notify::RECEIPT_ACK).await {
            outcome.acknowledged = true;
            self.record_outbound(user, ack, MessageKind::Text, now).await;
        }

        debug!(user_id = %user, kind = %content.kind(), "user message relayed");
        Ok(outcome)
    }

    async fn notify_operators_directly(&self, session: &UserSession, content: &Content) -> usize {
        let notice = Content::text(notify::fallback_notice(&session.profile, content));
        let mut delivered = 0;
        for operator in self.operators.iter() {
            match self
                .deliver("fallback", self.sink.send(operator.into(), &notice, None))
                .await
            {
                Ok(_) => delivered += 1,
                Err(e) => debug!(operator_id = %operator, error = %e, "fallback notice failed"),
            }
        }
        delivered
    }

    // ── Operator → support ──────────────────────────────────────────────────

    /// Relay an operator's message to the user they are bound to.
    ///
    /// A failed send always unbinds the route; it is never retried.
    pub async fn on_operator_message(
        &self,
        sender: &Sender,
        content: &Content,
        in_shared_channel: bool,
    ) -> Result<ReplyOutcome> {
        let operator = self.authorize(sender.id)?;
        let Some(target) = self.router.route_for(operator) else {
            return Ok(ReplyOutcome::NoRoute);
        };

        if !in_shared_channel {
            self.send_text(sender.id, notify::REPLY_FROM_GROUP).await;
            return Ok(ReplyOutcome::WrongChat);
        }
        if !content.is_relayable() {
            self.send_text(self.settings.shared_chat, notify::UNSUPPORTED_REPLY)
                .await;
            return Ok(ReplyOutcome::Unsupported);
        }

        let name = sender.name();
        let outgoing = content.with_header(&notify::reply_header(&name));
        match self
            .deliver("reply", self.sink.send(target.into(), &outgoing, None))
            .await
        {
            Ok(message) => {
                let now = self.now();
                self.router.touch(operator, now);
                self.record_outbound(target, message, content.kind(), now).await;
                self.audit.append(operator, AuditAction::Replied, Some(target)).await;
                #[cfg(feature = "metrics")]
                counter!(relay_metrics::REPLIES_TOTAL).increment(1);
                info!(operator_id = %operator, user_id = %target, "reply relayed");
                self.send_text(
                    self.settings.shared_chat,
                    notify::reply_confirmed(&name, target),
                )
                .await;
                Ok(ReplyOutcome::Delivered { target, message })
            },
            Err(e) => {
                self.router.unbind_if_target(operator, target);
                warn!(operator_id = %operator, user_id = %target, error = %e, "reply failed, route closed");
                self.send_text(
                    self.settings.shared_chat,
                    notify::reply_failed(target, &e.to_string()),
                )
                .await;
                Err(e.into())
            },
        }
    }

    // ── Notification actions ────────────────────────────────────────────────

    /// Dispatch an inline button press and answer it.
    pub async fn on_action(
        &self,
        sender: &Sender,
        action: ActionKind,
        target: UserId,
        action_id: &str,
        notification: Option<&NotificationRef>,
    ) -> Result<()> {
        let result = match action {
            ActionKind::Claim => self
                .claim(sender, target, notification)
                .await
                .map(|_| Some(notify::claim_ack(target))),
            ActionKind::DeleteHistory => self
                .delete_history(sender, target)
                .await
                .map(|report| Some(notify::delete_summary(target, &report))),
            ActionKind::Info => match self.info(sender, target).await {
                Ok(text) => {
                    self.send_text(self.settings.shared_chat, text).await;
                    Ok(None)
                },
                Err(e) => Err(e),
            },
            ActionKind::Block => self
                .block(sender, target)
                .await
                .map(|()| Some(notify::BLOCK_NOT_IMPLEMENTED.to_string())),
        };

        match result {
            Ok(text) => {
                self.answer(action_id, text.as_deref(), false).await;
                Ok(())
            },
            Err(e) => {
                let text = match &e {
                    RelayError::Unauthorized { .. } => notify::UNAUTHORIZED_ACTION.to_string(),
                    RelayError::CannotEdit => notify::CANNOT_EDIT.to_string(),
                    other => format!("⚠️ {other}"),
                };
                self.answer(action_id, Some(&text), true).await;
                Err(e)
            },
        }
    }

    /// Bind the acting operator to `target` and mark the notification as claimed.
    ///
    /// The binding stands even when the notification cannot be edited; that
    /// case returns [`RelayError::CannotEdit`]. On success returns the target
    /// the operator was previously bound to, if any.
    pub async fn claim(
        &self,
        actor: &Sender,
        target: UserId,
        notification: Option<&NotificationRef>,
    ) -> Result<Option<UserId>> {
        let operator = self.authorize(actor.id)?;
        let now = self.now();
        let previous = self.router.bind(operator, target, now);
        self.audit.append(operator, AuditAction::Claimed, Some(target)).await;
        info!(operator_id = %operator, user_id = %target, ?previous, "user claimed");

        let last_message_at = self
            .sessions
            .get(target)
            .and_then(|s| s.last_snapshot())
            .map(|s| s.at);
        let suffix = notify::claim_suffix(&actor.name(), target, last_message_at);
        let buttons = notify::action_buttons(target);

        let Some(notification) = notification else {
            return Err(RelayError::CannotEdit);
        };
        let (kind, text) = match &notification.body {
            NotificationBody::Text(text) => (
                EditKind::Text,
                format!("{}{suffix}", notify::strip_claim(text)),
            ),
            NotificationBody::Caption(caption) => (
                EditKind::Caption,
                format!(
                    "{}{suffix}",
                    notify::strip_claim(caption.as_deref().unwrap_or_default())
                )
                .trim_start()
                .to_string(),
            ),
            NotificationBody::Other => return Err(RelayError::CannotEdit),
        };

        match self
            .deliver(
                "edit",
                self.sink
                    .edit(&notification.message, kind, &text, Some(&buttons)),
            )
            .await
        {
            Ok(()) => Ok(previous),
            Err(DeliveryError::NotModifiable { .. }) => Err(RelayError::CannotEdit),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every recorded outbound message for `target`, then forget the
    /// user: durable history, live session and any routes to them.
    ///
    /// Individual delete failures are counted and never abort the rest.
    pub async fn delete_history(&self, actor: &Sender, target: UserId) -> Result<DeleteReport> {
        let operator = self.authorize(actor.id)?;

        let (messages, read_error) = self.sessions.sent_messages(target).await;
        if let Some(e) = read_error {
            warn!(user_id = %target, error = %e, "could not read durable history, deleting live refs only");
        }

        let mut report = DeleteReport::default();
        for message in messages.iter().rev() {
            match self.deliver("delete", self.sink.delete(message)).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    report.failed += 1;
                    debug!(user_id = %target, message = %message, error = %e, "delete failed");
                },
            }
        }

        if let Err(e) = self.sessions.purge_history(target).await {
            warn!(user_id = %target, error = %e, "failed to purge durable history");
        }
        self.sessions.remove(target);
        let released = self.router.unbind_target(target);
        self.send_text(target.into(), notify::CONVERSATION_CLOSED).await;

        self.audit.append(operator, AuditAction::DeletedHistory, Some(target)).await;
        info!(
            operator_id = %operator,
            user_id = %target,
            deleted = report.deleted,
            failed = report.failed,
            released = released.len(),
            "conversation deleted"
        );
        Ok(report)
    }

    /// Summary of a live session, including every operator bound to it.
    pub async fn info(&self, actor: &Sender, target: UserId) -> Result<String> {
        let operator = self.authorize(actor.id)?;
        let session = self
            .sessions
            .get(target)
            .ok_or_else(|| RelayError::not_found(format!("session for user {target}")))?;
        let now = self.now();
        self.audit.append(operator, AuditAction::InfoViewed, Some(target)).await;
        Ok(notify::user_info(
            &session,
            &self.router.operators_for(target),
            now,
        ))
    }

    /// Blocking is not implemented; the request is only audited.
    pub async fn block(&self, actor: &Sender, target: UserId) -> Result<()> {
        let operator = self.authorize(actor.id)?;
        self.audit.append(operator, AuditAction::BlockRequested, Some(target)).await;
        Ok(())
    }

    // ── Operator commands ───────────────────────────────────────────────────

    /// Send `text` to every live session, pausing between sends.
    pub async fn broadcast(&self, actor: &Sender, text: &str) -> Result<BroadcastReport> {
        let operator = self.authorize(actor.id)?;
        let mut users = self.sessions.active_user_ids();
        users.sort();

        let content = notify::announcement(text);
        let mut report = BroadcastReport::default();
        for (i, user) in users.into_iter().enumerate() {
            if i > 0 && !self.settings.broadcast_delay.is_zero() {
                tokio::time::sleep(self.settings.broadcast_delay).await;
            }
            match self
                .deliver("broadcast", self.sink.send(user.into(), &content, None))
                .await
            {
                Ok(message) => {
                    report.sent += 1;
                    self.record_outbound(user, message, MessageKind::Text, self.now())
                        .await;
                },
                Err(e) => {
                    report.failed += 1;
                    debug!(user_id = %user, error = %e, "broadcast send failed");
                },
            }
        }

        self.audit.append(operator, AuditAction::Broadcast, None).await;
        info!(operator_id = %operator, sent = report.sent, failed = report.failed, "broadcast finished");
        Ok(report)
    }

    /// Send `text` to `user` without binding a route.
    pub async fn direct_reply(&self, actor: &Sender, user: UserId, text: &str) -> Result<MessageRef> {
        let operator = self.authorize(actor.id)?;
        let content = Content::text(text).with_header(&notify::reply_header(&actor.name()));
        let message = self
            .deliver("direct_reply", self.sink.send(user.into(), &content, None))
            .await?;
        let now = self.now();
        self.record_outbound(user, message, MessageKind::Text, now).await;
        self.audit.append(operator, AuditAction::DirectReply, Some(user)).await;
        info!(operator_id = %operator, user_id = %user, "direct reply sent");
        Ok(message)
    }

    /// End the acting operator's route. Returns the user it pointed at.
    pub async fn cancel_route(&self, actor: &Sender) -> Result<UserId> {
        let operator = self.authorize(actor.id)?;
        let target = self
            .router
            .unbind(operator)
            .ok_or_else(|| RelayError::not_found("active reply route"))?;
        self.audit.append(operator, AuditAction::RouteCancelled, Some(target)).await;
        Ok(target)
    }

    /// Run a sweep on demand.
    pub async fn cleanup_now(&self, actor: &Sender) -> Result<SweepReport> {
        let operator = self.authorize(actor.id)?;
        let report = self.sweep();
        self.audit.append(operator, AuditAction::ManualCleanup, None).await;
        Ok(report)
    }

    pub async fn stats(&self, actor: &Sender) -> Result<Stats> {
        self.authorize(actor.id)?;
        let history = match bounded(
            "counts",
            self.settings.storage_timeout,
            self.sessions.history().counts(),
        )
        .await
        {
            Ok(counts) => Some(counts),
            Err(e) => {
                warn!(error = %e, "history counts unavailable");
                None
            },
        };
        Ok(Stats {
            active_sessions: self.sessions.count_active(),
            active_routes: self.router.count_bound(),
            tracked_windows: self.limiter.tracked(),
            history,
            uptime_ms: self.now().saturating_sub(self.started_at),
        })
    }

    pub fn list_sessions(&self, actor: &Sender) -> Result<Vec<UserSession>> {
        self.authorize(actor.id)?;
        Ok(self.sessions.list())
    }

    pub fn list_routes(&self, actor: &Sender) -> Result<Vec<ReplyRoute>> {
        self.authorize(actor.id)?;
        Ok(self.router.list())
    }

    /// Evict idle sessions, expire idle routes and drop empty rate windows.
    pub fn sweep(&self) -> SweepReport {
        let now = self.now();
        let report = SweepReport {
            sessions_evicted: self.sessions.sweep(self.settings.session_inactivity, now),
            routes_expired: self.router.sweep(self.settings.route_timeout, now),
            windows_pruned: self.limiter.prune(now),
        };
        debug!(?report, "sweep finished");
        report
    }

    // ── Helpers ─────────────────────────────────────────────────────────────

    pub(crate) fn authorize(&self, identity: PeerId) -> Result<OperatorId> {
        self.operators.authorize(identity).ok_or_else(|| {
            #[cfg(feature = "metrics")]
            counter!(relay_metrics::UNAUTHORIZED_TOTAL).increment(1);
            info!(identity = %identity, "unauthorized operator action");
            RelayError::unauthorized(identity)
        })
    }

    /// Run a transport call under the delivery timeout.
    async fn deliver<T>(
        &self,
        op: &'static str,
        call: impl Future<Output = DeliveryResult<T>>,
    ) -> DeliveryResult<T> {
        let limit = self.settings.delivery_timeout;
        let result = tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| Err(DeliveryError::timeout(limit)));
        if let Err(e) = &result {
            debug!(op, kind = e.kind(), error = %e, "delivery failed");
            #[cfg(feature = "metrics")]
            counter!(relay_metrics::DELIVERY_FAILURES_TOTAL, "op" => op).increment(1);
        }
        result
    }

    /// Send a plain text message, logging rather than returning failures.
    pub(crate) async fn send_text(&self, to: PeerId, text: impl Into<String>) -> Option<MessageRef> {
        let content = Content::text(text);
        match self.deliver("text", self.sink.send(to, &content, None)).await {
            Ok(message) => Some(message),
            Err(e) => {
                warn!(peer = %to, error = %e, "failed to send message");
                None
            },
        }
    }

    async fn answer(&self, action_id: &str, text: Option<&str>, alert: bool) {
        if let Err(e) = self
            .deliver("answer", self.sink.answer_action(action_id, text, alert))
            .await
        {
            debug!(error = %e, "failed to answer action");
        }
    }

    async fn record_outbound(&self, user: UserId, message: MessageRef, kind: MessageKind, now: u64) {
        if let Err(e) = self
            .sessions
            .record_outbound(user, message, kind, now)
            .await
        {
            warn!(user_id = %user, message = %message, error = %e, "failed to persist outbound message");
        }
    }
}
