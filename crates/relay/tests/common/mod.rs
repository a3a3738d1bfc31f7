#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::{
    collections::HashSet,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering},
    },
};

use {
    async_trait::async_trait,
    relaydesk_channels::{
        Affordances, DeliveryError, DeliverySink, EditKind, OperatorSet, Result, Sender,
    },
    relaydesk_common::{Content, MessageRef, OperatorId, PeerId, UserId, UserProfile},
    relaydesk_relay::{RelayEngine, RelaySettings},
    relaydesk_sessions::InMemoryHistory,
};

pub const SHARED: PeerId = PeerId(-100_500);
pub const OWNER: i64 = 1;
pub const SECOND_OPERATOR: i64 = 2;

#[derive(Debug, Clone)]
pub struct Sent {
    pub to: PeerId,
    pub content: Content,
    pub affordances: Option<Affordances>,
    pub message: MessageRef,
}

/// Records every outbound call. Individual recipients, deletes and edits can
/// be told to fail.
#[derive(Default)]
pub struct RecordingSink {
    next_id: AtomicI32,
    sent: Mutex<Vec<Sent>>,
    edits: Mutex<Vec<(MessageRef, EditKind, String)>>,
    deletes: Mutex<Vec<MessageRef>>,
    answers: Mutex<Vec<(String, Option<String>, bool)>>,
    unreachable: Mutex<HashSet<PeerId>>,
    undeletable: Mutex<HashSet<MessageRef>>,
    edits_rejected: AtomicBool,
    hang: AtomicBool,
}

impl RecordingSink {
    pub fn fail_sends_to(&self, peer: impl Into<PeerId>) {
        self.unreachable.lock().unwrap().insert(peer.into());
    }

    pub fn fail_delete_of(&self, message: MessageRef) {
        self.undeletable.lock().unwrap().insert(message);
    }

    pub fn reject_edits(&self) {
        self.edits_rejected.store(true, Ordering::SeqCst);
    }

    /// Every send blocks forever from now on.
    pub fn hang(&self) {
        self.hang.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, peer: impl Into<PeerId>) -> Vec<Sent> {
        let peer = peer.into();
        self.sent().into_iter().filter(|s| s.to == peer).collect()
    }

    /// Text or caption of every message sent to `peer`.
    pub fn texts_to(&self, peer: impl Into<PeerId>) -> Vec<String> {
        self.sent_to(peer)
            .into_iter()
            .map(|s| s.content.body().unwrap_or_default().to_string())
            .collect()
    }

    pub fn edits(&self) -> Vec<(MessageRef, EditKind, String)> {
        self.edits.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<MessageRef> {
        self.deletes.lock().unwrap().clone()
    }

    pub fn answers(&self) -> Vec<(String, Option<String>, bool)> {
        self.answers.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeliverySink for RecordingSink {
    async fn send(
        &self,
        to: PeerId,
        content: &Content,
        affordances: Option<&Affordances>,
    ) -> Result<MessageRef> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.unreachable.lock().unwrap().contains(&to) {
            return Err(DeliveryError::unreachable(to, "bot was blocked by the user"));
        }
        let message = MessageRef::new(to, self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.sent.lock().unwrap().push(Sent {
            to,
            content: content.clone(),
            affordances: affordances.cloned(),
            message,
        });
        Ok(message)
    }

    async fn edit(
        &self,
        message: &MessageRef,
        kind: EditKind,
        text: &str,
        _affordances: Option<&Affordances>,
    ) -> Result<()> {
        if self.edits_rejected.load(Ordering::SeqCst) {
            return Err(DeliveryError::not_modifiable("message can't be edited"));
        }
        self.edits
            .lock()
            .unwrap()
            .push((*message, kind, text.to_string()));
        Ok(())
    }

    async fn delete(&self, message: &MessageRef) -> Result<()> {
        self.deletes.lock().unwrap().push(*message);
        if self.undeletable.lock().unwrap().contains(message) {
            return Err(DeliveryError::not_modifiable("message to delete not found"));
        }
        Ok(())
    }

    async fn answer_action(&self, action_id: &str, text: Option<&str>, alert: bool) -> Result<()> {
        self.answers.lock().unwrap().push((
            action_id.to_string(),
            text.map(str::to_string),
            alert,
        ));
        Ok(())
    }
}

/// Engine wired to a recording sink, in-memory history and a manual clock.
pub struct Harness {
    pub engine: Arc<RelayEngine>,
    pub sink: Arc<RecordingSink>,
    pub history: Arc<InMemoryHistory>,
    clock: Arc<AtomicU64>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    pub fn with_settings(tweak: impl FnOnce(&mut RelaySettings)) -> Self {
        let mut settings = RelaySettings::new(SHARED);
        settings.broadcast_delay = std::time::Duration::ZERO;
        tweak(&mut settings);

        let sink = Arc::new(RecordingSink::default());
        let history = Arc::new(InMemoryHistory::new());
        let clock = Arc::new(AtomicU64::new(1_700_000_000_000));
        let operators = OperatorSet::new(Some(OperatorId(OWNER)), [OperatorId(SECOND_OPERATOR)]);

        let ticks = Arc::clone(&clock);
        let engine = RelayEngine::new(sink.clone(), operators, history.clone(), settings)
            .with_clock(Arc::new(move || ticks.load(Ordering::SeqCst)));

        Self {
            engine: Arc::new(engine),
            sink,
            history,
            clock,
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.load(Ordering::SeqCst)
    }

    pub fn advance_ms(&self, ms: u64) {
        self.clock.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn user(&self, id: i64) -> Sender {
        Sender::new(
            UserId(id),
            UserProfile::new(Some(format!("User {id}")), Some(format!("user{id}"))),
        )
    }

    pub fn operator(&self, id: i64) -> Sender {
        Sender::new(
            OperatorId(id),
            UserProfile::new(Some(format!("Operator {id}")), None),
        )
    }
}
