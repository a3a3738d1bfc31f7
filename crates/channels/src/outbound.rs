use {
    async_trait::async_trait,
    relaydesk_common::{Content, MessageRef, PeerId},
};

use crate::Result;

/// A single inline action button.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Affordance {
    pub label: String,
    /// Opaque payload echoed back by the transport when the button is pressed.
    pub data: String,
}

impl Affordance {
    #[must_use]
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Rows of inline action buttons attached to an outbound message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Affordances {
    pub rows: Vec<Vec<Affordance>>,
}

impl Affordances {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn row(mut self, row: Vec<Affordance>) -> Self {
        if !row.is_empty() {
            self.rows.push(row);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterate over every button regardless of row.
    pub fn buttons(&self) -> impl Iterator<Item = &Affordance> {
        self.rows.iter().flatten()
    }
}

/// Which part of an existing message an edit replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditKind {
    /// The body of a text message.
    Text,
    /// The caption of a media message.
    Caption,
}

/// Outbound side of a transport.
///
/// Implementations must not retry forever: the relay wraps every call in a
/// timeout and treats expiry as a delivery failure.
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Send `content` to `to`, optionally with inline action buttons.
    async fn send(
        &self,
        to: PeerId,
        content: &Content,
        affordances: Option<&Affordances>,
    ) -> Result<MessageRef>;

    /// Replace the text or caption of `message`. `affordances`, when given,
    /// replace the attached actions; otherwise they are removed.
    async fn edit(
        &self,
        message: &MessageRef,
        kind: EditKind,
        text: &str,
        affordances: Option<&Affordances>,
    ) -> Result<()>;

    /// Delete a previously sent message.
    async fn delete(&self, message: &MessageRef) -> Result<()>;

    /// Acknowledge an inline button press. No-op by default.
    async fn answer_action(&self, _action_id: &str, _text: Option<&str>, _alert: bool) -> Result<()> {
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_rows_are_skipped() {
        let kb = Affordances::new()
            .row(vec![Affordance::new("a", "1"), Affordance::new("b", "2")])
            .row(Vec::new())
            .row(vec![Affordance::new("c", "3")]);
        assert_eq!(kb.rows.len(), 2);
        let data: Vec<&str> = kb.buttons().map(|b| b.data.as_str()).collect();
        assert_eq!(data, vec!["1", "2", "3"]);
    }
}
