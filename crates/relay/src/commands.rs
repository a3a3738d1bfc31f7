//! Bot command dispatch. Each command is one engine call plus a summary.

use {
    relaydesk_channels::{Command, Sender},
    relaydesk_common::PeerId,
};

use crate::{
    engine::RelayEngine,
    error::{RelayError, Result},
    notify,
};

impl RelayEngine {
    /// Run `command` for `sender` and reply in `chat`.
    pub async fn on_command(&self, sender: &Sender, chat: PeerId, command: Command) -> Result<()> {
        if command.requires_operator()
            && let Err(e) = self.authorize(sender.id)
        {
            self.send_text(chat, notify::UNAUTHORIZED_COMMAND).await;
            return Err(e);
        }
        let is_operator = self.operators().is_operator(sender.id);
        let now = self.now();

        let reply = match command {
            Command::Start if is_operator => notify::admin_panel(&self.stats(sender).await?),
            Command::Start => notify::welcome(&sender.name()),
            Command::Help => notify::help(is_operator),
            Command::Admin => notify::admin_panel(&self.stats(sender).await?),
            Command::Stats => notify::stats(&self.stats(sender).await?),
            Command::Sessions => notify::session_list(&self.list_sessions(sender)?, now),
            Command::Routes => notify::route_list(&self.list_routes(sender)?, now),
            Command::Cleanup => notify::sweep_summary(&self.cleanup_now(sender).await?),
            Command::Broadcast { text } => {
                notify::broadcast_summary(&self.broadcast(sender, &text).await?)
            },
            Command::Cancel => match self.cancel_route(sender).await {
                Ok(user) => notify::route_cancelled(user),
                Err(RelayError::NotFound { .. }) => notify::NO_ACTIVE_ROUTE.to_string(),
                Err(e) => return Err(e),
            },
            Command::Reply { user, text } => match self.direct_reply(sender, user, &text).await {
                Ok(_) => notify::direct_reply_sent(user),
                Err(RelayError::Delivery(e)) => {
                    self.send_text(chat, notify::direct_reply_failed(user, &e.to_string()))
                        .await;
                    return Err(e.into());
                },
                Err(e) => return Err(e),
            },
        };

        self.send_text(chat, reply).await;
        Ok(())
    }
}
