// Per-session turn driver shared by the web and terminal frontends. One
// session owns its conversation transcript and its completion backend (and
// with it the generate-mode context token); the only shared resource is the
// interaction log.

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::backend::CompletionBackend;
use crate::catalog::Catalog;
use crate::classifier;
use crate::config::Config;
use crate::conversation::ConversationState;
use crate::interaction_log::InteractionLog;
use crate::persona;

pub struct Session {
    conversation: ConversationState,
    backend: CompletionBackend,
    log: InteractionLog,
}

impl Session {
    pub fn new(config: &Config, catalog: &Catalog, log: InteractionLog) -> Self {
        let mut conversation = ConversationState::new();
        conversation.initialize(
            &persona::build_system_prompt(&catalog.describe()),
            Some(persona::OPENING_LINE),
        );
        Session {
            conversation,
            backend: CompletionBackend::from_config(config),
            log,
        }
    }

    pub fn greeting(&self) -> &'static str {
        persona::OPENING_LINE
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    /// Drive one full turn, strictly sequentially: append the user message,
    /// stream the completion through `tx`, append the assistant reply, then
    /// classify and log. A failed completion aborts the turn with the user
    /// message kept and no assistant message appended. Classification and
    /// logging never fail the turn.
    pub async fn run_turn(
        &mut self,
        user_text: &str,
        tx: &mpsc::Sender<String>,
    ) -> Result<String> {
        self.conversation.append_user(user_text)?;

        let reply = self
            .backend
            .complete(&self.conversation, tx)
            .await
            .context("completion call failed")?;
        self.conversation.append_assistant(&reply);

        let labels = classifier::classify(&self.backend, user_text).await;
        info!(
            emotion = %labels.emotion,
            personality_trait = %labels.personality_trait,
            "turn classified"
        );
        if let Err(e) = self.log.append(user_text, &labels).await {
            warn!(error = %e, "failed to append interaction log row");
        }

        Ok(reply)
    }
}
