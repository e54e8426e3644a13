use boardsight_core::domain::conversation::recent_turns;
use boardsight_core::ConversationTurn;

use crate::llm::ChatMessage;

/// Carries the tail of the caller's conversation into a prompt so follow-ups
/// ("and for work orders?") resolve against earlier turns.
#[derive(Clone, Copy, Debug)]
pub struct ConversationWindow {
    turns: usize,
}

impl Default for ConversationWindow {
    fn default() -> Self {
        Self { turns: 10 }
    }
}

impl ConversationWindow {
    pub fn new(turns: usize) -> Self {
        Self { turns }
    }

    pub fn turns(&self) -> usize {
        self.turns
    }

    /// Last `turns` non-blank turns as chat messages, oldest first.
    pub fn messages(&self, history: &[ConversationTurn]) -> Vec<ChatMessage> {
        let non_blank = history
            .iter()
            .filter(|turn| !turn.content.trim().is_empty())
            .cloned()
            .collect::<Vec<_>>();
        recent_turns(&non_blank, self.turns).iter().map(ChatMessage::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use boardsight_core::ConversationTurn;

    use super::ConversationWindow;
    use crate::llm::ChatRole;

    #[test]
    fn window_keeps_recent_non_blank_turns() {
        let history = vec![
            ConversationTurn::user("How is the pipeline?"),
            ConversationTurn::assistant("₹4.2Cr across 31 deals."),
            ConversationTurn::user("   "),
            ConversationTurn::user("And for mining?"),
        ];
        let messages = ConversationWindow::new(2).messages(&history);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::Assistant);
        assert_eq!(messages[1].content, "And for mining?");
    }

    #[test]
    fn zero_window_drops_history() {
        let history = vec![ConversationTurn::user("hi")];
        assert!(ConversationWindow::new(0).messages(&history).is_empty());
        assert_eq!(ConversationWindow::default().turns(), 10);
    }
}
