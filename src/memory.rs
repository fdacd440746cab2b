use crate::message::Message;

/// Append-only transcript for a single query.
///
/// Messages can only be pushed; nothing is ever edited, removed or reordered,
/// so the sequence handed to the model on turn `n + 1` always starts with the
/// sequence it saw on turn `n`.
#[derive(Default, Clone, Debug, PartialEq)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Message> + '_ {
        self.messages.iter()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
