use super::ClientError;
use crate::models::chat::ChatMessage;

/// In-memory conversation: an append-only log plus a cursor to the assistant
/// entry that is still being filled in.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<ChatMessage>,
    open: Option<usize>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(greeting: impl Into<String>) -> Self {
        Self {
            entries: vec![ChatMessage::assistant(greeting)],
            open: None,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_streaming(&self) -> bool {
        self.open.is_some()
    }

    pub fn open_message(&self) -> Option<&ChatMessage> {
        self.open.map(|i| &self.entries[i])
    }

    /// Everything the relay should see: the whole log minus the open placeholder.
    pub fn request_history(&self) -> Vec<ChatMessage> {
        let end = self.open.unwrap_or(self.entries.len());
        self.entries[..end].to_vec()
    }

    /// Appends the user's message and an empty assistant placeholder.
    /// Blank input is ignored and reported as `Ok(false)`.
    pub fn begin_turn(&mut self, text: &str) -> Result<bool, ClientError> {
        if text.trim().is_empty() {
            return Ok(false);
        }
        if self.open.is_some() {
            return Err(ClientError::Busy);
        }

        self.entries.push(ChatMessage::user(text));
        self.entries.push(ChatMessage::assistant(""));
        self.open = Some(self.entries.len() - 1);
        Ok(true)
    }

    pub fn append_fragment(&mut self, fragment: &str) -> Result<(), ClientError> {
        let index = self.open.ok_or(ClientError::NoOpenTurn)?;
        self.entries[index].content.push_str(fragment);
        Ok(())
    }

    /// Seals the placeholder; returns it as it stands.
    pub fn finish_turn(&mut self) -> Option<&ChatMessage> {
        let index = self.open.take()?;
        Some(&self.entries[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    #[test]
    fn begin_turn_appends_user_and_placeholder() {
        let mut t = Transcript::seeded("Hi");
        assert!(t.begin_turn("hours?").unwrap());

        assert_eq!(
            t.messages(),
            &[
                ChatMessage::assistant("Hi"),
                ChatMessage::user("hours?"),
                ChatMessage::assistant(""),
            ]
        );
        assert_eq!(t.request_history(), vec![ChatMessage::assistant("Hi"), ChatMessage::user("hours?")]);
    }

    #[test]
    fn user_text_is_kept_verbatim() {
        let mut t = Transcript::new();
        t.begin_turn("  spaced out \n").unwrap();
        assert_eq!(t.messages()[0].content, "  spaced out \n");
    }

    #[test]
    fn blank_input_changes_nothing() {
        let mut t = Transcript::seeded("Hi");
        for blank in ["", "   ", "\n\t"] {
            assert!(!t.begin_turn(blank).unwrap());
        }
        assert_eq!(t.messages(), &[ChatMessage::assistant("Hi")]);
        assert!(!t.is_streaming());
    }

    #[test]
    fn fragments_concatenate_in_order() {
        let mut t = Transcript::seeded("Hi");
        t.begin_turn("hours?").unwrap();
        for f in ["We", "'re open", " 9-5."] {
            t.append_fragment(f).unwrap();
        }

        let done = t.finish_turn().unwrap();
        assert_eq!(done.role, Role::Assistant);
        assert_eq!(done.content, "We're open 9-5.");
        assert!(!t.is_streaming());
        assert_eq!(t.len(), 3);
    }

    #[test]
    fn second_turn_while_streaming_is_rejected() {
        let mut t = Transcript::seeded("Hi");
        t.begin_turn("first").unwrap();
        t.append_fragment("par").unwrap();

        assert!(matches!(t.begin_turn("second"), Err(ClientError::Busy)));
        assert_eq!(t.len(), 3);
        t.append_fragment("tial").unwrap();
        assert_eq!(t.open_message().unwrap().content, "partial");
    }

    #[test]
    fn append_without_open_turn_fails() {
        let mut t = Transcript::seeded("Hi");
        assert!(matches!(t.append_fragment("x"), Err(ClientError::NoOpenTurn)));
        assert_eq!(t.messages()[0].content, "Hi");
        assert!(t.finish_turn().is_none());
    }

    #[test]
    fn finished_turn_is_part_of_next_history() {
        let mut t = Transcript::seeded("Hi");
        t.begin_turn("hours?").unwrap();
        t.append_fragment("9-5").unwrap();
        t.finish_turn();
        t.begin_turn("weekends?").unwrap();

        let history = t.request_history();
        assert_eq!(history.len(), 4);
        assert_eq!(history[2], ChatMessage::assistant("9-5"));
        assert_eq!(history[3], ChatMessage::user("weekends?"));
    }
}
