use cadre_core::Message;

/// What a worker sends the model on each turn: a system prompt plus a
/// sliding window of the most recent messages.
pub struct ContextWindow {
    system: Option<String>,
    window: Vec<Message>,
    capacity: usize,
}

impl ContextWindow {
    /// An empty window holding at most `capacity` messages (at least 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            system: None,
            window: Vec::with_capacity(capacity.clamp(1, 64)),
            capacity: capacity.max(1),
        }
    }

    /// Replace the system prompt.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system = Some(prompt.into());
    }

    /// The system prompt, if set.
    pub fn system_prompt(&self) -> Option<&str> {
        self.system.as_deref()
    }

    /// Append `message`, evicting the oldest once over capacity.
    pub fn push(&mut self, message: Message) {
        if self.window.len() == self.capacity {
            self.window.remove(0);
        }
        self.window.push(message);
    }

    /// The window, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.window
    }

    /// Rough size in tokens, at four characters per token per text.
    pub fn estimated_tokens(&self) -> usize {
        let approx = |s: &str| s.chars().count() / 4;
        self.system.as_deref().map_or(0, approx)
            + self.window.iter().map(|m| approx(&m.content)).sum::<usize>()
    }
}
