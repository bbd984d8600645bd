use crate::error::RelayError;
use crate::relay::{RelayEvent, TurnSummary};

/// The assistant side of a turn while its answer is still arriving.
#[derive(Debug, Clone, Default)]
pub struct PendingTurn {
    /// Accumulated answer text
    text_buffer: String,
    /// Whether any fragment has arrived yet
    has_content: bool,
    /// Set by `Done`
    summary: Option<TurnSummary>,
    /// Set by a relay failure
    failure: Option<String>,
}

impl PendingTurn {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one relay event. Events after completion are ignored.
    pub fn apply(&mut self, event: RelayEvent) {
        if self.is_complete() {
            tracing::warn!("relay event after turn completion ignored");
            return;
        }

        match event {
            RelayEvent::Chunk(delta) => {
                if !delta.is_empty() {
                    self.has_content = true;
                }
                self.text_buffer.push_str(&delta);
            }
            RelayEvent::Done(summary) => {
                self.summary = Some(summary);
            }
        }
    }

    /// Record a failed call. Partial text is discarded.
    pub fn fail(&mut self, error: &RelayError) {
        if self.is_complete() {
            return;
        }
        self.failure = Some(failure_diagnostic(error));
        self.text_buffer.clear();
        self.has_content = false;
    }

    /// Text to show in the live bubble
    pub fn text(&self) -> &str {
        &self.text_buffer
    }

    pub fn has_content(&self) -> bool {
        self.has_content
    }

    pub fn is_complete(&self) -> bool {
        self.summary.is_some() || self.failure.is_some()
    }

    #[cfg(test)]
    fn summary(&self) -> Option<&TurnSummary> {
        self.summary.as_ref()
    }

    #[cfg(test)]
    fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub(crate) fn into_parts(self) -> (String, Option<TurnSummary>, Option<String>) {
        (self.text_buffer, self.summary, self.failure)
    }
}

/// The message shown when a call fails, listing the usual misconfigurations.
pub fn failure_diagnostic(error: &RelayError) -> String {
    format!(
        "The agent call failed. Please check:\n\
         - the region is correct (e.g., us-east-1 / ap-southeast-2)\n\
         - the agent ID and agent alias ID are correct\n\
         - AWS credentials are configured (aws configure) or an IAM role is attached\n\
         \n\
         Error: {error}"
    )
}
