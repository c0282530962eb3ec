//! # Scripted Completion Model for Testing
//!
//! Provides a `MockCompletionModel` that implements the `CompletionModel` trait
//! for use in tests. Replies are queued up front and consumed in order, so a
//! test can script a provider that fails, stalls or answers on a given call.
//! Every request is recorded for later assertions.

use rig::{
    completion::{
        AssistantContent, CompletionError, CompletionModel, CompletionRequest, CompletionResponse,
    },
    message::{Message, UserContent},
    one_or_many::OneOrMany,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// One scripted answer
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    /// Fail with a provider error carrying this message
    Error(String),
    /// Sleep before answering with the text, used to trigger timeouts
    Delay(Duration, String),
}

impl MockReply {
    pub fn text(text: &str) -> Self {
        MockReply::Text(text.to_string())
    }

    pub fn error(message: &str) -> Self {
        MockReply::Error(message.to_string())
    }

    pub fn delay(duration: Duration, text: &str) -> Self {
        MockReply::Delay(duration, text.to_string())
    }
}

/// A request as seen by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub preamble: Option<String>,
    pub prompt: String,
}

/// A mock completion model for testing purposes.
/// Without queued replies it answers with an empty text.
#[derive(Debug, Clone, Default)]
pub struct MockCompletionModel {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockCompletionModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the reply for the next unanswered call
    pub async fn push(&self, reply: MockReply) {
        self.replies.lock().await.push_back(reply);
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }
}

fn prompt_text(message: &Message) -> String {
    match message {
        Message::User { content } => content
            .iter()
            .filter_map(|c| match c {
                UserContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Message::Assistant { content } => content
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

impl CompletionModel for MockCompletionModel {
    type Response = String;

    async fn completion(
        &self,
        completion_request: CompletionRequest,
    ) -> Result<CompletionResponse<Self::Response>, CompletionError> {
        self.calls.lock().await.push(RecordedCall {
            preamble: completion_request.preamble.clone(),
            prompt: prompt_text(&completion_request.prompt),
        });

        let reply = self.replies.lock().await.pop_front();
        let text = match reply {
            None => String::new(),
            Some(MockReply::Text(text)) => text,
            Some(MockReply::Error(message)) => return Err(CompletionError::ProviderError(message)),
            Some(MockReply::Delay(duration, text)) => {
                tokio::time::sleep(duration).await;
                text
            }
        };
        Ok(CompletionResponse {
            choice: OneOrMany::one(AssistantContent::text(&text)),
            raw_response: text,
        })
    }
}
