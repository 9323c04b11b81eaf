//! Testing utilities.
//!
//! - [`ScriptedLlm`] replays queued responses so the pipeline can run without API calls
//! - [`sample_seed`] is a small world seed for tests and demos

use async_trait::async_trait;
use llm::{GenerationRequest, LlmClient, Provider};
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::config::{SeedCrewMember, SeedLocation, SeedProtagonist, SeedThread, WorldSeed};

/// Returned once the script runs out.
pub const EXHAUSTED_RESPONSE: &str = "The model has no more scripted responses.";

/// A deterministic [`LlmClient`] that returns scripted responses in order.
///
/// Every request is recorded so tests can inspect prompts and parameters.
#[derive(Debug, Default)]
pub struct ScriptedLlm {
    responses: Mutex<VecDeque<Result<String, llm::Error>>>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedLlm {
    /// Create a client that answers with `responses` in order.
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue another successful response.
    pub fn push(&self, response: impl Into<String>) {
        lock(&self.responses).push_back(Ok(response.into()));
    }

    /// Queue a failure.
    pub fn push_error(&self, error: llm::Error) {
        lock(&self.responses).push_back(Err(error));
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        lock(&self.requests).clone()
    }

    /// Responses not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.responses).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, request: GenerationRequest) -> Result<String, llm::Error> {
        lock(&self.requests).push(request);
        lock(&self.responses)
            .pop_front()
            .unwrap_or_else(|| Ok(EXHAUSTED_RESPONSE.to_string()))
    }

    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// A small seed: one protagonist, two crew members, two opening threads.
pub fn sample_seed() -> WorldSeed {
    WorldSeed {
        world_name: "The Aether Reach".to_string(),
        description: "Floating islands above an endless storm sea".to_string(),
        central_conflict: "The Sky Council hoards the only maps to the Edge".to_string(),
        themes: vec!["freedom".to_string(), "found family".to_string()],
        starting_location: SeedLocation {
            name: "Drift Port".to_string(),
            description: "A ramshackle harbor on the underside of an island".to_string(),
        },
        protagonist: SeedProtagonist {
            name: "Kael".to_string(),
            age: Some(17),
            personality: "Reckless, loyal, endlessly curious".to_string(),
            dream: Some("Reach the Edge of the World".to_string()),
            quirks: vec!["Hums when nervous".to_string()],
            abilities: vec!["Wind sense".to_string()],
            background: "Orphan raised by dockworkers".to_string(),
            speech_pattern: Some("Short bursts, lots of exclamations".to_string()),
        },
        initial_crew: vec![
            SeedCrewMember {
                name: "Mira".to_string(),
                personality: "Sharp-tongued navigator".to_string(),
                role: Some("ally".to_string()),
                background: "Former Council cartographer".to_string(),
            },
            SeedCrewMember {
                name: "Old Bram".to_string(),
                personality: "Gruff but kind".to_string(),
                role: Some("mentor".to_string()),
                background: String::new(),
            },
        ],
        initial_threads: vec![
            SeedThread {
                thread: "What lies at the Edge?".to_string(),
                thread_type: "mystery".to_string(),
            },
            SeedThread {
                thread: "Who burned the Council archive?".to_string(),
                thread_type: "conspiracy".to_string(),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_responses_in_order() {
        let llm = ScriptedLlm::new(["first", "second"]);
        llm.push_error(llm::Error::EmptyResponse);

        let a = llm.generate(GenerationRequest::new("a")).await.unwrap();
        let b = llm.generate(GenerationRequest::new("b").with_temperature(0.2)).await.unwrap();
        let c = llm.generate(GenerationRequest::new("c")).await;
        let d = llm.generate(GenerationRequest::new("d")).await.unwrap();

        assert_eq!(a, "first");
        assert_eq!(b, "second");
        assert!(matches!(c, Err(llm::Error::EmptyResponse)));
        assert_eq!(d, EXHAUSTED_RESPONSE);

        let requests = llm.requests();
        assert_eq!(requests.len(), 4);
        assert_eq!(requests[1].temperature, Some(0.2));
        assert_eq!(llm.remaining(), 0);
    }
}
