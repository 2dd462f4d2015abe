//! Request token-cost estimation
//!
//! The estimate is a deliberate approximation (4 characters ≈ 1 token), not
//! a tokenizer. The only property admission control needs is monotonicity:
//! a larger payload never estimates cheaper than a smaller one.

use serde::Deserialize;

const CHARS_PER_TOKEN: usize = 4;
const MIN_JSON_TOKENS: u64 = 5;

#[derive(Debug, Default, Deserialize)]
struct CostPayload {
    #[serde(default)]
    messages: Vec<CostMessage>,
    #[serde(default)]
    prompt: String,
}

#[derive(Debug, Deserialize)]
struct CostMessage {
    #[serde(default)]
    content: String,
}

/// Estimate the token cost of a request body.
///
/// Empty bodies cost 1. OpenAI-shaped JSON bodies are costed from their
/// `messages[].content` and `prompt` text with a floor of 5 to cover role
/// and metadata overhead. Anything else is costed from its raw length.
pub fn estimate_tokens(body: &[u8]) -> u64 {
    if body.is_empty() {
        return 1;
    }

    let payload: CostPayload = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        // Not OpenAI-shaped JSON (or not JSON at all): cost the raw bytes
        Err(_) => return ((body.len() / CHARS_PER_TOKEN) as u64).max(1),
    };

    let mut tokens: u64 = 0;
    for message in &payload.messages {
        tokens += (message.content.len() / CHARS_PER_TOKEN) as u64;
    }
    tokens += (payload.prompt.len() / CHARS_PER_TOKEN) as u64;

    tokens.max(MIN_JSON_TOKENS)
}
