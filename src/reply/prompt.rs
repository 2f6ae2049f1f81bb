//! Request bodies for the reply backends.
//!
//! [`PromptBuilder`] assembles the system instruction from the persona and
//! the document, then lays out the conversation history in either wire
//! format:
//! * **Gemini** (`gemini_body`): the instruction is sent as a leading user
//!   turn followed by a fixed model acknowledgement, then the history with
//!   assistant turns renamed to `model`.
//! * **Chat** (`chat_body`): a `system` message followed by the history for
//!   any OpenAI-compatible `/v1/chat/completions` endpoint.
//!
//! The response parsers live here too so both halves of each format are
//! tested side by side.

use serde_json::{json, Value};

use crate::turn::{Message, Role};

use super::ReplyError;

// ---------------------------------------------------------------------------
// Fixed text
// ---------------------------------------------------------------------------

const VOICE_INSTRUCTION: &str = "\
You are a helpful voice assistant. Keep your responses concise and conversational \
since they will be spoken aloud. Avoid using markdown formatting, bullet points, \
or numbered lists in your responses.";

const DOCUMENT_PREAMBLE: &str =
    "Here is the document content you have access to for reference:";

const DOCUMENT_SCOPE: &str = "You can answer questions about this document, but you are also \
able to answer general questions on any topic.";

const GENERAL_SCOPE: &str = "You can answer general questions on any topic.";

const MODEL_ACKNOWLEDGEMENT: &str = "I understand. I'll act as a helpful voice assistant. \
I'll keep my responses concise and conversational. How can I help you?";

/// Spoken when the backend answers successfully but with no text.
pub const EMPTY_REPLY: &str = "I couldn't generate a response.";

// ---------------------------------------------------------------------------
// PromptBuilder
// ---------------------------------------------------------------------------

/// Builds reply requests for one turn.
///
/// ```rust
/// use doc_voice_agent::reply::PromptBuilder;
///
/// let builder = PromptBuilder::new("You are a museum guide.", "The museum opens at 10.");
/// assert!(builder.system_instruction().starts_with("You are a museum guide."));
/// ```
pub struct PromptBuilder<'a> {
    persona: &'a str,
    document: &'a str,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(persona: &'a str, document: &'a str) -> Self {
        Self { persona, document }
    }

    /// Persona, the voice-assistant rules, then the document (if any).
    pub fn system_instruction(&self) -> String {
        let mut out = String::with_capacity(self.persona.len() + self.document.len() + 512);
        out.push_str(self.persona);
        out.push_str("\n\n");
        out.push_str(VOICE_INSTRUCTION);
        out.push_str("\n\n");
        if self.document.is_empty() {
            out.push_str(GENERAL_SCOPE);
        } else {
            out.push_str(DOCUMENT_PREAMBLE);
            out.push_str("\n---\n");
            out.push_str(self.document);
            out.push_str("\n---\n\n");
            out.push_str(DOCUMENT_SCOPE);
        }
        out
    }

    /// Body for `POST /v1beta/models/{model}:generateContent`.
    pub fn gemini_body(&self, history: &[Message], temperature: f32, max_tokens: u32) -> Value {
        let mut contents = vec![
            gemini_turn("user", &self.system_instruction()),
            gemini_turn("model", MODEL_ACKNOWLEDGEMENT),
        ];
        contents.extend(history.iter().map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            gemini_turn(role, &m.text)
        }));

        json!({
            "contents": contents,
            "generationConfig": {
                "maxOutputTokens": max_tokens,
                "temperature":     temperature
            }
        })
    }

    /// Body for an OpenAI-compatible `POST /v1/chat/completions`.
    pub fn chat_body(
        &self,
        history: &[Message],
        model: &str,
        temperature: f32,
        max_tokens: u32,
    ) -> Value {
        let mut messages = vec![json!({
            "role": "system",
            "content": self.system_instruction()
        })];
        messages.extend(history.iter().map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            json!({ "role": role, "content": m.text })
        }));

        json!({
            "model":       model,
            "messages":    messages,
            "stream":      false,
            "temperature": temperature,
            "max_tokens":  max_tokens
        })
    }
}

fn gemini_turn(role: &str, text: &str) -> Value {
    json!({ "role": role, "parts": [{ "text": text }] })
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Concatenate the text parts of the first Gemini candidate.
///
/// A response without any text yields [`EMPTY_REPLY`].  That includes a
/// blocked prompt, which has `promptFeedback` and no `candidates` at all.
/// Only an `error` body is a failure.
pub fn parse_gemini_reply(json: &Value) -> Result<String, ReplyError> {
    if let Some(message) = json["error"]["message"].as_str() {
        return Err(ReplyError::Parse(message.to_string()));
    }
    if let Some(reason) = json["promptFeedback"]["blockReason"].as_str() {
        log::debug!("reply: prompt blocked ({reason})");
    }

    let text: String = json["candidates"]
        .as_array()
        .and_then(|candidates| candidates.first())
        .and_then(|c| c["content"]["parts"].as_array())
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    Ok(or_fallback(text))
}

/// Content of the first chat-completion choice.
pub fn parse_chat_reply(json: &Value) -> Result<String, ReplyError> {
    let choices = json["choices"]
        .as_array()
        .ok_or_else(|| ReplyError::Parse("response has no choices".into()))?;

    let text = choices
        .first()
        .and_then(|c| c["message"]["content"].as_str())
        .unwrap_or_default()
        .to_string();

    Ok(or_fallback(text))
}

fn or_fallback(text: String) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        EMPTY_REPLY.to_string()
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
