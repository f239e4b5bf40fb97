use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatChoice {
    pub content: String,
}

/// Candidate completions returned by the backend, in backend order.
#[derive(Debug, Clone, Default)]
pub struct ChatCompletion {
    pub choices: Vec<ChatChoice>,
}

impl ChatCompletion {
    pub fn first_text(&self) -> Option<&str> {
        self.choices.first().map(|choice| choice.content.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            temperature: 0.7,
        }
    }
}
