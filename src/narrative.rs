//! Optional plain-language explanation of a prediction from an external
//! chat-completion API.
//!
//! Enrichment is disabled (returns `None`) when no API key is configured.
//! When enabled, every failure becomes [`Narrative::Failed`]; nothing here
//! can fail the classification it decorates.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

pub const DEFAULT_ENDPOINT: &str = "https://api.groq.com/openai/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "llama2-70b-4096";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const SYSTEM_PROMPT: &str =
    "You are a helpful dermatology assistant that provides information in JSON format.";

/// Keys the prompt asks for. A reply must carry at least one of them.
const ANALYSIS_KEYS: [&str; 6] = [
    "description",
    "key_characteristics",
    "urgency_level",
    "requires_urgent_attention",
    "urgency_explanation",
    "followup_questions",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeConfig {
    /// Bearer credential; `None` disables enrichment
    #[serde(default)]
    pub api_key: Option<String>,
    pub model: String,
    pub endpoint: String,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl NarrativeConfig {
    /// The credential, if it is present and non-blank.
    pub fn credential(&self) -> Option<&str> {
        self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// Structured explanation requested from the language model.
///
/// Built from whatever JSON object the model returns. Missing keys stay
/// empty and loosely typed values are coerced, so `"Yes"` counts as an
/// urgent flag and a single string counts as a one-item list.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NarrativeAnalysis {
    pub description: String,
    pub key_characteristics: Vec<String>,
    /// "High", "Medium" or "Low"
    pub urgency_level: String,
    pub requires_urgent_attention: bool,
    pub urgency_explanation: String,
    pub followup_questions: Vec<String>,
}

impl NarrativeAnalysis {
    /// Read an analysis out of a reply object. `None` when the object has
    /// none of the requested keys.
    pub fn from_object(object: &Map<String, Value>) -> Option<Self> {
        if !ANALYSIS_KEYS.iter().any(|key| object.contains_key(*key)) {
            return None;
        }
        Some(Self {
            description: text(object.get("description")),
            key_characteristics: list(object.get("key_characteristics")),
            urgency_level: text(object.get("urgency_level")),
            requires_urgent_attention: flag(object.get("requires_urgent_attention")),
            urgency_explanation: text(object.get("urgency_explanation")),
            followup_questions: list(object.get("followup_questions")),
        })
    }
}

fn text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

fn list(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().map(|item| text(Some(item))).collect(),
        Some(other) => vec![text(Some(other))],
    }
}

fn flag(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => {
            let s = s.trim().to_ascii_lowercase();
            s == "true" || s.starts_with("yes")
        }
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Narrative {
    Analysis(NarrativeAnalysis),
    Failed { error: String },
}

impl Narrative {
    pub fn analysis(&self) -> Option<&NarrativeAnalysis> {
        match self {
            Narrative::Analysis(a) => Some(a),
            Narrative::Failed { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Narrative::Analysis(_) => None,
            Narrative::Failed { error } => Some(error),
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

pub struct NarrativeEnricher {
    config: NarrativeConfig,
    client: Option<reqwest::blocking::Client>,
}

impl NarrativeEnricher {
    /// Build the enricher. The HTTP client is only created when a credential is configured.
    pub fn new(config: NarrativeConfig) -> Result<Self> {
        let client = match config.credential() {
            Some(_) => Some(
                reqwest::blocking::Client::builder()
                    .timeout(config.timeout)
                    .build()
                    .map_err(|e| Error::Narrative(e.to_string()))?,
            ),
            None => {
                tracing::info!("No narrative API key configured; enrichment disabled");
                None
            }
        };
        Ok(Self { config, client })
    }

    /// Enricher that never calls out.
    pub fn disabled() -> Self {
        Self {
            config: NarrativeConfig::default(),
            client: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.client.is_some() && self.config.credential().is_some()
    }

    /// Ask for an explanation of `label` predicted at `confidence` percent.
    pub fn enrich(&self, label: &str, confidence: f64) -> Option<Narrative> {
        let (client, api_key) = match (&self.client, self.config.credential()) {
            (Some(client), Some(key)) => (client, key),
            _ => return None,
        };

        Some(match self.request(client, api_key, label, confidence) {
            Ok(analysis) => Narrative::Analysis(analysis),
            Err(err) => {
                tracing::error!("Error in narrative enrichment: {err}");
                Narrative::Failed {
                    error: err.to_string(),
                }
            }
        })
    }

    fn request(
        &self,
        client: &reqwest::blocking::Client,
        api_key: &str,
        label: &str,
        confidence: f64,
    ) -> Result<NarrativeAnalysis> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": build_prompt(label, confidence)},
            ],
            "temperature": 0.1,
            "max_tokens": 2048,
            "response_format": {"type": "json_object"},
        });

        let response = client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .map_err(|e| Error::Narrative(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            tracing::error!("Narrative API request failed with status code {}: {text}", status.as_u16());
            return Err(Error::Narrative(format!(
                "API request failed with status code {}",
                status.as_u16()
            )));
        }

        let chat: ChatResponse = response
            .json()
            .map_err(|e| Error::Narrative(format!("unexpected response body: {e}")))?;
        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Narrative("response contained no choices".to_string()))?;

        parse_analysis(&content)
    }
}

/// Prompt asking for description, characteristics, urgency and follow-up questions as JSON.
pub fn build_prompt(label: &str, confidence: f64) -> String {
    format!(
        "You are a dermatology assistant. Based on an AI image analysis, a skin lesion has been \
classified as '{label}' with {confidence:.2}% confidence.

Please provide:
1. A brief description of this condition (2-3 sentences)
2. Three key characteristics to look for
3. Whether this condition generally requires urgent medical attention (Yes/No, with brief explanation)
4. Two follow-up questions a doctor might ask the patient about this condition

Format your response as structured JSON with the following keys:
- description
- key_characteristics (as an array)
- urgency_level (string: \"High\", \"Medium\", or \"Low\")
- requires_urgent_attention (boolean)
- urgency_explanation
- followup_questions (as an array)

Ensure your response is valid JSON format."
    )
}

/// Parse the model's reply. Any JSON object carrying at least one of the
/// requested keys is accepted. If the whole reply is not a JSON object, the
/// text between the first `{` and the last `}` is tried.
pub fn parse_analysis(content: &str) -> Result<NarrativeAnalysis> {
    let object = match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(object)) => object,
        parsed => {
            if let Err(err) = parsed {
                tracing::warn!("Failed to parse JSON reply, trying to extract object: {err}");
            }
            extract_object(content)
                .ok_or_else(|| Error::Narrative("Failed to parse JSON from response".to_string()))?
        }
    };
    NarrativeAnalysis::from_object(&object)
        .ok_or_else(|| Error::Narrative("Response JSON contained none of the requested keys".to_string()))
}

fn extract_object(content: &str) -> Option<Map<String, Value>> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&content[start..=end]).ok()? {
        Value::Object(object) => Some(object),
        _ => None,
    }
}
