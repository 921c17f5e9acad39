//! AI arbiter: scores how directly an answer addresses its question (Gemini)

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::store::QuestionStore;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Questions compared when looking for duplicates
const DUPLICATE_CANDIDATES: u32 = 10;
/// Characters of each candidate body included in the duplicate prompt
const DUPLICATE_BODY_CHARS: usize = 200;

/// Arbiter verdict on an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AiAnalysis {
    /// 0 (completely evasive) to 100 (perfectly direct)
    pub directness_score: f64,
    pub summary: String,
    /// Concerning patterns, e.g. `political_fluff`, `off_topic`
    #[serde(default)]
    pub flags: Vec<String>,
}

impl AiAnalysis {
    /// Used when no Gemini key is configured
    pub fn unavailable() -> Self {
        Self {
            directness_score: 75.0,
            summary: "AI analysis unavailable - using default score".to_string(),
            flags: Vec::new(),
        }
    }

    /// Used when the model call or its reply fails
    pub fn failed(error: &str) -> Self {
        let short: String = error.chars().take(50).collect();
        Self {
            directness_score: 50.0,
            summary: format!("Analysis error: {}", short),
            flags: vec!["analysis_failed".to_string()],
        }
    }
}

/// Duplicate-question verdict
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DuplicateCheck {
    #[serde(default)]
    pub is_duplicate: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similar_question_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_reason: Option<String>,
}

/// Arbiter errors
#[derive(Debug, thiserror::Error)]
pub enum ArbiterError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Gemini API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Gemini returned no text")]
    EmptyResponse,

    #[error("Invalid JSON from model: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Invalid directness score")]
    InvalidScore,

    #[error("Database error: {0}")]
    Database(#[from] crate::store::supabase::SupabaseError),
}

// ============================================================================
// Gemini client
// ============================================================================

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

/// Minimal client for the Gemini `generateContent` endpoint
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", GEMINI_BASE_URL, self.model)
    }

    /// Send a single-turn prompt and return the concatenated reply text
    pub async fn generate(&self, prompt: &str) -> Result<String, ArbiterError> {
        let request = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: prompt }],
            }],
            generation_config: GenerationConfig { temperature: 0.2 },
        };

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ArbiterError::Api { status: status.as_u16(), body });
        }

        let reply: GenerateResponse = response.json().await?;
        let text: String = reply
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(ArbiterError::EmptyResponse);
        }
        Ok(text)
    }
}

// ============================================================================
// Prompts and reply parsing
// ============================================================================

pub fn directness_prompt(title: &str, body: &str, answer: &str) -> String {
    format!(
        r#"You are an AI assistant analyzing political accountability.

Analyze how directly the following answer addresses the citizen's question.

QUESTION TITLE: {title}

QUESTION BODY: {body}

POLITICIAN'S ANSWER: {answer}

Evaluate the answer and respond in this exact JSON format:
{{
    "directness_score": <0-100 number, where 100 is perfectly direct and 0 is completely evasive>,
    "summary": "<one sentence summary of your analysis>",
    "flags": [<list of any concerning patterns, e.g. "political_fluff", "off_topic", "vague_promises", "blame_shifting">]
}}

Scoring guidelines:
- 80-100: Answer directly addresses the specific issue with concrete details
- 60-79: Answer is somewhat relevant but lacks specifics
- 40-59: Answer is vague or only tangentially related
- 20-39: Answer is mostly political platitudes with minimal relevance
- 0-19: Answer completely ignores the question

Return ONLY the JSON, no other text."#
    )
}

pub fn duplicate_prompt(title: &str, body: &str, existing: &[(Uuid, String, String)]) -> String {
    let existing_qs = existing
        .iter()
        .map(|(id, title, body)| {
            let short: String = body.chars().take(DUPLICATE_BODY_CHARS).collect();
            format!("ID: {}\nTitle: {}\nBody: {}", id, title, short)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Compare this new question to existing ones and determine if it's a duplicate.

NEW QUESTION:
Title: {title}
Body: {body}

EXISTING QUESTIONS:
{existing_qs}

Respond with JSON:
{{
    "is_duplicate": true/false,
    "similar_question_id": "<ID of most similar question if duplicate>",
    "similarity_reason": "<brief explanation if duplicate>"
}}

Return ONLY the JSON."#
    )
}

/// Strip a surrounding markdown code fence (and a `json` language tag)
pub fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    if !text.starts_with("```") {
        return text;
    }
    let inner = text.split("```").nth(1).unwrap_or("");
    inner.strip_prefix("json").unwrap_or(inner).trim()
}

#[derive(Deserialize)]
struct RawAnalysis {
    directness_score: Option<serde_json::Value>,
    summary: Option<String>,
    flags: Option<Vec<String>>,
}

/// Parse the model's directness reply
pub fn parse_analysis(text: &str) -> Result<AiAnalysis, ArbiterError> {
    let raw: RawAnalysis = serde_json::from_str(strip_code_fence(text))?;

    let score = match raw.directness_score {
        None | Some(serde_json::Value::Null) => 50.0,
        Some(serde_json::Value::Number(n)) => n.as_f64().ok_or(ArbiterError::InvalidScore)?,
        Some(serde_json::Value::String(s)) => {
            s.trim().parse().map_err(|_| ArbiterError::InvalidScore)?
        }
        Some(_) => return Err(ArbiterError::InvalidScore),
    };
    if !score.is_finite() {
        return Err(ArbiterError::InvalidScore);
    }

    Ok(AiAnalysis {
        directness_score: score.clamp(0.0, 100.0),
        summary: raw
            .summary
            .unwrap_or_else(|| "Analysis completed".to_string()),
        flags: raw.flags.unwrap_or_default(),
    })
}

/// Parse the model's duplicate reply
pub fn parse_duplicate(text: &str) -> Result<DuplicateCheck, ArbiterError> {
    Ok(serde_json::from_str(strip_code_fence(text))?)
}

// ============================================================================
// Arbiter service
// ============================================================================

/// Answer analysis and duplicate detection
#[derive(Clone)]
pub struct Arbiter {
    gemini: Option<GeminiClient>,
    questions: QuestionStore,
}

impl Arbiter {
    pub fn new(config: &Config, questions: QuestionStore) -> Self {
        let gemini = config
            .gemini_api_key
            .as_deref()
            .map(|key| GeminiClient::new(key, &config.gemini_model));
        Self { gemini, questions }
    }

    /// Score an answer; never fails, falling back to fixed verdicts
    pub async fn analyze_answer_directness(
        &self,
        question_title: &str,
        question_body: &str,
        answer_content: &str,
    ) -> AiAnalysis {
        let Some(gemini) = &self.gemini else {
            return AiAnalysis::unavailable();
        };

        let prompt = directness_prompt(question_title, question_body, answer_content);
        let result = match gemini.generate(&prompt).await {
            Ok(text) => parse_analysis(&text),
            Err(e) => Err(e),
        };

        match result {
            Ok(analysis) => {
                debug!(score = analysis.directness_score, flags = ?analysis.flags, "Answer analyzed");
                analysis
            }
            Err(e) => {
                warn!(error = %e, "Answer analysis failed");
                AiAnalysis::failed(&e.to_string())
            }
        }
    }

    /// Check whether a similar open question already targets the politician
    pub async fn check_duplicate_question(
        &self,
        title: &str,
        body: &str,
        politician_id: Uuid,
    ) -> DuplicateCheck {
        let Some(gemini) = &self.gemini else {
            return DuplicateCheck::default();
        };

        match self.find_duplicate(gemini, title, body, politician_id).await {
            Ok(check) => check,
            Err(e) => {
                warn!(error = %e, politician_id = %politician_id, "Duplicate check failed");
                DuplicateCheck::default()
            }
        }
    }

    async fn find_duplicate(
        &self,
        gemini: &GeminiClient,
        title: &str,
        body: &str,
        politician_id: Uuid,
    ) -> Result<DuplicateCheck, ArbiterError> {
        let existing = self
            .questions
            .open_for_politician(politician_id, DUPLICATE_CANDIDATES)
            .await?;
        if existing.is_empty() {
            return Ok(DuplicateCheck::default());
        }

        let candidates: Vec<(Uuid, String, String)> = existing
            .into_iter()
            .map(|q| (q.id, q.title, q.body))
            .collect();
        let text = gemini
            .generate(&duplicate_prompt(title, body, &candidates))
            .await?;
        parse_duplicate(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("  {\"a\":1}  "), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{\"a\":1}\n```"), "{\"a\":1}");
    }

    #[test]
    fn test_parse_analysis_fenced() {
        let reply = "```json\n{\"directness_score\": 82, \"summary\": \"Direct answer\", \"flags\": [\"vague_promises\"]}\n```";
        let analysis = parse_analysis(reply).unwrap();
        assert_eq!(analysis.directness_score, 82.0);
        assert_eq!(analysis.summary, "Direct answer");
        assert_eq!(analysis.flags, vec!["vague_promises".to_string()]);
    }

    #[test]
    fn test_parse_analysis_defaults_and_clamp() {
        let analysis = parse_analysis("{}").unwrap();
        assert_eq!(analysis.directness_score, 50.0);
        assert_eq!(analysis.summary, "Analysis completed");
        assert!(analysis.flags.is_empty());

        let analysis = parse_analysis("{\"directness_score\": \"140\"}").unwrap();
        assert_eq!(analysis.directness_score, 100.0);
    }

    #[test]
    fn test_parse_analysis_rejects_garbage() {
        assert!(parse_analysis("The answer was fine.").is_err());
        assert!(matches!(
            parse_analysis("{\"directness_score\": \"high\"}"),
            Err(ArbiterError::InvalidScore)
        ));
    }

    #[test]
    fn test_fallback_verdicts() {
        let unavailable = AiAnalysis::unavailable();
        assert_eq!(unavailable.directness_score, 75.0);
        assert!(unavailable.flags.is_empty());

        let failed = AiAnalysis::failed(&"x".repeat(80));
        assert_eq!(failed.directness_score, 50.0);
        assert_eq!(failed.summary, format!("Analysis error: {}", "x".repeat(50)));
        assert_eq!(failed.flags, vec!["analysis_failed".to_string()]);
    }

    #[test]
    fn test_parse_duplicate() {
        let check = parse_duplicate(
            "{\"is_duplicate\": true, \"similar_question_id\": \"abc\", \"similarity_reason\": \"Same road\"}",
        )
        .unwrap();
        assert!(check.is_duplicate);
        assert_eq!(check.similar_question_id.as_deref(), Some("abc"));

        assert_eq!(parse_duplicate("{}").unwrap(), DuplicateCheck::default());
    }

    #[test]
    fn test_duplicate_prompt_truncates_bodies() {
        let long_body = "b".repeat(500);
        let prompt = duplicate_prompt("New", "Body", &[(Uuid::nil(), "Old".to_string(), long_body)]);
        assert!(prompt.contains(&"b".repeat(200)));
        assert!(!prompt.contains(&"b".repeat(201)));
        assert!(prompt.contains("ID: 00000000-0000-0000-0000-000000000000"));
    }

    #[tokio::test]
    async fn test_arbiter_without_key_uses_default() {
        let config = Config::from_lookup(|_| None).unwrap();
        let questions = QuestionStore::new(crate::store::SupabaseClient::new(&config));
        let arbiter = Arbiter::new(&config, questions);

        let analysis = arbiter.analyze_answer_directness("T", "B", "A").await;
        assert_eq!(analysis, AiAnalysis::unavailable());

        let check = arbiter.check_duplicate_question("T", "B", Uuid::nil()).await;
        assert!(!check.is_duplicate);
    }
}
