//! Remote pronunciation-assessment strategy.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;
use tracing::debug;

use super::{clamp_score, ScoreRequest, ScoreSource, ScoreStrategy};
use crate::config::RemoteConfig;
use crate::error::{Error, Result};

/// Opaque remote scoring backend.
#[async_trait]
pub trait RemoteScorer: Send + Sync {
    /// Score the request audio against its reference text, on the
    /// canonical 0-100 scale.
    async fn assess(&self, request: &ScoreRequest) -> Result<f32>;
}

/// Strategy that asks a remote backend, bounded by its own deadline.
pub struct RemoteStrategy {
    scorer: Arc<dyn RemoteScorer>,
    deadline: Duration,
}

impl RemoteStrategy {
    pub fn new(scorer: Arc<dyn RemoteScorer>, deadline: Duration) -> Self {
        Self { scorer, deadline }
    }
}

#[async_trait]
impl ScoreStrategy for RemoteStrategy {
    fn source(&self) -> ScoreSource {
        ScoreSource::Remote
    }

    async fn score(&self, request: &ScoreRequest) -> Result<f32> {
        let deadline = request.remote_deadline_override.unwrap_or(self.deadline);
        match tokio::time::timeout(deadline, self.scorer.assess(request)).await {
            Ok(result) => result.map(clamp_score),
            Err(_) => Err(Error::RemoteUnavailable(format!(
                "No response within {:?}",
                deadline
            ))),
        }
    }
}

/// Azure Speech pronunciation-assessment client.
///
/// Sends the WAV body to the short-audio recognition endpoint with a
/// `Pronunciation-Assessment` header and averages the four subscores
/// (accuracy, fluency, completeness, pronunciation) into the overall
/// 0-100 value.
pub struct AzureSpeechScorer {
    config: RemoteConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RecognitionResponse {
    recognition_status: String,
    #[serde(default)]
    n_best: Vec<NBestEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NBestEntry {
    pronunciation_assessment: Option<PronunciationAssessment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PronunciationAssessment {
    accuracy_score: f32,
    fluency_score: f32,
    completeness_score: f32,
    pron_score: f32,
}

impl AzureSpeechScorer {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::RemoteUnavailable(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, language: &str) -> String {
        format!(
            "https://{}.stt.speech.microsoft.com/speech/recognition/conversation/cognitiveservices/v1?language={}",
            self.config.region, language
        )
    }

    fn assessment_header(reference_text: &str) -> String {
        let params = serde_json::json!({
            "ReferenceText": reference_text,
            "GradingSystem": "HundredMark",
            "Granularity": "Phoneme",
            "EnableMiscue": true,
        });
        base64::engine::general_purpose::STANDARD.encode(params.to_string())
    }

    fn overall_score(response: &RecognitionResponse) -> Result<f32> {
        if !response.recognition_status.eq_ignore_ascii_case("success") {
            return Err(Error::RemoteUnavailable(format!(
                "Recognition failed: {}",
                response.recognition_status
            )));
        }

        let assessment = response
            .n_best
            .first()
            .and_then(|entry| entry.pronunciation_assessment.as_ref())
            .ok_or_else(|| {
                Error::RemoteUnavailable("Response missing pronunciation assessment".to_string())
            })?;

        let overall = (assessment.accuracy_score
            + assessment.fluency_score
            + assessment.completeness_score
            + assessment.pron_score)
            / 4.0;

        Ok(clamp_score(overall))
    }
}

#[async_trait]
impl RemoteScorer for AzureSpeechScorer {
    async fn assess(&self, request: &ScoreRequest) -> Result<f32> {
        if self.config.subscription_key.is_empty() {
            return Err(Error::RemoteUnavailable(
                "No subscription key configured".to_string(),
            ));
        }

        let audio = tokio::fs::read(&request.audio_path).await.map_err(|e| {
            Error::InvalidInput(format!(
                "Cannot read audio {}: {}",
                request.audio_path.display(),
                e
            ))
        })?;

        let language = if request.language.is_empty() {
            self.config.language.as_str()
        } else {
            request.language.as_str()
        };

        debug!("Requesting pronunciation assessment ({})", language);
        let response = self
            .client
            .post(self.endpoint(language))
            .header("Ocp-Apim-Subscription-Key", &self.config.subscription_key)
            .header(
                "Pronunciation-Assessment",
                Self::assessment_header(&request.reference_text),
            )
            .header(
                "Content-Type",
                "audio/wav; codecs=audio/pcm; samplerate=16000",
            )
            .header("Accept", "application/json")
            .body(audio)
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::RemoteUnavailable(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let parsed: RecognitionResponse = response
            .json()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("Malformed response: {}", e)))?;

        Self::overall_score(&parsed)
    }
}
