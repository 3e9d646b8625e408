//! HTTP client for the Hearth memory service.
//!
//! Implements [`MemoryBackend`] over `reqwest`: token minting, speaker
//! identification and enrollment (multipart WAV uploads), participant and
//! story management, and session completion.

use hearth_types::{
    CollaboratorError, CompletedSession, EnrollOutcome, IdentifyOutcome, ParticipantRef,
    PlaybackLocation, StoryRef, TokenGrant, TokenRequest,
};
use hearth_voice::MemoryBackend;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use crate::config::ApiConfig;

/// HTTP request timeout applied to every memory-service call.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A voice participant row as listed by the memory service.
#[derive(Debug, Deserialize)]
struct ParticipantRow {
    id: String,
    label: String,
    #[serde(default)]
    has_voice_profile: bool,
}

#[derive(Debug, Deserialize)]
struct StoryRow {
    id: String,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompleteResponse {
    #[serde(rename = "momentId")]
    moment_id: String,
}

/// Client for the Hearth memory service HTTP API.
#[derive(Debug, Clone)]
pub struct MemoryApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl MemoryApiClient {
    pub fn new(config: &ApiConfig) -> Self {
        let timeout = if config.request_timeout_secs > 0 {
            Duration::from_secs(config.request_timeout_secs)
        } else {
            DEFAULT_REQUEST_TIMEOUT
        };
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn wav_form(wav: Vec<u8>) -> Result<reqwest::multipart::Form, CollaboratorError> {
        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("clip.wav")
            .mime_str("audio/wav")
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;
        Ok(reqwest::multipart::Form::new().part("audio", part))
    }
}

/// Pulls the `detail` field out of an API error body, falling back to the
/// raw text.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail")?.as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

async fn expect_json<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, CollaboratorError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(CollaboratorError::Status {
            status: status.as_u16(),
            detail: error_detail(&body),
        });
    }
    resp.json::<T>()
        .await
        .map_err(|e| CollaboratorError::InvalidResponse(e.to_string()))
}

fn transport(e: reqwest::Error) -> CollaboratorError {
    CollaboratorError::Transport(e.to_string())
}

/// Flattens turns into `role: content` lines so sessions stay searchable
/// server-side.
pub(crate) fn flatten_transcript(session: &CompletedSession) -> String {
    session
        .turns
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str(), t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Body of the session-completion call: per-turn data plus derived recall
/// metadata under `sessionMeta`, and a flattened transcript.
pub(crate) fn complete_session_body(session: &CompletedSession) -> serde_json::Value {
    json!({
        "sessionMeta": {
            "participantId": session.participant_id,
            "summary": session.summary,
            "tags": session.keywords,
            "turns": session.turns,
        },
        "transcriptText": flatten_transcript(session),
    })
}

impl MemoryBackend for MemoryApiClient {
    async fn any_enrolled_voiceprints(&self) -> Result<bool, CollaboratorError> {
        let resp = self
            .http
            .get(self.url("/voice/participants"))
            .send()
            .await
            .map_err(transport)?;
        let rows: Vec<ParticipantRow> = expect_json(resp).await?;
        Ok(rows.iter().any(|r| r.has_voice_profile))
    }

    async fn identify(&self, wav: Vec<u8>) -> Result<IdentifyOutcome, CollaboratorError> {
        let resp = self
            .http
            .post(self.url("/voice/identify"))
            .multipart(Self::wav_form(wav)?)
            .send()
            .await
            .map_err(transport)?;
        expect_json(resp).await
    }

    async fn mint_token(&self, req: TokenRequest) -> Result<TokenGrant, CollaboratorError> {
        let resp = self
            .http
            .post(self.url("/realtime/token"))
            .json(&req)
            .send()
            .await
            .map_err(transport)?;
        let grant: TokenGrant = expect_json(resp).await?;
        if let Some(expires_at) = grant.expires_at {
            if let Some(when) = chrono::DateTime::from_timestamp(expires_at, 0) {
                tracing::debug!(expires_at = %when.to_rfc3339(), "token minted");
            }
        }
        Ok(grant)
    }

    async fn enroll_voice(
        &self,
        participant_id: &str,
        wav: Vec<u8>,
    ) -> Result<EnrollOutcome, CollaboratorError> {
        let resp = self
            .http
            .post(self.url(&format!("/voice/participants/{participant_id}/enroll")))
            .multipart(Self::wav_form(wav)?)
            .send()
            .await
            .map_err(transport)?;
        expect_json(resp).await
    }

    async fn create_voiceprint(
        &self,
        participant_id: &str,
        wav: Vec<u8>,
    ) -> Result<(), CollaboratorError> {
        // Same endpoint as incremental enrollment, fed a longer clip; the
        // caller enforces the minimum duration.
        let outcome = self.enroll_voice(participant_id, wav).await?;
        if outcome.ok {
            Ok(())
        } else {
            Err(CollaboratorError::Unavailable(outcome.message))
        }
    }

    async fn create_participant(&self, name: &str) -> Result<ParticipantRef, CollaboratorError> {
        let resp = self
            .http
            .post(self.url("/voice/participants"))
            .json(&json!({ "label": name }))
            .send()
            .await
            .map_err(transport)?;
        let row: ParticipantRow = expect_json(resp).await?;
        Ok(ParticipantRef {
            id: row.id,
            label: row.label,
        })
    }

    async fn confirm_story(
        &self,
        participant_id: &str,
        story_text: &str,
        source_moment_id: Option<&str>,
    ) -> Result<StoryRef, CollaboratorError> {
        let resp = self
            .http
            .post(self.url("/voice/stories/confirm"))
            .json(&json!({
                "participant_id": participant_id,
                "story_text": story_text,
                "source_moment_id": source_moment_id,
            }))
            .send()
            .await
            .map_err(transport)?;
        let row: StoryRow = expect_json(resp).await?;
        Ok(StoryRef {
            id: row.id,
            title: row.title,
        })
    }

    async fn story_playback(&self, moment_id: &str) -> Result<PlaybackLocation, CollaboratorError> {
        let resp = self
            .http
            .get(self.url("/voice/stories/shared/playback"))
            .query(&[("moment_id", moment_id)])
            .send()
            .await
            .map_err(transport)?;
        expect_json(resp).await
    }

    async fn mark_story_listened(
        &self,
        moment_id: &str,
        participant_id: &str,
    ) -> Result<(), CollaboratorError> {
        let resp = self
            .http
            .post(self.url("/voice/stories/shared/listened"))
            .json(&json!({
                "moment_id": moment_id,
                "participant_id": participant_id,
            }))
            .send()
            .await
            .map_err(transport)?;
        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = resp.text().await.unwrap_or_default();
            Err(CollaboratorError::Status {
                status: status.as_u16(),
                detail: error_detail(&body),
            })
        }
    }

    async fn complete_session(
        &self,
        session: CompletedSession,
    ) -> Result<String, CollaboratorError> {
        let resp = self
            .http
            .post(self.url("/sessions/complete"))
            .json(&complete_session_body(&session))
            .send()
            .await
            .map_err(transport)?;
        let created: CompleteResponse = expect_json(resp).await?;
        Ok(created.moment_id)
    }
}
