//! Tunables for one voice session.

use hearth_types::ResumeContext;
use serde::Deserialize;
use std::time::Duration;

fn default_capture_capacity_secs() -> u32 {
    30
}

fn default_identify_clip_secs() -> u32 {
    6
}

fn default_enroll_interval_secs() -> u64 {
    20
}

fn default_voiceprint_check_secs() -> u64 {
    5
}

fn default_voiceprint_min_secs() -> f64 {
    20.0
}

fn default_tool_call_timeout_secs() -> u64 {
    30
}

/// Configuration for a [`SessionController`](crate::SessionController).
///
/// The serde defaults let deployments override only what they need from a
/// config file; `Default` gives the production values.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Rolling capture buffer capacity, in seconds of audio.
    #[serde(default = "default_capture_capacity_secs")]
    pub capture_capacity_secs: u32,

    /// Length of the identification clip captured before connecting.
    #[serde(default = "default_identify_clip_secs")]
    pub identify_clip_secs: u32,

    /// Interval between periodic enrollment snapshot uploads.
    #[serde(default = "default_enroll_interval_secs")]
    pub enroll_interval_secs: u64,

    /// Interval between voice-print eligibility checks.
    #[serde(default = "default_voiceprint_check_secs")]
    pub voiceprint_check_secs: u64,

    /// Minimum buffered audio before a voice print may be created.
    #[serde(default = "default_voiceprint_min_secs")]
    pub voiceprint_min_secs: f64,

    /// Upper bound on a single tool-handler execution.
    #[serde(default = "default_tool_call_timeout_secs")]
    pub tool_call_timeout_secs: u64,

    /// Whether the user opted in to voice-print creation.
    #[serde(default)]
    pub voiceprint_opt_in: bool,

    /// Participant already known before the session starts, if any.
    #[serde(skip)]
    pub participant_id: Option<String>,

    /// Prior conversation or story to resume, if any.
    #[serde(skip)]
    pub resume: Option<ResumeContext>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capture_capacity_secs: default_capture_capacity_secs(),
            identify_clip_secs: default_identify_clip_secs(),
            enroll_interval_secs: default_enroll_interval_secs(),
            voiceprint_check_secs: default_voiceprint_check_secs(),
            voiceprint_min_secs: default_voiceprint_min_secs(),
            tool_call_timeout_secs: default_tool_call_timeout_secs(),
            voiceprint_opt_in: false,
            participant_id: None,
            resume: None,
        }
    }
}

impl SessionConfig {
    pub fn enroll_interval(&self) -> Duration {
        Duration::from_secs(self.enroll_interval_secs)
    }

    pub fn voiceprint_check_interval(&self) -> Duration {
        Duration::from_secs(self.voiceprint_check_secs)
    }

    pub fn tool_call_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_call_timeout_secs)
    }
}
