//! Speech pipeline option definitions.
//!
//! A pipeline is the chain of real-time speech model, optional avatar, and
//! turn detector that processes one call's audio. These types describe how
//! the chain is configured; the chain itself is provided by an external
//! collaborator.

use serde::{Deserialize, Serialize};

/// Output modalities the speech model may produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modality {
    /// Synthesised speech.
    #[default]
    Audio,
    /// Text transcripts.
    Text,
}

/// Real-time speech model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelOptions {
    /// Model identifier understood by the provider.
    pub name: String,
    /// Prebuilt voice the model speaks with.
    pub voice: String,
    /// Modalities requested from the model.
    pub response_modalities: Vec<Modality>,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            name: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice: "Leda".to_string(),
            response_modalities: vec![Modality::Audio],
        }
    }
}

/// Lip-synced avatar configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarOptions {
    /// Provider face identifier.
    pub face_id: String,
}

/// End-of-turn detection configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnDetectionOptions {
    /// Probability above which the caller's turn is considered finished (0..=1).
    pub threshold: f32,
    /// Silence required before a turn may end, in milliseconds.
    pub min_silence_ms: u32,
}

impl Default for TurnDetectionOptions {
    fn default() -> Self {
        Self {
            threshold: 0.8,
            min_silence_ms: 500,
        }
    }
}

/// Full description of the pipeline built for each session.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineOptions {
    pub model: ModelOptions,
    /// `None` disables the avatar.
    pub avatar: Option<AvatarOptions>,
    pub turn_detection: TurnDetectionOptions,
}
