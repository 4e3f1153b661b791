use crate::error::SessionError;
use ringline_types::PipelineOptions;
use std::fmt;

/// Pipeline options plus the provider credentials needed to open it.
#[derive(Clone, Default)]
pub struct PipelineConfig {
    pub options: PipelineOptions,
    /// Speech model API key.
    pub model_api_key: String,
    /// Avatar provider API key. Required when an avatar is configured.
    pub avatar_api_key: Option<String>,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("options", &self.options)
            .field("model_api_key", &redact(&self.model_api_key))
            .field(
                "avatar_api_key",
                &self.avatar_api_key.as_deref().map(redact),
            )
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "[EMPTY]"
    } else {
        "[REDACTED]"
    }
}

impl PipelineConfig {
    pub fn new(options: PipelineOptions, model_api_key: impl Into<String>) -> Self {
        Self {
            options,
            model_api_key: model_api_key.into(),
            avatar_api_key: None,
        }
    }

    /// Checks the option ranges and that every enabled stage has credentials.
    pub fn validate(&self) -> Result<(), SessionError> {
        let model = &self.options.model;
        if model.name.trim().is_empty() {
            return Err(SessionError::Config("model name must not be empty".into()));
        }
        if model.voice.trim().is_empty() {
            return Err(SessionError::Config("model voice must not be empty".into()));
        }
        if model.response_modalities.is_empty() {
            return Err(SessionError::Config(
                "at least one response modality is required".into(),
            ));
        }

        let threshold = self.options.turn_detection.threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SessionError::Config(format!(
                "turn detection threshold must be between 0 and 1, got {}",
                threshold
            )));
        }

        if let Some(avatar) = &self.options.avatar {
            if avatar.face_id.trim().is_empty() {
                return Err(SessionError::Config("avatar face id must not be empty".into()));
            }
            if self.avatar_api_key.as_deref().unwrap_or("").is_empty() {
                return Err(SessionError::Config(
                    "avatar is enabled but no avatar API key is set".into(),
                ));
            }
        }
        Ok(())
    }
}
