//! Configuration for the notation engine.
//!
//! Loads settings from /etc/nota/config.toml or uses defaults. Every default
//! lives here as a named function next to its field: the rest of the code
//! never hardcodes an endpoint, a timeout or a prompt.

use crate::rubric::RubricKind;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Config file path
pub const CONFIG_PATH: &str = "/etc/nota/config.toml";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotaConfig {
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub prompts: RubricPrompts,
}

impl NotaConfig {
    /// Load from `path`, falling back to defaults when the file is absent.
    /// A present but malformed file is an error, not a silent default.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }
}

/// Rubric evaluator endpoint (Ollama chat API).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Base URL of the evaluation service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model used for every rubric
    #[serde(default = "default_model")]
    pub model: String,

    /// HTTP timeout on a single request, in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Hard deadline on one rubric evaluation end to end, in seconds. A call
    /// past the deadline is recorded as that rubric's error; the three
    /// siblings are unaffected.
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,

    /// How long the model stays loaded after a request ("5m", "0", "1h")
    #[serde(default = "default_keep_alive")]
    pub keep_alive: String,
}

fn default_base_url() -> String {
    "http://127.0.0.1:11434".to_string()
}

fn default_model() -> String {
    "qwen2.5:7b-instruct".to_string()
}

fn default_request_timeout() -> u64 {
    90
}

fn default_call_timeout() -> u64 {
    120
}

fn default_keep_alive() -> String {
    "5m".to_string()
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            request_timeout_secs: default_request_timeout(),
            call_timeout_secs: default_call_timeout(),
            keep_alive: default_keep_alive(),
        }
    }
}

/// On-disk layout: sessions, reference documents and persisted notations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/var/lib/nota")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    pub fn notations_dir(&self) -> PathBuf {
        self.data_dir.join("notations")
    }

    pub fn reference_dir(&self) -> PathBuf {
        self.data_dir.join("reference")
    }
}

/// Per-rubric evaluation instructions.
///
/// The defaults below are working prompts, kept deliberately short; teams
/// tune them per deployment in the config file. Authoring better prompts is
/// out of the engine's scope - it only forwards them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RubricPrompts {
    #[serde(default = "default_prompt_synthese")]
    pub synthese: String,
    #[serde(default = "default_prompt_methodologie")]
    pub methodologie: String,
    #[serde(default = "default_prompt_discours")]
    pub discours: String,
    #[serde(default = "default_prompt_transcription")]
    pub transcription: String,
}

fn default_prompt_synthese() -> String {
    "Tu es un coach commercial. À partir du document de référence et de la transcription \
     de l'appel, rédige une synthèse de la prestation. Réponds uniquement en JSON : \
     {\"resume\": \"...\", \"points_forts\": [\"...\"], \"axes_amelioration\": [\"...\"]}"
        .to_string()
}

fn default_prompt_methodologie() -> String {
    "Tu es un coach commercial. Évalue l'appel sur les quatre étapes de la méthodologie \
     (1 découverte, 2 accroche, 3 gestion des objections, 4 obtenir l'engagement), \
     chacune notée de 0 à 100. Réponds uniquement en JSON : \
     {\"etapes\": [{\"code\": \"D\", \"titre\": \"1. Découverte\", \"score\": 0, \
     \"commentaire\": \"...\"}]}"
        .to_string()
}

fn default_prompt_discours() -> String {
    "Tu es un coach commercial. Analyse le discours du commercial : formulation, ton, \
     rythme, tics de langage. Réponds uniquement en JSON : {\"observations\": [\"...\"]}"
        .to_string()
}

fn default_prompt_transcription() -> String {
    "Relis la transcription et signale les passages vraisemblablement mal transcrits ou \
     mal attribués. Réponds uniquement en JSON : {\"corrections\": [\"...\"]}"
        .to_string()
}

impl Default for RubricPrompts {
    fn default() -> Self {
        Self {
            synthese: default_prompt_synthese(),
            methodologie: default_prompt_methodologie(),
            discours: default_prompt_discours(),
            transcription: default_prompt_transcription(),
        }
    }
}

impl RubricPrompts {
    pub fn for_kind(&self, kind: RubricKind) -> &str {
        match kind {
            RubricKind::Synthese => &self.synthese,
            RubricKind::Methodologie => &self.methodologie,
            RubricKind::Discours => &self.discours,
            RubricKind::Transcription => &self.transcription,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let config = NotaConfig::load(Path::new("/nonexistent/nota.toml")).unwrap();
        assert_eq!(config.evaluator.base_url, "http://127.0.0.1:11434");
        assert_eq!(config.evaluator.call_timeout_secs, 120);
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/nota"));
    }

    #[test]
    fn test_partial_file_keeps_field_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[evaluator]\nmodel = \"qwen3:8b\"\n").unwrap();

        let config = NotaConfig::load(&path).unwrap();
        assert_eq!(config.evaluator.model, "qwen3:8b");
        // untouched fields keep their documented defaults
        assert_eq!(config.evaluator.request_timeout_secs, 90);
        assert!(config.prompts.methodologie.contains("JSON"));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "evaluator = [not toml").unwrap();
        assert!(NotaConfig::load(&path).is_err());
    }

    #[test]
    fn test_prompt_lookup_covers_all_kinds() {
        let prompts = RubricPrompts::default();
        for kind in RubricKind::ALL {
            assert!(!prompts.for_kind(kind).is_empty());
        }
    }
}
