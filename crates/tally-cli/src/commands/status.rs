//! Status command: settings in effect and provider health

use anyhow::Result;
use serde::Serialize;
use tally_core::prompts::default_prompts_dir;
use tally_core::settings::{GEMINI_API_KEY_ENV, GROQ_API_KEY_ENV};
use tally_core::{Credentials, Pipeline, ProviderStatus, Settings};

use super::print_json;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub settings_file: Option<String>,
    pub home_currency: String,
    pub credentials: CredentialStatus,
    pub providers: Vec<ProviderStatus>,
    pub fx_service: String,
    pub prompt_overrides: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CredentialStatus {
    pub groq: bool,
    pub gemini: bool,
}

pub async fn cmd_status(settings: &Settings) -> Result<()> {
    let report = build_status(settings, &Credentials::from_env()).await;
    if report.providers.is_empty() {
        eprintln!(
            "No AI provider configured: set {} and/or {}",
            GROQ_API_KEY_ENV, GEMINI_API_KEY_ENV
        );
    }
    print_json(&report)
}

/// Provider health is only checked when at least one key is present
pub async fn build_status(settings: &Settings, credentials: &Credentials) -> StatusReport {
    let providers = match Pipeline::from_settings(settings, credentials) {
        Ok(pipeline) => pipeline.status().await,
        Err(_) => Vec::new(),
    };

    StatusReport {
        settings_file: settings.source.as_ref().map(|p| p.display().to_string()),
        home_currency: settings.home_currency.clone(),
        credentials: CredentialStatus {
            groq: credentials.groq_api_key.is_some(),
            gemini: credentials.gemini_api_key.is_some(),
        },
        providers,
        fx_service: settings.fx.base_url.clone(),
        prompt_overrides: default_prompts_dir().map(|p| p.display().to_string()),
    }
}
