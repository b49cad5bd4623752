//! Settings and credentials
//!
//! Settings are loaded with a two-layer resolution:
//! 1. An explicit path, or the override in the data dir
//!    (~/.local/share/tally/config/tally.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! Credentials never live in the settings file. They come from the
//! environment or are handed in by the caller.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default settings (compiled into binary)
const DEFAULT_SETTINGS: &str = include_str!("../../../config/tally.toml");

/// Environment variable that overrides the home currency
pub const HOME_CURRENCY_ENV: &str = "TALLY_HOME_CURRENCY";
pub const GROQ_API_KEY_ENV: &str = "GROQ_API_KEY";
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Connection settings for one AI provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

impl ProviderSettings {
    pub fn groq_default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn gemini_default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

/// Exchange-rate service settings
#[derive(Debug, Clone, PartialEq)]
pub struct FxSettings {
    pub base_url: String,
    pub timeout: Duration,
    /// Static rates into the home currency, keyed by source currency
    pub fallback_rates: HashMap<String, f64>,
}

impl Default for FxSettings {
    fn default() -> Self {
        let fallback_rates = [
            ("USD", 10.5),
            ("EUR", 11.2),
            ("GBP", 13.1),
            ("NOK", 0.95),
            ("DKK", 1.5),
        ]
        .into_iter()
        .map(|(code, rate)| (code.to_string(), rate))
        .collect();

        Self {
            base_url: "https://api.frankfurter.app".to_string(),
            timeout: Duration::from_secs(5),
            fallback_rates,
        }
    }
}

/// Input size limits and windowing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    pub text_chars: usize,
    pub csv_chars: usize,
    pub ocr_min_chars: usize,
    pub chat_history: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            text_chars: 4000,
            csv_chars: 3000,
            ocr_min_chars: 50,
            chat_history: 6,
        }
    }
}

/// External OCR toolchain
#[derive(Debug, Clone, PartialEq)]
pub struct OcrSettings {
    pub pdftoppm: PathBuf,
    pub tesseract: PathBuf,
    pub dpi: u32,
    pub language: String,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            pdftoppm: PathBuf::from("pdftoppm"),
            tesseract: PathBuf::from("tesseract"),
            dpi: 300,
            language: "eng".to_string(),
        }
    }
}

/// Resolved settings
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub home_currency: String,
    pub text_provider: ProviderSettings,
    pub vision_provider: ProviderSettings,
    pub fx: FxSettings,
    pub limits: Limits,
    pub ocr: OcrSettings,
    /// File the settings came from (None for embedded defaults)
    pub source: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            home_currency: "SEK".to_string(),
            text_provider: ProviderSettings::groq_default(),
            vision_provider: ProviderSettings::gemini_default(),
            fx: FxSettings::default(),
            limits: Limits::default(),
            ocr: OcrSettings::default(),
            source: None,
        }
    }
}

impl Settings {
    /// Load from the default override location, else embedded defaults
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from an explicit path (falling back to embedded defaults when it
    /// does not exist), then apply environment overrides
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let candidate = path
            .map(Path::to_path_buf)
            .or_else(default_settings_path)
            .filter(|p| p.exists());

        let mut settings = match candidate {
            Some(path) => {
                let content = fs::read_to_string(&path).map_err(|e| {
                    Error::Configuration(format!(
                        "Failed to read settings {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                let mut settings = Self::parse(&content)?;
                settings.source = Some(path);
                settings
            }
            None => Self::parse(DEFAULT_SETTINGS)?,
        };

        settings.apply_overrides(|key| std::env::var(key).ok());
        tracing::debug!(
            "Settings loaded from {}",
            settings
                .source
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "embedded defaults".to_string())
        );
        Ok(settings)
    }

    /// Parse settings TOML; absent keys keep built-in defaults
    pub fn parse(content: &str) -> Result<Self> {
        let raw: RawSettings = toml::from_str(content)
            .map_err(|e| Error::Configuration(format!("Invalid settings TOML: {}", e)))?;

        let mut settings = Settings::default();

        if let Some(general) = raw.general {
            if let Some(home) = general.home_currency {
                settings.home_currency = home.trim().to_uppercase();
            }
        }

        if let Some(providers) = raw.providers {
            if let Some(text) = providers.text {
                text.apply(&mut settings.text_provider);
            }
            if let Some(vision) = providers.vision {
                vision.apply(&mut settings.vision_provider);
            }
        }

        if let Some(fx) = raw.fx {
            if let Some(url) = fx.base_url {
                settings.fx.base_url = url;
            }
            if let Some(secs) = fx.timeout_secs {
                settings.fx.timeout = Duration::from_secs(secs);
            }
            if let Some(rates) = fx.fallback_rates {
                settings.fx.fallback_rates = rates
                    .into_iter()
                    .map(|(code, rate)| (code.trim().to_uppercase(), rate))
                    .collect();
            }
        }

        if let Some(limits) = raw.limits {
            let l = &mut settings.limits;
            l.text_chars = limits.text_chars.unwrap_or(l.text_chars);
            l.csv_chars = limits.csv_chars.unwrap_or(l.csv_chars);
            l.ocr_min_chars = limits.ocr_min_chars.unwrap_or(l.ocr_min_chars);
            l.chat_history = limits.chat_history.unwrap_or(l.chat_history);
        }

        if let Some(ocr) = raw.ocr {
            if let Some(p) = ocr.pdftoppm {
                settings.ocr.pdftoppm = p;
            }
            if let Some(t) = ocr.tesseract {
                settings.ocr.tesseract = t;
            }
            if let Some(dpi) = ocr.dpi {
                settings.ocr.dpi = dpi;
            }
            if let Some(lang) = ocr.language {
                settings.ocr.language = lang;
            }
        }

        if settings.home_currency.is_empty() {
            return Err(Error::Configuration(
                "general.home_currency must not be empty".into(),
            ));
        }

        Ok(settings)
    }

    /// Apply environment overrides through a lookup function
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(home) = lookup(HOME_CURRENCY_ENV).filter(|v| !v.trim().is_empty()) {
            self.home_currency = home.trim().to_uppercase();
        }
    }
}

/// Default settings override path
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config").join("tally.toml"))
}

/// Raw settings structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawSettings {
    general: Option<RawGeneral>,
    providers: Option<RawProviders>,
    fx: Option<RawFx>,
    limits: Option<RawLimits>,
    ocr: Option<RawOcr>,
}

#[derive(Debug, Deserialize)]
struct RawGeneral {
    home_currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProviders {
    text: Option<RawProvider>,
    vision: Option<RawProvider>,
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

impl RawProvider {
    fn apply(self, target: &mut ProviderSettings) {
        if let Some(url) = self.base_url {
            target.base_url = url;
        }
        if let Some(model) = self.model {
            target.model = model;
        }
        if let Some(secs) = self.timeout_secs {
            target.timeout = Duration::from_secs(secs);
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawFx {
    base_url: Option<String>,
    timeout_secs: Option<u64>,
    fallback_rates: Option<HashMap<String, f64>>,
}

#[derive(Debug, Deserialize)]
struct RawLimits {
    text_chars: Option<usize>,
    csv_chars: Option<usize>,
    ocr_min_chars: Option<usize>,
    chat_history: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawOcr {
    pdftoppm: Option<PathBuf>,
    tesseract: Option<PathBuf>,
    dpi: Option<u32>,
    language: Option<String>,
}

/// Provider API keys
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub groq_api_key: Option<String>,
    pub gemini_api_key: Option<String>,
}

impl Credentials {
    /// Build from values supplied by an external secret store
    ///
    /// Empty strings count as unset.
    pub fn new(groq_api_key: Option<String>, gemini_api_key: Option<String>) -> Self {
        Self {
            groq_api_key: non_empty(groq_api_key),
            gemini_api_key: non_empty(gemini_api_key),
        }
    }

    /// Read `GROQ_API_KEY` and `GEMINI_API_KEY` from the environment
    pub fn from_env() -> Self {
        Self::new(
            std::env::var(GROQ_API_KEY_ENV).ok(),
            std::env::var(GEMINI_API_KEY_ENV).ok(),
        )
    }

    pub fn has_any(&self) -> bool {
        self.groq_api_key.is_some() || self.gemini_api_key.is_some()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// Keys must never end up in logs
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("Credentials")
            .field("groq_api_key", &mask(&self.groq_api_key))
            .field("gemini_api_key", &mask(&self.gemini_api_key))
            .finish()
    }
}
