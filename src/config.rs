//! Service configuration.
//!
//! Every knob for the ingestion → analyze pipeline lives in one
//! [`ServiceConfig`], built through [`ServiceConfigBuilder`]. A single
//! struct keeps configs trivially shareable across tasks and easy to log.
//!
//! The rasterization constants default to the page contract every stored
//! document obeys: JPEG pages bounded to 1200 × 1600 px with aspect ratio
//! preserved, quality 90, transparency flattened onto white. Changing them
//! only affects newly uploaded documents; pages already on disk are
//! immutable.

use crate::error::DoctriageError;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a [`crate::service::DocumentService`].
///
/// # Example
/// ```rust
/// use doctriage::ServiceConfig;
///
/// let config = ServiceConfig::builder()
///     .data_dir("/var/lib/doctriage")
///     .model("gpt-4.1-nano")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ServiceConfig {
    /// Root directory holding the `uploads/` and `cache/` stores.
    /// Default: `./data`.
    pub data_dir: PathBuf,

    /// Target render density in DPI. Default: 200.
    ///
    /// pdfium sizes renders by pixel bounds rather than physical density,
    /// so this is recorded for provenance; the pixel caps below are what
    /// actually bound the output.
    pub density: u32,

    /// Maximum rendered page width in pixels. Default: 1200.
    pub max_page_width: u32,

    /// Maximum rendered page height in pixels. Default: 1600.
    ///
    /// Aspect ratio is always preserved; whichever bound bites first wins.
    /// 1200 × 1600 keeps a letter/A4 page crisp enough for a vision model
    /// while staying far below API upload limits.
    pub max_page_height: u32,

    /// JPEG quality for converted pages, 1–100. Default: 90.
    pub jpeg_quality: u8,

    /// Inference model identifier. If `None`, the provider default is used.
    pub model: Option<String>,

    /// Inference provider name (e.g. "openai", "anthropic").
    /// If `None` along with `provider`, the provider is auto-detected from
    /// the environment.
    pub provider_name: Option<String>,

    /// Pre-constructed provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Maximum tokens the model may generate per analyze call. Default: 4096.
    ///
    /// Fixed per call: the analyze operation is one-shot and synchronous,
    /// so this is the only output bound it carries.
    pub max_tokens: usize,

    /// Sampling temperature. Default: 0.0.
    ///
    /// Classification and field extraction want determinism, not variety.
    pub temperature: f32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            density: 200,
            max_page_width: 1200,
            max_page_height: 1600,
            jpeg_quality: 90,
            model: None,
            provider_name: None,
            provider: None,
            max_tokens: 4096,
            temperature: 0.0,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("data_dir", &self.data_dir)
            .field("density", &self.density)
            .field("max_page_width", &self.max_page_width)
            .field("max_page_height", &self.max_page_height)
            .field("jpeg_quality", &self.jpeg_quality)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    /// Directory holding one subdirectory per uploaded document.
    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    /// Directory holding one JSON file per cached inference result.
    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("cache")
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn density(mut self, dpi: u32) -> Self {
        self.config.density = dpi.clamp(72, 400);
        self
    }

    pub fn max_page_width(mut self, px: u32) -> Self {
        self.config.max_page_width = px.max(100);
        self
    }

    pub fn max_page_height(mut self, px: u32) -> Self {
        self.config.max_page_height = px.max(100);
        self
    }

    pub fn jpeg_quality(mut self, q: u8) -> Self {
        self.config.jpeg_quality = q.clamp(1, 100);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, DoctriageError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(DoctriageError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.data_dir.as_os_str().is_empty() {
            return Err(DoctriageError::InvalidConfig(
                "data_dir must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
