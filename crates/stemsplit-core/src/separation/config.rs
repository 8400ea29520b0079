//! Separation configuration types

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::error::{Result, SeparationError};

/// Configuration for stem separation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeparationConfig {
    /// Where downloaded stem models are kept (`None` = platform cache dir)
    pub cache_dir: Option<PathBuf>,

    /// Remote base locations, one per model variant
    pub model_urls: ModelUrls,

    /// Mask estimation tuning
    pub mask: MaskParams,

    /// Threads per ONNX session
    pub intra_threads: usize,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            model_urls: ModelUrls::default(),
            mask: MaskParams::default(),
            intra_threads: 1,
        }
    }
}

impl SeparationConfig {
    /// Clamp values to usable ranges
    pub fn validate(&mut self) {
        self.mask.validate();
        self.intra_threads = self.intra_threads.clamp(1, 64);
    }

    /// Resolved model cache directory
    pub fn resolved_cache_dir(&self) -> Result<PathBuf> {
        match &self.cache_dir {
            Some(dir) => Ok(dir.clone()),
            None => crate::config::default_cache_dir().ok_or_else(|| {
                SeparationError::InvalidConfig("Could not determine cache directory".to_string())
            }),
        }
    }
}

/// Tuning of the mask estimator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaskParams {
    /// Exponent of the Wiener-style soft mask (2 = conventional power mask)
    pub wiener_power: i32,
    /// Logistic sharpening slope
    pub sigmoid_gain: f32,
    /// Logistic sharpening midpoint
    pub sigmoid_center: f32,
    /// Temporal median half-width in frames
    pub median_radius: usize,
    /// Number of bands used to extend masks above the modeled range
    pub hf_bands: usize,
    /// Added to the Wiener denominator, on the scale of `|x|^wiener_power`
    pub epsilon: f32,
}

impl Default for MaskParams {
    fn default() -> Self {
        Self {
            wiener_power: 6,
            sigmoid_gain: 12.0,
            sigmoid_center: 0.5,
            median_radius: 2,
            hf_bands: 8,
            epsilon: 1e-30,
        }
    }
}

impl MaskParams {
    pub fn validate(&mut self) {
        self.wiener_power = self.wiener_power.clamp(1, 16);
        if !(self.sigmoid_gain.is_finite() && self.sigmoid_gain > 0.0) {
            self.sigmoid_gain = Self::default().sigmoid_gain;
        }
        if !self.sigmoid_center.is_finite() {
            self.sigmoid_center = Self::default().sigmoid_center;
        }
        self.sigmoid_center = self.sigmoid_center.clamp(0.0, 1.0);
        self.median_radius = self.median_radius.min(8);
        self.hf_bands = self.hf_bands.clamp(1, 64);
        if !(self.epsilon.is_finite() && self.epsilon > 0.0) {
            self.epsilon = Self::default().epsilon;
        }
    }
}

/// Remote base URLs for each variant's per-stem ONNX files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelUrls {
    #[serde(rename = "2stems")]
    pub two_stems: String,
    #[serde(rename = "4stems")]
    pub four_stems: String,
    #[serde(rename = "5stems")]
    pub five_stems: String,
}

impl Default for ModelUrls {
    fn default() -> Self {
        Self {
            two_stems: "https://huggingface.co/stemsplit/sherpa-onnx-spleeter-2stems/resolve/main"
                .to_string(),
            four_stems: "https://huggingface.co/stemsplit/sherpa-onnx-spleeter-4stems/resolve/main"
                .to_string(),
            five_stems: "https://huggingface.co/stemsplit/sherpa-onnx-spleeter-5stems/resolve/main"
                .to_string(),
        }
    }
}

impl ModelUrls {
    pub fn base_url(&self, variant: ModelVariant) -> &str {
        match variant {
            ModelVariant::TwoStems => &self.two_stems,
            ModelVariant::FourStems => &self.four_stems,
            ModelVariant::FiveStems => &self.five_stems,
        }
    }

    /// Full URL of one stem model
    pub fn stem_url(&self, variant: ModelVariant, stem: Stem) -> String {
        format!(
            "{}/{}.onnx",
            self.base_url(variant).trim_end_matches('/'),
            stem.as_str()
        )
    }
}

/// Available separation models
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ModelVariant {
    /// Vocals / accompaniment
    #[serde(rename = "2stems")]
    TwoStems,

    /// Vocals, drums, bass, other
    #[default]
    #[serde(rename = "4stems")]
    FourStems,

    /// Vocals, piano, drums, bass, other
    #[serde(rename = "5stems")]
    FiveStems,
}

impl ModelVariant {
    /// Identifier used in cache keys and on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TwoStems => "2stems",
            Self::FourStems => "4stems",
            Self::FiveStems => "5stems",
        }
    }

    /// Display name for UI
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::TwoStems => "2-stem (vocals / accompaniment)",
            Self::FourStems => "4-stem (vocals, drums, bass, other)",
            Self::FiveStems => "5-stem (adds piano)",
        }
    }

    /// Stems produced by this variant, in model order
    pub fn stems(&self) -> &'static [Stem] {
        match self {
            Self::TwoStems => &[Stem::Vocals, Stem::Accompaniment],
            Self::FourStems => &[Stem::Vocals, Stem::Drums, Stem::Bass, Stem::Other],
            Self::FiveStems => &[
                Stem::Vocals,
                Stem::Piano,
                Stem::Drums,
                Stem::Bass,
                Stem::Other,
            ],
        }
    }

    /// Number of output stems
    pub fn stem_count(&self) -> usize {
        self.stems().len()
    }

    /// All variants
    pub fn all() -> &'static [Self] {
        &[Self::TwoStems, Self::FourStems, Self::FiveStems]
    }

    /// Parse a wire identifier (`"2stems"`, `"4stems"`, `"5stems"`)
    pub fn parse(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|v| v.as_str() == name)
    }

    /// Cache key of one stem model: `"{variant}_{stem}"`
    pub fn cache_key(&self, stem: Stem) -> String {
        format!("{}_{}", self.as_str(), stem.as_str())
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A separated source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stem {
    Vocals,
    Accompaniment,
    Drums,
    Bass,
    Piano,
    Other,
}

impl Stem {
    /// Lowercase name, also the remote model file stem
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vocals => "vocals",
            Self::Accompaniment => "accompaniment",
            Self::Drums => "drums",
            Self::Bass => "bass",
            Self::Piano => "piano",
            Self::Other => "other",
        }
    }

    /// Display name for UI and output file names
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Vocals => "Vocals",
            Self::Accompaniment => "Accompaniment",
            Self::Drums => "Drums",
            Self::Bass => "Bass",
            Self::Piano => "Piano",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Stem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
