//! Test doubles for inference, model fetching and caching

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::Array4;
use stemsplit_core::separation::{
    InferenceAdapter, InferenceLoader, ModelFetcher, ModelStore, ModelTensor, ModelUrls,
    ModelVariant, Result, SeparationError, Stem,
};

/// Returns the mixture magnitudes scaled per stem
pub struct ScaledEcho {
    pub variant: ModelVariant,
    pub gains: HashMap<Stem, f32>,
    pub fail_on: Option<Stem>,
}

impl ScaledEcho {
    pub fn uniform(variant: ModelVariant) -> Self {
        Self {
            variant,
            gains: HashMap::new(),
            fail_on: None,
        }
    }
}

impl InferenceAdapter for ScaledEcho {
    fn run(&mut self, stem: Stem, input: &ModelTensor) -> Result<Array4<f32>> {
        if self.fail_on == Some(stem) {
            return Err(SeparationError::Inference {
                stem,
                message: "model exploded".to_string(),
            });
        }
        let gain = self.gains.get(&stem).copied().unwrap_or(1.0);
        Ok(input.as_array().mapv(|v| v * gain))
    }

    fn variant(&self) -> ModelVariant {
        self.variant
    }

    fn name(&self) -> &'static str {
        "scaled echo"
    }
}

/// Loader producing [`ScaledEcho`] adapters, counting loads
#[derive(Clone, Default)]
pub struct EchoLoader {
    pub loads: Arc<AtomicUsize>,
    pub fail_on: Option<Stem>,
}

impl EchoLoader {
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl InferenceLoader for EchoLoader {
    fn load(
        &self,
        variant: ModelVariant,
        models: Vec<(Stem, Vec<u8>)>,
    ) -> Result<Box<dyn InferenceAdapter>> {
        assert_eq!(models.len(), variant.stem_count());
        self.loads.fetch_add(1, Ordering::SeqCst);
        let mut adapter = ScaledEcho::uniform(variant);
        adapter.fail_on = self.fail_on;
        Ok(Box::new(adapter))
    }
}

/// In-memory remote serving every stem of the given variants
#[derive(Clone)]
pub struct FakeRemote {
    files: Arc<HashMap<String, Vec<u8>>>,
    pub fetches: Arc<AtomicUsize>,
}

impl FakeRemote {
    pub fn serving(urls: &ModelUrls, variants: &[ModelVariant]) -> Self {
        let mut files = HashMap::new();
        for &variant in variants {
            for &stem in variant.stems() {
                files.insert(urls.stem_url(variant, stem), vec![7u8; 64]);
            }
        }
        Self {
            files: Arc::new(files),
            fetches: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ModelFetcher for FakeRemote {
    fn exists(&self, url: &str) -> Result<bool> {
        Ok(self.files.contains_key(url))
    }

    fn fetch(&self, url: &str, progress: &mut dyn FnMut(u64, Option<u64>)) -> Result<Vec<u8>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let bytes = self
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| SeparationError::DownloadFailure(format!("404 {}", url)))?;
        let total = bytes.len() as u64;
        for received in (16..=total).step_by(16) {
            progress(received, Some(total));
        }
        Ok(bytes)
    }
}

/// Cache whose reads and writes always fail
pub struct BrokenStore;

impl ModelStore for BrokenStore {
    fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
        Err(SeparationError::CacheFailure("read denied".to_string()))
    }

    fn put(&self, _key: &str, _bytes: &[u8]) -> Result<()> {
        Err(SeparationError::CacheFailure("write denied".to_string()))
    }

    fn contains(&self, _key: &str) -> bool {
        false
    }

    fn remove(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn size_bytes(&self) -> u64 {
        0
    }
}

pub fn sine(len: usize, sample_rate: u32, freq: f32, amplitude: f32) -> Vec<f32> {
    (0..len)
        .map(|i| {
            amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / sample_rate as f32).sin()
        })
        .collect()
}
