//! Model management for stem separation
//!
//! Locates the per-stem ONNX files of a variant: the local byte cache is
//! consulted first, misses are downloaded and written back. A cache that
//! cannot be read or written only costs a download; it never fails a request.

use super::config::{ModelUrls, ModelVariant, SeparationConfig, Stem};
use super::error::{Result, SeparationError};
use super::fetch::{HttpFetcher, ModelFetcher};
use super::store::{DiskModelStore, ModelStore};

/// Raw model files of one variant, in stem order
pub type VariantModels = Vec<(Stem, Vec<u8>)>;

/// Manages model downloads and caching
pub struct ModelManager {
    store: Box<dyn ModelStore>,
    fetcher: Box<dyn ModelFetcher>,
    urls: ModelUrls,
}

impl ModelManager {
    /// Disk cache plus HTTP downloads, as configured
    ///
    /// Default location: `~/.cache/stemsplit/models/`
    pub fn new(config: &SeparationConfig) -> Result<Self> {
        let cache_dir = config.resolved_cache_dir()?;
        log::debug!("Model cache directory: {:?}", cache_dir);
        Ok(Self::with_parts(
            Box::new(DiskModelStore::new(cache_dir)),
            Box::new(HttpFetcher::new()),
            config.model_urls.clone(),
        ))
    }

    /// Assemble from explicit collaborators
    pub fn with_parts(
        store: Box<dyn ModelStore>,
        fetcher: Box<dyn ModelFetcher>,
        urls: ModelUrls,
    ) -> Self {
        Self {
            store,
            fetcher,
            urls,
        }
    }

    pub fn urls(&self) -> &ModelUrls {
        &self.urls
    }

    /// Fail fast unless every stem of `variant` is cached or reachable
    pub fn check_availability(&self, variant: ModelVariant) -> Result<()> {
        for &stem in variant.stems() {
            if self.store.contains(&variant.cache_key(stem)) {
                continue;
            }

            let url = self.urls.stem_url(variant, stem);
            match self.fetcher.exists(&url) {
                Ok(true) => {}
                Ok(false) => {
                    log::warn!("Model {} not found at {}", variant.cache_key(stem), url);
                    return Err(SeparationError::ModelUnavailable(variant));
                }
                Err(e) => {
                    log::warn!("Availability probe for {} failed: {}", url, e);
                    return Err(SeparationError::ModelUnavailable(variant));
                }
            }
        }
        Ok(())
    }

    pub fn is_available(&self, variant: ModelVariant) -> bool {
        self.check_availability(variant).is_ok()
    }

    /// Whether every stem of `variant` is in the local cache
    pub fn is_cached(&self, variant: ModelVariant) -> bool {
        variant
            .stems()
            .iter()
            .all(|&stem| self.store.contains(&variant.cache_key(stem)))
    }

    /// Bytes of one stem model, from cache or network
    ///
    /// `progress` receives the download fraction (0.0 to 1.0, capped at 0.99
    /// until the transfer is verified).
    pub fn load_stem(
        &self,
        variant: ModelVariant,
        stem: Stem,
        progress: &mut dyn FnMut(f32),
    ) -> Result<Vec<u8>> {
        let key = variant.cache_key(stem);

        match self.store.get(&key) {
            Ok(Some(bytes)) => {
                log::info!("Model {} found in cache ({} bytes)", key, bytes.len());
                progress(1.0);
                return Ok(bytes);
            }
            Ok(None) => log::debug!("Model {} not cached", key),
            Err(e) => log::warn!("Ignoring cache read failure for {}: {}", key, e),
        }

        let url = self.urls.stem_url(variant, stem);
        let bytes = self.fetcher.fetch(&url, &mut |received, total| {
            if let Some(total) = total.filter(|&t| t > 0) {
                progress((received as f32 / total as f32).min(0.99));
            }
        })?;

        if let Err(e) = self.store.put(&key, &bytes) {
            log::warn!("Could not cache {}: {}", key, e);
        }

        progress(1.0);
        Ok(bytes)
    }

    /// All stem models of `variant`
    ///
    /// Progress spans the whole variant, each stem taking an equal share.
    pub fn load_variant(
        &self,
        variant: ModelVariant,
        progress: &mut dyn FnMut(f32),
    ) -> Result<VariantModels> {
        let stems = variant.stems();
        let share = 1.0 / stems.len() as f32;
        let mut models = Vec::with_capacity(stems.len());

        for (i, &stem) in stems.iter().enumerate() {
            let base = i as f32 * share;
            let bytes = self.load_stem(variant, stem, &mut |p| progress(base + p * share))?;
            models.push((stem, bytes));
        }

        Ok(models)
    }

    /// Delete a variant's cached models
    pub fn delete_variant(&self, variant: ModelVariant) -> Result<()> {
        for &stem in variant.stems() {
            self.store.remove(&variant.cache_key(stem))?;
        }
        Ok(())
    }

    /// Get total size of all cached models
    pub fn cache_size(&self) -> u64 {
        self.store.size_bytes()
    }

    /// Clear all cached models
    pub fn clear_cache(&self) -> Result<()> {
        for variant in ModelVariant::all() {
            self.delete_variant(*variant)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Serves fixed bytes for every URL it knows, counting fetches
    struct MapFetcher {
        files: HashMap<String, Vec<u8>>,
        fetches: Arc<AtomicUsize>,
        reachable: bool,
    }

    impl MapFetcher {
        fn for_variant(urls: &ModelUrls, variant: ModelVariant) -> Self {
            let files = variant
                .stems()
                .iter()
                .map(|&stem| (urls.stem_url(variant, stem), vec![stem as u8; 100]))
                .collect();
            Self {
                files,
                fetches: Arc::new(AtomicUsize::new(0)),
                reachable: true,
            }
        }
    }

    impl ModelFetcher for MapFetcher {
        fn exists(&self, url: &str) -> Result<bool> {
            if !self.reachable {
                return Err(SeparationError::DownloadFailure("offline".to_string()));
            }
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
            progress(total / 2, Some(total));
            progress(total, Some(total));
            Ok(bytes)
        }
    }

    /// Store whose every operation fails
    struct BrokenStore;

    impl ModelStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> {
            Err(SeparationError::CacheFailure("disk on fire".to_string()))
        }
        fn put(&self, _key: &str, _bytes: &[u8]) -> Result<()> {
            Err(SeparationError::CacheFailure("disk on fire".to_string()))
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

    fn disk_manager(dir: &std::path::Path, fetcher: MapFetcher) -> ModelManager {
        ModelManager::with_parts(
            Box::new(DiskModelStore::new(dir.to_path_buf())),
            Box::new(fetcher),
            ModelUrls::default(),
        )
    }

    #[test]
    fn test_download_then_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let urls = ModelUrls::default();
        let fetcher = MapFetcher::for_variant(&urls, ModelVariant::TwoStems);
        let fetches = fetcher.fetches.clone();
        let manager = disk_manager(dir.path(), fetcher);

        assert!(!manager.is_cached(ModelVariant::TwoStems));
        let models = manager.load_variant(ModelVariant::TwoStems, &mut |_| {}).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].0, Stem::Vocals);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
        assert!(manager.is_cached(ModelVariant::TwoStems));
        assert_eq!(manager.cache_size(), 200);

        // Second load is served from disk
        manager.load_variant(ModelVariant::TwoStems, &mut |_| {}).unwrap();
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_variant_progress_is_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let urls = ModelUrls::default();
        let manager = disk_manager(dir.path(), MapFetcher::for_variant(&urls, ModelVariant::FourStems));

        let mut seen = Vec::new();
        manager
            .load_variant(ModelVariant::FourStems, &mut |p| seen.push(p))
            .unwrap();

        assert!(seen.windows(2).all(|w| w[1] >= w[0]));
        assert!((seen.last().copied().unwrap() - 1.0).abs() < 1e-6);
        assert!(seen.iter().all(|&p| (0.0..=1.0).contains(&p)));
    }

    #[test]
    fn test_cache_failure_falls_back_to_network() {
        let urls = ModelUrls::default();
        let fetcher = MapFetcher::for_variant(&urls, ModelVariant::TwoStems);
        let fetches = fetcher.fetches.clone();
        let manager = ModelManager::with_parts(Box::new(BrokenStore), Box::new(fetcher), urls);

        let models = manager.load_variant(ModelVariant::TwoStems, &mut |_| {}).unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_availability() {
        let dir = tempfile::tempdir().unwrap();
        let urls = ModelUrls::default();
        let manager = disk_manager(dir.path(), MapFetcher::for_variant(&urls, ModelVariant::TwoStems));

        assert!(manager.check_availability(ModelVariant::TwoStems).is_ok());
        assert!(matches!(
            manager.check_availability(ModelVariant::FiveStems),
            Err(SeparationError::ModelUnavailable(ModelVariant::FiveStems))
        ));
    }

    #[test]
    fn test_cached_models_available_offline() {
        let dir = tempfile::tempdir().unwrap();
        let urls = ModelUrls::default();
        let mut fetcher = MapFetcher::for_variant(&urls, ModelVariant::TwoStems);
        fetcher.reachable = false;
        let manager = disk_manager(dir.path(), fetcher);

        assert!(!manager.is_available(ModelVariant::TwoStems));

        let store = DiskModelStore::new(dir.path().to_path_buf());
        for &stem in ModelVariant::TwoStems.stems() {
            store.put(&ModelVariant::TwoStems.cache_key(stem), &[1, 2, 3]).unwrap();
        }
        assert!(manager.is_available(ModelVariant::TwoStems));
    }

    #[test]
    fn test_missing_remote_is_download_failure() {
        let dir = tempfile::tempdir().unwrap();
        let urls = ModelUrls::default();
        let manager = disk_manager(dir.path(), MapFetcher::for_variant(&urls, ModelVariant::TwoStems));

        assert!(matches!(
            manager.load_stem(ModelVariant::FourStems, Stem::Drums, &mut |_| {}),
            Err(SeparationError::DownloadFailure(_))
        ));
    }

    #[test]
    fn test_clear_cache() {
        let dir = tempfile::tempdir().unwrap();
        let urls = ModelUrls::default();
        let manager = disk_manager(dir.path(), MapFetcher::for_variant(&urls, ModelVariant::TwoStems));

        manager.load_variant(ModelVariant::TwoStems, &mut |_| {}).unwrap();
        assert!(manager.cache_size() > 0);
        manager.clear_cache().unwrap();
        assert_eq!(manager.cache_size(), 0);
        assert!(!manager.is_cached(ModelVariant::TwoStems));
    }
}
