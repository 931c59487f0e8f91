//! Registry of loaded classifiers.
//!
//! Built once during startup and then shared read-only (`Arc<ModelRegistry>`)
//! by every request. There is no reload or eviction.

use crate::config::Config;
use crate::emotion::{
    CompactCnnAdapter, ModelAdapter, ModelIdentifier, ModelLoadError, TransformerAdapter,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

/// Immutable mapping from model identifier to loaded adapter
pub struct ModelRegistry {
    adapters: BTreeMap<ModelIdentifier, Arc<dyn ModelAdapter>>,
}

impl ModelRegistry {
    /// Build a registry from loaded adapters.
    ///
    /// Registering the same model twice is an error.
    pub fn new(adapters: Vec<Arc<dyn ModelAdapter>>) -> Result<Self, ModelLoadError> {
        let mut map = BTreeMap::new();
        for adapter in adapters {
            let id = adapter.id();
            if map.insert(id, adapter).is_some() {
                return Err(ModelLoadError::Duplicate(id));
            }
        }
        Ok(Self { adapters: map })
    }

    /// Load every model enabled in the configuration.
    ///
    /// Loading is synchronous and all-or-nothing: the first failure is
    /// returned and nothing is registered.
    pub fn load(config: &Config) -> Result<Self, ModelLoadError> {
        let mut adapters: Vec<Arc<dyn ModelAdapter>> = Vec::new();

        if config.vit.enabled {
            info!("Loading {} from {:?}", ModelIdentifier::VitFaceExpression, config.vit.model_dir);
            let adapter = TransformerAdapter::load(&config.vit.model_dir, config.intra_threads)?;
            adapters.push(Arc::new(adapter));
        }

        if config.mini_xception.enabled {
            info!(
                "Loading {} from {:?}",
                ModelIdentifier::MiniXception,
                config.mini_xception.model_path
            );
            let adapter =
                CompactCnnAdapter::load(&config.mini_xception.model_path, config.intra_threads)?;
            adapters.push(Arc::new(adapter));
        }

        if adapters.is_empty() {
            return Err(ModelLoadError::Config("No models enabled".to_string()));
        }

        Self::new(adapters)
    }

    /// Look up an adapter by its identifier
    pub fn get(&self, id: ModelIdentifier) -> Option<&Arc<dyn ModelAdapter>> {
        self.adapters.get(&id)
    }

    /// Resolve a client-supplied model name.
    ///
    /// A missing name resolves only when exactly one model is registered.
    pub fn resolve(&self, requested: Option<&str>) -> Option<&Arc<dyn ModelAdapter>> {
        match requested {
            Some(name) => ModelIdentifier::from_name(name).and_then(|id| self.get(id)),
            None if self.adapters.len() == 1 => self.adapters.values().next(),
            None => None,
        }
    }

    /// Registered adapters, in identifier order
    pub fn adapters(&self) -> impl Iterator<Item = &Arc<dyn ModelAdapter>> {
        self.adapters.values()
    }

    /// Registered identifiers, in order
    pub fn ids(&self) -> Vec<ModelIdentifier> {
        self.adapters.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_resolve_by_display_name_and_slug() {
        let registry = fake_registry();
        let adapter = registry.resolve(Some("Model 2: Mini-Xception CNN")).unwrap();
        assert_eq!(adapter.id(), ModelIdentifier::MiniXception);
        let adapter = registry.resolve(Some("vit-face-expression")).unwrap();
        assert_eq!(adapter.id(), ModelIdentifier::VitFaceExpression);
    }

    #[test]
    fn test_unknown_model_not_resolved() {
        let registry = fake_registry();
        assert!(registry.resolve(Some("Model 3: Nope")).is_none());
        assert!(registry.resolve(Some("")).is_none());
    }

    #[test]
    fn test_missing_model_requires_single_registration() {
        let registry = fake_registry();
        assert!(registry.resolve(None).is_none());

        let single = ModelRegistry::new(vec![fake_cnn()]).unwrap();
        assert_eq!(
            single.resolve(None).unwrap().id(),
            ModelIdentifier::MiniXception
        );
    }

    #[test]
    fn test_registered_but_absent_model_not_resolved() {
        let single = ModelRegistry::new(vec![fake_cnn()]).unwrap();
        assert!(single.resolve(Some("Model 1: ViT Face Expression")).is_none());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let result = ModelRegistry::new(vec![fake_cnn(), fake_cnn()]);
        assert!(matches!(
            result,
            Err(ModelLoadError::Duplicate(ModelIdentifier::MiniXception))
        ));
    }

    #[test]
    fn test_ids_in_order() {
        let registry = ModelRegistry::new(vec![fake_cnn(), fake_transformer()]).unwrap();
        assert_eq!(
            registry.ids(),
            vec![ModelIdentifier::VitFaceExpression, ModelIdentifier::MiniXception]
        );
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_load_fails_fast_on_missing_model() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.vit.model_dir = dir.path().join("missing-vit");
        config.mini_xception.model_path = dir.path().join("missing.onnx");
        assert!(ModelRegistry::load(&config).is_err());
    }

    #[test]
    fn test_load_with_nothing_enabled() {
        let mut config = Config::default();
        config.vit.enabled = false;
        config.mini_xception.enabled = false;
        assert!(matches!(
            ModelRegistry::load(&config),
            Err(ModelLoadError::Config(_))
        ));
    }
}
