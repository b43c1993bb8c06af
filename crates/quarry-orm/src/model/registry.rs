use std::collections::HashMap;
use std::sync::Arc;

use quarry_core::{OrmError, OrmResult};

use super::def::ModelMeta;

/// Registered models, looked up by case-insensitive name, alias or
/// morph name.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<ModelMeta>>,
    aliases: HashMap<String, String>,
    morphs: HashMap<String, String>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, meta: ModelMeta) -> Arc<ModelMeta> {
        let key = meta.name.to_lowercase();
        self.morphs.insert(meta.morph_name.clone(), key.clone());
        let meta = Arc::new(meta);
        self.models.insert(key, Arc::clone(&meta));
        meta
    }

    pub fn alias(&mut self, alias: &str, model: &str) {
        self.aliases.insert(alias.to_lowercase(), model.to_lowercase());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ModelMeta>> {
        let key = name.to_lowercase();
        self.models.get(&key).or_else(|| {
            self.aliases
                .get(&key)
                .and_then(|target| self.models.get(target))
        })
    }

    pub fn resolve(&self, name: &str) -> OrmResult<Arc<ModelMeta>> {
        self.get(name)
            .cloned()
            .ok_or_else(|| OrmError::UnknownModel(name.to_string()))
    }

    /// Model stored under a `{morph}_type` value.
    pub fn resolve_morph(&self, morph: &str) -> OrmResult<Arc<ModelMeta>> {
        match self.morphs.get(morph) {
            Some(key) => self.resolve(key),
            None => self.resolve(morph),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.models.values().map(|m| m.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelDef;
    use quarry_core::CastRegistry;

    fn registry() -> ModelRegistry {
        let casts = CastRegistry::with_defaults();
        let mut registry = ModelRegistry::new();
        registry.insert(ModelDef::new("BlogPost").morph_name("post").into_meta(&casts).unwrap());
        registry.insert(ModelDef::new("User").into_meta(&casts).unwrap());
        registry.alias("Author", "User");
        registry
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let registry = registry();
        assert_eq!(registry.resolve("blogpost").unwrap().table, "blog_posts");
        assert_eq!(registry.resolve("AUTHOR").unwrap().name, "User");
        assert_eq!(registry.names(), vec!["BlogPost", "User"]);
    }

    #[test]
    fn test_unknown_model() {
        assert!(matches!(
            registry().resolve("Invoice"),
            Err(OrmError::UnknownModel(name)) if name == "Invoice"
        ));
    }

    #[test]
    fn test_morph_names() {
        let registry = registry();
        assert_eq!(registry.resolve_morph("post").unwrap().name, "BlogPost");
        assert_eq!(registry.resolve_morph("User").unwrap().name, "User");
    }
}
