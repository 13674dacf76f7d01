//! Process-global-style name registry: maps the first path segment of a
//! request to the [`Container`] that serves it, the way the original
//! name-keyed table lookups resolved an object by name.
use crate::schema::Container;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct Registry {
    containers: RwLock<FxHashMap<String, Arc<Container>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, container: Arc<Container>) {
        let name = container.schema.name.to_ascii_lowercase();
        self.containers.write().insert(name, container);
    }

    pub fn get(&self, name: &str) -> Option<Arc<Container>> {
        self.containers.read().get(&name.to_ascii_lowercase()).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.containers.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::descriptor::SchemaDescriptor;
    use crate::schema::Schema;

    fn container(name: &str) -> Arc<Container> {
        let json = format!(
            r#"{{"name": "{name}", "path": "/tmp", "columns": [{{"name": "id", "type": "uint", "primary": true}}]}}"#
        );
        let descriptor = SchemaDescriptor::from_json(&json).unwrap();
        Container::new(Schema::from_descriptor(&descriptor).unwrap())
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let reg = Registry::new();
        reg.register(container("People"));
        assert!(reg.get("people").is_some());
        assert!(reg.get("PEOPLE").is_some());
        assert!(reg.get("other").is_none());
    }
}
