use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::resource::Resource;

/// Resource name to handler. Built once at startup and handed to the
/// router.
#[derive(Clone, Default)]
pub struct Registry {
    resources: HashMap<String, Arc<dyn Resource>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resource` under `name`, replacing any previous handler.
    pub fn register(&mut self, name: impl Into<String>, resource: impl Resource + 'static) -> &mut Self {
        self.resources.insert(name.into(), Arc::new(resource));
        self
    }

    pub fn with(mut self, name: impl Into<String>, resource: impl Resource + 'static) -> Self {
        self.register(name, resource);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Resource>> {
        self.resources.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("Registry").field("resources", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Empty;
    impl Resource for Empty {}

    #[test]
    fn lookup_by_name() {
        let registry = Registry::new().with("widgets", Empty);
        assert!(registry.get("widgets").is_some());
        assert!(registry.get("gadgets").is_none());
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["widgets"]);
    }
}
