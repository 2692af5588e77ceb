use std::collections::BTreeMap;
use std::sync::Arc;

use super::DirectKeyVendor;
use super::ProviderDescriptor;

/// Provider id to descriptor. Entries are immutable once registered; a new
/// registration swaps the whole `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    entries: BTreeMap<String, Arc<ProviderDescriptor>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the descriptor for `id`, returning the previous one.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        descriptor: ProviderDescriptor,
    ) -> Option<Arc<ProviderDescriptor>> {
        self.entries.insert(id.into(), Arc::new(descriptor))
    }

    pub fn get(&self, id: &str) -> Option<Arc<ProviderDescriptor>> {
        self.entries.get(id).cloned()
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ProviderDescriptor)> {
        self.entries.iter().map(|(id, d)| (id.as_str(), d.as_ref()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Picks the provider to use when none is configured:
    /// an authenticated delegated backend, else the first direct-key vendor
    /// (in [`DirectKeyVendor::PRIORITY`] order) holding a key, else any
    /// delegated backend so the authentication failure surfaces on first use.
    pub fn default_provider_id(&self) -> Option<String> {
        let delegated = || {
            self.entries
                .iter()
                .filter(|(_, d)| matches!(d.as_ref(), ProviderDescriptor::Delegated { .. }))
        };

        if let Some((id, _)) = delegated().find(|(_, d)| d.is_ready()) {
            return Some(id.clone());
        }

        for vendor in DirectKeyVendor::PRIORITY {
            let keyed = self.entries.iter().find(|(_, d)| {
                matches!(
                    d.as_ref(),
                    ProviderDescriptor::DirectKey {
                        vendor: v,
                        api_key: Some(_),
                        ..
                    } if *v == vendor
                )
            });
            if let Some((id, _)) = keyed {
                return Some(id.clone());
            }
        }

        delegated().next().map(|(id, _)| id.clone())
    }
}
