//! Usage: ProviderRegistry - lookup of usage integrations via trait dispatch.
//!
//! Uses `OnceLock` for the builtin set; tests build their own registry from fakes.

use super::adapters::{
    anthropic::AnthropicUsageProvider, codex::CodexUsageProvider, copilot::CopilotUsageProvider,
    openrouter::OpenRouterUsageProvider, proxy::ProxyUsageProvider, zai::ZaiUsageProvider,
};
use super::provider_trait::UsageProvider;
use crate::domain::credentials::ProviderId;
use std::sync::{Arc, OnceLock};

#[derive(Clone)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn UsageProvider>>,
}

impl ProviderRegistry {
    pub fn builtin() -> Self {
        Self::from_providers(vec![
            Arc::new(CodexUsageProvider::default()),
            Arc::new(CopilotUsageProvider::default()),
            Arc::new(AnthropicUsageProvider::default()),
            Arc::new(OpenRouterUsageProvider::default()),
            Arc::new(ZaiUsageProvider),
            Arc::new(ProxyUsageProvider),
        ])
    }

    /// Later registrations for an already-registered id are ignored.
    pub fn from_providers(providers: Vec<Arc<dyn UsageProvider>>) -> Self {
        let mut unique: Vec<Arc<dyn UsageProvider>> = Vec::with_capacity(providers.len());
        for provider in providers {
            if unique.iter().any(|p| p.id() == provider.id()) {
                tracing::warn!(provider = %provider.id(), "duplicate usage provider ignored");
                continue;
            }
            unique.push(provider);
        }
        Self { providers: unique }
    }

    pub fn get(&self, id: ProviderId) -> Option<&Arc<dyn UsageProvider>> {
        self.providers.iter().find(|p| p.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn UsageProvider>> {
        self.providers.iter()
    }
}

/// Global singleton accessor.
pub fn global_registry() -> &'static ProviderRegistry {
    static REGISTRY: OnceLock<ProviderRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ProviderRegistry::builtin)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_covers_every_provider() {
        let reg = global_registry();
        for id in ProviderId::ALL {
            let provider = reg.get(id).expect("provider registered");
            assert_eq!(provider.id(), id);
        }
        assert_eq!(reg.iter().count(), ProviderId::ALL.len());
    }

    #[test]
    fn special_providers_are_flagged() {
        let reg = global_registry();
        let special: Vec<ProviderId> = reg
            .iter()
            .filter(|p| p.is_special())
            .map(|p| p.id())
            .collect();
        assert_eq!(special, vec![ProviderId::Copilot, ProviderId::Proxy]);
    }

    #[test]
    fn duplicate_ids_keep_first_registration() {
        let reg = ProviderRegistry::from_providers(vec![
            Arc::new(CodexUsageProvider::default()),
            Arc::new(CodexUsageProvider::default()),
        ]);
        assert_eq!(reg.iter().count(), 1);
    }
}
