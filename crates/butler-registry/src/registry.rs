//! The process-wide adapter registry (spec §4.4): one `DashMap` of typed
//! registrations keyed by app id, grounded on `skynet_gateway::app::AppState`'s
//! `DashMap` usage for shared, lock-free-read registries.
//!
//! Re-architected per spec §9's guidance: instead of a dynamic manifest plus
//! a type-erased factory callback, each adapter registers its manifest
//! alongside a constructor closure that produces the already-typed
//! [`LiveInstance`] variant for its category. The config schema stays pure
//! UI data; the runtime only ever touches the typed struct the closure
//! returns.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use butler_persistence::models::ExtensionCategory;
use butler_persistence::Repositories;

use crate::channel::ChannelAdapter;
use crate::error::{RegistryError, Result};
use crate::manifest::{AdapterManifest, AppCategory};
use crate::pms::PmsAdapter;
use crate::provider::{ConnectionTestResult, LanguageModelProvider};

#[derive(Clone)]
pub enum LiveInstance {
    Ai(Arc<dyn LanguageModelProvider>),
    Channel(Arc<dyn ChannelAdapter>),
    Pms(Arc<dyn PmsAdapter>),
}

impl LiveInstance {
    pub async fn test_connection(&self) -> Result<ConnectionTestResult> {
        match self {
            Self::Ai(p) => p.test_connection().await,
            Self::Channel(c) => c.test_connection().await,
            Self::Pms(p) => p.test_connection().await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterStatus {
    Active,
    Inactive,
    Error,
    Unconfigured,
}

pub type Factory = dyn Fn(&serde_json::Value) -> Result<LiveInstance> + Send + Sync;

struct Registration {
    manifest: AdapterManifest,
    factory: Box<Factory>,
}

struct InstanceSlot {
    instance: LiveInstance,
    status: AdapterStatus,
    error: Option<String>,
}

/// Registry of known adapters plus the currently-live, configured
/// instances. Configuration mutation acquires the `DashMap`'s per-key lock
/// only for the entry being changed (spec §5: "configuration mutations
/// acquire an exclusive guard and rebuild affected instance(s) outside the
/// guard").
pub struct AdapterRegistry {
    registrations: DashMap<&'static str, Registration>,
    live: DashMap<String, InstanceSlot>,
    repos: Arc<Repositories>,
}

impl AdapterRegistry {
    pub fn new(repos: Arc<Repositories>) -> Self {
        Self {
            registrations: DashMap::new(),
            live: DashMap::new(),
            repos,
        }
    }

    /// Register an adapter type at startup. Idempotent re-registration
    /// (e.g. on hot reload of the binary) simply overwrites the entry.
    pub fn register(
        &self,
        manifest: AdapterManifest,
        factory: impl Fn(&serde_json::Value) -> Result<LiveInstance> + Send + Sync + 'static,
    ) {
        self.registrations.insert(
            manifest.id,
            Registration {
                manifest,
                factory: Box::new(factory),
            },
        );
    }

    pub fn manifests(&self) -> Vec<AdapterManifest> {
        self.registrations.iter().map(|e| e.manifest.clone()).collect()
    }

    pub fn manifests_by_category(&self, category: AppCategory) -> Vec<AdapterManifest> {
        self.registrations
            .iter()
            .filter(|e| e.manifest.category == category)
            .map(|e| e.manifest.clone())
            .collect()
    }

    /// Load every enabled `ExtensionConfig` from persistence and instantiate
    /// it. Called once at startup; individual failures are logged and leave
    /// that app `unconfigured`/`error` rather than aborting the whole boot.
    pub async fn load_from_persistence(&self) {
        let configs = match self.repos.extension_configs.list_enabled() {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "failed to list enabled extension configs");
                return;
            }
        };
        for cfg in configs {
            if let Err(e) = self.instantiate(&cfg.id, &cfg.config).await {
                tracing::warn!(app_id = %cfg.id, error = %e, "failed to instantiate adapter at startup");
            }
        }
    }

    /// Apply a configuration change: persist it, destroy the old instance
    /// (if any), build the new one, and run a connection test (spec §4.4).
    /// Enforces the single-active-per-category/medium selection policy by
    /// disabling any other currently-enabled config that would conflict.
    pub async fn apply_config(
        &self,
        app_id: &str,
        config: serde_json::Value,
        enabled: bool,
    ) -> Result<ConnectionTestResult> {
        let manifest = self
            .registrations
            .get(app_id)
            .map(|r| r.manifest.clone())
            .ok_or_else(|| RegistryError::UnknownApp(app_id.to_string()))?;

        if enabled {
            self.disable_conflicting(&manifest, app_id)?;
        }

        self.repos
            .extension_configs
            .upsert(app_id, manifest.category.into(), config.clone(), enabled)?;

        self.live.remove(app_id);

        if !enabled {
            return Ok(ConnectionTestResult {
                success: true,
                message: "adapter disabled".to_string(),
                details: None,
                latency_ms: 0,
            });
        }

        self.instantiate(app_id, &config).await
    }

    /// Disable every other enabled config that would violate the
    /// at-most-one-active rule for `manifest`'s category/medium.
    fn disable_conflicting(&self, manifest: &AdapterManifest, app_id: &str) -> Result<()> {
        let category: ExtensionCategory = manifest.category.into();
        let siblings = self.repos.extension_configs.list_by_category(category)?;
        for sibling in siblings {
            if sibling.id == app_id || !sibling.enabled {
                continue;
            }
            if manifest.category == AppCategory::Channel {
                let sibling_medium = self
                    .registrations
                    .get(sibling.id.as_str())
                    .and_then(|r| r.manifest.channel_medium);
                if sibling_medium != manifest.channel_medium {
                    continue;
                }
            }
            self.repos
                .extension_configs
                .upsert(&sibling.id, category, sibling.config, false)?;
            self.live.remove(&sibling.id);
        }
        Ok(())
    }

    async fn instantiate(&self, app_id: &str, config: &serde_json::Value) -> Result<ConnectionTestResult> {
        let registration = self
            .registrations
            .get(app_id)
            .ok_or_else(|| RegistryError::UnknownApp(app_id.to_string()))?;

        let instance = match (registration.factory)(config) {
            Ok(i) => i,
            Err(e) => {
                let _ = self.repos.extension_configs.record_test_result(
                    app_id,
                    serde_json::json!({"success": false}),
                    Some(&e.to_string()),
                );
                return Err(e);
            }
        };
        drop(registration);

        let test = instance.test_connection().await;
        let (status, result) = match test {
            Ok(r) if r.success => (AdapterStatus::Active, r),
            Ok(r) => (AdapterStatus::Error, r),
            Err(e) => (
                AdapterStatus::Error,
                ConnectionTestResult {
                    success: false,
                    message: e.to_string(),
                    details: None,
                    latency_ms: 0,
                },
            ),
        };

        let _ = self.repos.extension_configs.record_test_result(
            app_id,
            serde_json::json!({"success": result.success, "message": result.message}),
            if result.success { None } else { Some(result.message.as_str()) },
        );

        self.live.insert(
            app_id.to_string(),
            InstanceSlot {
                instance,
                status,
                error: if result.success { None } else { Some(result.message.clone()) },
            },
        );

        Ok(result)
    }

    pub fn status(&self, app_id: &str) -> AdapterStatus {
        self.live
            .get(app_id)
            .map(|s| s.status)
            .unwrap_or(AdapterStatus::Unconfigured)
    }

    pub fn last_error(&self, app_id: &str) -> Option<String> {
        self.live.get(app_id).and_then(|s| s.error.clone())
    }

    pub fn get_live(&self, app_id: &str) -> Option<LiveInstance> {
        self.live.get(app_id).map(|s| s.instance.clone())
    }

    /// The single active AI provider, if any — used for both completion and
    /// embedding (spec §4.4: "may be the same instance").
    pub fn active_ai(&self) -> Option<Arc<dyn LanguageModelProvider>> {
        self.live.iter().find_map(|e| match &e.instance {
            LiveInstance::Ai(p) if e.status == AdapterStatus::Active => Some(Arc::clone(p)),
            _ => None,
        })
    }

    /// The active channel adapter for one medium (`"short_message"`,
    /// `"instant_messaging"`, or `"email"`).
    pub fn active_channel(&self, medium: &str) -> Option<Arc<dyn ChannelAdapter>> {
        self.live.iter().find_map(|e| {
            if e.status != AdapterStatus::Active {
                return None;
            }
            let LiveInstance::Channel(c) = &e.instance else { return None };
            let registered_medium = self
                .registrations
                .get(e.key().as_str())
                .and_then(|r| r.manifest.channel_medium);
            if registered_medium == Some(medium) {
                Some(Arc::clone(c))
            } else {
                None
            }
        })
    }

    pub fn active_pms(&self) -> Option<Arc<dyn PmsAdapter>> {
        self.live.iter().find_map(|e| match &e.instance {
            LiveInstance::Pms(p) if e.status == AdapterStatus::Active => Some(Arc::clone(p)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Capabilities;
    use crate::provider::{
        ChatMessage, CompletionRequest, CompletionResponse, EmbedRequest, EmbedResponse, TokenUsage,
    };
    use async_trait::async_trait;

    struct FakeAi;

    #[async_trait]
    impl LanguageModelProvider for FakeAi {
        fn app_id(&self) -> &str {
            "fake-ai"
        }
        async fn complete(&self, _req: CompletionRequest) -> Result<CompletionResponse> {
            Ok(CompletionResponse {
                content: "hi".to_string(),
                usage: TokenUsage::default(),
                stop_reason: None,
            })
        }
        async fn embed(&self, _req: EmbedRequest) -> Result<EmbedResponse> {
            Ok(EmbedResponse { embedding: vec![0.0; 4], usage: None })
        }
        async fn test_connection(&self) -> Result<ConnectionTestResult> {
            Ok(ConnectionTestResult { success: true, message: "ok".into(), details: None, latency_ms: 1 })
        }
    }

    fn registry() -> AdapterRegistry {
        let repos = Arc::new(Repositories::open_in_memory().unwrap());
        let registry = AdapterRegistry::new(repos);
        registry.register(
            AdapterManifest {
                id: "fake-ai",
                name: "Fake AI",
                category: AppCategory::Ai,
                version: "1.0",
                description: "test double",
                config_schema: vec![],
                capabilities: Capabilities::Ai(vec![]),
                channel_medium: None,
            },
            |_cfg| Ok(LiveInstance::Ai(Arc::new(FakeAi))),
        );
        registry
    }

    #[tokio::test]
    async fn applying_config_activates_the_instance() {
        let registry = registry();
        let result = registry
            .apply_config("fake-ai", serde_json::json!({"key": "x"}), true)
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(registry.status("fake-ai"), AdapterStatus::Active);
        assert!(registry.active_ai().is_some());
    }

    #[tokio::test]
    async fn disabling_removes_the_live_instance() {
        let registry = registry();
        registry
            .apply_config("fake-ai", serde_json::json!({}), true)
            .await
            .unwrap();
        registry
            .apply_config("fake-ai", serde_json::json!({}), false)
            .await
            .unwrap();
        assert_eq!(registry.status("fake-ai"), AdapterStatus::Unconfigured);
        assert!(registry.active_ai().is_none());
    }

    #[test]
    fn unknown_app_yields_not_found() {
        // compile-time sanity: trait object usage above must stay Send + Sync
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AdapterRegistry>();
        let _ = ChatMessage { role: crate::provider::ChatRole::User, content: String::new() };
    }
}
