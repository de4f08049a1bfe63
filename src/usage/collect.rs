//! Usage: Fetch orchestrator - concurrent, deadline-bounded usage collection across providers.
//!
//! One call to `collect_snapshots`:
//! - reads the credential store once and resolves typed entries;
//! - fans out one task per entry (plus special providers without an entry) on a `JoinSet`;
//! - bounds each task by the configured timeout and the batch by timeout + grace;
//! - synthesizes `is_missing` placeholders for enabled core providers that produced nothing.

use crate::domain::credential_registry::{descriptor, resolve, ResolveOptions};
use crate::domain::credentials::{ProviderCredential, ProviderId};
use crate::domain::snapshot::UsageSnapshot;
use crate::infra::credential_store::{CredentialLoad, CredentialStore};
use crate::infra::settings::UsageSettings;
use crate::providers::provider_trait::{FetchContext, UsageProvider};
use crate::providers::registry::{global_registry, ProviderRegistry};
use crate::shared::blocking;
use crate::shared::error::AppResult;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Extra time the whole batch gets on top of the per-call timeout.
pub const BATCH_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectOptions {
    pub filter: Option<ProviderId>,
    pub include_all_accounts: bool,
}

enum FetchOutcome {
    Snapshot(UsageSnapshot),
    Empty,
    Failed(String),
    TimedOut,
}

struct FetchJob {
    provider: Arc<dyn UsageProvider>,
    label: Option<String>,
    credential: Option<ProviderCredential>,
}

impl FetchJob {
    fn describe(&self) -> String {
        match self.label.as_deref() {
            Some(label) => format!("{} ({label})", self.provider.id()),
            None => self.provider.id().to_string(),
        }
    }
}

pub struct UsageCollector {
    registry: ProviderRegistry,
    client: reqwest::Client,
}

impl UsageCollector {
    pub fn new(client: reqwest::Client) -> Self {
        Self::with_registry(global_registry().clone(), client)
    }

    pub fn with_registry(registry: ProviderRegistry, client: reqwest::Client) -> Self {
        Self { registry, client }
    }

    /// Never fails for per-provider problems; errors come only from reading the store.
    pub async fn collect_snapshots(
        &self,
        store: Arc<dyn CredentialStore>,
        settings: &UsageSettings,
        options: &CollectOptions,
    ) -> AppResult<Vec<UsageSnapshot>> {
        let load = blocking::run("credential_store_load", move || store.load()).await?;
        Ok(self.collect_from(load, settings, options).await)
    }

    pub async fn collect_from(
        &self,
        load: CredentialLoad,
        settings: &UsageSettings,
        options: &CollectOptions,
    ) -> Vec<UsageSnapshot> {
        let targeted = |id: ProviderId| {
            settings.is_provider_enabled(id) && options.filter.map_or(true, |f| f == id)
        };

        let entries = resolve(
            &load.records,
            ResolveOptions {
                include_all_accounts: options.include_all_accounts,
            },
        );

        let mut jobs: Vec<FetchJob> = Vec::new();
        for entry in entries {
            if !targeted(entry.provider) {
                continue;
            }
            let Some(provider) = self.registry.get(entry.provider) else {
                continue;
            };
            jobs.push(FetchJob {
                provider: Arc::clone(provider),
                label: Some(entry.label),
                credential: Some(entry.credential),
            });
        }
        for provider in self.registry.iter() {
            let id = provider.id();
            if provider.is_special()
                && targeted(id)
                && !jobs.iter().any(|job| job.provider.id() == id)
            {
                jobs.push(FetchJob {
                    provider: Arc::clone(provider),
                    label: None,
                    credential: None,
                });
            }
        }

        let mut ctx = FetchContext::new(self.client.clone(), settings.clone());
        ctx.copilot_usage_token = load.copilot_usage_token.clone();
        let ctx = Arc::new(ctx);

        let (snapshots, notes) = run_jobs(jobs, ctx.clone(), settings.fetch_timeout()).await;

        let mut out = snapshots;
        for provider in self.registry.iter() {
            let id = provider.id();
            if !id.is_core() || !targeted(id) || out.iter().any(|s| s.provider == id) {
                continue;
            }
            out.push(placeholder(
                id,
                ctx.now_secs,
                &load,
                notes.get(&id).map(Vec::as_slice).unwrap_or_default(),
            ));
        }
        out
    }
}

async fn run_jobs(
    jobs: Vec<FetchJob>,
    ctx: Arc<FetchContext>,
    per_call: Duration,
) -> (Vec<UsageSnapshot>, BTreeMap<ProviderId, Vec<String>>) {
    let mut pending: BTreeMap<usize, (ProviderId, String)> = BTreeMap::new();
    let mut task_jobs: HashMap<tokio::task::Id, usize> = HashMap::new();
    let mut set = JoinSet::new();

    for (idx, job) in jobs.into_iter().enumerate() {
        pending.insert(idx, (job.provider.id(), job.describe()));
        let ctx = Arc::clone(&ctx);
        let handle = set.spawn(async move {
            let fetch = job.provider.fetch_usage(&ctx, job.credential.as_ref());
            let outcome = match tokio::time::timeout(per_call, fetch).await {
                Ok(Ok(Some(mut snapshot))) => {
                    if snapshot.account_label.is_none() {
                        snapshot.account_label = job.label.clone();
                    }
                    FetchOutcome::Snapshot(snapshot)
                }
                Ok(Ok(None)) => FetchOutcome::Empty,
                Ok(Err(err)) => FetchOutcome::Failed(err.to_string()),
                Err(_) => FetchOutcome::TimedOut,
            };
            (idx, outcome)
        });
        task_jobs.insert(handle.id(), idx);
    }

    let mut snapshots = Vec::new();
    let mut notes: BTreeMap<ProviderId, Vec<String>> = BTreeMap::new();
    let deadline = tokio::time::Instant::now() + per_call + BATCH_GRACE;

    loop {
        let joined = match tokio::time::timeout_at(deadline, set.join_next()).await {
            Ok(Some(joined)) => joined,
            Ok(None) => break,
            Err(_) => {
                tracing::warn!(
                    pending = pending.len(),
                    "usage batch deadline reached; detaching unfinished fetches"
                );
                set.detach_all();
                break;
            }
        };
        let (idx, outcome) = match joined {
            Ok(v) => v,
            Err(err) => {
                tracing::error!("usage fetch task failed to join: {}", err);
                let Some(idx) = task_jobs.get(&err.id()).copied() else {
                    continue;
                };
                let state = if err.is_panic() { "panicked" } else { "was cancelled" };
                (idx, FetchOutcome::Failed(format!("fetch task {state}")))
            }
        };
        let Some((id, what)) = pending.remove(&idx) else {
            continue;
        };
        match outcome {
            FetchOutcome::Snapshot(snapshot) => snapshots.push(snapshot),
            FetchOutcome::Empty => {
                tracing::debug!(provider = %id, "usage payload held no recognizable data");
                notes
                    .entry(id)
                    .or_default()
                    .push(format!("{what}: response had no usage data"));
            }
            FetchOutcome::Failed(reason) => {
                tracing::warn!(provider = %id, "usage fetch failed: {}", reason);
                notes
                    .entry(id)
                    .or_default()
                    .push(format!("{what}: {reason}"));
            }
            FetchOutcome::TimedOut => {
                tracing::warn!(provider = %id, timeout_ms = per_call.as_millis() as u64, "usage fetch timed out");
                notes.entry(id).or_default().push(format!(
                    "{what}: timed out after {}ms",
                    per_call.as_millis()
                ));
            }
        }
    }

    // Only tasks still running at the deadline are left.
    for (id, what) in pending.into_values() {
        notes
            .entry(id)
            .or_default()
            .push(format!("{what}: no result before the batch deadline"));
    }

    (snapshots, notes)
}

fn missing_hint(id: ProviderId) -> &'static str {
    match id {
        ProviderId::Codex => {
            "No Codex usage available. Sign in with `codex login` or add an `openai` OAuth entry to auth.json."
        }
        ProviderId::Copilot => {
            "No Copilot usage available. Run `aio-usage login` to authorize GitHub Copilot."
        }
        ProviderId::Anthropic => {
            "No Anthropic usage available. Sign in with Claude Code or set CLAUDE_CODE_OAUTH_TOKEN."
        }
        ProviderId::Proxy => {
            "No proxy quota available. Check `endpoint` and `apiKey` in usage-config.json."
        }
        ProviderId::OpenRouter => "No OpenRouter usage available. Add an `openrouter` API key.",
        ProviderId::Zai => "No Z.ai usage available. Add a `zai-coding-plan` API key.",
    }
}

fn placeholder(
    id: ProviderId,
    now_secs: i64,
    load: &CredentialLoad,
    notes: &[String],
) -> UsageSnapshot {
    let mut details = load.diagnostics.clone();
    if let Some(descriptor) = descriptor(id) {
        details.push(format!("Labels searched: {}", descriptor.labels.join(", ")));
    }
    details.extend(notes.iter().cloned());
    tracing::info!(provider = %id, notes = notes.len(), "usage placeholder synthesized");
    UsageSnapshot::missing(id, now_secs, missing_hint(id), details)
}
