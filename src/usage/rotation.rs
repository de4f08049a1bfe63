//! Usage: Codex account rotation workflow (select next/explicit account, refresh, persist).

use crate::domain::account_rotation::{
    cycle_to_next_account, rotation_candidates, AccountSelection, RotationTarget,
};
use crate::domain::credential_registry::CURRENT_CODEX_LABEL;
use crate::domain::credentials::{AccountIdentity, CredentialRecords, RawCredentialRecord};
use crate::infra::credential_store::CredentialStore;
use crate::oauth::refresh::CredentialRefresher;
use crate::shared::blocking;
use crate::shared::error::{AppResult, UsageError};
use std::sync::Arc;

/// Makes the selected account current by writing it under `openai`.
///
/// A `RefreshFailed` does not abort the rotation: the stale token is written and the caller sees
/// a warning in the log. When the refresh mints new tokens the source label is rewritten as well,
/// so the rotated-out refresh token does not linger there. An account that lives only under
/// `openai` is first copied to a generated `codex-<fingerprint>` label so it stays rotatable.
/// All labels change in one store update.
pub async fn rotate_codex_account(
    store: Arc<dyn CredentialStore>,
    refresher: &dyn CredentialRefresher,
    target: RotationTarget,
) -> AppResult<AccountSelection> {
    let load = {
        let store = Arc::clone(&store);
        blocking::run("rotation_load", move || store.load()).await?
    };

    let candidates = rotation_candidates(&load.records);
    let current = load
        .records
        .get(CURRENT_CODEX_LABEL)
        .map(AccountIdentity::from_record);
    let mut selection = cycle_to_next_account(&candidates, current.as_ref(), target)?;

    tracing::info!(
        selected = %selection.selected.label,
        selected_order = selection.selected_order,
        previous = selection.previous_label.as_deref().unwrap_or("-"),
        total = selection.total,
        "codex account selected"
    );

    let refreshed = match refresher.ensure_fresh(&selection.selected.credential).await {
        Ok(credential) => Some(credential),
        Err(UsageError::RefreshFailed(reason)) => {
            tracing::warn!(
                label = %selection.selected.label,
                "codex token refresh failed; keeping the stored token: {}",
                reason
            );
            None
        }
        Err(other) => return Err(other.into()),
    };

    let mut writes: Vec<(String, RawCredentialRecord)> = Vec::with_capacity(3);
    if selection.selected.label != CURRENT_CODEX_LABEL
        && candidates.iter().any(|c| c.label == CURRENT_CODEX_LABEL)
    {
        if let Some(record) = load.records.get(CURRENT_CODEX_LABEL) {
            let label = unnamed_account_label(&load.records, record);
            tracing::info!(label = %label, "current codex account had no named label; keeping a copy");
            writes.push((label, record.clone()));
        }
    }

    let source_label = selection.selected.label.clone();
    if let Some(credential) = refreshed {
        if credential != selection.selected.credential {
            if source_label != CURRENT_CODEX_LABEL {
                writes.push((source_label, credential.to_record()));
            }
            selection.selected.credential = credential;
        }
    }
    writes.push((
        CURRENT_CODEX_LABEL.to_string(),
        selection.selected.credential.to_record(),
    ));

    blocking::run("rotation_save", move || store.save_records(&writes)).await?;

    Ok(selection)
}

fn unnamed_account_label(records: &CredentialRecords, record: &RawCredentialRecord) -> String {
    let fingerprint = AccountIdentity::from_record(record).fingerprint();
    let short = fingerprint.get(..12).unwrap_or(&fingerprint);
    let base = format!("codex-{short}");
    let mut label = base.clone();
    let mut n = 2;
    while records.contains_key(&label) {
        label = format!("{base}-{n}");
        n += 1;
    }
    label
}
