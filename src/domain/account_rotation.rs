//! Usage: Multi-account rotation for codex credentials (locate current account, pick next).

use crate::domain::credential_registry::{resolve, ResolveOptions};
use crate::domain::credentials::{
    AccountIdentity, CodexCredential, CredentialRecords, ProviderCredential, ProviderId,
};
use crate::shared::error::UsageError;

// Preference order matters, exact weights do not: each weight exceeds the sum of those below it.
pub const REFRESH_MATCH_WEIGHT: u32 = 16;
pub const ACCOUNT_ID_MATCH_WEIGHT: u32 = 8;
pub const ACCESS_MATCH_WEIGHT: u32 = 4;
pub const EXPIRY_MATCH_WEIGHT: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCandidate {
    pub label: String,
    pub credential: CodexCredential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationTarget {
    Next,
    /// 1-based position in the candidate list.
    Order(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSelection {
    pub selected: AccountCandidate,
    pub selected_order: usize,
    pub previous_label: Option<String>,
    pub previous_order: Option<usize>,
    pub total: usize,
}

pub fn rotation_candidates(records: &CredentialRecords) -> Vec<AccountCandidate> {
    resolve(
        records,
        ResolveOptions {
            include_all_accounts: true,
        },
    )
    .into_iter()
    .filter(|entry| entry.provider == ProviderId::Codex)
    .filter_map(|entry| match entry.credential {
        ProviderCredential::Codex(credential) => Some(AccountCandidate {
            label: entry.label,
            credential,
        }),
        _ => None,
    })
    .collect()
}

fn same(a: &Option<String>, b: &Option<String>) -> bool {
    matches!((a, b), (Some(a), Some(b)) if a == b)
}

pub fn match_score(candidate: &AccountIdentity, current: &AccountIdentity) -> u32 {
    let mut score = 0;
    if same(&candidate.refresh, &current.refresh) {
        score += REFRESH_MATCH_WEIGHT;
    }
    if same(&candidate.account_id, &current.account_id) {
        score += ACCOUNT_ID_MATCH_WEIGHT;
    }
    if same(&candidate.access, &current.access) {
        score += ACCESS_MATCH_WEIGHT;
    }
    if matches!((candidate.expires, current.expires), (Some(a), Some(b)) if a == b) {
        score += EXPIRY_MATCH_WEIGHT;
    }
    score
}

/// Index of the best-matching candidate; `None` when nothing scores above zero.
pub fn locate_current(candidates: &[AccountCandidate], current: &AccountIdentity) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (idx, candidate) in candidates.iter().enumerate() {
        let score = match_score(&candidate.credential.identity(), current);
        if score == 0 {
            continue;
        }
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((idx, score));
        }
    }
    best.map(|(idx, _)| idx)
}

pub fn cycle_to_next_account(
    candidates: &[AccountCandidate],
    current: Option<&AccountIdentity>,
    target: RotationTarget,
) -> Result<AccountSelection, UsageError> {
    let total = candidates.len();
    let current_idx = current.and_then(|identity| locate_current(candidates, identity));

    let selected_idx = match target {
        RotationTarget::Order(order) => {
            if order < 1 || order > total {
                return Err(UsageError::OutOfRangeSelection { order, total });
            }
            order - 1
        }
        RotationTarget::Next => {
            if total == 0 {
                return Err(UsageError::NoAccounts);
            }
            current_idx.map_or(0, |idx| (idx + 1) % total)
        }
    };

    Ok(AccountSelection {
        selected: candidates[selected_idx].clone(),
        selected_order: selected_idx + 1,
        previous_label: current_idx.map(|idx| candidates[idx].label.clone()),
        previous_order: current_idx.map(|idx| idx + 1),
        total,
    })
}
