//! Usage: Free-text provider filter resolution (alias table).

use crate::domain::credentials::ProviderId;

const ALIASES: &[(&str, ProviderId)] = &[
    ("codex", ProviderId::Codex),
    ("openai", ProviderId::Codex),
    ("gpt", ProviderId::Codex),
    ("chatgpt", ProviderId::Codex),
    ("proxy", ProviderId::Proxy),
    ("agy", ProviderId::Proxy),
    ("antigravity", ProviderId::Proxy),
    ("gemini", ProviderId::Proxy),
    ("copilot", ProviderId::Copilot),
    ("gh", ProviderId::Copilot),
    ("github", ProviderId::Copilot),
    ("github-copilot", ProviderId::Copilot),
    ("anthropic", ProviderId::Anthropic),
    ("claude", ProviderId::Anthropic),
    ("openrouter", ProviderId::OpenRouter),
    ("or", ProviderId::OpenRouter),
    ("zai", ProviderId::Zai),
    ("glm", ProviderId::Zai),
    ("z.ai", ProviderId::Zai),
    ("zai-coding-plan", ProviderId::Zai),
];

/// `None` means "no filter": unrecognized text selects every provider.
pub fn resolve_provider_filter(raw: &str) -> Option<ProviderId> {
    let needle = raw.trim().to_ascii_lowercase();
    if needle.is_empty() {
        return None;
    }
    ALIASES
        .iter()
        .find(|(alias, _)| *alias == needle)
        .map(|(_, id)| *id)
}
