pub mod cards;
pub mod merchants;
pub mod passes;
pub mod redeem;
pub mod wallet;

/// Actor recorded on events when the caller does not name one.
pub const DEFAULT_ACTOR: &str = "api";

pub fn actor_or_default(actor: &Option<String>) -> &str {
    actor
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .unwrap_or(DEFAULT_ACTOR)
}
