use tracing_subscriber::{EnvFilter, fmt};

/// Installs a global fmt subscriber filtered by `RUST_LOG`. `log` records are forwarded to it.
///
/// Returns `false` if a global subscriber was already set, e.g. by the embedding application.
#[allow(
    clippy::missing_inline_in_public_items,
    reason = "Executed once per run, never across crate boundaries"
)]
pub fn init_tracing() -> bool {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
        .is_ok()
}
