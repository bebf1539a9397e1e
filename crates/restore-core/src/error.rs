use thiserror::Error;

/// Structural failures of a store.
///
/// These describe programmer errors: the panicking accessors (`Store::state`,
/// `Store::provider`) format one of these as their panic message, the `try_*`
/// accessors hand it back instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("state `{0}` was never registered with this store or its fallback")]
    UnregisteredState(&'static str),

    #[error("provider `{0}` was never registered with this store")]
    MissingProvider(&'static str),

    #[error("remote settlement for `{0}` arrived with a mismatched value type")]
    SettlementMismatch(&'static str),

    #[error("remote resolver was dropped without settling its promise")]
    ResolverDropped,
}
