//! Custody bridge traits.

use custodia_types::{AssetRef, CustodyError, PartyId};

/// Result type for registry calls.
pub type CustodyResult<T> = std::result::Result<T, CustodyError>;

/// What the escrow requires from an asset registry.
///
/// Implementations must be safe to call from several threads. A `transfer`
/// may call back into the recipient (and from there into anything else); an
/// implementation must not hold internal locks across that callback.
pub trait CustodyBridge: Send + Sync {
    /// The party currently recorded as holding `asset`.
    fn current_holder(&self, asset: &AssetRef) -> CustodyResult<PartyId>;

    /// Whether `operator` may move `asset` on behalf of its current holder.
    /// The holder is always authorized for its own assets.
    fn is_transfer_authorized(&self, asset: &AssetRef, operator: &PartyId) -> bool;

    /// Move `asset` from `from` to `to`, executed by `operator`.
    ///
    /// Fails with `NotHolder` if `from` is not the current holder and with
    /// `NotAuthorized` if `operator` may not move it. When `receiver` is
    /// given, it must acknowledge the transfer; a refusal reverts it.
    fn transfer(
        &self,
        asset: &AssetRef,
        operator: &PartyId,
        from: &PartyId,
        to: &PartyId,
        receiver: Option<&dyn CustodyReceiver>,
    ) -> CustodyResult<()>;
}

/// Acknowledgment hook for parties that accept incoming custody.
pub trait CustodyReceiver {
    /// Called after `asset` has been recorded as held by the receiver.
    /// Returning an error makes the registry revert the transfer.
    fn on_custody_received(&self, asset: &AssetRef, from: &PartyId) -> CustodyResult<()>;
}
