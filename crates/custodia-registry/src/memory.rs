//! In-memory asset registry.
//!
//! Tracks one holder per unit, a single-use per-unit approval, and
//! holder-wide operator approvals. A transfer clears the per-unit approval,
//! so an approval granted to one party silently stops covering anyone else
//! once the unit moves.

use std::{
    collections::{HashMap, HashSet},
    sync::{PoisonError, RwLock},
};

use custodia_types::{AssetRef, CustodyError, PartyId};
use tracing::debug;

use crate::bridge::{CustodyBridge, CustodyReceiver, CustodyResult};

#[derive(Debug, Clone, Copy)]
struct Holding {
    holder: PartyId,
    approved: Option<PartyId>,
}

/// A single named registry of non-fungible units.
pub struct InMemoryAssetRegistry {
    /// Registry name; an [`AssetRef`] resolves here only if its `registry` matches.
    name: String,
    /// Holdings indexed by unit id.
    holdings: RwLock<HashMap<u64, Holding>>,
    /// `(holder, operator)` pairs where the holder approved the operator for all units.
    operators: RwLock<HashSet<(PartyId, PartyId)>>,
}

impl InMemoryAssetRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            holdings: RwLock::new(HashMap::new()),
            operators: RwLock::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Record a new unit held by `holder` and return its reference.
    ///
    /// # Errors
    /// Returns `Rejected` if the unit already exists.
    pub fn mint(&self, unit_id: u64, holder: PartyId) -> CustodyResult<AssetRef> {
        let mut holdings = self.holdings.write().unwrap_or_else(PoisonError::into_inner);
        if holdings.contains_key(&unit_id) {
            return Err(CustodyError::Rejected {
                reason: format!("unit {unit_id} already minted"),
            });
        }
        holdings.insert(
            unit_id,
            Holding {
                holder,
                approved: None,
            },
        );
        Ok(AssetRef::new(self.name.clone(), unit_id))
    }

    /// Approve `spender` to move one unit. Only the holder may approve;
    /// `None` clears the approval.
    pub fn approve(
        &self,
        caller: &PartyId,
        asset: &AssetRef,
        spender: Option<PartyId>,
    ) -> CustodyResult<()> {
        let unit = self.resolve(asset)?;
        let mut holdings = self.holdings.write().unwrap_or_else(PoisonError::into_inner);
        let holding = holdings
            .get_mut(&unit)
            .ok_or_else(|| CustodyError::UnknownAsset(asset.to_string()))?;
        if holding.holder != *caller {
            return Err(CustodyError::NotHolder {
                expected: *caller,
                actual: holding.holder,
            });
        }
        holding.approved = spender;
        Ok(())
    }

    /// Grant or revoke `operator` authority over every unit `holder` holds.
    pub fn set_approval_for_all(&self, holder: PartyId, operator: PartyId, approved: bool) {
        let mut operators = self.operators.write().unwrap_or_else(PoisonError::into_inner);
        if approved {
            operators.insert((holder, operator));
        } else {
            operators.remove(&(holder, operator));
        }
    }

    /// The current holder, if the unit exists.
    #[must_use]
    pub fn holder_of(&self, asset: &AssetRef) -> Option<PartyId> {
        self.current_holder(asset).ok()
    }

    fn resolve(&self, asset: &AssetRef) -> CustodyResult<u64> {
        if asset.registry == self.name {
            Ok(asset.unit_id)
        } else {
            Err(CustodyError::UnknownAsset(asset.to_string()))
        }
    }

    fn holding(&self, asset: &AssetRef) -> CustodyResult<Holding> {
        let unit = self.resolve(asset)?;
        self.holdings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&unit)
            .copied()
            .ok_or_else(|| CustodyError::UnknownAsset(asset.to_string()))
    }

    fn authorized(&self, holding: Holding, operator: &PartyId) -> bool {
        holding.holder == *operator
            || holding.approved == Some(*operator)
            || self
                .operators
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .contains(&(holding.holder, *operator))
    }

    fn set_holding(&self, unit: u64, holding: Holding) {
        self.holdings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(unit, holding);
    }
}

impl CustodyBridge for InMemoryAssetRegistry {
    fn current_holder(&self, asset: &AssetRef) -> CustodyResult<PartyId> {
        self.holding(asset).map(|h| h.holder)
    }

    fn is_transfer_authorized(&self, asset: &AssetRef, operator: &PartyId) -> bool {
        self.holding(asset)
            .is_ok_and(|holding| self.authorized(holding, operator))
    }

    fn transfer(
        &self,
        asset: &AssetRef,
        operator: &PartyId,
        from: &PartyId,
        to: &PartyId,
        receiver: Option<&dyn CustodyReceiver>,
    ) -> CustodyResult<()> {
        let unit = self.resolve(asset)?;
        let before = {
            let mut holdings = self.holdings.write().unwrap_or_else(PoisonError::into_inner);
            let holding = holdings
                .get_mut(&unit)
                .ok_or_else(|| CustodyError::UnknownAsset(asset.to_string()))?;
            if holding.holder != *from {
                return Err(CustodyError::NotHolder {
                    expected: *from,
                    actual: holding.holder,
                });
            }
            let before = *holding;
            // `authorized` takes the operators lock; holdings stays locked so
            // the holder cannot change between check and write.
            if !self.authorized(before, operator) {
                return Err(CustodyError::NotAuthorized(asset.to_string()));
            }
            holding.holder = *to;
            holding.approved = None;
            before
        };

        debug!(asset = %asset, from = %from.short(), to = %to.short(), "custody transferred");

        // Holdings lock is released: the receiver may call back into us.
        if let Some(receiver) = receiver {
            if let Err(err) = receiver.on_custody_received(asset, from) {
                self.set_holding(unit, before);
                debug!(asset = %asset, error = %err, "custody transfer reverted by receiver");
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    fn setup() -> (InMemoryAssetRegistry, PartyId, AssetRef) {
        let registry = InMemoryAssetRegistry::new("art");
        let alice = PartyId::random();
        let asset = registry.mint(1, alice).unwrap();
        (registry, alice, asset)
    }

    struct Refuser;

    impl CustodyReceiver for Refuser {
        fn on_custody_received(&self, _: &AssetRef, _: &PartyId) -> CustodyResult<()> {
            Err(CustodyError::Rejected {
                reason: "not expecting anything".into(),
            })
        }
    }

    struct Recorder(AtomicBool);

    impl CustodyReceiver for Recorder {
        fn on_custody_received(&self, _: &AssetRef, _: &PartyId) -> CustodyResult<()> {
            self.0.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn mint_records_holder() {
        let (registry, alice, asset) = setup();
        assert_eq!(registry.current_holder(&asset).unwrap(), alice);
        assert!(registry.mint(1, alice).is_err(), "double mint must fail");
    }

    #[test]
    fn unknown_asset_and_foreign_registry() {
        let (registry, _, _) = setup();
        assert!(matches!(
            registry.current_holder(&AssetRef::new("art", 99)),
            Err(CustodyError::UnknownAsset(_))
        ));
        assert!(matches!(
            registry.current_holder(&AssetRef::new("other", 1)),
            Err(CustodyError::UnknownAsset(_))
        ));
    }

    #[test]
    fn holder_may_transfer_own_asset() {
        let (registry, alice, asset) = setup();
        let bob = PartyId::random();
        registry.transfer(&asset, &alice, &alice, &bob, None).unwrap();
        assert_eq!(registry.holder_of(&asset), Some(bob));
    }

    #[test]
    fn unapproved_operator_blocked() {
        let (registry, alice, asset) = setup();
        let escrow = PartyId::random();
        assert!(!registry.is_transfer_authorized(&asset, &escrow));
        let err = registry
            .transfer(&asset, &escrow, &alice, &escrow, None)
            .unwrap_err();
        assert!(matches!(err, CustodyError::NotAuthorized(_)));
        assert_eq!(registry.holder_of(&asset), Some(alice));
    }

    #[test]
    fn approval_is_cleared_by_transfer() {
        let (registry, alice, asset) = setup();
        let escrow = PartyId::random();
        let bob = PartyId::random();
        registry.approve(&alice, &asset, Some(escrow)).unwrap();
        assert!(registry.is_transfer_authorized(&asset, &escrow));

        registry.transfer(&asset, &alice, &alice, &bob, None).unwrap();
        assert!(!registry.is_transfer_authorized(&asset, &escrow));
    }

    #[test]
    fn later_approval_replaces_earlier() {
        let (registry, alice, asset) = setup();
        let escrow = PartyId::random();
        let other = PartyId::random();
        registry.approve(&alice, &asset, Some(escrow)).unwrap();
        registry.approve(&alice, &asset, Some(other)).unwrap();
        assert!(!registry.is_transfer_authorized(&asset, &escrow));
        assert!(registry.is_transfer_authorized(&asset, &other));
    }

    #[test]
    fn only_holder_may_approve() {
        let (registry, _, asset) = setup();
        let mallory = PartyId::random();
        let err = registry.approve(&mallory, &asset, Some(mallory)).unwrap_err();
        assert!(matches!(err, CustodyError::NotHolder { .. }));
    }

    #[test]
    fn operator_for_all_authorizes() {
        let (registry, alice, asset) = setup();
        let escrow = PartyId::random();
        registry.set_approval_for_all(alice, escrow, true);
        assert!(registry.is_transfer_authorized(&asset, &escrow));
        registry.set_approval_for_all(alice, escrow, false);
        assert!(!registry.is_transfer_authorized(&asset, &escrow));
    }

    #[test]
    fn wrong_from_is_not_holder() {
        let (registry, alice, asset) = setup();
        let bob = PartyId::random();
        let err = registry.transfer(&asset, &bob, &bob, &alice, None).unwrap_err();
        assert!(matches!(err, CustodyError::NotHolder { actual, .. } if actual == alice));
    }

    #[test]
    fn receiver_acknowledges() {
        let (registry, alice, asset) = setup();
        let escrow = PartyId::random();
        let recorder = Recorder(AtomicBool::new(false));
        registry
            .transfer(&asset, &alice, &alice, &escrow, Some(&recorder))
            .unwrap();
        assert!(recorder.0.load(Ordering::SeqCst));
        assert_eq!(registry.holder_of(&asset), Some(escrow));
    }

    #[test]
    fn receiver_refusal_reverts_transfer() {
        let (registry, alice, asset) = setup();
        let escrow = PartyId::random();
        registry.approve(&alice, &asset, Some(escrow)).unwrap();
        let err = registry
            .transfer(&asset, &escrow, &alice, &escrow, Some(&Refuser))
            .unwrap_err();
        assert!(matches!(err, CustodyError::Rejected { .. }));
        assert_eq!(registry.holder_of(&asset), Some(alice));
        assert!(
            registry.is_transfer_authorized(&asset, &escrow),
            "approval must be restored with the holding"
        );
    }
}
