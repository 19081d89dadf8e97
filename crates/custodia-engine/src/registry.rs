//! Deal registry: append-only, monotonically keyed.
//!
//! Ids start at 1 and are never reused. Records are never removed; terminal
//! deals stay queryable as the audit trail. The engine replaces a record
//! wholesale to stage a transition and replaces it back to roll one back.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use custodia_types::{AssetRef, Commitment, Deal, DealId, EscrowError, PartyId, Result};

/// Keyed store of every deal ever opened.
#[derive(Debug)]
pub struct DealRegistry {
    deals: BTreeMap<DealId, Deal>,
    next_id: DealId,
}

impl DealRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            deals: BTreeMap::new(),
            next_id: DealId::FIRST,
        }
    }

    /// Allocate the next id and store a freshly opened deal under it.
    pub fn open(
        &mut self,
        seller: PartyId,
        buyer: PartyId,
        asset: AssetRef,
        price_cents: u64,
        correlation_hash: Commitment,
        now: DateTime<Utc>,
    ) -> DealId {
        let id = self.next_id;
        self.next_id = id.next();
        self.deals.insert(
            id,
            Deal::opened(id, seller, buyer, asset, price_cents, correlation_hash, now),
        );
        id
    }

    /// # Errors
    /// Returns `DealNotFound` for ids never allocated.
    pub fn get(&self, id: DealId) -> Result<&Deal> {
        self.deals.get(&id).ok_or(EscrowError::DealNotFound(id))
    }

    /// Overwrite an existing record, returning the previous version.
    ///
    /// # Errors
    /// Returns `DealNotFound` if `deal.id` was never allocated; `replace`
    /// never creates records.
    pub fn replace(&mut self, deal: Deal) -> Result<Deal> {
        let slot = self
            .deals
            .get_mut(&deal.id)
            .ok_or(EscrowError::DealNotFound(deal.id))?;
        Ok(std::mem::replace(slot, deal))
    }

    /// The id the next `open` will allocate.
    #[must_use]
    pub fn next_id(&self) -> DealId {
        self.next_id
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.deals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deals.is_empty()
    }

    /// All deals in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Deal> {
        self.deals.values()
    }
}

impl Default for DealRegistry {
    fn default() -> Self {
        Self::new()
    }
}
