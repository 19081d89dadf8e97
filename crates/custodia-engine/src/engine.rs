//! Escrow engine: the deal state machine.
//!
//! Every mutating operation runs the same way:
//! 1. Take the [`OperationGate`] (serialized, non-reentrant)
//! 2. Validate arguments, then deal lookup, authority, and state
//! 3. Check commitments, timeouts, and amounts
//! 4. Re-validate custody with the asset registry (holder + authorization)
//! 5. Stage the post-transition deal in the registry
//! 6. Move custody; if the registry refuses, restore the pre-transition deal
//! 7. Emit notifications
//!
//! Because the post-transition state is staged before the registry is
//! called, a registry that calls back into the engine sees the deal in its
//! new state, and any attempt to re-run a transition from inside the
//! callback is rejected by the gate. Queries from other threads wait on the
//! gate, so they only ever see committed or rolled-back records.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use custodia_registry::{CustodyBridge, CustodyReceiver, CustodyResult};
use custodia_types::{
    AssetRef, Authority, Clock, CustodyError, Deal, DealId, DealState, EscrowConfig, EscrowError,
    Notification, PartyId, PaymentRecord, Result, SystemClock,
};
use tracing::{info, warn};

use crate::{
    access::AccessControl,
    commitment,
    gate::OperationGate,
    registry::DealRegistry,
    sink::{NotificationSink, TracingSink},
    timeout::{REFUNDABLE_STATES, TimeoutPolicy},
};

/// Role table and deal records, guarded together.
struct Ledger {
    access: AccessControl,
    deals: DealRegistry,
}

/// One asset movement requested by a transition.
struct Movement {
    asset: AssetRef,
    from: PartyId,
    to: PartyId,
    /// Inbound movements require the escrow's acknowledgment.
    inbound: bool,
}

/// The custody escrow coordinator.
pub struct EscrowEngine {
    /// Identity under which the escrow holds deposited assets.
    custodian: PartyId,
    ledger: Mutex<Ledger>,
    gate: OperationGate,
    timeouts: TimeoutPolicy,
    custody: Arc<dyn CustodyBridge>,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn NotificationSink>,
    /// The inbound transfer currently in flight, if any.
    expected_inbound: Mutex<Option<(DealId, AssetRef, PartyId)>>,
}

impl EscrowEngine {
    /// Create an engine with default windows, the system clock, and a
    /// tracing-only notification sink.
    ///
    /// # Errors
    /// Returns `Validation` if `admin` is the zero identity.
    pub fn new(admin: PartyId, custody: Arc<dyn CustodyBridge>) -> Result<Self> {
        Ok(Self {
            custodian: PartyId::new(),
            ledger: Mutex::new(Ledger {
                access: AccessControl::new(admin)?,
                deals: DealRegistry::new(),
            }),
            gate: OperationGate::new(),
            timeouts: TimeoutPolicy::default(),
            custody,
            clock: Arc::new(SystemClock),
            sink: Arc::new(TracingSink),
            expected_inbound: Mutex::new(None),
        })
    }

    /// Replace the refund windows.
    pub fn with_config(mut self, config: &EscrowConfig) -> Result<Self> {
        self.timeouts = TimeoutPolicy::from_config(config)?;
        Ok(self)
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Use a fixed custodian identity instead of a generated one.
    pub fn with_custodian(mut self, custodian: PartyId) -> Result<Self> {
        require_party("custodian", &custodian)?;
        self.custodian = custodian;
        Ok(self)
    }

    /// The identity sellers must authorize and deposited assets are held by.
    #[must_use]
    pub fn custodian(&self) -> PartyId {
        self.custodian
    }

    #[must_use]
    pub fn admin(&self) -> PartyId {
        self.ledger().access.admin()
    }

    #[must_use]
    pub fn timeouts(&self) -> TimeoutPolicy {
        self.timeouts
    }

    // =================================================================
    // Role administration
    // =================================================================

    /// Grant the operator role. Admin only.
    pub fn grant_operator(&self, caller: PartyId, party: PartyId) -> Result<()> {
        self.run("grant_operator", None, || {
            let granted = self.ledger().access.grant_operator(&caller, party)?;
            if granted {
                info!(operator = %party, "operator granted");
                self.sink.notify(&Notification::OperatorGranted { party });
            }
            Ok(())
        })
    }

    /// Revoke the operator role. Admin only.
    pub fn revoke_operator(&self, caller: PartyId, party: PartyId) -> Result<()> {
        self.run("revoke_operator", None, || {
            let revoked = self.ledger().access.revoke_operator(&caller, &party)?;
            if revoked {
                info!(operator = %party, "operator revoked");
                self.sink.notify(&Notification::OperatorRevoked { party });
            }
            Ok(())
        })
    }

    #[must_use]
    pub fn is_operator(&self, party: &PartyId) -> bool {
        self.read(|ledger| {
            ledger
                .access
                .has_role(party, custodia_types::Role::Operator)
        })
    }

    // =================================================================
    // Deal lifecycle
    // =================================================================

    /// Open a deal. The caller becomes the seller of record. Only the
    /// commitment to `correlation_id` is stored.
    pub fn open(
        &self,
        caller: PartyId,
        buyer: PartyId,
        asset: AssetRef,
        price_cents: u64,
        correlation_id: &str,
    ) -> Result<DealId> {
        self.run("open", None, || {
            require_party("seller", &caller)?;
            require_party("buyer", &buyer)?;
            if asset.is_null() {
                return Err(EscrowError::Validation {
                    field: "asset",
                    reason: "missing registry reference".into(),
                });
            }
            if price_cents == 0 {
                return Err(EscrowError::Validation {
                    field: "price_cents",
                    reason: "must be > 0".into(),
                });
            }
            require_text("correlation_id", correlation_id)?;

            let correlation_hash = commitment::commit(correlation_id);
            let now = self.clock.now();
            let id = self.ledger().deals.open(
                caller,
                buyer,
                asset.clone(),
                price_cents,
                correlation_hash,
                now,
            );

            info!(deal_id = id.0, seller = %caller, asset = %asset, price_cents, "deal opened");
            self.sink.notify(&Notification::DealOpened {
                deal_id: id,
                seller: caller,
                buyer,
                asset,
                price_cents,
                correlation_hash,
            });
            Ok(id)
        })
    }

    /// Move the asset from the seller into escrow custody.
    pub fn deposit(&self, caller: PartyId, id: DealId, correlation_id: &str) -> Result<()> {
        self.run("deposit", Some(id), || {
            require_text("correlation_id", correlation_id)?;
            let deal = self.load(id)?;
            self.ledger()
                .access
                .require(&caller, Authority::Seller, Some(&deal))?;
            require_state(&deal, &[DealState::Opened])?;
            commitment::require_match("correlation_id", correlation_id, &deal.correlation_hash)?;

            self.require_holder(&deal.asset, &deal.seller)?;
            if !self
                .custody
                .is_transfer_authorized(&deal.asset, &self.custodian)
            {
                return Err(CustodyError::NotAuthorized(deal.asset.to_string()).into());
            }

            let now = self.clock.now();
            let mut staged = deal.clone();
            staged.advance(DealState::Deposited, now)?;
            staged.deposited_at = Some(now);

            let movement = Movement {
                asset: deal.asset.clone(),
                from: deal.seller,
                to: self.custodian,
                inbound: true,
            };
            self.apply(&deal, staged, Some(movement))?;

            info!(deal_id = id.0, asset = %deal.asset, "asset deposited");
            self.sink.notify(&Notification::AssetDeposited {
                deal_id: id,
                seller: deal.seller,
                asset: deal.asset.clone(),
            });
            self.sink.notify(&Notification::AgreementRequested {
                deal_id: id,
                correlation_id: correlation_id.to_owned(),
                buyer: deal.buyer,
                price_cents: deal.price_cents,
            });
            Ok(())
        })
    }

    /// Operator attests that the off-ledger payment agreement exists.
    pub fn confirm_agreement(
        &self,
        caller: PartyId,
        id: DealId,
        correlation_id: &str,
        agreement_token: &str,
    ) -> Result<()> {
        self.run("confirm_agreement", Some(id), || {
            require_text("correlation_id", correlation_id)?;
            require_text("agreement_token", agreement_token)?;
            let deal = self.load(id)?;
            self.ledger()
                .access
                .require(&caller, Authority::Operator, Some(&deal))?;
            require_state(&deal, &[DealState::Deposited])?;
            commitment::require_match("correlation_id", correlation_id, &deal.correlation_hash)?;

            let now = self.clock.now();
            let agreement_hash = commitment::commit(agreement_token);
            let mut staged = deal.clone();
            staged.advance(DealState::AgreementConfirmed, now)?;
            staged.agreement_hash = Some(agreement_hash);
            staged.agreed_at = Some(now);
            self.apply(&deal, staged, None)?;

            info!(deal_id = id.0, operator = %caller, "agreement confirmed");
            self.sink.notify(&Notification::AgreementConfirmed {
                deal_id: id,
                agreement_hash,
            });
            self.sink.notify(&Notification::PaymentRequested {
                deal_id: id,
                correlation_id: correlation_id.to_owned(),
                agreement_token: agreement_token.to_owned(),
                price_cents: deal.price_cents,
            });
            Ok(())
        })
    }

    /// Operator attests that payment settled; the asset goes to the buyer.
    pub fn confirm_payment(
        &self,
        caller: PartyId,
        id: DealId,
        receipt_ref: &str,
        amount_cents: u64,
        currency: &str,
    ) -> Result<()> {
        self.run("confirm_payment", Some(id), || {
            require_text("receipt_ref", receipt_ref)?;
            require_text("currency", currency)?;
            let deal = self.load(id)?;
            self.ledger()
                .access
                .require(&caller, Authority::Operator, Some(&deal))?;
            require_state(&deal, &[DealState::AgreementConfirmed])?;
            if amount_cents != deal.price_cents {
                return Err(EscrowError::AmountMismatch {
                    expected: deal.price_cents,
                    actual: amount_cents,
                });
            }
            self.require_holder(&deal.asset, &self.custodian)?;

            let now = self.clock.now();
            let mut staged = deal.clone();
            staged.advance(DealState::Paid, now)?;
            staged.payment = Some(PaymentRecord {
                receipt_ref: receipt_ref.to_owned(),
                currency: currency.to_owned(),
                amount_cents,
                confirmed_at: now,
            });

            let movement = Movement {
                asset: deal.asset.clone(),
                from: self.custodian,
                to: deal.buyer,
                inbound: false,
            };
            self.apply(&deal, staged, Some(movement))?;

            info!(
                deal_id = id.0,
                price = %deal.price(),
                currency,
                receipt_ref,
                "payment confirmed, asset released"
            );
            self.sink.notify(&Notification::PaymentConfirmed {
                deal_id: id,
                receipt_ref: receipt_ref.to_owned(),
                amount_cents,
                currency: currency.to_owned(),
            });
            self.sink.notify(&Notification::AssetReleased {
                deal_id: id,
                buyer: deal.buyer,
                asset: deal.asset.clone(),
            });
            Ok(())
        })
    }

    /// Cancel a deal whose asset never left the seller.
    pub fn cancel(&self, caller: PartyId, id: DealId) -> Result<()> {
        self.run("cancel", Some(id), || {
            let deal = self.load(id)?;
            self.ledger()
                .access
                .require(&caller, Authority::SellerOrAdmin, Some(&deal))?;
            require_state(&deal, &[DealState::Opened])?;

            let mut staged = deal.clone();
            staged.advance(DealState::Cancelled, self.clock.now())?;
            self.apply(&deal, staged, None)?;

            info!(deal_id = id.0, by = %caller, "deal cancelled");
            self.sink.notify(&Notification::DealCancelled {
                deal_id: id,
                by: caller,
            });
            Ok(())
        })
    }

    /// Return the asset to the seller after the applicable window elapsed.
    pub fn refund_asset(&self, caller: PartyId, id: DealId) -> Result<()> {
        self.run("refund_asset", Some(id), || {
            let deal = self.load(id)?;
            self.ledger()
                .access
                .require(&caller, Authority::SellerOrAdmin, Some(&deal))?;
            require_state(&deal, &REFUNDABLE_STATES)?;
            let now = self.clock.now();
            self.timeouts.check_refund(&deal, now)?;
            self.require_holder(&deal.asset, &self.custodian)?;

            let mut staged = deal.clone();
            staged.advance(DealState::Refunded, now)?;
            let movement = Movement {
                asset: deal.asset.clone(),
                from: self.custodian,
                to: deal.seller,
                inbound: false,
            };
            self.apply(&deal, staged, Some(movement))?;

            info!(deal_id = id.0, by = %caller, from_state = %deal.state, "asset refunded");
            self.sink.notify(&Notification::AssetRefunded {
                deal_id: id,
                seller: deal.seller,
                asset: deal.asset.clone(),
            });
            Ok(())
        })
    }

    /// Admin circuit breaker: close any unpaid deal immediately, returning
    /// the asset if the escrow holds it.
    pub fn emergency_refund(&self, caller: PartyId, id: DealId) -> Result<()> {
        self.run("emergency_refund", Some(id), || {
            let deal = self.load(id)?;
            self.ledger()
                .access
                .require(&caller, Authority::Admin, Some(&deal))?;
            require_state(
                &deal,
                &[
                    DealState::Opened,
                    DealState::Deposited,
                    DealState::AgreementConfirmed,
                ],
            )?;

            let held = deal.state.is_in_custody()
                && self.custody.current_holder(&deal.asset)? == self.custodian;
            if deal.state.is_in_custody() && !held {
                warn!(deal_id = id.0, asset = %deal.asset, "escrow no longer holds asset; closing without transfer");
            }

            let mut staged = deal.clone();
            staged.advance(DealState::Refunded, self.clock.now())?;
            let movement = held.then(|| Movement {
                asset: deal.asset.clone(),
                from: self.custodian,
                to: deal.seller,
                inbound: false,
            });
            self.apply(&deal, staged, movement)?;

            warn!(deal_id = id.0, from_state = %deal.state, returned = held, "emergency refund");
            if held {
                self.sink.notify(&Notification::AssetRefunded {
                    deal_id: id,
                    seller: deal.seller,
                    asset: deal.asset.clone(),
                });
            }
            self.sink.notify(&Notification::DealCancelled {
                deal_id: id,
                by: caller,
            });
            Ok(())
        })
    }

    // =================================================================
    // Queries (wait for in-flight operations; never mutate)
    // =================================================================

    /// A copy of the deal record.
    pub fn get_deal(&self, id: DealId) -> Result<Deal> {
        self.read(|ledger| ledger.deals.get(id).cloned())
    }

    /// The id the next `open` will allocate.
    #[must_use]
    pub fn next_id(&self) -> DealId {
        self.read(|ledger| ledger.deals.next_id())
    }

    /// Whether `refund_asset` would pass its timeout check right now.
    /// `false` for unknown ids and for every state other than
    /// `DEPOSITED` / `AGREEMENT_CONFIRMED`.
    #[must_use]
    pub fn can_refund(&self, id: DealId) -> bool {
        let now = self.clock.now();
        self.read(|ledger| {
            ledger
                .deals
                .get(id)
                .is_ok_and(|deal| self.timeouts.can_refund(deal, now))
        })
    }

    /// When the deal becomes refundable, if it is in a refundable state.
    #[must_use]
    pub fn refund_eligible_at(&self, id: DealId) -> Option<DateTime<Utc>> {
        self.read(|ledger| {
            ledger
                .deals
                .get(id)
                .ok()
                .and_then(|deal| self.timeouts.refund_eligible_at(deal))
        })
    }

    /// Number of deals ever opened.
    #[must_use]
    pub fn deal_count(&self) -> usize {
        self.read(|ledger| ledger.deals.len())
    }

    /// Audit listing: every deal ever opened, in id order.
    #[must_use]
    pub fn deals(&self) -> Vec<Deal> {
        self.read(|ledger| ledger.deals.iter().cloned().collect())
    }

    /// Number of parties currently holding the operator role.
    #[must_use]
    pub fn operator_count(&self) -> usize {
        self.read(|ledger| ledger.access.operator_count())
    }

    // =================================================================
    // Internals
    // =================================================================

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read the committed ledger. Waits while another thread is inside an
    /// operation; the thread inside one reads its own staged record.
    fn read<T>(&self, query: impl FnOnce(&Ledger) -> T) -> T {
        let _token = self.gate.observe();
        query(&self.ledger())
    }

    /// Inside an operation only: the gate is already held.
    fn load(&self, id: DealId) -> Result<Deal> {
        self.ledger().deals.get(id).cloned()
    }

    /// Run `op` inside the gate, logging rejections.
    fn run<T>(
        &self,
        op: &'static str,
        deal_id: Option<DealId>,
        body: impl FnOnce() -> Result<T>,
    ) -> Result<T> {
        let _token = self.gate.enter().inspect_err(|err| {
            warn!(op, deal_id = deal_id.map(|id| id.0), code = err.code(), "operation refused");
        })?;
        body().inspect_err(|err| {
            warn!(op, deal_id = deal_id.map(|id| id.0), code = err.code(), error = %err, "operation rejected");
        })
    }

    fn require_holder(&self, asset: &AssetRef, expected: &PartyId) -> Result<()> {
        let actual = self.custody.current_holder(asset)?;
        if actual != *expected {
            return Err(CustodyError::NotHolder {
                expected: *expected,
                actual,
            }
            .into());
        }
        Ok(())
    }

    /// Stage `staged`, then perform `movement`. If the movement fails the
    /// registry is restored to `previous` and the custody error returned.
    fn apply(&self, previous: &Deal, staged: Deal, movement: Option<Movement>) -> Result<()> {
        self.ledger().deals.replace(staged)?;
        let Some(movement) = movement else {
            return Ok(());
        };

        if let Err(err) = self.move_custody(previous.id, &movement) {
            warn!(deal_id = previous.id.0, error = %err, "custody transfer failed; rolling back");
            self.ledger().deals.replace(previous.clone())?;
            return Err(err.into());
        }
        Ok(())
    }

    fn move_custody(&self, id: DealId, movement: &Movement) -> CustodyResult<()> {
        if !movement.inbound {
            return self.custody.transfer(
                &movement.asset,
                &self.custodian,
                &movement.from,
                &movement.to,
                None,
            );
        }

        *self.inbound_slot() = Some((id, movement.asset.clone(), movement.from));
        let result = self.custody.transfer(
            &movement.asset,
            &self.custodian,
            &movement.from,
            &movement.to,
            Some(self as &dyn CustodyReceiver),
        );
        *self.inbound_slot() = None;
        result
    }

    fn inbound_slot(&self) -> MutexGuard<'_, Option<(DealId, AssetRef, PartyId)>> {
        self.expected_inbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl CustodyReceiver for EscrowEngine {
    /// Accept only the inbound transfer a `deposit` is currently driving.
    fn on_custody_received(&self, asset: &AssetRef, from: &PartyId) -> CustodyResult<()> {
        let expected = self.inbound_slot().clone();
        let Some((id, expected_asset, expected_from)) = expected else {
            return Err(CustodyError::Rejected {
                reason: format!("no deposit in progress for {asset}"),
            });
        };
        if expected_asset != *asset || expected_from != *from {
            return Err(CustodyError::Rejected {
                reason: format!("unexpected transfer of {asset}"),
            });
        }
        let deposited = self
            .ledger()
            .deals
            .get(id)
            .is_ok_and(|deal| deal.state == DealState::Deposited);
        if deposited {
            Ok(())
        } else {
            Err(CustodyError::Rejected {
                reason: format!("{id} is not awaiting custody"),
            })
        }
    }
}

fn require_party(field: &'static str, party: &PartyId) -> Result<()> {
    if party.is_nil() {
        return Err(EscrowError::Validation {
            field,
            reason: "zero identity".into(),
        });
    }
    Ok(())
}

fn require_text(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EscrowError::Validation {
            field,
            reason: "must not be empty".into(),
        });
    }
    Ok(())
}

fn require_state(deal: &Deal, allowed: &[DealState]) -> Result<()> {
    if allowed.contains(&deal.state) {
        Ok(())
    } else {
        Err(EscrowError::StateMismatch {
            expected: allowed.to_vec(),
            actual: deal.state,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use custodia_registry::InMemoryAssetRegistry;
    use custodia_types::ManualClock;

    use super::*;
    use crate::sink::MemorySink;

    struct Fixture {
        engine: EscrowEngine,
        registry: Arc<InMemoryAssetRegistry>,
        clock: Arc<ManualClock>,
        sink: Arc<MemorySink>,
        admin: PartyId,
        operator: PartyId,
        seller: PartyId,
        buyer: PartyId,
        asset: AssetRef,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(InMemoryAssetRegistry::new("art"));
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let sink = Arc::new(MemorySink::new());
        let admin = PartyId::random();
        let operator = PartyId::random();
        let seller = PartyId::random();
        let buyer = PartyId::random();

        let engine = EscrowEngine::new(admin, registry.clone())
            .unwrap()
            .with_clock(clock.clone())
            .with_sink(sink.clone());
        engine.grant_operator(admin, operator).unwrap();

        let asset = registry.mint(1, seller).unwrap();
        registry
            .approve(&seller, &asset, Some(engine.custodian()))
            .unwrap();
        let _ = sink.drain();

        Fixture {
            engine,
            registry,
            clock,
            sink,
            admin,
            operator,
            seller,
            buyer,
            asset,
        }
    }

    impl Fixture {
        fn open(&self) -> DealId {
            self.engine
                .open(self.seller, self.buyer, self.asset.clone(), 100_000, "INV-1")
                .unwrap()
        }

        fn deposited(&self) -> DealId {
            let id = self.open();
            self.engine.deposit(self.seller, id, "INV-1").unwrap();
            id
        }

        fn agreed(&self) -> DealId {
            let id = self.deposited();
            self.engine
                .confirm_agreement(self.operator, id, "INV-1", "TOK-1")
                .unwrap();
            id
        }

        fn state(&self, id: DealId) -> DealState {
            self.engine.get_deal(id).unwrap().state
        }

        fn holder(&self) -> PartyId {
            self.registry.holder_of(&self.asset).unwrap()
        }
    }

    #[test]
    fn open_stores_only_commitment() {
        let f = fixture();
        let id = f.open();
        let deal = f.engine.get_deal(id).unwrap();
        assert_eq!(deal.state, DealState::Opened);
        assert_eq!(deal.seller, f.seller);
        assert_eq!(deal.correlation_hash, commitment::commit("INV-1"));
        assert!(deal.agreement_hash.is_none());
        assert!(deal.deposited_at.is_none());
        let json = serde_json::to_string(&deal).unwrap();
        assert!(!json.contains("INV-1"), "plaintext must not be stored");
    }

    #[test]
    fn open_validation() {
        let f = fixture();
        let cases: Vec<(Result<DealId>, &str)> = vec![
            (
                f.engine
                    .open(f.seller, PartyId::nil(), f.asset.clone(), 1, "INV"),
                "buyer",
            ),
            (
                f.engine
                    .open(f.seller, f.buyer, AssetRef::new("", 1), 1, "INV"),
                "asset",
            ),
            (
                f.engine.open(f.seller, f.buyer, f.asset.clone(), 0, "INV"),
                "price_cents",
            ),
            (
                f.engine.open(f.seller, f.buyer, f.asset.clone(), 1, ""),
                "correlation_id",
            ),
            (
                f.engine
                    .open(PartyId::nil(), f.buyer, f.asset.clone(), 1, "INV"),
                "seller",
            ),
        ];
        for (result, expected_field) in cases {
            match result {
                Err(EscrowError::Validation { field, .. }) => assert_eq!(field, expected_field),
                other => panic!("expected Validation({expected_field}), got {other:?}"),
            }
        }
        assert_eq!(f.engine.deal_count(), 0);
        assert_eq!(f.engine.next_id(), DealId(1));
    }

    #[test]
    fn deposit_moves_custody_and_stamps_time() {
        let f = fixture();
        let id = f.deposited();
        let deal = f.engine.get_deal(id).unwrap();
        assert_eq!(deal.state, DealState::Deposited);
        assert_eq!(deal.deposited_at, Some(f.clock.now()));
        assert_eq!(f.holder(), f.engine.custodian());

        let names: Vec<_> = f.sink.snapshot().iter().map(Notification::name).collect();
        assert_eq!(
            names,
            vec!["DEAL_OPENED", "ASSET_DEPOSITED", "AGREEMENT_REQUESTED"]
        );
    }

    #[test]
    fn deposit_twice_is_state_mismatch() {
        let f = fixture();
        let id = f.deposited();
        let err = f.engine.deposit(f.seller, id, "INV-1").unwrap_err();
        assert!(matches!(
            err,
            EscrowError::StateMismatch {
                actual: DealState::Deposited,
                ..
            }
        ));
        assert_eq!(f.state(id), DealState::Deposited);
    }

    #[test]
    fn deposit_only_by_seller() {
        let f = fixture();
        let id = f.open();
        for caller in [f.buyer, f.admin, f.operator] {
            let err = f.engine.deposit(caller, id, "INV-1").unwrap_err();
            assert!(matches!(
                err,
                EscrowError::Unauthorized {
                    required: Authority::Seller,
                    ..
                }
            ));
        }
        assert_eq!(f.state(id), DealState::Opened);
    }

    #[test]
    fn empty_correlation_is_validation_not_mismatch() {
        let f = fixture();
        let id = f.open();
        assert!(matches!(
            f.engine.deposit(f.seller, id, "").unwrap_err(),
            EscrowError::Validation {
                field: "correlation_id",
                ..
            }
        ));
        assert!(matches!(
            f.engine.deposit(f.seller, id, "INV-2").unwrap_err(),
            EscrowError::CommitmentMismatch {
                field: "correlation_id"
            }
        ));
    }

    #[test]
    fn deposit_without_authorization_fails_custody() {
        let f = fixture();
        f.registry.approve(&f.seller, &f.asset, None).unwrap();
        let id = f.open();
        let err = f.engine.deposit(f.seller, id, "INV-1").unwrap_err();
        assert!(matches!(
            err,
            EscrowError::CustodyFailure(CustodyError::NotAuthorized(_))
        ));
        assert_eq!(f.state(id), DealState::Opened);
        assert_eq!(f.holder(), f.seller);
    }

    #[test]
    fn deposit_when_seller_no_longer_holds() {
        let f = fixture();
        let id = f.open();
        let elsewhere = PartyId::random();
        f.registry
            .transfer(&f.asset, &f.seller, &f.seller, &elsewhere, None)
            .unwrap();
        let err = f.engine.deposit(f.seller, id, "INV-1").unwrap_err();
        assert!(matches!(
            err,
            EscrowError::CustodyFailure(CustodyError::NotHolder { .. })
        ));
        assert_eq!(f.state(id), DealState::Opened);
    }

    #[test]
    fn confirm_agreement_requires_operator_not_admin() {
        let f = fixture();
        let id = f.deposited();
        let err = f
            .engine
            .confirm_agreement(f.admin, id, "INV-1", "TOK-1")
            .unwrap_err();
        assert!(matches!(
            err,
            EscrowError::Unauthorized {
                required: Authority::Operator,
                ..
            }
        ));
        assert_eq!(f.state(id), DealState::Deposited);
    }

    #[test]
    fn confirm_agreement_validation_and_commitment() {
        let f = fixture();
        let id = f.deposited();
        assert!(matches!(
            f.engine
                .confirm_agreement(f.operator, id, "INV-1", " ")
                .unwrap_err(),
            EscrowError::Validation {
                field: "agreement_token",
                ..
            }
        ));
        assert!(matches!(
            f.engine
                .confirm_agreement(f.operator, id, "", "TOK-1")
                .unwrap_err(),
            EscrowError::Validation {
                field: "correlation_id",
                ..
            }
        ));
        assert!(matches!(
            f.engine
                .confirm_agreement(f.operator, id, "INV-1-EXTRA", "TOK-1")
                .unwrap_err(),
            EscrowError::CommitmentMismatch { .. }
        ));
        assert_eq!(f.state(id), DealState::Deposited);
    }

    #[test]
    fn confirm_agreement_stores_hash_and_time() {
        let f = fixture();
        let id = f.agreed();
        let deal = f.engine.get_deal(id).unwrap();
        assert_eq!(deal.state, DealState::AgreementConfirmed);
        assert_eq!(deal.agreement_hash, Some(commitment::commit("TOK-1")));
        assert_eq!(deal.agreed_at, Some(f.clock.now()));
        assert!(f.sink.snapshot().iter().any(|n| matches!(
            n,
            Notification::PaymentRequested { agreement_token, .. } if agreement_token == "TOK-1"
        )));
    }

    #[test]
    fn confirm_payment_amount_mismatch_carries_both() {
        let f = fixture();
        let id = f.agreed();
        let err = f
            .engine
            .confirm_payment(f.operator, id, "RXN-1", 99_999, "AUD")
            .unwrap_err();
        assert!(matches!(
            err,
            EscrowError::AmountMismatch {
                expected: 100_000,
                actual: 99_999
            }
        ));
        assert_eq!(f.state(id), DealState::AgreementConfirmed);
        assert_eq!(f.holder(), f.engine.custodian());
    }

    #[test]
    fn confirm_payment_requires_receipt_and_currency() {
        let f = fixture();
        let id = f.agreed();
        assert!(matches!(
            f.engine
                .confirm_payment(f.operator, id, "", 100_000, "AUD")
                .unwrap_err(),
            EscrowError::Validation {
                field: "receipt_ref",
                ..
            }
        ));
        assert!(matches!(
            f.engine
                .confirm_payment(f.operator, id, "RXN-1", 100_000, "")
                .unwrap_err(),
            EscrowError::Validation {
                field: "currency",
                ..
            }
        ));
    }

    #[test]
    fn confirm_payment_releases_to_buyer() {
        let f = fixture();
        let id = f.agreed();
        f.engine
            .confirm_payment(f.operator, id, "RXN-1", 100_000, "AUD")
            .unwrap();
        let deal = f.engine.get_deal(id).unwrap();
        assert_eq!(deal.state, DealState::Paid);
        assert_eq!(deal.closed_at, Some(f.clock.now()));
        let payment = deal.payment.unwrap();
        assert_eq!(payment.receipt_ref, "RXN-1");
        assert_eq!(payment.currency, "AUD");
        assert_eq!(f.holder(), f.buyer);
    }

    #[test]
    fn cancel_by_seller_or_admin_only_when_opened() {
        let f = fixture();
        let a = f.open();
        let b = f.open();
        assert!(f.engine.cancel(f.buyer, a).is_err());
        f.engine.cancel(f.seller, a).unwrap();
        f.engine.cancel(f.admin, b).unwrap();
        assert_eq!(f.state(a), DealState::Cancelled);
        assert_eq!(f.state(b), DealState::Cancelled);
        assert_eq!(f.holder(), f.seller, "cancel never moves custody");

        let c = f.deposited();
        assert!(matches!(
            f.engine.cancel(f.seller, c).unwrap_err(),
            EscrowError::StateMismatch { .. }
        ));
    }

    #[test]
    fn refund_before_window_fails_then_succeeds_at_boundary() {
        let f = fixture();
        let id = f.deposited();
        let eligible = f.clock.now() + Duration::days(7);
        assert_eq!(f.engine.refund_eligible_at(id), Some(eligible));

        f.clock.set(eligible - Duration::seconds(1));
        assert!(!f.engine.can_refund(id));
        assert!(matches!(
            f.engine.refund_asset(f.seller, id).unwrap_err(),
            EscrowError::TimeoutNotReached { eligible_at } if eligible_at == eligible
        ));

        f.clock.set(eligible);
        assert!(f.engine.can_refund(id));
        f.engine.refund_asset(f.seller, id).unwrap();
        assert_eq!(f.state(id), DealState::Refunded);
        assert_eq!(f.holder(), f.seller);
        assert!(!f.engine.can_refund(id), "terminal deals are never refundable");
    }

    #[test]
    fn refund_after_agreement_uses_payment_window() {
        let f = fixture();
        let id = f.agreed();
        f.clock.advance(Duration::days(29));
        assert!(f.engine.refund_asset(f.admin, id).is_err());
        f.clock.advance(Duration::days(1));
        f.engine.refund_asset(f.admin, id).unwrap();
        assert_eq!(f.holder(), f.seller);
    }

    #[test]
    fn refund_not_for_strangers_or_opened() {
        let f = fixture();
        let id = f.deposited();
        f.clock.advance(Duration::days(8));
        assert!(matches!(
            f.engine.refund_asset(f.operator, id).unwrap_err(),
            EscrowError::Unauthorized { .. }
        ));

        let opened = f
            .engine
            .open(f.seller, f.buyer, AssetRef::new("art", 2), 5, "INV-9")
            .unwrap();
        assert!(matches!(
            f.engine.refund_asset(f.seller, opened).unwrap_err(),
            EscrowError::StateMismatch { .. }
        ));
    }

    #[test]
    fn emergency_refund_from_opened_moves_nothing() {
        let f = fixture();
        let id = f.open();
        f.engine.emergency_refund(f.admin, id).unwrap();
        assert_eq!(f.state(id), DealState::Refunded);
        assert_eq!(f.holder(), f.seller);
        let names: Vec<_> = f.sink.snapshot().iter().map(Notification::name).collect();
        assert_eq!(names.last(), Some(&"DEAL_CANCELLED"));
        assert!(!names.contains(&"ASSET_REFUNDED"));
    }

    #[test]
    fn emergency_refund_is_admin_only_and_ignores_timeout() {
        let f = fixture();
        let id = f.agreed();
        assert!(f.engine.emergency_refund(f.seller, id).is_err());
        assert!(f.engine.emergency_refund(f.operator, id).is_err());
        f.engine.emergency_refund(f.admin, id).unwrap();
        assert_eq!(f.holder(), f.seller);
        assert_eq!(f.state(id), DealState::Refunded);
    }

    #[test]
    fn emergency_refund_after_paid_fails() {
        let f = fixture();
        let id = f.agreed();
        f.engine
            .confirm_payment(f.operator, id, "RXN-1", 100_000, "AUD")
            .unwrap();
        assert!(matches!(
            f.engine.emergency_refund(f.admin, id).unwrap_err(),
            EscrowError::StateMismatch {
                actual: DealState::Paid,
                ..
            }
        ));
        assert_eq!(f.holder(), f.buyer);
    }

    #[test]
    fn unknown_deal() {
        let f = fixture();
        assert!(matches!(
            f.engine.deposit(f.seller, DealId(9), "INV-1").unwrap_err(),
            EscrowError::DealNotFound(DealId(9))
        ));
        assert!(!f.engine.can_refund(DealId(9)));
        assert!(f.engine.refund_eligible_at(DealId(9)).is_none());
    }

    #[test]
    fn operator_administration_notifies() {
        let f = fixture();
        let newcomer = PartyId::random();
        f.engine.grant_operator(f.admin, newcomer).unwrap();
        assert!(f.engine.is_operator(&newcomer));
        f.engine.revoke_operator(f.admin, newcomer).unwrap();
        assert!(!f.engine.is_operator(&newcomer));
        assert!(f.engine.grant_operator(f.operator, newcomer).is_err());

        let names: Vec<_> = f.sink.drain().iter().map(Notification::name).collect();
        assert_eq!(names, vec!["OPERATOR_GRANTED", "OPERATOR_REVOKED"]);
    }

    #[test]
    fn receiver_rejects_unsolicited_transfer() {
        let f = fixture();
        let err = f
            .engine
            .on_custody_received(&f.asset, &f.seller)
            .unwrap_err();
        assert!(matches!(err, CustodyError::Rejected { .. }));

        let direct = f.registry.transfer(
            &f.asset,
            &f.seller,
            &f.seller,
            &f.engine.custodian(),
            Some(&f.engine as &dyn CustodyReceiver),
        );
        assert!(direct.is_err());
        assert_eq!(f.holder(), f.seller, "unsolicited transfer reverted");
    }

    #[test]
    fn with_config_replaces_windows() {
        let registry = Arc::new(InMemoryAssetRegistry::new("art"));
        let cfg = EscrowConfig {
            agreement_window_secs: 60,
            payment_window_secs: 120,
        };
        let engine = EscrowEngine::new(PartyId::random(), registry)
            .unwrap()
            .with_config(&cfg)
            .unwrap();
        assert_eq!(engine.timeouts().agreement_window(), Duration::seconds(60));
        assert_eq!(engine.timeouts().payment_window(), Duration::seconds(120));
    }

    #[test]
    fn nil_admin_or_custodian_rejected() {
        let registry: Arc<dyn CustodyBridge> = Arc::new(InMemoryAssetRegistry::new("art"));
        assert!(EscrowEngine::new(PartyId::nil(), registry.clone()).is_err());
        let engine = EscrowEngine::new(PartyId::random(), registry).unwrap();
        assert!(engine.with_custodian(PartyId::nil()).is_err());
    }

    #[test]
    fn audit_listing_and_operator_count() {
        let f = fixture();
        assert_eq!(f.engine.operator_count(), 1);
        assert!(f.engine.deals().is_empty());

        let a = f.open();
        let b = f
            .engine
            .open(f.seller, f.buyer, AssetRef::new("art", 2), 5, "INV-2")
            .unwrap();
        f.engine.cancel(f.seller, b).unwrap();

        let listed = f.engine.deals();
        let ids: Vec<_> = listed.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(listed[1].state, DealState::Cancelled, "terminal deals stay listed");

        f.engine.grant_operator(f.admin, PartyId::random()).unwrap();
        assert_eq!(f.engine.operator_count(), 2);
        f.engine.revoke_operator(f.admin, f.operator).unwrap();
        assert_eq!(f.engine.operator_count(), 1);
    }
}
