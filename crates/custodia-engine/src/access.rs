//! Access control: two flat authority sets.
//!
//! One admin, fixed at construction, and an operator set the admin manages.
//! There is no hierarchy: the admin is not an operator unless it has been
//! granted the role explicitly. Checks run at the top of each operation.

use std::collections::HashSet;

use custodia_types::{Authority, Deal, EscrowError, PartyId, Result, Role};

/// Role membership for one escrow instance.
#[derive(Debug, Clone)]
pub struct AccessControl {
    /// The single administrator.
    admin: PartyId,
    /// Parties allowed to confirm off-ledger facts.
    operators: HashSet<PartyId>,
}

impl AccessControl {
    /// Create the table with `admin` and no operators.
    ///
    /// # Errors
    /// Returns `Validation` if `admin` is the zero identity.
    pub fn new(admin: PartyId) -> Result<Self> {
        if admin.is_nil() {
            return Err(EscrowError::Validation {
                field: "admin",
                reason: "zero identity".into(),
            });
        }
        Ok(Self {
            admin,
            operators: HashSet::new(),
        })
    }

    #[must_use]
    pub fn admin(&self) -> PartyId {
        self.admin
    }

    #[must_use]
    pub fn has_role(&self, party: &PartyId, role: Role) -> bool {
        match role {
            Role::Admin => *party == self.admin,
            Role::Operator => self.operators.contains(party),
        }
    }

    /// Number of operators currently granted.
    #[must_use]
    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }

    /// Add `party` to the operator set. Admin only.
    /// Returns `false` if it was already an operator.
    pub fn grant_operator(&mut self, caller: &PartyId, party: PartyId) -> Result<bool> {
        self.require(caller, Authority::Admin, None)?;
        if party.is_nil() {
            return Err(EscrowError::Validation {
                field: "operator",
                reason: "zero identity".into(),
            });
        }
        Ok(self.operators.insert(party))
    }

    /// Remove `party` from the operator set. Admin only.
    /// Returns `false` if it was not an operator.
    pub fn revoke_operator(&mut self, caller: &PartyId, party: &PartyId) -> Result<bool> {
        self.require(caller, Authority::Admin, None)?;
        Ok(self.operators.remove(party))
    }

    /// Check `caller` against `required`. Deal-relative authorities need the
    /// deal; without one they fail closed.
    ///
    /// # Errors
    /// Returns `Unauthorized` carrying the caller and the requirement.
    pub fn require(&self, caller: &PartyId, required: Authority, deal: Option<&Deal>) -> Result<()> {
        let is_seller = deal.is_some_and(|d| d.seller == *caller);
        let allowed = match required {
            Authority::Admin => self.has_role(caller, Role::Admin),
            Authority::Operator => self.has_role(caller, Role::Operator),
            Authority::Seller => is_seller,
            Authority::SellerOrAdmin => is_seller || self.has_role(caller, Role::Admin),
        };
        if allowed {
            Ok(())
        } else {
            Err(EscrowError::Unauthorized {
                caller: *caller,
                required,
            })
        }
    }
}
