//! # Vault Registry Contract
//!
//! Deterministic in-memory model of the EDU Vault ledger contract. It holds
//! every vault, its recipients and their claimable balances, and enforces
//! the contract's rules:
//!
//! 1. **Create** — anyone may create a vault; the caller becomes its
//!    depositor. Ids are sequential.
//! 2. **Deposit / Withdraw** — only the depositor. A withdrawal may not dip
//!    into funds already allocated to recipients.
//! 3. **Register** — only the depositor; each address at most once per
//!    vault. Recipient ids are sequential per vault.
//! 4. **Allocate** — only the depositor, bounded by unallocated funds.
//! 5. **Claim** — only the address owning the recipient id, bounded by its
//!    claimable balance. Claimed funds leave the vault entirely.
//!
//! The registry also keeps the native balance of every account it has seen.
//! Deposits are paid from the caller's balance; withdrawals and claims are
//! paid into it. An unseen account starts with the devnet faucet amount.
//!
//! All amount arithmetic is checked.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use edu_vault_protocol::address::Address;
use edu_vault_protocol::amount::Wei;
use edu_vault_protocol::config::{
    DEVNET_STARTING_BALANCE_EDU, FIRST_RECIPIENT_ID, FIRST_VAULT_ID, NATIVE_DECIMALS,
};
use edu_vault_protocol::ledger::{RecipientEntry, RecipientId, VaultId};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why the contract refused a call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    /// No vault with this id.
    #[error("unknown vault {0}")]
    UnknownVault(VaultId),

    /// A depositor-only call from someone else.
    #[error("caller {caller} is not the depositor of vault {vault}")]
    NotDepositor {
        /// Target vault.
        vault: VaultId,
        /// Who called.
        caller: Address,
    },

    /// Vault names must not be blank.
    #[error("vault name is empty")]
    EmptyName,

    /// Zero-value deposits, withdrawals, allocations and claims are refused.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// Withdrawal or allocation larger than the unallocated funds.
    #[error("exceeds unallocated funds: requested {requested}, available {available}")]
    ExceedsUnallocated {
        /// Amount asked for.
        requested: Wei,
        /// Deposited minus allocated.
        available: Wei,
    },

    /// Claim larger than the recipient's claimable balance.
    #[error("exceeds claimable balance: requested {requested}, available {available}")]
    ExceedsClaimable {
        /// Amount asked for.
        requested: Wei,
        /// The recipient's claimable balance.
        available: Wei,
    },

    /// The address already has a recipient id in this vault.
    #[error("{recipient} is already registered on vault {vault}")]
    AlreadyRegistered {
        /// Target vault.
        vault: VaultId,
        /// The address.
        recipient: Address,
    },

    /// The address has no recipient id in this vault.
    #[error("{address} is not registered on vault {vault}")]
    NotRegistered {
        /// Target vault.
        vault: VaultId,
        /// The address.
        address: Address,
    },

    /// No recipient with this id in this vault.
    #[error("unknown recipient {recipient} on vault {vault}")]
    UnknownRecipient {
        /// Target vault.
        vault: VaultId,
        /// The id asked for.
        recipient: RecipientId,
    },

    /// A claim for a recipient id the caller does not own.
    #[error("caller {caller} does not own recipient {recipient} on vault {vault}")]
    NotRecipientOwner {
        /// Target vault.
        vault: VaultId,
        /// The id asked for.
        recipient: RecipientId,
        /// Who called.
        caller: Address,
    },

    /// The caller's native balance cannot cover a deposit.
    #[error("insufficient native balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Amount attached to the call.
        requested: Wei,
        /// The caller's balance.
        available: Wei,
    },

    /// Arithmetic would leave the 128-bit range.
    #[error("amount overflow")]
    AmountOverflow,
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A registered recipient of one vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    pub address: Address,
    /// Allocated and not yet claimed.
    pub claimable: Wei,
}

/// One vault as the contract stores it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vault {
    pub id: VaultId,
    pub name: String,
    pub depositor: Address,
    pub total_deposited: Wei,
    pub total_allocated: Wei,
    /// In registration order.
    pub recipients: Vec<Recipient>,
    pub created_at: DateTime<Utc>,
}

impl Vault {
    /// Deposited funds not allocated to anyone.
    pub fn unallocated(&self) -> Wei {
        self.total_deposited.saturating_sub(self.total_allocated)
    }

    fn recipient_by_address(&self, address: &Address) -> Option<&Recipient> {
        self.recipients.iter().find(|r| &r.address == address)
    }

    fn recipient_mut(&mut self, id: RecipientId) -> Result<&mut Recipient, ContractError> {
        let vault = self.id;
        self.recipients
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or(ContractError::UnknownRecipient {
                vault,
                recipient: id,
            })
    }

    fn require_depositor(&self, caller: &Address) -> Result<(), ContractError> {
        if &self.depositor != caller {
            return Err(ContractError::NotDepositor {
                vault: self.id,
                caller: caller.clone(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Every vault on the ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultRegistry {
    vaults: BTreeMap<VaultId, Vault>,
    next_vault_id: u64,
    accounts: HashMap<Address, Wei>,
    starting_balance: Wei,
}

impl VaultRegistry {
    /// An empty registry whose first vault gets id 1.
    pub fn new() -> Self {
        Self::starting_at(FIRST_VAULT_ID)
    }

    /// An empty registry whose first vault gets `first_id`.
    pub fn starting_at(first_id: u64) -> Self {
        Self {
            vaults: BTreeMap::new(),
            next_vault_id: first_id,
            accounts: HashMap::new(),
            starting_balance: Wei::new(
                DEVNET_STARTING_BALANCE_EDU * 10u128.pow(u32::from(NATIVE_DECIMALS)),
            ),
        }
    }

    /// Balance given to accounts on first sight.
    pub fn with_starting_balance(mut self, balance: Wei) -> Self {
        self.starting_balance = balance;
        self
    }

    /// Sets the native balance of `address`.
    pub fn fund(&mut self, address: &Address, balance: Wei) {
        self.accounts.insert(address.clone(), balance);
    }

    /// Number of vaults ever created.
    pub fn vault_count(&self) -> usize {
        self.vaults.len()
    }

    /// Looks up a vault.
    pub fn vault(&self, id: VaultId) -> Result<&Vault, ContractError> {
        self.vaults.get(&id).ok_or(ContractError::UnknownVault(id))
    }

    fn vault_mut(&mut self, id: VaultId) -> Result<&mut Vault, ContractError> {
        self.vaults.get_mut(&id).ok_or(ContractError::UnknownVault(id))
    }

    // -- reads --------------------------------------------------------------

    /// Vaults whose depositor is `depositor`, by id.
    pub fn depositor_vaults(&self, depositor: &Address) -> Vec<VaultId> {
        self.vaults
            .values()
            .filter(|v| &v.depositor == depositor)
            .map(|v| v.id)
            .collect()
    }

    /// Vaults where `recipient` has a positive claimable balance, by id.
    pub fn recipient_vaults(&self, recipient: &Address) -> Vec<VaultId> {
        self.vaults
            .values()
            .filter(|v| {
                v.recipient_by_address(recipient)
                    .is_some_and(|r| !r.claimable.is_zero())
            })
            .map(|v| v.id)
            .collect()
    }

    /// Native balance of `address`.
    pub fn native_balance(&self, address: &Address) -> Wei {
        self.accounts
            .get(address)
            .copied()
            .unwrap_or(self.starting_balance)
    }

    pub fn vault_name(&self, vault: VaultId) -> Result<String, ContractError> {
        Ok(self.vault(vault)?.name.clone())
    }

    pub fn total_deposit(&self, vault: VaultId) -> Result<Wei, ContractError> {
        Ok(self.vault(vault)?.total_deposited)
    }

    pub fn total_allocated(&self, vault: VaultId) -> Result<Wei, ContractError> {
        Ok(self.vault(vault)?.total_allocated)
    }

    /// Recipient id of `address` in `vault`.
    pub fn recipient_id(&self, vault: VaultId, address: &Address) -> Result<RecipientId, ContractError> {
        self.vault(vault)?
            .recipient_by_address(address)
            .map(|r| r.id)
            .ok_or_else(|| ContractError::NotRegistered {
                vault,
                address: address.clone(),
            })
    }

    /// Claimable balance of `recipient` in `vault`.
    pub fn recipient_balance(&self, vault: VaultId, recipient: RecipientId) -> Result<Wei, ContractError> {
        self.vault(vault)?
            .recipients
            .iter()
            .find(|r| r.id == recipient)
            .map(|r| r.claimable)
            .ok_or(ContractError::UnknownRecipient { vault, recipient })
    }

    /// Registered recipients, in registration order.
    pub fn list_recipients(&self, vault: VaultId) -> Result<Vec<RecipientEntry>, ContractError> {
        Ok(self
            .vault(vault)?
            .recipients
            .iter()
            .map(|r| RecipientEntry {
                address: r.address.clone(),
                recipient_id: r.id,
            })
            .collect())
    }

    // -- mutations ----------------------------------------------------------

    /// Creates a vault owned by `caller`.
    pub fn create_vault(&mut self, caller: &Address, name: &str) -> Result<VaultId, ContractError> {
        if name.trim().is_empty() {
            return Err(ContractError::EmptyName);
        }
        let id = VaultId(self.next_vault_id);
        self.next_vault_id = self
            .next_vault_id
            .checked_add(1)
            .ok_or(ContractError::AmountOverflow)?;
        self.vaults.insert(
            id,
            Vault {
                id,
                name: name.to_string(),
                depositor: caller.clone(),
                total_deposited: Wei::ZERO,
                total_allocated: Wei::ZERO,
                recipients: Vec::new(),
                created_at: Utc::now(),
            },
        );
        Ok(id)
    }

    /// Moves `amount` from the caller's native balance into the vault.
    pub fn deposit(&mut self, caller: &Address, vault: VaultId, amount: Wei) -> Result<(), ContractError> {
        require_positive(amount)?;
        let available = self.native_balance(caller);
        let v = self.vault_mut(vault)?;
        v.require_depositor(caller)?;
        let remaining = available
            .checked_sub(amount)
            .ok_or(ContractError::InsufficientBalance {
                requested: amount,
                available,
            })?;
        v.total_deposited = v
            .total_deposited
            .checked_add(amount)
            .ok_or(ContractError::AmountOverflow)?;
        self.accounts.insert(caller.clone(), remaining);
        Ok(())
    }

    /// Returns `amount` of unallocated funds to the depositor.
    pub fn depositor_withdraw(
        &mut self,
        caller: &Address,
        vault: VaultId,
        amount: Wei,
    ) -> Result<(), ContractError> {
        require_positive(amount)?;
        let credited = self.credited(caller, amount)?;
        let v = self.vault_mut(vault)?;
        v.require_depositor(caller)?;
        let available = v.unallocated();
        if amount > available {
            return Err(ContractError::ExceedsUnallocated {
                requested: amount,
                available,
            });
        }
        v.total_deposited = v
            .total_deposited
            .checked_sub(amount)
            .ok_or(ContractError::AmountOverflow)?;
        self.accounts.insert(caller.clone(), credited);
        Ok(())
    }

    /// Registers `recipient` on the vault and returns its new id.
    pub fn register_recipient(
        &mut self,
        caller: &Address,
        vault: VaultId,
        recipient: &Address,
    ) -> Result<RecipientId, ContractError> {
        let v = self.vault_mut(vault)?;
        v.require_depositor(caller)?;
        if v.recipient_by_address(recipient).is_some() {
            return Err(ContractError::AlreadyRegistered {
                vault,
                recipient: recipient.clone(),
            });
        }
        let id = RecipientId(FIRST_RECIPIENT_ID + v.recipients.len() as u64);
        v.recipients.push(Recipient {
            id,
            address: recipient.clone(),
            claimable: Wei::ZERO,
        });
        Ok(id)
    }

    /// Moves `amount` of unallocated funds to the recipient's claimable
    /// balance.
    pub fn allocate(
        &mut self,
        caller: &Address,
        vault: VaultId,
        amount: Wei,
        recipient: RecipientId,
    ) -> Result<(), ContractError> {
        require_positive(amount)?;
        let v = self.vault_mut(vault)?;
        v.require_depositor(caller)?;
        let available = v.unallocated();
        if amount > available {
            return Err(ContractError::ExceedsUnallocated {
                requested: amount,
                available,
            });
        }
        let new_allocated = v
            .total_allocated
            .checked_add(amount)
            .ok_or(ContractError::AmountOverflow)?;
        let r = v.recipient_mut(recipient)?;
        r.claimable = r
            .claimable
            .checked_add(amount)
            .ok_or(ContractError::AmountOverflow)?;
        v.total_allocated = new_allocated;
        Ok(())
    }

    /// Pays `amount` of the recipient's claimable balance out of the vault.
    pub fn recipient_withdraw(
        &mut self,
        caller: &Address,
        vault: VaultId,
        amount: Wei,
        recipient: RecipientId,
    ) -> Result<(), ContractError> {
        require_positive(amount)?;
        let credited = self.credited(caller, amount)?;
        let v = self.vault_mut(vault)?;
        let r = v.recipient_mut(recipient)?;
        if &r.address != caller {
            return Err(ContractError::NotRecipientOwner {
                vault,
                recipient,
                caller: caller.clone(),
            });
        }
        if amount > r.claimable {
            return Err(ContractError::ExceedsClaimable {
                requested: amount,
                available: r.claimable,
            });
        }
        r.claimable = r
            .claimable
            .checked_sub(amount)
            .ok_or(ContractError::AmountOverflow)?;
        v.total_allocated = v
            .total_allocated
            .checked_sub(amount)
            .ok_or(ContractError::AmountOverflow)?;
        v.total_deposited = v
            .total_deposited
            .checked_sub(amount)
            .ok_or(ContractError::AmountOverflow)?;
        self.accounts.insert(caller.clone(), credited);
        Ok(())
    }

    /// `address`'s balance after receiving `amount`.
    fn credited(&self, address: &Address, amount: Wei) -> Result<Wei, ContractError> {
        self.native_balance(address)
            .checked_add(amount)
            .ok_or(ContractError::AmountOverflow)
    }
}

impl Default for VaultRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn require_positive(amount: Wei) -> Result<(), ContractError> {
    if amount.is_zero() {
        return Err(ContractError::ZeroAmount);
    }
    Ok(())
}
