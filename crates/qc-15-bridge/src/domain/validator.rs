//! Validator set and quorum rules.
//!
//! The set is the per-epoch voting-power table the bridge signs against.
//! Quorum rules may change at fork heights, so the oracle answers for a
//! specific block number.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use super::bls::BlsPublicKey;
use super::value_objects::Address;

/// One validator entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorMetadata {
    /// Validator address.
    pub address: Address,
    /// BLS key votes are verified against.
    pub bls_key: BlsPublicKey,
    /// Voting power.
    pub voting_power: u64,
    /// Whether the validator is currently active.
    pub is_active: bool,
}

impl ValidatorMetadata {
    /// Active validator with the given power.
    pub fn new(address: Address, bls_key: BlsPublicKey, voting_power: u64) -> Self {
        Self {
            address,
            bls_key,
            voting_power,
            is_active: true,
        }
    }
}

/// Fraction of total voting power required for quorum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumRule {
    numerator: u64,
    denominator: u64,
    /// `true` requires strictly more than the fraction, `false` at least the fraction.
    strict: bool,
}

impl QuorumRule {
    /// At least `numerator / denominator` of total power.
    pub const fn at_least(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
            strict: false,
        }
    }

    /// Strictly more than `numerator / denominator` of total power.
    pub const fn more_than(numerator: u64, denominator: u64) -> Self {
        Self {
            numerator,
            denominator,
            strict: true,
        }
    }

    /// Default BFT rule: at least two thirds.
    pub const fn two_thirds() -> Self {
        Self::at_least(2, 3)
    }

    /// Whether `power` out of `total` satisfies the rule.
    pub fn is_met(&self, power: u64, total: u64) -> bool {
        if total == 0 || self.denominator == 0 {
            return false;
        }
        let lhs = u128::from(power) * u128::from(self.denominator);
        let rhs = u128::from(total) * u128::from(self.numerator);
        if self.strict {
            lhs > rhs
        } else {
            lhs >= rhs
        }
    }
}

impl Default for QuorumRule {
    fn default() -> Self {
        Self::two_thirds()
    }
}

/// Quorum rules keyed by activation block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumSchedule {
    rules: BTreeMap<u64, QuorumRule>,
}

impl QuorumSchedule {
    /// One rule for every block.
    pub fn fixed(rule: QuorumRule) -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(0, rule);
        Self { rules }
    }

    /// Add a rule taking effect from `block` onwards.
    pub fn with_fork(mut self, block: u64, rule: QuorumRule) -> Self {
        self.rules.insert(block, rule);
        self
    }

    /// Rule active at `block`.
    pub fn rule_at(&self, block: u64) -> QuorumRule {
        self.rules
            .range(..=block)
            .next_back()
            .map(|(_, rule)| *rule)
            .unwrap_or_default()
    }
}

impl Default for QuorumSchedule {
    fn default() -> Self {
        Self::fixed(QuorumRule::two_thirds())
    }
}

/// Answers whether a set of signers holds quorum at a block.
pub trait QuorumOracle {
    /// Whether `signers` reach quorum under the rule active at `block_number`.
    fn has_quorum(&self, block_number: u64, signers: &HashSet<Address>) -> bool;
}

/// Voting-power table for one epoch.
#[derive(Clone, Debug, Default)]
pub struct ValidatorSet {
    validators: Vec<ValidatorMetadata>,
    index_by_address: HashMap<Address, usize>,
    total_power: u64,
    quorum: QuorumSchedule,
}

impl ValidatorSet {
    /// Build a set with the default quorum schedule.
    ///
    /// Later duplicates of an address are ignored.
    pub fn new(validators: Vec<ValidatorMetadata>) -> Self {
        Self::with_quorum(validators, QuorumSchedule::default())
    }

    /// Build a set with an explicit quorum schedule.
    pub fn with_quorum(validators: Vec<ValidatorMetadata>, quorum: QuorumSchedule) -> Self {
        let mut set = Self {
            validators: Vec::with_capacity(validators.len()),
            index_by_address: HashMap::with_capacity(validators.len()),
            total_power: 0,
            quorum,
        };
        for validator in validators {
            if set.index_by_address.contains_key(&validator.address) {
                continue;
            }
            if validator.is_active {
                set.total_power = set.total_power.saturating_add(validator.voting_power);
            }
            set.index_by_address
                .insert(validator.address, set.validators.len());
            set.validators.push(validator);
        }
        set
    }

    /// Validator at bitmap index `idx`.
    pub fn get(&self, idx: usize) -> Option<&ValidatorMetadata> {
        self.validators.get(idx)
    }

    /// Validator by address.
    pub fn by_address(&self, address: &Address) -> Option<&ValidatorMetadata> {
        self.index_of(address).and_then(|idx| self.validators.get(idx))
    }

    /// Bitmap index of an address.
    pub fn index_of(&self, address: &Address) -> Option<usize> {
        self.index_by_address.get(address).copied()
    }

    /// Whether `address` is an active member.
    pub fn includes(&self, address: &Address) -> bool {
        self.by_address(address).is_some_and(|v| v.is_active)
    }

    /// Number of validators.
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Total active voting power.
    pub fn total_voting_power(&self) -> u64 {
        self.total_power
    }

    /// Combined active voting power of `signers`.
    pub fn voting_power_of(&self, signers: &HashSet<Address>) -> u64 {
        signers
            .iter()
            .filter_map(|address| self.by_address(address))
            .filter(|v| v.is_active)
            .fold(0u64, |acc, v| acc.saturating_add(v.voting_power))
    }

    /// Validators in index order.
    pub fn iter(&self) -> impl Iterator<Item = &ValidatorMetadata> {
        self.validators.iter()
    }
}

impl QuorumOracle for ValidatorSet {
    fn has_quorum(&self, block_number: u64, signers: &HashSet<Address>) -> bool {
        let rule = self.quorum.rule_at(block_number);
        rule.is_met(self.voting_power_of(signers), self.total_power)
    }
}
