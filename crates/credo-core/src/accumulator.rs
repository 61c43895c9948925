//! RSA accumulator engine for identity credentials
//!
//! The accumulator maintains a single value A that represents the set of all
//! currently valid identities. Each identity is represented by a prime p_i:
//!
//! A = g^(p1 * p2 * ... * pn) mod N
//!
//! where g is the public base and N a modulus whose factorization is held
//! nowhere in this crate. A membership witness for p_i is the accumulator over
//! every other member, so `w^p_i mod N == A`.
//!
//! Without the factorization an element cannot be removed in O(1). Revocation
//! therefore recomputes the accumulator over the surviving members.
//!
//! State changes are split into two steps. `stage_*` computes a [`Transition`]
//! without touching the engine, and [`AccumulatorEngine::commit`] applies it.
//! A caller can hand the staged history entry to durable storage in between
//! and simply drop the transition if that fails.

use num_bigint::BigUint;
use num_integer::Integer;
use num_traits::{One, Zero};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::history::{HistoryEntry, HistoryLog, Operation};
use crate::prime::RESERVED_PRIME_BOUND;
use crate::types::{biguint_hex, IdentityHash};

/// RSA-2048 challenge number. Its factorization was destroyed when it was
/// published and has never been recovered.
pub const RSA2048_MODULUS: &str = "2519590847565789349402718324004839857142928212620403202777713783604366202070\
    7595556264018525880784406918290641249515082189298559149176184502808489120072\
    8449926873928072877767359714183472702618963750149718246911650776133798590957\
    0009733045974880842840179742910064245869181719511874612151517265463228221686\
    9987549182422433637259085141865462043576798423387184774447920739934236584823\
    8242811981638150106748104516603773060562016196762561338441436038339044149526\
    3443219011465754445417842402092461651572335077870774981712577246796292638635\
    6373289912154831438167899885040445364023527381951378636564391212010397122822\
    120720357";

/// Default public base (the empty accumulator)
pub const DEFAULT_BASE: u64 = 65537;

/// Public accumulator parameters, fixed for the lifetime of an accumulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorParams {
    /// RSA modulus N
    #[serde(with = "biguint_hex")]
    pub modulus: BigUint,

    /// Base g, the accumulator value at generation 0
    #[serde(with = "biguint_hex")]
    pub base: BigUint,
}

impl AccumulatorParams {
    /// Validate and create accumulator parameters
    pub fn new(modulus: BigUint, base: BigUint) -> Result<Self> {
        if modulus < BigUint::from(3u8) {
            return Err(Error::InvalidModulus(format!(
                "modulus must be at least 3, got {}",
                modulus
            )));
        }
        if modulus.is_even() {
            return Err(Error::InvalidModulus("modulus must be odd".to_string()));
        }
        if base <= BigUint::one() || base >= modulus {
            return Err(Error::InvalidBase(
                "base must satisfy 1 < base < modulus".to_string(),
            ));
        }
        if !base.gcd(&modulus).is_one() {
            return Err(Error::InvalidBase(
                "base must be coprime to the modulus".to_string(),
            ));
        }

        Ok(Self { modulus, base })
    }

    /// Parameters over the RSA-2048 challenge modulus with the default base
    pub fn rsa2048() -> Result<Self> {
        let modulus = BigUint::parse_bytes(RSA2048_MODULUS.as_bytes(), 10)
            .ok_or_else(|| Error::InvalidModulus("malformed RSA-2048 constant".to_string()))?;
        Self::new(modulus, BigUint::from(DEFAULT_BASE))
    }
}

/// Accumulator state at one generation
///
/// Invariant: `0 < value < modulus`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccumulatorState {
    /// RSA modulus N
    #[serde(with = "biguint_hex")]
    pub modulus: BigUint,

    /// Current accumulator value A
    #[serde(with = "biguint_hex")]
    pub value: BigUint,

    /// Version counter (increments on each state change)
    pub generation: u64,
}

impl AccumulatorState {
    /// The empty accumulator: A_0 = g
    pub fn genesis(params: &AccumulatorParams) -> Self {
        Self {
            modulus: params.modulus.clone(),
            value: params.base.clone(),
            generation: 0,
        }
    }

    /// Verify that an element is IN the accumulator
    ///
    /// Given witness w for prime p, checks `w^p mod N == A`. Witnesses issued
    /// for another generation, or carrying a non-canonical value, are rejected
    /// outright.
    pub fn verify(&self, prime: &BigUint, witness: &Witness) -> bool {
        if witness.generation != self.generation {
            return false;
        }
        self.verify_value(prime, &witness.value)
    }

    /// Algebraic membership check on a raw witness value
    pub fn verify_value(&self, prime: &BigUint, witness: &BigUint) -> bool {
        if witness.is_zero() || *witness >= self.modulus {
            return false;
        }
        witness.modpow(prime, &self.modulus) == self.value
    }
}

/// Membership witness proving an identity IS in the accumulator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Witness {
    /// The identity this witness is for
    pub identity_hash: IdentityHash,

    /// The witness value (accumulator over all other members)
    #[serde(with = "biguint_hex")]
    pub value: BigUint,

    /// Generation of the accumulator this witness verifies against
    pub generation: u64,
}

/// Refresh a witness after another element was added: `w' = w^p mod N`
pub fn update_witness(old_witness: &BigUint, added_prime: &BigUint, modulus: &BigUint) -> BigUint {
    old_witness.modpow(added_prime, modulus)
}

/// Accumulate a set of primes from the base: `g^(p1 * ... * pn) mod N`
///
/// Exponentiates one prime at a time so the product is never materialized.
pub fn accumulate<'a, I>(base: &BigUint, primes: I, modulus: &BigUint) -> BigUint
where
    I: IntoIterator<Item = &'a BigUint>,
{
    primes
        .into_iter()
        .fold(base % modulus, |acc, prime| acc.modpow(prime, modulus))
}

/// Check that a prime is well formed for accumulation
///
/// Primality itself is the encoder's job; the engine only rejects even values
/// and anything inside the reserved small-prime range.
pub fn validate_prime(prime: &BigUint) -> Result<()> {
    if prime.is_even() {
        return Err(Error::InvalidPrime("prime must be odd".to_string()));
    }
    if *prime <= BigUint::from(RESERVED_PRIME_BOUND) {
        return Err(Error::InvalidPrime(format!(
            "prime must exceed the reserved bound {}",
            RESERVED_PRIME_BOUND
        )));
    }
    Ok(())
}

/// A computed but not yet applied state change
#[derive(Debug, Clone)]
pub struct Transition {
    entry: HistoryEntry,
    state: AccumulatorState,
    witness: Option<Witness>,
}

impl Transition {
    /// History entry this transition appends
    pub fn entry(&self) -> &HistoryEntry {
        &self.entry
    }

    /// State after the transition
    pub fn state(&self) -> &AccumulatorState {
        &self.state
    }

    /// Witness for a newly added identity (additions only)
    pub fn witness(&self) -> Option<&Witness> {
        self.witness.as_ref()
    }
}

/// Single-writer owner of the accumulator state and its history
#[derive(Debug, Clone, Default)]
pub struct AccumulatorEngine {
    history: Option<HistoryLog>,
    state: Option<AccumulatorState>,
}

impl AccumulatorEngine {
    /// Create an uninitialized engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild an engine whose live state is the tip of an existing history
    pub fn restore(history: HistoryLog) -> Self {
        let state = history.tip();
        Self {
            history: Some(history),
            state: Some(state),
        }
    }

    /// One-time setup. Sets generation 0 with value = base.
    pub fn initialize(&mut self, modulus: BigUint, base: BigUint) -> Result<AccumulatorState> {
        if self.history.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let params = AccumulatorParams::new(modulus, base)?;
        let state = AccumulatorState::genesis(&params);

        self.history = Some(HistoryLog::new(params));
        self.state = Some(state.clone());

        Ok(state)
    }

    pub fn is_initialized(&self) -> bool {
        self.history.is_some()
    }

    /// Current accumulator state
    pub fn state(&self) -> Result<&AccumulatorState> {
        self.state.as_ref().ok_or(Error::NotInitialized)
    }

    pub fn params(&self) -> Result<&AccumulatorParams> {
        self.history().map(|history| history.params())
    }

    pub fn history(&self) -> Result<&HistoryLog> {
        self.history.as_ref().ok_or(Error::NotInitialized)
    }

    /// Compute the addition of `prime`: A' = A^prime mod N
    ///
    /// The witness for the new identity is the accumulator before the
    /// addition. Duplicate membership is the caller's responsibility.
    pub fn stage_add(&self, identity_hash: IdentityHash, prime: &BigUint) -> Result<Transition> {
        let state = self.state()?;
        validate_prime(prime)?;

        let value = state.value.modpow(prime, &state.modulus);
        let generation = state.generation + 1;

        let entry = HistoryEntry {
            generation,
            operation: Operation::Add(identity_hash),
            resulting_value: value.clone(),
            previous_value: state.value.clone(),
        };
        let witness = Witness {
            identity_hash,
            value: state.value.clone(),
            generation,
        };

        Ok(Transition {
            entry,
            state: AccumulatorState {
                modulus: state.modulus.clone(),
                value,
                generation,
            },
            witness: Some(witness),
        })
    }

    /// Compute the revocation of `prime` by recomputing over the survivors
    ///
    /// `survivors` must be every other active prime. Membership is checked
    /// algebraically: the survivors' accumulator raised to `prime` has to
    /// reproduce the current value.
    pub fn stage_revoke<'a, I>(
        &self,
        identity_hash: IdentityHash,
        prime: &BigUint,
        survivors: I,
    ) -> Result<Transition>
    where
        I: IntoIterator<Item = &'a BigUint>,
    {
        let state = self.state()?;
        let params = self.params()?;
        validate_prime(prime)?;

        let survivors: Vec<&BigUint> = survivors.into_iter().collect();
        if survivors.contains(&prime) {
            return Err(Error::NotAMember(format!(
                "{} is listed among the survivors",
                identity_hash.short()
            )));
        }

        let value = accumulate(&params.base, survivors.iter().copied(), &state.modulus);
        if value.modpow(prime, &state.modulus) != state.value {
            return Err(Error::NotAMember(identity_hash.short()));
        }

        let generation = state.generation + 1;
        let entry = HistoryEntry {
            generation,
            operation: Operation::Revoke(identity_hash),
            resulting_value: value.clone(),
            previous_value: state.value.clone(),
        };

        Ok(Transition {
            entry,
            state: AccumulatorState {
                modulus: state.modulus.clone(),
                value,
                generation,
            },
            witness: None,
        })
    }

    /// Apply a staged transition
    ///
    /// Fails with `GenerationMismatch` if the transition was staged against a
    /// state that is no longer current.
    pub fn commit(&mut self, transition: Transition) -> Result<AccumulatorState> {
        let history = self.history.as_mut().ok_or(Error::NotInitialized)?;
        history.append(transition.entry)?;
        self.state = Some(transition.state.clone());
        Ok(transition.state)
    }

    /// Add an element, returning the new state and the new member's witness
    pub fn add(
        &mut self,
        identity_hash: IdentityHash,
        prime: &BigUint,
    ) -> Result<(AccumulatorState, Witness)> {
        let mut transition = self.stage_add(identity_hash, prime)?;
        let witness = transition.witness.take().ok_or(Error::NotInitialized)?;
        let state = self.commit(transition)?;
        Ok((state, witness))
    }

    /// Revoke an element, recomputing the accumulator over `survivors`
    pub fn revoke<'a, I>(
        &mut self,
        identity_hash: IdentityHash,
        prime: &BigUint,
        survivors: I,
    ) -> Result<AccumulatorState>
    where
        I: IntoIterator<Item = &'a BigUint>,
    {
        let transition = self.stage_revoke(identity_hash, prime, survivors)?;
        self.commit(transition)
    }

    /// Check a witness against the live accumulator
    pub fn verify(&self, prime: &BigUint, witness: &Witness) -> Result<bool> {
        Ok(self.state()?.verify(prime, witness))
    }
}
