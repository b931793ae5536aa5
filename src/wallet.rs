//! Budget-capped payment wallet.
//!
//! A [`Wallet`] pairs an opaque signing capability with a USD budget and
//! an append-only payment history. [`Wallet::sign_payment`] is the single
//! mutating operation: it checks affordability, signs an ERC-3009
//! authorization, and commits the spend, all inside one critical
//! section, so concurrent negotiations sharing a wallet can never both
//! pass a budget check that only one of them can satisfy.

use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use rand::{Rng, rng};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::authorization;
use crate::money::UsdAmount;
use crate::networks::{self, NetworkConfig, UnknownNetwork};
use crate::timestamp::{Clock, SystemClock, UnixTimestamp};
use crate::types::{
    EvmAddress, EvmSignature, ExactEvmPayload, ExactEvmPayloadAuthorization, HexEncodedNonce,
    TokenAmount,
};

/// Source of per-authorization replay-guard nonces.
///
/// Production uses [`RandomNonceSource`]; tests pin a
/// [`FixedNonceSource`].
pub trait NonceSource: Send + Sync {
    fn next_nonce(&self) -> [u8; 32];
}

/// Draws 32 random bytes from the OS-seeded CSPRNG per authorization.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomNonceSource;

impl NonceSource for RandomNonceSource {
    fn next_nonce(&self) -> [u8; 32] {
        rng().random()
    }
}

/// Always returns the same nonce. For deterministic tests only.
#[derive(Debug, Clone, Copy)]
pub struct FixedNonceSource(pub [u8; 32]);

impl NonceSource for FixedNonceSource {
    fn next_nonce(&self) -> [u8; 32] {
        self.0
    }
}

/// One payment to sign: recipient, price, validity window, and the
/// resource being paid for. `valid_after` must precede `valid_before`.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub recipient: EvmAddress,
    pub amount_usd: UsdAmount,
    pub valid_after: UnixTimestamp,
    pub valid_before: UnixTimestamp,
    /// Opaque resource identifier, typically the URL being paid for.
    pub resource: String,
}

/// Immutable log entry for one signed payment.
#[derive(Debug, Clone)]
pub struct PaymentRecord {
    pub resource: String,
    pub amount_usd: UsdAmount,
    pub amount_units: TokenAmount,
    pub recipient: EvmAddress,
    pub signature: EvmSignature,
    pub nonce: HexEncodedNonce,
    pub timestamp: UnixTimestamp,
    pub valid_before: UnixTimestamp,
}

/// Read-only projection of the wallet's state and history.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSummary {
    pub wallet_address: EvmAddress,
    pub network: String,
    pub budget_usd: UsdAmount,
    pub spent_usd: UsdAmount,
    pub remaining_usd: UsdAmount,
    pub payment_count: usize,
    pub payments: Vec<PaymentSummaryRow>,
}

/// One history row of [`PaymentSummary`], in insertion order.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentSummaryRow {
    pub resource: String,
    pub amount_usd: UsdAmount,
    pub recipient: EvmAddress,
    pub timestamp: UnixTimestamp,
}

/// Errors from wallet construction and signing.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    #[error(transparent)]
    UnknownNetwork(#[from] UnknownNetwork),
    /// The payment would push `spent` past `budget`. State is unchanged.
    #[error("cannot afford ${requested}: remaining budget ${remaining}")]
    BudgetExceeded {
        requested: UsdAmount,
        remaining: UsdAmount,
    },
    /// The signing capability failed. State is unchanged.
    #[error("failed to sign payment authorization")]
    SigningFailed(#[source] alloy_signer::Error),
    /// The named environment variable is unset or empty.
    #[error("environment variable {0} is not set")]
    MissingCredential(String),
    /// The named environment variable does not hold a parseable key.
    #[error("environment variable {variable} does not hold a valid private key")]
    InvalidPrivateKey {
        variable: String,
        #[source]
        source: alloy_signer_local::LocalSignerError,
    },
}

/// Mutable wallet state, guarded as one unit.
#[derive(Debug)]
struct Ledger {
    budget_usd: UsdAmount,
    spent_usd: UsdAmount,
    payments: Vec<PaymentRecord>,
}

/// A signing wallet with a USD budget ceiling.
///
/// Construction resolves the network identifier against the registry and
/// fails fast on unknown networks, before any state exists. Address and
/// network are immutable for the wallet's lifetime; budget, spend total,
/// and history live behind one mutex (see §concurrency note on
/// [`sign_payment`](Wallet::sign_payment)).
pub struct Wallet {
    address: EvmAddress,
    network_id: String,
    config: &'static NetworkConfig,
    signer: Arc<dyn Signer + Send + Sync>,
    nonce_source: Arc<dyn NonceSource>,
    clock: Arc<dyn Clock>,
    ledger: Mutex<Ledger>,
}

impl std::fmt::Debug for Wallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .field("network", &self.network_id)
            .finish_non_exhaustive()
    }
}

impl Wallet {
    /// Creates a wallet from a signing capability.
    ///
    /// `network` may be a canonical CAIP-2 identifier or a legacy alias;
    /// the identifier is kept verbatim for option matching and outbound
    /// payloads.
    pub fn new<S>(signer: S, network: &str, budget_usd: UsdAmount) -> Result<Self, WalletError>
    where
        S: Signer + Send + Sync + 'static,
    {
        let config = networks::resolve(network)?;
        let address = EvmAddress(signer.address());
        Ok(Self {
            address,
            network_id: network.to_string(),
            config,
            signer: Arc::new(signer),
            nonce_source: Arc::new(RandomNonceSource),
            clock: Arc::new(SystemClock),
            ledger: Mutex::new(Ledger {
                budget_usd,
                spent_usd: UsdAmount::ZERO,
                payments: Vec::new(),
            }),
        })
    }

    /// Creates a wallet with a freshly generated private key.
    pub fn generate(network: &str, budget_usd: UsdAmount) -> Result<Self, WalletError> {
        Self::new(PrivateKeySigner::random(), network, budget_usd)
    }

    /// Creates a wallet from a hex private key held in the named
    /// environment variable.
    pub fn from_env(var: &str, network: &str, budget_usd: UsdAmount) -> Result<Self, WalletError> {
        let key = std::env::var(var)
            .ok()
            .filter(|value| !value.is_empty())
            .ok_or_else(|| WalletError::MissingCredential(var.to_string()))?;
        let signer = key
            .parse::<PrivateKeySigner>()
            .map_err(|source| WalletError::InvalidPrivateKey {
                variable: var.to_string(),
                source,
            })?;
        Self::new(signer, network, budget_usd)
    }

    /// Replaces the clock capability. For deterministic tests.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replaces the nonce source. For deterministic tests.
    pub fn with_nonce_source<N: NonceSource + 'static>(mut self, nonce_source: N) -> Self {
        self.nonce_source = Arc::new(nonce_source);
        self
    }

    /// The address derived from the signing key.
    pub fn address(&self) -> EvmAddress {
        self.address
    }

    /// The network identifier this wallet was configured with.
    pub fn network(&self) -> &str {
        &self.network_id
    }

    /// The resolved chain parameters.
    pub fn network_config(&self) -> &'static NetworkConfig {
        self.config
    }

    pub async fn budget_usd(&self) -> UsdAmount {
        self.ledger.lock().await.budget_usd
    }

    pub async fn spent_usd(&self) -> UsdAmount {
        self.ledger.lock().await.spent_usd
    }

    pub async fn remaining_usd(&self) -> UsdAmount {
        let ledger = self.ledger.lock().await;
        ledger.budget_usd.saturating_sub(ledger.spent_usd)
    }

    /// Whether a payment of `amount_usd` fits the remaining budget.
    pub async fn can_afford(&self, amount_usd: UsdAmount) -> bool {
        amount_usd <= self.remaining_usd().await
    }

    /// Signs a transfer authorization and commits the spend.
    ///
    /// The affordability check, signing, and commit run under one lock:
    /// no concurrent `sign_payment` observes the state between check and
    /// commit. Nothing is mutated on any failure path: a
    /// [`WalletError::BudgetExceeded`] or [`WalletError::SigningFailed`]
    /// leaves `spent` and the history exactly as they were.
    #[instrument(skip_all, err, fields(resource = %intent.resource, amount = %intent.amount_usd))]
    pub async fn sign_payment(
        &self,
        intent: PaymentIntent,
    ) -> Result<ExactEvmPayload, WalletError> {
        let mut ledger = self.ledger.lock().await;

        let remaining = ledger.budget_usd.saturating_sub(ledger.spent_usd);
        if intent.amount_usd > remaining {
            return Err(WalletError::BudgetExceeded {
                requested: intent.amount_usd,
                remaining,
            });
        }

        let amount_units = intent.amount_usd.to_token_units();
        let nonce = HexEncodedNonce(self.nonce_source.next_nonce());
        let authorization = ExactEvmPayloadAuthorization {
            from: self.address,
            to: intent.recipient,
            value: amount_units,
            valid_after: intent.valid_after,
            valid_before: intent.valid_before,
            nonce,
        };

        let hash = authorization::signing_hash(self.config, &authorization);
        let signature = self
            .signer
            .sign_hash(&hash)
            .await
            .map_err(WalletError::SigningFailed)?;
        let signature = EvmSignature::from(signature.as_bytes());

        ledger.spent_usd += intent.amount_usd;
        ledger.payments.push(PaymentRecord {
            resource: intent.resource,
            amount_usd: intent.amount_usd,
            amount_units,
            recipient: intent.recipient,
            signature,
            nonce,
            timestamp: self.clock.now(),
            valid_before: intent.valid_before,
        });
        tracing::debug!(
            spent = %ledger.spent_usd,
            payments = ledger.payments.len(),
            "payment authorization signed"
        );

        Ok(ExactEvmPayload {
            signature,
            authorization,
        })
    }

    /// Zeroes the spend total and clears the history. A new budget may be
    /// supplied; otherwise the current one is kept.
    pub async fn reset_budget(&self, new_budget: Option<UsdAmount>) {
        let mut ledger = self.ledger.lock().await;
        if let Some(budget) = new_budget {
            ledger.budget_usd = budget;
        }
        ledger.spent_usd = UsdAmount::ZERO;
        ledger.payments.clear();
    }

    /// Snapshot of address, network, budget figures, and history rows in
    /// insertion order.
    pub async fn payment_summary(&self) -> PaymentSummary {
        let ledger = self.ledger.lock().await;
        PaymentSummary {
            wallet_address: self.address,
            network: self.network_id.clone(),
            budget_usd: ledger.budget_usd,
            spent_usd: ledger.spent_usd,
            remaining_usd: ledger.budget_usd.saturating_sub(ledger.spent_usd),
            payment_count: ledger.payments.len(),
            payments: ledger
                .payments
                .iter()
                .map(|p| PaymentSummaryRow {
                    resource: p.resource.clone(),
                    amount_usd: p.amount_usd,
                    recipient: p.recipient,
                    timestamp: p.timestamp,
                })
                .collect(),
        }
    }

    /// Copy of the full payment history.
    pub async fn payments(&self) -> Vec<PaymentRecord> {
        self.ledger.lock().await.payments.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp::FixedClock;
    use alloy_primitives::address;
    use std::sync::Arc;

    const TEST_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

    fn usd(s: &str) -> UsdAmount {
        UsdAmount::parse(s).unwrap()
    }

    fn test_wallet(budget: &str) -> Wallet {
        let signer: PrivateKeySigner = TEST_KEY.parse().unwrap();
        Wallet::new(signer, "eip155:84532", usd(budget))
            .unwrap()
            .with_clock(FixedClock(UnixTimestamp::from_secs(1_700_000_000)))
            .with_nonce_source(FixedNonceSource([0x42; 32]))
    }

    fn intent(amount: &str) -> PaymentIntent {
        PaymentIntent {
            recipient: address!("0x209693Bc6afc0C5328bA36FaF03C514EF312287C").into(),
            amount_usd: usd(amount),
            valid_after: UnixTimestamp::from_secs(1_700_000_000),
            valid_before: UnixTimestamp::from_secs(1_700_000_300),
            resource: "https://api.example.com/data".to_string(),
        }
    }

    #[tokio::test]
    async fn fresh_wallet_has_full_budget() {
        let wallet = test_wallet("10");
        assert_eq!(wallet.spent_usd().await, UsdAmount::ZERO);
        assert_eq!(wallet.remaining_usd().await, usd("10"));
        assert!(wallet.can_afford(usd("10")).await);
        assert!(!wallet.can_afford(usd("10.000001")).await);
        assert!(wallet.payments().await.is_empty());
    }

    #[test]
    fn construction_rejects_unknown_networks() {
        let signer: PrivateKeySigner = TEST_KEY.parse().unwrap();
        let err = Wallet::new(signer, "polygon", usd("10")).unwrap_err();
        assert!(matches!(err, WalletError::UnknownNetwork(_)));
    }

    #[test]
    fn alias_and_canonical_network_share_chain_parameters() {
        let by_alias = test_wallet("10");
        let signer: PrivateKeySigner = TEST_KEY.parse().unwrap();
        let canonical = Wallet::new(signer, "base-sepolia", usd("10")).unwrap();
        assert_eq!(
            by_alias.network_config().chain_id,
            canonical.network_config().chain_id
        );
        // But the configured identifier is preserved verbatim.
        assert_eq!(by_alias.network(), "eip155:84532");
        assert_eq!(canonical.network(), "base-sepolia");
    }

    #[tokio::test]
    async fn sign_payment_commits_spend_and_history() {
        let wallet = test_wallet("10");
        let payload = wallet.sign_payment(intent("0.01")).await.unwrap();

        assert_eq!(payload.authorization.from, wallet.address());
        assert_eq!(
            payload.authorization.to,
            address!("0x209693Bc6afc0C5328bA36FaF03C514EF312287C").into()
        );
        assert_eq!(payload.authorization.value, TokenAmount::from(10_000u64));
        assert_eq!(payload.authorization.nonce.0, [0x42; 32]);

        assert_eq!(wallet.spent_usd().await, usd("0.01"));
        assert_eq!(wallet.remaining_usd().await, usd("9.99"));
        let payments = wallet.payments().await;
        assert_eq!(payments.len(), 1);
        assert_eq!(payments[0].resource, "https://api.example.com/data");
        assert_eq!(payments[0].amount_usd, usd("0.01"));
        assert_eq!(payments[0].timestamp, UnixTimestamp::from_secs(1_700_000_000));
    }

    #[tokio::test]
    async fn sign_payment_rejects_over_budget_without_mutation() {
        let wallet = test_wallet("0.005");
        let err = wallet.sign_payment(intent("0.01")).await.unwrap_err();
        assert!(matches!(
            err,
            WalletError::BudgetExceeded { requested, remaining }
                if requested == usd("0.01") && remaining == usd("0.005")
        ));
        assert_eq!(wallet.spent_usd().await, UsdAmount::ZERO);
        assert!(wallet.payments().await.is_empty());
    }

    #[tokio::test]
    async fn spending_accumulates_to_the_ceiling() {
        let wallet = test_wallet("0.03");
        wallet.sign_payment(intent("0.01")).await.unwrap();
        wallet.sign_payment(intent("0.01")).await.unwrap();
        wallet.sign_payment(intent("0.01")).await.unwrap();
        assert_eq!(wallet.spent_usd().await, usd("0.03"));
        let err = wallet.sign_payment(intent("0.01")).await.unwrap_err();
        assert!(matches!(err, WalletError::BudgetExceeded { .. }));
        assert_eq!(wallet.payments().await.len(), 3);
    }

    #[tokio::test]
    async fn concurrent_signing_never_double_spends() {
        let wallet = Arc::new(test_wallet("0.01"));
        let (a, b) = tokio::join!(
            wallet.sign_payment(intent("0.01")),
            wallet.sign_payment(intent("0.01")),
        );
        let successes = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(successes, 1, "exactly one of two concurrent signs may win");
        assert_eq!(wallet.spent_usd().await, usd("0.01"));
        assert_eq!(wallet.payments().await.len(), 1);
    }

    #[tokio::test]
    async fn reset_budget_clears_spend_and_history() {
        let wallet = test_wallet("10");
        wallet.sign_payment(intent("0.01")).await.unwrap();

        wallet.reset_budget(None).await;
        assert_eq!(wallet.spent_usd().await, UsdAmount::ZERO);
        assert_eq!(wallet.budget_usd().await, usd("10"));
        assert!(wallet.payments().await.is_empty());

        wallet.reset_budget(Some(usd("20"))).await;
        assert_eq!(wallet.budget_usd().await, usd("20"));
        assert_eq!(wallet.remaining_usd().await, usd("20"));
    }

    #[tokio::test]
    async fn payment_summary_reports_history_in_order() {
        let wallet = test_wallet("10");
        let mut first = intent("0.01");
        first.resource = "https://api.example.com/a".to_string();
        let mut second = intent("0.02");
        second.resource = "https://api.example.com/b".to_string();
        wallet.sign_payment(first).await.unwrap();
        wallet.sign_payment(second).await.unwrap();

        let summary = wallet.payment_summary().await;
        assert_eq!(summary.network, "eip155:84532");
        assert_eq!(summary.budget_usd, usd("10"));
        assert_eq!(summary.spent_usd, usd("0.03"));
        assert_eq!(summary.remaining_usd, usd("9.97"));
        assert_eq!(summary.payment_count, 2);
        assert_eq!(summary.payments[0].resource, "https://api.example.com/a");
        assert_eq!(summary.payments[1].resource, "https://api.example.com/b");
    }

    #[test]
    fn from_env_requires_the_variable() {
        let err =
            Wallet::from_env("X402_WALLET_TEST_UNSET", "eip155:8453", usd("10")).unwrap_err();
        assert!(matches!(err, WalletError::MissingCredential(var) if var == "X402_WALLET_TEST_UNSET"));
    }

    #[test]
    fn from_env_rejects_garbage_keys() {
        unsafe { std::env::set_var("X402_WALLET_TEST_BAD_KEY", "not-a-key") };
        let err =
            Wallet::from_env("X402_WALLET_TEST_BAD_KEY", "eip155:8453", usd("10")).unwrap_err();
        assert!(matches!(err, WalletError::InvalidPrivateKey { .. }));
    }

    #[test]
    fn generate_produces_distinct_addresses() {
        let a = Wallet::generate("eip155:8453", usd("1")).unwrap();
        let b = Wallet::generate("eip155:8453", usd("1")).unwrap();
        assert_ne!(a.address(), b.address());
    }
}
