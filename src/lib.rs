//! Budget-capped x402 micropayments for autonomous HTTP agents.
//!
//! The [x402](https://www.x402.org) protocol gates HTTP resources behind
//! `402 Payment Required` responses carrying machine-readable payment
//! terms. This crate implements the paying side: a [`Wallet`] that signs
//! ERC-3009 `TransferWithAuthorization` messages against a hard USD
//! budget, and a [`PaymentNegotiator`] that detects 402 responses, picks
//! a compatible payment option, signs a time-boxed single-use
//! authorization, and retries the request with the proof attached.
//!
//! The wallet enforces two safety properties that matter when an
//! unattended agent holds the purse:
//!
//! - **No overspending.** `spent <= budget` holds after every signature;
//!   the affordability check and the spend commit share one critical
//!   section, so concurrent negotiations cannot double-claim the last
//!   cent.
//! - **No replay.** Every authorization carries a fresh random 32-byte
//!   nonce and a bounded validity window.
//!
//! # Quickstart
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use x402_wallet::{PaidRequest, PaymentNegotiator, ReqwestExecutor, UsdAmount, Wallet};
//!
//! // A wallet on Base, capped at $10, keyed from the environment.
//! let wallet = Arc::new(Wallet::from_env(
//!     "WALLET_PRIVATE_KEY",
//!     "eip155:8453",
//!     UsdAmount::parse("10")?,
//! )?);
//!
//! let negotiator = PaymentNegotiator::new(wallet.clone(), ReqwestExecutor::default());
//! let outcome = negotiator
//!     .fetch(PaidRequest::get("https://api.example.com/data".parse()?)
//!         .with_max_price(UsdAmount::parse("0.05")?))
//!     .await?;
//!
//! println!("{:#?}", wallet.payment_summary().await);
//! ```
//!
//! # Modules
//!
//! - [`networks`] - Registry of known USDC deployments (CAIP-2 ids plus
//!   legacy aliases)
//! - [`authorization`] - EIP-712 typed data for ERC-3009 authorizations
//! - [`wallet`] - Budget-capped signing wallet and payment history
//! - [`negotiator`] - The 402 negotiate-sign-retry driver
//! - [`transport`] - The HTTP executor capability and its reqwest adapter
//! - [`types`] - Wire types with exact serde contracts
//! - [`money`] - Fixed-point USD amounts and token-unit conversion
//! - [`timestamp`] - Unix timestamps and the clock capability
//! - [`util`] - Base64 helpers
//!
//! # Capabilities, not dependencies
//!
//! Signing, transport, time, and randomness all enter through injectable
//! capabilities (`alloy_signer::Signer`, [`HttpExecutor`],
//! [`timestamp::Clock`], [`wallet::NonceSource`]), so hosts can swap key
//! storage or transport, and tests run deterministic and offline.

pub mod authorization;
pub mod money;
pub mod negotiator;
pub mod networks;
pub mod timestamp;
pub mod transport;
pub mod types;
pub mod util;
pub mod wallet;

pub use transport::{HttpExecutor, HttpExecutorError, HttpRequest, HttpResponse, ReqwestExecutor};
pub use money::{USDC_DECIMALS, UsdAmount, UsdAmountError};
pub use negotiator::{
    DEFAULT_GRACE_PERIOD_SECS, FetchOutcome, HEADER_PAYMENT, HEADER_PAYMENT_REQUIRED,
    HEADER_PAYMENT_RESPONSE, NegotiationError, PaidOutcome, PaidRequest, PaymentNegotiator,
};
pub use networks::{NetworkConfig, UnknownNetwork};
pub use timestamp::{Clock, SystemClock, UnixTimestamp};
pub use wallet::{
    NonceSource, PaymentIntent, PaymentRecord, PaymentSummary, RandomNonceSource, Wallet,
    WalletError,
};
