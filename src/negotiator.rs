//! The x402 payment negotiation driver.
//!
//! [`PaymentNegotiator::fetch`] runs one request/response exchange to
//! completion: perform the request, and if the server answers
//! `402 Payment Required`, parse its terms from the `X-PAYMENT-REQUIRED`
//! header, select the option on the wallet's network, enforce the
//! per-request ceiling and the wallet budget, sign a time-boxed
//! authorization, and retry once with the proof attached under
//! `X-PAYMENT`.
//!
//! The flow is a straight line with early exits. Every check happens
//! strictly before the wallet signs or spends anything, except the
//! post-payment retry itself, which by protocol design can still fail
//! after funds are committed (see
//! [`NegotiationError::PostPaymentRequestFailed`]).

use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::transport::{HttpExecutor, HttpExecutorError, HttpRequest, HttpResponse};
use crate::money::UsdAmount;
use crate::timestamp::{Clock, SystemClock};
use crate::types::{
    EvmAddress, PaymentPayload, PaymentRequired, Scheme, SettlementInfo, X402Version1,
};
use crate::util::Base64Bytes;
use crate::wallet::{PaymentIntent, Wallet, WalletError};

/// Header carrying payment terms on a 402 response.
pub const HEADER_PAYMENT_REQUIRED: &str = "X-PAYMENT-REQUIRED";
/// Header carrying the signed payment proof on the retry.
pub const HEADER_PAYMENT: &str = "X-PAYMENT";
/// Header optionally carrying settlement confirmation on a paid response.
pub const HEADER_PAYMENT_RESPONSE: &str = "X-PAYMENT-RESPONSE";

/// How long a signed authorization stays valid, from signing time.
pub const DEFAULT_GRACE_PERIOD_SECS: u64 = 300;

/// A request that may require payment, plus an optional per-request
/// price ceiling independent of the wallet budget.
#[derive(Debug, Clone)]
pub struct PaidRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
    pub max_price_usd: Option<UsdAmount>,
}

impl PaidRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            max_price_usd: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url, body: Vec<u8>) -> Self {
        let mut request = Self::new(Method::POST, url);
        request.body = Some(body);
        request
    }

    /// Caps what this single request may cost, on top of the wallet
    /// budget.
    pub fn with_max_price(mut self, max_price_usd: UsdAmount) -> Self {
        self.max_price_usd = Some(max_price_usd);
        self
    }

    pub fn with_header(mut self, name: http::header::HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    fn http_request(&self) -> HttpRequest {
        HttpRequest {
            method: self.method.clone(),
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.clone(),
        }
    }
}

/// How a negotiated exchange ended.
#[derive(Debug)]
pub enum FetchOutcome {
    /// The server answered without asking for payment.
    Ok(HttpResponse),
    /// The server answered with a non-402 error status; passed through
    /// uninterpreted.
    HttpError(HttpResponse),
    /// Payment is required and affordable, but auto-pay is disabled.
    /// Nothing was signed and no wallet state changed.
    PaymentNeeded {
        price_usd: UsdAmount,
        recipient: EvmAddress,
    },
    /// The resource was paid for and delivered.
    Paid(PaidOutcome),
}

/// A successful paid exchange.
#[derive(Debug)]
pub struct PaidOutcome {
    pub response: HttpResponse,
    pub amount_paid: UsdAmount,
    /// Settlement transaction hash, when the server reported one.
    pub transaction: Option<String>,
}

/// Failures of the negotiation protocol.
///
/// Every variant except [`PostPaymentRequestFailed`](Self::PostPaymentRequestFailed)
/// and [`Transport`](Self::Transport) on the retry leg occurs strictly
/// before signing, so wallet state is untouched.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    /// The 402 carried no terms, or terms that did not decode or parse.
    #[error("malformed payment requirements: {0}")]
    MalformedRequirements(String),
    /// The terms offered an empty list of payment options.
    #[error("no payment options offered in 402 response")]
    NoOptions,
    /// No offered option settles on the wallet's network.
    #[error("no compatible payment option: wallet is on {wallet_network}, offered {offered:?}")]
    NoCompatibleOption {
        wallet_network: String,
        offered: Vec<String>,
    },
    /// The price exceeds the caller's ceiling for this request.
    #[error("price ${price} exceeds per-request limit ${limit}")]
    PriceExceedsRequestLimit { price: UsdAmount, limit: UsdAmount },
    /// The price exceeds what the wallet has left.
    #[error("price ${price} exceeds remaining budget ${remaining}")]
    PriceExceedsBudget {
        price: UsdAmount,
        remaining: UsdAmount,
    },
    /// `BudgetExceeded` or `SigningFailed` from the wallet, unchanged.
    #[error(transparent)]
    Wallet(#[from] WalletError),
    /// The retry failed after the spend was committed. The payment is
    /// not rolled back; `amount_paid` is gone from the budget.
    #[error(
        "request failed after payment: ${amount_paid} was already spent and is not rolled back ({detail})"
    )]
    PostPaymentRequestFailed {
        amount_paid: UsdAmount,
        status: Option<StatusCode>,
        detail: String,
    },
    /// The signed payload could not be serialized.
    #[error("failed to encode payment payload")]
    PaymentHeaderEncoding(#[source] serde_json::Error),
    /// The encoded payload could not be placed in an HTTP header.
    #[error("failed to encode payment header value")]
    PaymentHeaderValue(#[source] http::header::InvalidHeaderValue),
    /// Transport failure on the initial round trip.
    #[error(transparent)]
    Transport(#[from] HttpExecutorError),
}

/// Drives 402 negotiations against one wallet.
pub struct PaymentNegotiator<E> {
    wallet: Arc<Wallet>,
    executor: E,
    auto_pay: bool,
    grace_period_secs: u64,
    clock: Arc<dyn Clock>,
}

impl<E: HttpExecutor> PaymentNegotiator<E> {
    pub fn new(wallet: Arc<Wallet>, executor: E) -> Self {
        Self {
            wallet,
            executor,
            auto_pay: true,
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
            clock: Arc::new(SystemClock),
        }
    }

    /// When disabled, an affordable 402 yields
    /// [`FetchOutcome::PaymentNeeded`] instead of signing.
    pub fn with_auto_pay(mut self, auto_pay: bool) -> Self {
        self.auto_pay = auto_pay;
        self
    }

    /// Overrides how long signed authorizations remain valid.
    pub fn with_grace_period(mut self, secs: u64) -> Self {
        self.grace_period_secs = secs;
        self
    }

    /// Replaces the clock capability. For deterministic tests.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn wallet(&self) -> &Wallet {
        &self.wallet
    }

    /// Runs one exchange to completion, paying if the server demands it
    /// and the price clears every check.
    #[instrument(name = "x402.fetch", skip_all, err, fields(method = %request.method, url = %request.url))]
    pub async fn fetch(&self, request: PaidRequest) -> Result<FetchOutcome, NegotiationError> {
        let initial = self.executor.execute(request.http_request()).await?;

        if initial.status != StatusCode::PAYMENT_REQUIRED {
            if initial.status.as_u16() >= 400 {
                debug!(status = %initial.status, "request failed without payment negotiation");
                return Ok(FetchOutcome::HttpError(initial));
            }
            return Ok(FetchOutcome::Ok(initial));
        }

        debug!("received 402 Payment Required");
        self.settle(request, initial).await
    }

    /// The 402 leg: parse terms, select, check, sign, retry, resolve.
    async fn settle(
        &self,
        request: PaidRequest,
        response: HttpResponse,
    ) -> Result<FetchOutcome, NegotiationError> {
        let required = parse_requirements(&response)?;
        if required.accepts.is_empty() {
            return Err(NegotiationError::NoOptions);
        }

        // First option on the wallet's network, by exact identifier
        // match. No cross-network substitution.
        let option = required
            .accepts
            .iter()
            .find(|option| option.network == self.wallet.network())
            .ok_or_else(|| NegotiationError::NoCompatibleOption {
                wallet_network: self.wallet.network().to_string(),
                offered: required
                    .accepts
                    .iter()
                    .map(|option| option.network.clone())
                    .collect(),
            })?;

        let recipient: EvmAddress = option.pay_to.parse().map_err(|_| {
            NegotiationError::MalformedRequirements(format!(
                "invalid payTo address: {}",
                option.pay_to
            ))
        })?;
        let price_usd = UsdAmount::from_token_units(option.max_amount_required).map_err(|e| {
            NegotiationError::MalformedRequirements(format!(
                "maxAmountRequired {} not expressible: {e}",
                option.max_amount_required
            ))
        })?;
        debug!(price = %price_usd, network = %option.network, recipient = %recipient, "selected payment option");

        if let Some(limit) = request.max_price_usd {
            if price_usd > limit {
                return Err(NegotiationError::PriceExceedsRequestLimit {
                    price: price_usd,
                    limit,
                });
            }
        }
        if !self.wallet.can_afford(price_usd).await {
            return Err(NegotiationError::PriceExceedsBudget {
                price: price_usd,
                remaining: self.wallet.remaining_usd().await,
            });
        }

        if !self.auto_pay {
            info!(price = %price_usd, recipient = %recipient, "auto-pay disabled; reporting payment needed");
            return Ok(FetchOutcome::PaymentNeeded {
                price_usd,
                recipient,
            });
        }

        let now = self.clock.now();
        let signed = self
            .wallet
            .sign_payment(PaymentIntent {
                recipient,
                amount_usd: price_usd,
                valid_after: now,
                valid_before: now + self.grace_period_secs,
                resource: request.url.to_string(),
            })
            .await?;

        let payload = PaymentPayload {
            x402_version: X402Version1,
            scheme: Scheme::Exact,
            network: self.wallet.network().to_string(),
            payload: signed,
        };
        let json = serde_json::to_vec(&payload).map_err(NegotiationError::PaymentHeaderEncoding)?;
        let header_value = HeaderValue::from_bytes(Base64Bytes::encode(json).as_ref())
            .map_err(NegotiationError::PaymentHeaderValue)?;

        let mut retry = request.http_request();
        retry.headers.insert(HEADER_PAYMENT, header_value);
        info!(price = %price_usd, "retrying request with payment attached");

        // From here on the spend is committed; failures are surfaced as
        // post-payment errors, never rolled back.
        let paid_response = self.executor.execute(retry).await.map_err(|e| {
            NegotiationError::PostPaymentRequestFailed {
                amount_paid: price_usd,
                status: None,
                detail: e.0.to_string(),
            }
        })?;
        if paid_response.status.as_u16() >= 400 {
            return Err(NegotiationError::PostPaymentRequestFailed {
                amount_paid: price_usd,
                status: Some(paid_response.status),
                detail: paid_response.text(),
            });
        }

        let transaction = extract_transaction(&paid_response);
        info!(
            price = %price_usd,
            transaction = transaction.as_deref().unwrap_or("unreported"),
            "payment accepted"
        );
        Ok(FetchOutcome::Paid(PaidOutcome {
            response: paid_response,
            amount_paid: price_usd,
            transaction,
        }))
    }
}

/// Decodes the terms document from a 402 response's header.
fn parse_requirements(response: &HttpResponse) -> Result<PaymentRequired, NegotiationError> {
    let header = response.headers.get(HEADER_PAYMENT_REQUIRED).ok_or_else(|| {
        NegotiationError::MalformedRequirements(format!(
            "402 response missing {HEADER_PAYMENT_REQUIRED} header"
        ))
    })?;
    PaymentRequired::try_from(Base64Bytes::from(header.as_bytes()))
        .map_err(|e| NegotiationError::MalformedRequirements(e.to_string()))
}

/// Reads the optional settlement confirmation. Malformed content is
/// logged and ignored; the payment already succeeded from the wallet's
/// perspective.
fn extract_transaction(response: &HttpResponse) -> Option<String> {
    let header = response.headers.get(HEADER_PAYMENT_RESPONSE)?;
    match SettlementInfo::try_from(Base64Bytes::from(header.as_bytes())) {
        Ok(info) => Some(info.transaction_hash),
        Err(error) => {
            warn!(%error, "ignoring malformed payment confirmation header");
            None
        }
    }
}
