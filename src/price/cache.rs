//! BTC/AUD Price Cache
//!
//! One cached quote with an injected TTL and clock. Reads take the shared
//! lock; only a successful fetch takes the exclusive lock. The lock is never
//! held across the fetch itself.
//!
//! When a refresh fails the last known price is served and marked stale.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Only supported quote currency
pub const QUOTE_CURRENCY: &str = "AUD";

/// Price errors
#[derive(Debug, Error)]
pub enum PriceError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("price source returned an unusable price: {0}")]
    InvalidPrice(f64),

    #[error("price unavailable: {0}")]
    Unavailable(String),
}

/// Where prices come from
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Current BTC price in AUD
    async fn fetch_btc_aud(&self) -> Result<f64, PriceError>;
}

/// Monotonic time source
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A price as served to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Quote {
    pub price: f64,
    pub currency: &'static str,
    /// Served from the cache rather than a fresh fetch
    pub cached: bool,
    /// Older than the TTL because the refresh failed
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    price: f64,
    fetched_at: Instant,
}

/// TTL cache in front of a [`PriceSource`]
pub struct PriceCache {
    source: Arc<dyn PriceSource>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entry: RwLock<Option<Entry>>,
}

impl PriceCache {
    pub fn new(source: Arc<dyn PriceSource>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            source,
            clock,
            ttl,
            entry: RwLock::new(None),
        }
    }

    /// Cache backed by the system clock
    pub fn with_system_clock(source: Arc<dyn PriceSource>, ttl: Duration) -> Self {
        Self::new(source, Arc::new(SystemClock), ttl)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn current(&self) -> Option<Entry> {
        *self.entry.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn store(&self, entry: Entry) {
        *self.entry.write().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(entry);
    }

    fn is_fresh(&self, entry: &Entry) -> bool {
        entry.price > 0.0 && self.clock.now().duration_since(entry.fetched_at) < self.ttl
    }

    /// Current BTC/AUD quote
    pub async fn get(&self) -> Result<Quote, PriceError> {
        let last = self.current();

        if let Some(entry) = last.filter(|e| self.is_fresh(e)) {
            return Ok(Quote {
                price: entry.price,
                currency: QUOTE_CURRENCY,
                cached: true,
                stale: false,
            });
        }

        let fetched = match self.source.fetch_btc_aud().await {
            Ok(price) if price.is_finite() && price > 0.0 => Ok(price),
            Ok(price) => Err(PriceError::InvalidPrice(price)),
            Err(e) => Err(e),
        };

        match fetched {
            Ok(price) => {
                self.store(Entry {
                    price,
                    fetched_at: self.clock.now(),
                });
                debug!(target: "loanvault::price", price, "refreshed BTC/AUD price");
                Ok(Quote {
                    price,
                    currency: QUOTE_CURRENCY,
                    cached: false,
                    stale: false,
                })
            }
            Err(e) => match last {
                Some(entry) => {
                    warn!(
                        target: "loanvault::price",
                        error = %e,
                        price = entry.price,
                        "price refresh failed, serving stale value"
                    );
                    Ok(Quote {
                        price: entry.price,
                        currency: QUOTE_CURRENCY,
                        cached: true,
                        stale: true,
                    })
                }
                None => Err(e),
            },
        }
    }
}
