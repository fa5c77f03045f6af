//! BTC/AUD Price
//!
//! - `cache` - TTL cache with an injected clock
//! - `coingecko` - HTTP source

pub mod cache;
pub mod coingecko;

pub use cache::{Clock, PriceCache, PriceError, PriceSource, Quote, SystemClock, QUOTE_CURRENCY};
pub use coingecko::CoinGeckoSource;
