//! Price providers and the frames they return.

pub mod csv;
pub mod provider;
pub mod yahoo;

pub use csv::CsvProvider;
pub use provider::{
    date_from_epoch_days, price_frame, PriceBar, PriceProvider, PriceRequest, Provider,
    ProviderError, ProviderRegistry,
};
pub use yahoo::YahooProvider;
