//! Domain models shared across the whole pricecast pipeline.

pub mod forecast;
pub mod instrument;
pub mod price;

pub use forecast::{CurrentForecast, ForecastBatch, PointForecast, VolatilityForecast, FORECAST_DAYS};
pub use instrument::{InstrumentSeed, TrackedInstrument};
pub use price::{PriceBar, PriceObservation};
