pub mod bybit;
pub mod executor;
pub mod lifecycle;

pub use bybit::BybitClient;
pub use executor::OrderExecutor;
pub use lifecycle::{CycleReport, Engine, EngineHandle, EngineSettings};
