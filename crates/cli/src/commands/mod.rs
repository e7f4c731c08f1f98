//! CLI commands for the alert bridge.

pub mod fetch_instruments;
pub mod resolve;
pub mod serve;

pub use fetch_instruments::FetchInstrumentsArgs;
pub use resolve::ResolveArgs;
pub use serve::ServeArgs;
