//! HTTP surface for the alert bridge.
//!
//! Routes:
//! - `POST /chartlink`: screener webhook, dispatched in the background
//! - `GET /login`, `GET /login/callback`: broker login, installs the access-token lease
//! - `POST /update-tpsl`, `GET /api/trade-config`: per-symbol trade config
//! - `GET /api/monitors`, `GET|DELETE /api/monitors/:id`: position monitors

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{ApiServer, AppState, LoginService};
