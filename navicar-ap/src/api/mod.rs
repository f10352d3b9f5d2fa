//! Local control API
//!
//! axum router exposing transport controls, account management, the album
//! catalog, the car browse tree and an SSE event stream.

pub mod handlers;
pub mod server;
pub mod sse;

pub use server::{router, run, AppContext};
