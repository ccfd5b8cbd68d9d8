//! # TimeBank Web
//!
//! HTTP and WebSocket surface of TimeBank, built on Axum.
//!
//! - [`router::build_router`]: every route, under `/api` and at the root
//! - [`state::AppState`]: the injected store, room hub, mailer and keys
//! - [`error::AppError`]: domain errors rendered as `{ code, message, details? }`
//! - [`auth`]: HS256 bearer tokens and the [`auth::AuthUser`] extractor
//! - [`realtime`]: `user:<id>` / `request:<id>` rooms and the socket handler
//! - [`rate_limit`]: fixed-window limiter per client IP
//!
//! ## Example
//!
//! ```ignore
//! let state = AppState { store, clock, hub: RoomHub::new(), mailer, jwt, limiter };
//! let app = build_router(state, "http://localhost:3000");
//! axum::serve(listener, app).await?;
//! ```

pub mod auth;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod mail;
pub mod metrics;
pub mod middleware;
pub mod rate_limit;
pub mod realtime;
pub mod router;
pub mod state;

pub use auth::{AuthUser, JwtKeys};
pub use error::AppError;
pub use router::build_router;
pub use state::AppState;
