//! # yeevu_server
//!
//! HTTP surface for Yeevu.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `POST /generate` | run a session, streaming progress as server-sent events |
//! | `POST /download` | zip of a sandbox's project directory |
//! | `DELETE /sandbox/:id` | remove a sandbox |
//! | `GET /health` | liveness |

pub mod error;
pub mod generate;
pub mod routes;
pub mod state;

pub use error::{ServerError, ServerResult};
pub use generate::{to_sse_event, GenerateRequest, DONE};
pub use routes::{router, serve, DownloadRequest};
pub use state::AppState;
