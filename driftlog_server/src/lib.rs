//! driftlog HTTP front end
//!
//! Thin request layer over [`driftlog_core`]: it validates input, maps
//! core errors onto status codes and serializes samples. All lifecycle and
//! windowing semantics live in the core.
//!
//! # Endpoints
//!
//! ```text
//! POST /start            {"user_ids": ["id1", "id2"]}
//! POST /stop
//! GET  /user/{user_id}   ?min=0.0&max=1.0
//! GET  /status
//! ```

pub mod api;

pub use api::{router, AppState};
