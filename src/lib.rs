//! BUEDI session core.
//!
//! SYSTEM CONTEXT
//! ==============
//! Client-side session and notification state for the BUEDI construction
//! marketplace. The route guard reads the session store; the session store
//! talks to an identity backend and mirrors the session into durable
//! key-value storage. Notifications run independently, fed by a polling task.

pub mod config;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod storage;
