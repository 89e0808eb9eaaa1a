//! Client-side state stores.
//!
//! DESIGN
//! ======
//! State is split by domain (`session`, `notifications`) so consumers such as
//! the route guard depend on small focused models.

pub mod notifications;
pub mod session;
