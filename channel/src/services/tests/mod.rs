//! Service tests for the task channel
//!
//! Exercise the connection actor, the registry and the HTTP task control
//! against the in-process mock transport and a wiremock server.

pub mod helpers;
