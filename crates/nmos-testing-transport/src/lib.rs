// crates/nmos-testing-transport/src/lib.rs
// ============================================================================
// Module: NMOS Testing Transport Library
// Description: Concrete HTTP and WebSocket implementations of the core seams.
// Purpose: Keep reqwest and tokio out of the grading crates.
// Dependencies: futures-util, nmos-testing-core, reqwest, tokio, tokio-tungstenite
// ============================================================================

//! ## Overview
//! [`ReqwestHttpClient`] implements [`nmos_testing_core::HttpClient`] with a
//! blocking reqwest client. [`WebSocketConnector`] implements
//! [`nmos_testing_core::SessionConnector`] on a private tokio runtime so the
//! synchronous verifier never needs an async context.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod http;
pub mod websocket;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use http::HttpClientConfig;
pub use http::ReqwestHttpClient;
pub use websocket::WebSocketConnector;
