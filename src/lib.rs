//! `hanzo-mcp` — an MCP (Model Context Protocol) tool server exposing
//! developer-productivity tools (file I/O, code search, shell execution,
//! background process management, file editing) to a host AI assistant
//! over a line-delimited JSON-RPC transport.
//!
//! # Architecture
//!
//! ```text
//! stdin (NDJSON) → transport::run → dispatcher::handle_line → tools::call_tool
//!                                                                    ↓
//!                                          permissions / registry / validator
//! stdout (NDJSON) ←──────────────────────────────────────────────────┘
//! ```
//!
//! [`transport`] owns the framing loop (C1); [`dispatcher`] routes each
//! request to a protocol method (C2); [`permissions`] enforces the
//! path/command sandbox (C3); [`registry`] holds tool descriptors (C4);
//! [`validator`] checks `tools/call` arguments against a tool's schema
//! (C5); [`tools`] implements every handler (C6–C12); [`error`] is the
//! crate-wide error taxonomy (C13).

pub mod config;
pub mod context;
pub mod dispatcher;
pub mod edit;
pub mod error;
pub mod permissions;
pub mod protocol;
pub mod registry;
pub mod tools;
pub mod transport;
pub mod util;
pub mod validator;

pub use error::{ServerError, ServerResult};
