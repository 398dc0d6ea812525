//! HTTP/1.1 services for the shoal engine: the request parser, the
//! per-connection service loop, the handler chain and the response
//! encoder. Everything here runs inside an engine task and reaches the
//! wire only through the engine's async primitives.

pub mod http;
