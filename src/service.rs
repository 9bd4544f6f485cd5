//! Scanning service boundary: wire types, transports and the client.

pub mod client;
pub mod transport;
pub mod wire;

pub use client::{RequestType, ScanServiceClient, REQUEST_TYPE_HEADER};
pub use transport::{HttpScanTransport, ScanTransport, TransportError};
pub use wire::{Finding, FindingStatus, ScanRequest, ScanResponse, ScanStatus, WireExclusion};
