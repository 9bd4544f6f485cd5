//! Client deciding whether and how to call the remote scanning service.

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use tracing::{debug, error, info};

use super::transport::{HttpScanTransport, ScanTransport};
use super::wire::{ScanRequest, ScanResponse, WireExclusion};
use crate::audit::Auditor;
use crate::config::{Deployment, ServiceConfig};
use crate::exclusions::ExclusionsManager;
use crate::payload::ScanPayload;

/// Header carrying the [`RequestType`].
pub const REQUEST_TYPE_HEADER: &str = "x-request-type";

/// Whether the caller acts on the scan result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestType {
    /// The push waits for and enforces the result.
    #[default]
    Blocking,
    /// The result is only observed.
    Shadow,
}

impl RequestType {
    /// Header value for this request type.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Blocking => "blocking",
            Self::Shadow => "shadow",
        }
    }
}

/// Client for the remote scanning service.
///
/// The transport is built on first use; an injected transport replaces it.
pub struct ScanServiceClient {
    config: ServiceConfig,
    auditor: Arc<dyn Auditor>,
    transport: OnceLock<Arc<dyn ScanTransport>>,
    use_remote: OnceLock<bool>,
}

impl ScanServiceClient {
    /// Creates a client for the configured service.
    pub fn new(config: &ServiceConfig, auditor: Arc<dyn Auditor>) -> Self {
        Self {
            config: config.clone(),
            auditor,
            transport: OnceLock::new(),
            use_remote: OnceLock::new(),
        }
    }

    /// Uses `transport` instead of building an HTTP transport.
    pub fn with_transport(mut self, transport: Arc<dyn ScanTransport>) -> Self {
        self.transport = OnceLock::from(transport);
        self
    }

    /// Returns true when scans go to the remote service.
    ///
    /// Only multi-tenant hosted deployments with the capability flag and an
    /// endpoint qualify. The answer is computed once per client.
    pub fn use_remote_service(&self) -> bool {
        *self.use_remote.get_or_init(|| {
            let enabled = self.config.remote_enabled
                && self.config.deployment == Deployment::Saas
                && self.config.endpoint().is_some();
            debug!(
                enabled,
                deployment = ?self.config.deployment,
                "Evaluated remote scanning service"
            );
            enabled
        })
    }

    fn transport(&self) -> Result<&Arc<dyn ScanTransport>> {
        if let Some(transport) = self.transport.get() {
            return Ok(transport);
        }
        let built: Arc<dyn ScanTransport> =
            Arc::new(HttpScanTransport::from_service_config(&self.config)?);
        Ok(self.transport.get_or_init(|| built))
    }

    fn headers(
        &self,
        request_type: RequestType,
        extra_headers: &[(String, String)],
    ) -> Vec<(String, String)> {
        let mut headers = vec![(
            REQUEST_TYPE_HEADER.to_string(),
            request_type.as_str().to_string(),
        )];
        if let Some(token) = self.config.token() {
            headers.push(("authorization".to_string(), format!("Bearer {token}")));
        }
        headers.extend(extra_headers.iter().cloned());
        headers
    }

    /// Sends payloads and exclusions to the scanner.
    ///
    /// Returns `None` when the transport cannot be built or the request
    /// fails; the failure is tracked and logged.
    pub async fn send(
        &self,
        payloads: Vec<ScanPayload>,
        exclusions: &ExclusionsManager,
        request_type: RequestType,
        extra_headers: &[(String, String)],
    ) -> Option<ScanResponse> {
        let request = ScanRequest {
            payloads,
            exclusions: exclusions.all_rules().map(WireExclusion::from).collect(),
            tags: self.config.tags.clone(),
        };
        let headers = self.headers(request_type, extra_headers);

        let transport = match self.transport() {
            Ok(transport) => transport,
            Err(e) => {
                error!(error = %e, "Failed to set up scanning service transport");
                self.auditor.track_error("scan_service_setup", &*e);
                return None;
            }
        };

        match transport.scan(&request, &headers).await {
            Ok(response) => {
                info!(status = ?response.status, "Scanning service responded");
                Some(response)
            }
            Err(e) => {
                error!(error = %e, "Scanning service request failed");
                self.auditor.track_error("scan_service_request", &*e);
                None
            }
        }
    }
}
