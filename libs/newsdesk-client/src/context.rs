use crate::config::ClientConfig;
use std::time::Duration;

/// Where a call originates: a long-lived server-rendering process or a
/// browser session.
///
/// Resolved once per call and never mixed mid-call. Passed explicitly by the
/// caller so the branch is testable without simulating a runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionContext {
    /// Server-rendering process, serving many users
    Server,
    /// Browser session, fixed per page load
    Browser,
}

impl ExecutionContext {
    /// Whether this is the browser context
    #[must_use]
    pub fn is_browser(self) -> bool {
        matches!(self, ExecutionContext::Browser)
    }
}

/// Per-call routing decision: base address, credential policy, virtual-host
/// override, cache eligibility, and timeout budget.
#[derive(Debug, Clone)]
pub struct RoutePlan {
    /// Base URL to prefix request paths with
    pub base_url: String,

    /// Whether the token cookie is attached to the request
    pub include_credentials: bool,

    /// Logical virtual-host name to inject as the `Host` header
    /// (server context only, where the base address is internal)
    pub host_override: Option<String>,

    /// Whether the in-memory response cache may serve or store this call
    pub consult_cache: bool,

    /// Per-attempt timeout for this call
    pub timeout: Duration,
}

/// Chooses the endpoint and credential policy for each call.
///
/// The decision is re-evaluated on every call: a server process serves many
/// requests under different contexts over its lifetime, so nothing here may
/// be cached across calls.
#[derive(Debug, Clone)]
pub struct TransportSelector {
    public_base_url: String,
    internal_base_url: String,
    internal_host: String,
    browser_timeout: Duration,
    server_timeout: Duration,
}

impl TransportSelector {
    /// Create a selector from client configuration
    #[must_use]
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            public_base_url: config.endpoints.public_base_url.clone(),
            internal_base_url: config.endpoints.internal_base_url.clone(),
            internal_host: config.endpoints.internal_host.clone(),
            browser_timeout: config.browser_timeout,
            server_timeout: config.server_timeout,
        }
    }

    /// Resolve the routing plan for one call.
    ///
    /// Server context always targets the internal base address, omits
    /// browser-style credential inclusion, and carries the logical host for
    /// virtual-host routing. Browser context targets the public address with
    /// credentials, and is the only context where the response cache applies.
    #[must_use]
    pub fn route(&self, ctx: ExecutionContext) -> RoutePlan {
        match ctx {
            ExecutionContext::Server => RoutePlan {
                base_url: self.internal_base_url.clone(),
                include_credentials: false,
                host_override: Some(self.internal_host.clone()),
                consult_cache: false,
                timeout: self.server_timeout,
            },
            ExecutionContext::Browser => RoutePlan {
                base_url: self.public_base_url.clone(),
                include_credentials: true,
                host_override: None,
                consult_cache: true,
                timeout: self.browser_timeout,
            },
        }
    }
}
