// src/core/probe/resolver.rs

use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use std::time::Duration;
use tracing::debug;

use super::{RecordKind, Resolver};
use crate::core::error::ProbeError;

/// Resolver probe backed by hickory's Tokio resolver.
pub struct DnsResolver {
    resolver: TokioAsyncResolver,
}

impl DnsResolver {
    /// One attempt per lookup, bounded by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.attempts = 1;
        opts.timeout = timeout;
        Self { resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), opts) }
    }
}

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolves(&self, name: &str) -> bool {
        match self.resolver.lookup_ip(name).await {
            Ok(lookup) => lookup.iter().next().is_some(),
            Err(e) => {
                debug!(name, error = %e, "Name did not resolve.");
                false
            }
        }
    }

    async fn lookup_records(&self, domain: &str, kind: RecordKind) -> Result<Vec<String>, ProbeError> {
        let record_type = match kind {
            RecordKind::Ns => RecordType::NS,
            RecordKind::Mx => RecordType::MX,
            RecordKind::Txt => RecordType::TXT,
        };
        debug!(domain, kind = %kind, "Looking up records.");
        let lookup = self
            .resolver
            .lookup(domain, record_type)
            .await
            .map_err(ProbeError::from)?;
        Ok(lookup.iter().map(|r| r.to_string()).collect())
    }
}
