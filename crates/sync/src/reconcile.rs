//! One reconciliation pass against the registry.

use metrics::counter;
use peerlink_crypto::CipherCodec;
use peerlink_network::{LivenessProber, PeerSource};
use peerlink_registry::RegistryClient;
use peerlink_types::{Flavor, PeerAddress, PeerSet};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::errors::SyncError;
use crate::plan::{plan_flavor, FlavorPlan};

/// Outcome of reconciling one flavor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlavorReport {
    pub flavor: Flavor,
    pub remote_entries: usize,
    pub decode_skipped: usize,
    pub stale: usize,
    pub removed: usize,
    pub delete_failures: usize,
    pub added: usize,
    pub encode_skipped: usize,
    /// Why the flavor stopped early, if it did.
    pub aborted: Option<String>,
}

impl FlavorReport {
    fn new(flavor: Flavor) -> Self {
        Self {
            flavor,
            remote_entries: 0,
            decode_skipped: 0,
            stale: 0,
            removed: 0,
            delete_failures: 0,
            added: 0,
            encode_skipped: 0,
            aborted: None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.aborted.is_none() && self.delete_failures == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub pass_id: u64,
    pub namespace: String,
    pub observed: usize,
    pub private: FlavorReport,
    pub public: FlavorReport,
}

impl PassReport {
    pub fn flavor(&self, flavor: Flavor) -> &FlavorReport {
        match flavor {
            Flavor::Private => &self.private,
            Flavor::Public => &self.public,
        }
    }

    pub fn added(&self) -> usize {
        self.private.added + self.public.added
    }

    pub fn removed(&self) -> usize {
        self.private.removed + self.public.removed
    }

    pub fn is_clean(&self) -> bool {
        self.private.is_clean() && self.public.is_clean()
    }
}

/// Reconciles one namespace of the registry with a local peer source.
pub struct Reconciler {
    source: Arc<dyn PeerSource>,
    registry: RegistryClient,
    codec: Arc<CipherCodec>,
    prober: LivenessProber,
}

impl Reconciler {
    pub fn new(
        source: Arc<dyn PeerSource>,
        registry: RegistryClient,
        codec: Arc<CipherCodec>,
        prober: LivenessProber,
    ) -> Self {
        Self {
            source,
            registry,
            codec,
            prober,
        }
    }

    pub fn namespace(&self) -> &str {
        self.registry.namespace()
    }

    /// Run one pass. Only a failed observation aborts the whole pass; registry
    /// failures are confined to the flavor they happen in.
    pub async fn run_pass(&self, pass_id: u64) -> Result<PassReport, SyncError> {
        let namespace = self.namespace().to_string();

        let observed = match self.source.observe().await {
            Ok(observed) => observed,
            Err(err) => {
                warn!(pass_id, namespace = %namespace, error = %err, "observation failed, skipping pass");
                counter!("peerlink_sync_passes_total", "namespace" => namespace.clone(), "outcome" => "aborted")
                    .increment(1);
                return Err(err.into());
            }
        };
        debug!(
            pass_id,
            namespace = %namespace,
            private = observed.private.len(),
            public = observed.public.len(),
            "observed local peers"
        );

        let private = self
            .reconcile_flavor(pass_id, Flavor::Private, &observed.private)
            .await;
        let public = self
            .reconcile_flavor(pass_id, Flavor::Public, &observed.public)
            .await;

        let report = PassReport {
            pass_id,
            namespace: namespace.clone(),
            observed: observed.total(),
            private,
            public,
        };

        let outcome = if report.is_clean() { "ok" } else { "degraded" };
        counter!("peerlink_sync_passes_total", "namespace" => namespace.clone(), "outcome" => outcome)
            .increment(1);
        info!(
            pass_id,
            namespace = %namespace,
            outcome,
            added = report.added(),
            removed = report.removed(),
            "reconciliation pass finished"
        );
        Ok(report)
    }

    async fn reconcile_flavor(&self, pass_id: u64, flavor: Flavor, observed: &PeerSet) -> FlavorReport {
        let namespace = self.namespace().to_string();
        let mut report = FlavorReport::new(flavor);

        let raw = match self.registry.read(flavor).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(pass_id, namespace = %namespace, %flavor, error = %err, "registry read failed");
                report.aborted = Some(err.to_string());
                return report;
            }
        };
        report.remote_entries = raw.len();

        let decoded = self.codec.decode_entries(&raw);
        report.decode_skipped = raw.len() - decoded.len();
        if report.decode_skipped > 0 {
            counter!("peerlink_sync_skipped_total", "namespace" => namespace.clone(), "reason" => "decode")
                .increment(report.decode_skipped as u64);
        }

        // Private entries are relay-reachable only and have no delete primitive.
        let stale = match flavor {
            Flavor::Public => {
                self.stale_addresses(decoded.iter().map(|entry| &entry.address), observed)
                    .await
            }
            Flavor::Private => HashSet::new(),
        };
        report.stale = stale.len();

        let FlavorPlan {
            deletions,
            additions,
        } = plan_flavor(observed, &decoded, &stale);

        for index in deletions {
            match self.registry.delete_public(index).await {
                Ok(()) => {
                    report.removed += 1;
                    debug!(pass_id, namespace = %namespace, %flavor, index, "deleted stale entry");
                }
                Err(err) => {
                    report.delete_failures += 1;
                    warn!(pass_id, namespace = %namespace, %flavor, index, error = %err, "failed to delete stale entry");
                }
            }
        }
        if report.removed > 0 {
            counter!("peerlink_registry_deletions_total", "namespace" => namespace.clone(), "flavor" => flavor.as_str())
                .increment(report.removed as u64);
        }

        if !additions.is_empty() {
            let tokens = self.codec.encode_addresses(additions.iter());
            report.encode_skipped = additions.len() - tokens.len();
            if report.encode_skipped > 0 {
                counter!("peerlink_sync_skipped_total", "namespace" => namespace.clone(), "reason" => "encode")
                    .increment(report.encode_skipped as u64);
            }

            match self.registry.append(flavor, &tokens).await {
                Ok(submitted) => {
                    report.added = submitted;
                    counter!("peerlink_registry_additions_total", "namespace" => namespace.clone(), "flavor" => flavor.as_str())
                        .increment(submitted as u64);
                }
                Err(err) => {
                    warn!(pass_id, namespace = %namespace, %flavor, error = %err, "registry append failed");
                    report.aborted = Some(err.to_string());
                }
            }
        }

        info!(
            pass_id,
            namespace = %namespace,
            %flavor,
            remote = report.remote_entries,
            decode_skipped = report.decode_skipped,
            stale = report.stale,
            removed = report.removed,
            delete_failures = report.delete_failures,
            added = report.added,
            "flavor reconciled"
        );
        report
    }

    /// Remote addresses that were not observed live this pass and fail a probe.
    async fn stale_addresses<'a, I>(&self, remote: I, observed: &PeerSet) -> HashSet<PeerAddress>
    where
        I: Iterator<Item = &'a PeerAddress>,
    {
        let candidates: Vec<PeerAddress> = remote
            .filter(|address| !observed.contains(address))
            .cloned()
            .collect();
        if candidates.is_empty() {
            return HashSet::new();
        }

        self.prober
            .probe_all(candidates)
            .await
            .into_iter()
            .filter_map(|(address, alive)| (!alive).then_some(address))
            .collect()
    }
}
