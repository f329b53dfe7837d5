use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use fleetgate_domain::{DomainResult, QuotaKind, Tenant, TenantRepository};

use crate::queue::AdmissionCounters;

/// Device-to-tenant resolution with a shared cache, so identification does
/// not re-query storage per frame.
pub struct TenantResolver {
    repo: Arc<dyn TenantRepository>,
    cache: Mutex<HashMap<String, Option<Tenant>>>,
}

impl TenantResolver {
    pub fn new(repo: Arc<dyn TenantRepository>) -> Self {
        Self {
            repo,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, device_id: &str) -> DomainResult<Option<Tenant>> {
        if let Some(cached) = self.cache.lock().unwrap().get(device_id) {
            return Ok(cached.clone());
        }
        let tenant = self.repo.tenant_for_device(device_id).await?;
        self.cache
            .lock()
            .unwrap()
            .insert(device_id.to_string(), tenant.clone());
        Ok(tenant)
    }

    /// Drops cached assignments, forcing re-resolution. Called alongside
    /// quota resets so tenant moves take effect within a period.
    pub fn invalidate(&self) {
        self.cache.lock().unwrap().clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Admit,
    /// Usage reached the limit; distinct from a backpressure rejection.
    RejectQuota,
}

#[derive(Debug)]
struct LedgerEntry {
    limit: i64,
    used: i64,
    breach_reported: bool,
}

/// In-memory view of per-tenant quota state for the current period.
///
/// Admission reads this ledger; the batch writer adds usage as records
/// commit. Entries are dropped on reset so limit changes are picked up
/// from storage at the next admission.
#[derive(Default)]
pub struct QuotaLedger {
    entries: Mutex<HashMap<Uuid, LedgerEntry>>,
}

impl QuotaLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn seed(&self, tenant_id: Uuid, limit: i64, used: i64) {
        self.entries.lock().unwrap().insert(
            tenant_id,
            LedgerEntry {
                limit,
                used,
                breach_reported: false,
            },
        );
    }

    fn is_seeded(&self, tenant_id: Uuid) -> bool {
        self.entries.lock().unwrap().contains_key(&tenant_id)
    }

    /// Check usage against the limit. Returns the decision and whether this
    /// is the first breach since the last reset.
    fn check(&self, tenant_id: Uuid) -> (GateDecision, bool) {
        let mut entries = self.entries.lock().unwrap();
        let Some(entry) = entries.get_mut(&tenant_id) else {
            // No quota row configured: unlimited.
            return (GateDecision::Admit, false);
        };
        if entry.used < entry.limit {
            return (GateDecision::Admit, false);
        }
        let first = !entry.breach_reported;
        entry.breach_reported = true;
        (GateDecision::RejectQuota, first)
    }

    /// Add committed-record usage. Called by the batch writer at commit.
    pub fn add_usage(&self, tenant_id: Uuid, amount: i64) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&tenant_id) {
            entry.used += amount;
        }
    }

    pub fn usage(&self, tenant_id: Uuid) -> Option<(i64, i64)> {
        self.entries
            .lock()
            .unwrap()
            .get(&tenant_id)
            .map(|e| (e.used, e.limit))
    }

    /// Drop all entries; the next admission re-seeds from storage.
    pub fn reset(&self) {
        self.entries.lock().unwrap().clear();
    }
}

/// Per-tenant quota enforcement in front of the ingestion queue.
pub struct QuotaGate {
    repo: Arc<dyn TenantRepository>,
    ledger: Arc<QuotaLedger>,
    counters: Arc<AdmissionCounters>,
}

impl QuotaGate {
    pub fn new(
        repo: Arc<dyn TenantRepository>,
        ledger: Arc<QuotaLedger>,
        counters: Arc<AdmissionCounters>,
    ) -> Self {
        Self {
            repo,
            ledger,
            counters,
        }
    }

    /// Decide admission for one quota-counting record of the given tenant.
    ///
    /// The first breach per reset period is logged as a notable event;
    /// subsequent breaches stay silent until the next reset.
    pub async fn admit(&self, tenant_id: Uuid) -> DomainResult<GateDecision> {
        if !self.ledger.is_seeded(tenant_id) {
            if let Some(quota) = self
                .repo
                .get_quota(tenant_id, QuotaKind::FramesPerDay)
                .await?
            {
                self.ledger.seed(tenant_id, quota.limit, quota.used);
            }
        }

        let (decision, first_breach) = self.ledger.check(tenant_id);
        if decision == GateDecision::RejectQuota {
            self.counters.count_quota();
            if first_breach {
                let usage = self.ledger.usage(tenant_id);
                warn!(
                    tenant_id = %tenant_id,
                    usage = ?usage,
                    "tenant frame quota exhausted, rejecting until reset"
                );
            }
        }
        Ok(decision)
    }
}

/// Background task that zeroes quota usage on a fixed schedule, independent
/// of traffic.
pub async fn run_quota_reset(
    repo: Arc<dyn TenantRepository>,
    ledger: Arc<QuotaLedger>,
    resolver: Arc<TenantResolver>,
    period: Duration,
    ctx: CancellationToken,
) -> anyhow::Result<()> {
    let mut interval = tokio::time::interval(period);
    // The first tick fires immediately; skip it so the first period is full.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                info!("quota reset task stopping");
                return Ok(());
            }
            _ = interval.tick() => {
                if let Err(err) = repo.reset_usage(QuotaKind::FramesPerDay).await {
                    warn!(error = %err, "persistent quota reset failed, keeping ledger");
                    continue;
                }
                ledger.reset();
                resolver.invalidate();
                info!("quota usage reset for new period");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use fleetgate_domain::{MockTenantRepository, Quota};

    fn quota(tenant_id: Uuid, limit: i64, used: i64) -> Quota {
        Quota {
            tenant_id,
            kind: QuotaKind::FramesPerDay,
            limit,
            used,
            period_start: Utc::now(),
        }
    }

    #[tokio::test]
    async fn admits_until_limit_then_rejects_with_quota_outcome() {
        let tenant_id = Uuid::new_v4();
        let mut repo = MockTenantRepository::new();
        repo.expect_get_quota()
            .times(1)
            .returning(move |id, _| Ok(Some(quota(id, 2, 0))));

        let ledger = Arc::new(QuotaLedger::new());
        let counters = Arc::new(AdmissionCounters::default());
        let gate = QuotaGate::new(Arc::new(repo), ledger.clone(), counters.clone());

        assert_eq!(gate.admit(tenant_id).await.unwrap(), GateDecision::Admit);
        ledger.add_usage(tenant_id, 1);
        assert_eq!(gate.admit(tenant_id).await.unwrap(), GateDecision::Admit);
        ledger.add_usage(tenant_id, 1);

        // used == limit: next record is a quota rejection, not backpressure.
        assert_eq!(
            gate.admit(tenant_id).await.unwrap(),
            GateDecision::RejectQuota
        );
        assert_eq!(counters.quota_rejected(), 1);
        assert_eq!(counters.backpressure_rejected(), 0);
    }

    #[tokio::test]
    async fn reset_re_enables_admission() {
        let tenant_id = Uuid::new_v4();
        let mut repo = MockTenantRepository::new();
        // Seeded twice: once exhausted, once fresh after reset.
        let mut seeds = vec![Some(quota(tenant_id, 5, 5)), Some(quota(tenant_id, 5, 0))];
        repo.expect_get_quota()
            .times(2)
            .returning(move |_, _| Ok(seeds.remove(0)));

        let ledger = Arc::new(QuotaLedger::new());
        let counters = Arc::new(AdmissionCounters::default());
        let gate = QuotaGate::new(Arc::new(repo), ledger.clone(), counters.clone());

        assert_eq!(
            gate.admit(tenant_id).await.unwrap(),
            GateDecision::RejectQuota
        );

        ledger.reset();
        assert_eq!(gate.admit(tenant_id).await.unwrap(), GateDecision::Admit);
    }

    #[tokio::test]
    async fn unconfigured_tenant_is_unlimited() {
        let tenant_id = Uuid::new_v4();
        let mut repo = MockTenantRepository::new();
        repo.expect_get_quota().returning(|_, _| Ok(None));

        let ledger = Arc::new(QuotaLedger::new());
        let counters = Arc::new(AdmissionCounters::default());
        let gate = QuotaGate::new(Arc::new(repo), ledger, counters.clone());

        for _ in 0..100 {
            assert_eq!(gate.admit(tenant_id).await.unwrap(), GateDecision::Admit);
        }
        assert_eq!(counters.quota_rejected(), 0);
    }

    #[tokio::test]
    async fn resolver_caches_tenant_lookup() {
        let tenant_id = Uuid::new_v4();
        let mut repo = MockTenantRepository::new();
        repo.expect_tenant_for_device()
            .times(1)
            .returning(move |_| {
                Ok(Some(Tenant {
                    tenant_id,
                    name: "acme".to_string(),
                }))
            });

        let resolver = TenantResolver::new(Arc::new(repo));
        for _ in 0..3 {
            let tenant = resolver.resolve("123456789012345").await.unwrap().unwrap();
            assert_eq!(tenant.tenant_id, tenant_id);
        }
    }
}
