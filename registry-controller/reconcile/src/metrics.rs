use prometheus_client::{
    encoding::EncodeLabelSet,
    metrics::{counter::Counter, family::Family, gauge::Gauge},
    registry::Registry,
};

#[derive(Clone, Debug, Default)]
pub struct ReconcileMetrics {
    ticks: Family<TickLabels, Counter>,
    upsert_failures: Counter,
    prunes: Family<PruneLabels, Counter>,
    registered: Gauge,
    bootstrap_complete: Gauge,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct TickLabels {
    outcome: &'static str,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
struct PruneLabels {
    result: &'static str,
}

impl ReconcileMetrics {
    pub fn register(prom: &mut Registry) -> Self {
        let ticks = Family::default();
        prom.register(
            "ticks",
            "Count of reconciliation ticks by outcome",
            ticks.clone(),
        );

        let upsert_failures = Counter::default();
        prom.register(
            "upsert_failures",
            "Count of endpoints whose service or route could not be upserted",
            upsert_failures.clone(),
        );

        let prunes = Family::default();
        prom.register(
            "prunes",
            "Count of stale gateway services removed, by result",
            prunes.clone(),
        );

        let registered = Gauge::default();
        prom.register(
            "registered_services",
            "Number of services registered by the last completed tick",
            registered.clone(),
        );

        let bootstrap_complete = Gauge::default();
        prom.register(
            "bootstrap_complete",
            "Whether every static proxy has been registered",
            bootstrap_complete.clone(),
        );

        Self {
            ticks,
            upsert_failures,
            prunes,
            registered,
            bootstrap_complete,
        }
    }

    pub(crate) fn tick_skipped(&self) {
        self.tick("skipped");
    }

    pub(crate) fn tick_completed(&self, registered: usize) {
        self.tick("completed");
        self.registered
            .set(i64::try_from(registered).unwrap_or(i64::MAX));
    }

    fn tick(&self, outcome: &'static str) {
        self.ticks.get_or_create(&TickLabels { outcome }).inc();
    }

    pub(crate) fn upsert_failed(&self) {
        self.upsert_failures.inc();
    }

    pub(crate) fn pruned(&self, deleted: bool) {
        let result = if deleted { "deleted" } else { "failed" };
        self.prunes.get_or_create(&PruneLabels { result }).inc();
    }

    pub(crate) fn bootstrapped(&self) {
        self.bootstrap_complete.set(1);
    }
}
