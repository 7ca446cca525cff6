use faultline_alert::AlertEvaluator;
use faultline_common::metrics::MetricSnapshot;
use faultline_state::StateStore;
use faultline_transport::AlertBus;
use std::sync::Arc;

/// Single path from an ingested snapshot into the pipeline: store it,
/// evaluate it, forward the resulting alert events onto the transport.
pub struct Dispatcher {
    store: Arc<StateStore>,
    evaluator: AlertEvaluator,
    bus: Arc<AlertBus>,
}

impl Dispatcher {
    pub fn new(store: Arc<StateStore>, evaluator: AlertEvaluator, bus: Arc<AlertBus>) -> Self {
        Self {
            store,
            evaluator,
            bus,
        }
    }

    pub fn dispatch(&self, snapshot: MetricSnapshot) {
        self.store.update(snapshot.clone());

        let events = self.evaluator.evaluate_snapshot(&snapshot);
        if events.is_empty() {
            return;
        }

        tracing::debug!(
            kind = %snapshot.kind(),
            id = %snapshot.id(),
            count = events.len(),
            "Alert edges emitted"
        );
        for event in events {
            // Overflow is already logged by the bus; dropping the alert is
            // the documented overload response.
            let _ = self.bus.send(event);
        }
    }

    pub fn dispatch_all(&self, snapshots: Vec<MetricSnapshot>) {
        for snapshot in snapshots {
            self.dispatch(snapshot);
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }
}
