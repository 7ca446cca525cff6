use async_trait::async_trait;
use faultline_common::types::DiagnosisResult;
use tokio_util::sync::CancellationToken;

/// Per-invocation context handed to every action call. Carries the worker's
/// cancellation token, which fires when the engine deadline elapses; actions
/// doing their own I/O should pass the token down or poll it between steps.
#[derive(Clone)]
pub struct ActionContext {
    cancel: CancellationToken,
}

impl ActionContext {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }
}

/// One unit of recovery work, registered against a fault code or prefix.
///
/// `execute` performs the recovery step; `verify` confirms the
/// post-condition and returns an error when the effect did not take.
/// Actions are opaque to the engine and invoked only by it.
#[async_trait]
pub trait Action: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, ctx: &ActionContext, event: &DiagnosisResult) -> anyhow::Result<()>;

    async fn verify(&self, ctx: &ActionContext, event: &DiagnosisResult) -> anyhow::Result<()>;

    /// Actions that know how to undo their effect expose a [`Resolver`];
    /// the engine requires it on the resolve path.
    fn as_resolver(&self) -> Option<&dyn Resolver> {
        None
    }
}

/// Reversal capability, paired with `verify` to confirm the rollback.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, ctx: &ActionContext, event: &DiagnosisResult) -> anyhow::Result<()>;
}
