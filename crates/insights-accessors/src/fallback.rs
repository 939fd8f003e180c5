//! Ordered strategy evaluation with a single "not provisioned" policy.

use insights_gateway::{GatewayError, GatewayResult};
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, warn};

type StrategyFuture<'a, T> = Pin<Box<dyn Future<Output = GatewayResult<T>> + Send + 'a>>;

struct Strategy<'a, T> {
    name: &'static str,
    run: Box<dyn FnOnce() -> StrategyFuture<'a, T> + Send + 'a>,
}

/// An ordered list of ways to perform one operation.
///
/// - A strategy that succeeds ends the chain with its result.
/// - A failing strategy that is not the last hands over to the next one.
/// - If the last strategy fails with a not-provisioned error and a neutral
///   value was given, the chain succeeds with that value.
/// - Any other failure of the last strategy is returned.
pub struct FallbackChain<'a, T> {
    operation: &'static str,
    strategies: Vec<Strategy<'a, T>>,
    neutral: Option<T>,
}

impl<'a, T: Send + 'a> FallbackChain<'a, T> {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            strategies: Vec::new(),
            neutral: None,
        }
    }

    /// Append a strategy.
    pub fn then<F, Fut>(mut self, name: &'static str, strategy: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = GatewayResult<T>> + Send + 'a,
    {
        self.strategies.push(Strategy {
            name,
            run: Box::new(move || Box::pin(strategy())),
        });
        self
    }

    /// Value returned when the feature turns out not to be provisioned.
    pub fn neutral(mut self, value: T) -> Self {
        self.neutral = Some(value);
        self
    }

    /// Evaluate the strategies in order.
    pub async fn run(self) -> GatewayResult<T> {
        let operation = self.operation;
        let total = self.strategies.len();
        let mut last_error = None;

        for (index, strategy) in self.strategies.into_iter().enumerate() {
            match (strategy.run)().await {
                Ok(value) => {
                    if index > 0 {
                        debug!(operation, strategy = strategy.name, "Fallback strategy succeeded");
                    }
                    return Ok(value);
                }
                Err(e) if index + 1 < total => {
                    debug!(
                        operation,
                        strategy = strategy.name,
                        kind = %e.kind(),
                        error = %e,
                        "Strategy failed, falling back"
                    );
                }
                Err(e) => last_error = Some(e),
            }
        }

        match (last_error, self.neutral) {
            (Some(e), Some(neutral)) if e.is_not_provisioned() => {
                warn!(operation, error = %e, "Feature not provisioned, returning neutral result");
                Ok(neutral)
            }
            (Some(e), _) => Err(e),
            (None, _) => Err(GatewayError::NotProvisioned(format!(
                "{operation}: no strategy available"
            ))),
        }
    }
}
