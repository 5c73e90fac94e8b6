//! Response governor
//!
//! Wraps every operation call: execute, post-process, measure, then truncate
//! or digest the payload so the whole envelope stays within the operation's
//! token budget. Failures and panics become failed envelopes; nothing
//! propagates to the caller.

pub mod envelope;
pub mod operation;
pub mod truncation;

pub use envelope::GovernedResponse;
pub use operation::{parse_args, Operation, OperationContext, PostProcessor, Registration};
pub use truncation::{emergency_digest, govern, Fit, Governed};

use crate::error::Error;
use crate::metrics::{METRICS, UNKNOWN_TOOL_LABEL};
use crate::staging::CacheResolver;
use crate::tokens::TokenEstimator;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Re-measure attempts when the estimator is not additive over the envelope
const MAX_FIT_ATTEMPTS: usize = 4;

/// Token-budget enforcement around registered operations
pub struct ResponseGovernor {
    operations: HashMap<String, Registration>,
    estimator: Arc<dyn TokenEstimator>,
    resolver: CacheResolver,
    default_budget: usize,
}

impl ResponseGovernor {
    pub fn new(
        estimator: Arc<dyn TokenEstimator>,
        resolver: CacheResolver,
        default_budget: usize,
    ) -> Self {
        Self {
            operations: HashMap::new(),
            estimator,
            resolver,
            default_budget,
        }
    }

    /// Register an operation; `None` uses the default budget
    pub fn register(&mut self, operation: Arc<dyn Operation>, budget: Option<usize>) {
        self.register_with(operation, budget, None);
    }

    /// Register an operation with a post-processor applied before measuring
    pub fn register_with(
        &mut self,
        operation: Arc<dyn Operation>,
        budget: Option<usize>,
        post_processor: Option<PostProcessor>,
    ) {
        let name = operation.name().to_string();
        let budget = budget.unwrap_or(self.default_budget);
        debug!("Registered operation {} (budget {} tokens)", name, budget);
        self.operations.insert(
            name,
            Registration {
                operation,
                budget,
                post_processor,
            },
        );
    }

    /// Registered operation names, sorted
    pub fn operations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.operations.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn get(&self, name: &str) -> Option<&Registration> {
        self.operations.get(name)
    }

    pub fn budget_for(&self, name: &str) -> Option<usize> {
        self.operations.get(name).map(|r| r.budget)
    }

    pub fn estimator(&self) -> &Arc<dyn TokenEstimator> {
        &self.estimator
    }

    /// Execute `name` with `args` and return a budget-compliant envelope
    pub async fn execute(&self, name: &str, args: Value) -> GovernedResponse {
        let Some(registration) = self.operations.get(name) else {
            warn!("Unknown tool requested: {}", name);
            let response = self.fail(name, &Error::UnknownTool(name.to_string()), self.default_budget);
            METRICS.record_governed_call(UNKNOWN_TOOL_LABEL, false, 0);
            return response;
        };

        info!("Executing tool: {}", name);
        let cx = OperationContext::new(self.resolver.resolve());

        let raw = match AssertUnwindSafe(registration.operation.invoke(args, &cx))
            .catch_unwind()
            .await
        {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                warn!("Tool {} failed: {}", name, err);
                METRICS.record_governed_call(name, false, 0);
                return self.fail(name, &err, registration.budget);
            }
            Err(panic) => {
                let message = panic_message(panic);
                error!("Tool {} panicked: {}", name, message);
                METRICS.record_governed_call(name, false, 0);
                return self.fit_failure(
                    GovernedResponse::failure(name, message, "Panic"),
                    registration.budget,
                );
            }
        };

        let processed = match &registration.post_processor {
            None => raw,
            Some(post) => match std::panic::catch_unwind(AssertUnwindSafe(|| post(raw))) {
                Ok(Ok(value)) => value,
                Ok(Err(err)) => {
                    warn!("Post-processor for {} failed: {}", name, err);
                    METRICS.record_governed_call(name, false, 0);
                    return self.fail(name, &err, registration.budget);
                }
                Err(panic) => {
                    let message = panic_message(panic);
                    error!("Post-processor for {} panicked: {}", name, message);
                    METRICS.record_governed_call(name, false, 0);
                    return self.fit_failure(
                        GovernedResponse::failure(name, message, "Panic"),
                        registration.budget,
                    );
                }
            },
        };

        let response = self.fit(name, processed, registration.budget);
        METRICS.record_governed_call(name, true, response.tokens);
        info!("Tool {} completed ({} tokens)", name, response.tokens);
        response
    }

    /// Assemble a success envelope whose serialized form fits `budget`
    fn fit(&self, tool: &str, payload: Value, budget: usize) -> GovernedResponse {
        let estimator = self.estimator.as_ref();
        let mut payload_budget = budget.saturating_sub(self.envelope_overhead(tool, budget));

        let mut attempt = 0;
        loop {
            attempt += 1;
            let governed = govern(payload.clone(), payload_budget, estimator);
            let fit = governed.fit.clone();

            let mut response = GovernedResponse::success(tool, governed.value, governed.tokens);
            if let Fit::Truncated {
                original_count,
                truncated_count,
            } = fit
            {
                response = response.with_truncation(original_count, truncated_count);
            }

            let total = response.measure(estimator);
            if total <= budget || attempt >= MAX_FIT_ATTEMPTS || payload_budget == 0 {
                if total > budget {
                    warn!(
                        "Tool {} envelope still {} tokens over a {} token budget",
                        tool,
                        total - budget,
                        budget
                    );
                }
                match fit {
                    Fit::Unchanged => {}
                    Fit::Truncated {
                        original_count,
                        truncated_count,
                    } => {
                        warn!(
                            "Tool {} result exceeded {} tokens; truncated from {} to {} items",
                            tool, budget, original_count, truncated_count
                        );
                        METRICS.record_truncation(tool);
                    }
                    Fit::Emergency => {
                        warn!(
                            "Tool {} result exceeded {} tokens; replaced with emergency summary",
                            tool, budget
                        );
                        METRICS.record_emergency_summary(tool);
                    }
                }
                return response;
            }

            debug!(
                "Tool {} envelope measured {} tokens (budget {}), tightening payload budget",
                tool, total, budget
            );
            payload_budget = payload_budget.saturating_sub(total - budget);
        }
    }

    /// Envelope tokens excluding the payload, estimated with worst-case
    /// counters
    fn envelope_overhead(&self, tool: &str, budget: usize) -> usize {
        let probe = GovernedResponse::success(tool, Value::Null, budget)
            .with_truncation(u32::MAX as usize, u32::MAX as usize);
        let estimator = self.estimator.as_ref();
        probe
            .measure(estimator)
            .saturating_sub(estimator.estimate_value(&Value::Null))
    }

    fn fail(&self, tool: &str, err: &Error, budget: usize) -> GovernedResponse {
        self.fit_failure(GovernedResponse::from_error(tool, err), budget)
    }

    /// Clip an error message until the failure envelope fits `budget`
    fn fit_failure(&self, mut response: GovernedResponse, budget: usize) -> GovernedResponse {
        let estimator = self.estimator.as_ref();
        while response.measure(estimator) > budget {
            let Some(message) = response.error.as_mut() else {
                break;
            };
            let keep = message.chars().count() / 2;
            if keep == 0 {
                break;
            }
            *message = message.chars().take(keep).collect();
        }
        response
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("operation panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("operation panicked: {}", s)
    } else {
        "operation panicked".to_string()
    }
}
