//! Built-in success and failure actions

use async_trait::async_trait;
use serde_json::{Map, Value};

use ensemble_domain::RunStatus;

use super::registry::{Action, ActionContext, ActionError};

/// Names the success registry ships with
pub const SUCCESS_BUILTINS: &[&str] = &["log", "log_output"];

/// Names the failure registry ships with
pub const FAILURE_BUILTINS: &[&str] = &["retry", "skip", "abort"];

/// Key of the persisted retry counter for one (run, step) pair
#[must_use]
pub fn counter_key(workflow_id: &str, step_name: &str) -> String {
    format!("{workflow_id}:{step_name}")
}

// =============================================================================
// Success Actions
// =============================================================================

/// `log` - emit an operator-visible log line from the definition
pub struct LogAction;

#[async_trait]
impl Action for LogAction {
    fn name(&self) -> &str {
        "log"
    }

    async fn execute(
        &self,
        ctx: &mut ActionContext<'_>,
        params: &Map<String, Value>,
    ) -> Result<(), ActionError> {
        match params.get("message").and_then(Value::as_str) {
            Some(message) => tracing::info!(
                workflow_id = %ctx.run.workflow_id,
                step = %ctx.step_name,
                "{message}"
            ),
            None => tracing::warn!(
                workflow_id = %ctx.run.workflow_id,
                step = %ctx.step_name,
                "log action has no 'message' parameter"
            ),
        }
        Ok(())
    }
}

/// `log_output` - emit the step's recorded output to the operator log
pub struct LogOutputAction;

#[async_trait]
impl Action for LogOutputAction {
    fn name(&self) -> &str {
        "log_output"
    }

    async fn execute(
        &self,
        ctx: &mut ActionContext<'_>,
        _params: &Map<String, Value>,
    ) -> Result<(), ActionError> {
        match ctx.step_state().and_then(|state| state.payload.as_ref()) {
            Some(payload) => {
                let output = serde_json::to_string(&payload.output)?;
                tracing::info!(
                    workflow_id = %ctx.run.workflow_id,
                    step = %ctx.step_name,
                    %output,
                    "step output"
                );
            }
            None => tracing::warn!(
                workflow_id = %ctx.run.workflow_id,
                step = %ctx.step_name,
                "log_output requested but no payload is recorded"
            ),
        }
        Ok(())
    }
}

// =============================================================================
// Failure Actions
// =============================================================================

/// `retry` - bounded re-dispatch with a follow-up action once exhausted.
///
/// The attempt counter is persisted per (run, step), so the bound holds
/// across process restarts and replayed deliveries.
pub struct RetryAction;

#[async_trait]
impl Action for RetryAction {
    fn name(&self) -> &str {
        "retry"
    }

    async fn execute(
        &self,
        ctx: &mut ActionContext<'_>,
        params: &Map<String, Value>,
    ) -> Result<(), ActionError> {
        let Some(max_attempts) = parse_max_attempts(params) else {
            tracing::warn!(
                workflow_id = %ctx.run.workflow_id,
                step = %ctx.step_name,
                "retry action has no usable max_attempts; failure stands"
            );
            return Ok(());
        };

        let key = counter_key(&ctx.run.workflow_id, ctx.step_name);
        let attempts = match ctx.store().get(&key).await? {
            Some(raw) => raw.parse::<u64>().unwrap_or(0) + 1,
            None => 1,
        };
        ctx.store().set(&key, &attempts.to_string()).await?;

        if attempts < max_attempts {
            tracing::info!(
                workflow_id = %ctx.run.workflow_id,
                step = %ctx.step_name,
                attempts,
                max_attempts,
                "retrying failed step"
            );
            return ctx.retry_step().await;
        }

        match params
            .get("action_after_attempts")
            .and_then(Value::as_str)
            .map(str::to_string)
        {
            Some(successor) => {
                tracing::info!(
                    workflow_id = %ctx.run.workflow_id,
                    step = %ctx.step_name,
                    attempts,
                    action = %successor,
                    "retry budget exhausted; running follow-up action"
                );
                ctx.run_handler(&successor, params).await
            }
            None => {
                tracing::warn!(
                    workflow_id = %ctx.run.workflow_id,
                    step = %ctx.step_name,
                    attempts,
                    "retry budget exhausted and no action_after_attempts; failure stands"
                );
                Ok(())
            }
        }
    }
}

/// max_attempts may arrive as an integer or a numeric string
fn parse_max_attempts(params: &Map<String, Value>) -> Option<u64> {
    match params.get("max_attempts")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `skip` - accept the failure and mark the run successful anyway
pub struct SkipAction;

#[async_trait]
impl Action for SkipAction {
    fn name(&self) -> &str {
        "skip"
    }

    async fn execute(
        &self,
        ctx: &mut ActionContext<'_>,
        _params: &Map<String, Value>,
    ) -> Result<(), ActionError> {
        ctx.run.status = RunStatus::Success;
        tracing::info!(
            workflow_id = %ctx.run.workflow_id,
            step = %ctx.step_name,
            "failure skipped; run marked successful"
        );
        Ok(())
    }
}

/// `abort` - let the failure stand
pub struct AbortAction;

#[async_trait]
impl Action for AbortAction {
    fn name(&self) -> &str {
        "abort"
    }

    async fn execute(
        &self,
        ctx: &mut ActionContext<'_>,
        _params: &Map<String, Value>,
    ) -> Result<(), ActionError> {
        tracing::debug!(
            workflow_id = %ctx.run.workflow_id,
            step = %ctx.step_name,
            "failure stands"
        );
        Ok(())
    }
}
