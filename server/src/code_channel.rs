use async_trait::async_trait;
use dcs_protocol::{CodeChannel, CodeResult};
use tokio_util::sync::CancellationToken;

use crate::error::DispatchError;

/// The boundary between the IPC core and the RRF motion-controller
/// transport. Submitting a code onto a channel, evaluating an expression,
/// and flushing a channel are the only operations the core needs from the
/// transport; everything downstream of this trait (SPI framing, G-code
/// parsing, firmware semantics) is out of scope for this workspace.
///
/// Every method takes the originating connection's `CancellationToken` so
/// a disconnect while a code is in flight is a cancellable suspension
/// point rather than an indefinite wait on the transport.
#[async_trait]
pub trait CodePipeline: Send + Sync {
    async fn submit_code(
        &self,
        channel: CodeChannel,
        code: &str,
        cancellation: &CancellationToken,
    ) -> Result<CodeResult, DispatchError>;

    async fn evaluate_expression(
        &self,
        channel: CodeChannel,
        expression: &str,
        cancellation: &CancellationToken,
    ) -> Result<serde_json::Value, DispatchError>;

    /// Completes once every code previously submitted on `channel` has
    /// finished executing.
    async fn flush(&self, channel: CodeChannel, cancellation: &CancellationToken) -> Result<(), DispatchError>;
}

/// A pipeline that completes every code immediately with an empty result,
/// for running the IPC core (tests, local development) without a real
/// motion controller attached.
pub struct LoopbackPipeline;

#[async_trait]
impl CodePipeline for LoopbackPipeline {
    async fn submit_code(
        &self,
        _channel: CodeChannel,
        _code: &str,
        cancellation: &CancellationToken,
    ) -> Result<CodeResult, DispatchError> {
        if cancellation.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        Ok(CodeResult::default())
    }

    async fn evaluate_expression(
        &self,
        _channel: CodeChannel,
        _expression: &str,
        cancellation: &CancellationToken,
    ) -> Result<serde_json::Value, DispatchError> {
        if cancellation.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        Ok(serde_json::Value::Null)
    }

    async fn flush(&self, _channel: CodeChannel, cancellation: &CancellationToken) -> Result<(), DispatchError> {
        if cancellation.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_pipeline_completes_codes_immediately() {
        let pipeline = LoopbackPipeline;
        let token = CancellationToken::new();
        let result = pipeline.submit_code(CodeChannel::Sbc, "G28", &token).await.unwrap();
        assert_eq!(result, CodeResult::default());
        pipeline.flush(CodeChannel::Sbc, &token).await.unwrap();
    }

    #[tokio::test]
    async fn a_cancelled_token_short_circuits_the_loopback_pipeline() {
        let pipeline = LoopbackPipeline;
        let token = CancellationToken::new();
        token.cancel();
        let result = pipeline.submit_code(CodeChannel::Sbc, "G28", &token).await;
        assert!(matches!(result, Err(DispatchError::Cancelled)));
    }
}
