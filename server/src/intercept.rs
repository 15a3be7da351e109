use dcs_protocol::{InterceptOptions, InterceptStage, InterceptedCode, Verdict};
use tokio::sync::{mpsc, oneshot, RwLock};

/// One offer in flight: the code being offered plus where to send the
/// verdict, delivered to the owning Intercept connection's processor loop
/// over its `offer_tx`.
pub struct Offer {
    pub code: InterceptedCode,
    pub verdict_tx: oneshot::Sender<Verdict>,
}

struct Interceptor {
    connection_id: u32,
    options: InterceptOptions,
    offer_tx: mpsc::Sender<Offer>,
}

/// Registry of live Intercept-mode connections, consulted by the dispatcher
/// before a code is submitted to the pipeline. Interceptors are tried in
/// registration order at each stage; the first one whose filter matches the
/// code gets first refusal. An `Ignore` verdict passes the code on to the
/// next matching interceptor instead of straight to the pipeline, so
/// several plugins can chain-observe the same stage.
pub struct InterceptRegistry {
    interceptors: RwLock<Vec<Interceptor>>,
}

impl InterceptRegistry {
    pub fn new() -> Self {
        Self { interceptors: RwLock::new(Vec::new()) }
    }

    pub async fn register(&self, connection_id: u32, options: InterceptOptions, offer_tx: mpsc::Sender<Offer>) {
        self.interceptors.write().await.push(Interceptor { connection_id, options, offer_tx });
    }

    pub async fn unregister(&self, connection_id: u32) {
        self.interceptors.write().await.retain(|i| i.connection_id != connection_id);
    }

    /// Offer `code` at `stage` to every matching interceptor in turn.
    /// Returns the first non-`Ignore` verdict, or `None` if every matching
    /// interceptor (or none at all) ignored it — the caller should then
    /// proceed as if no interception happened.
    pub async fn offer(&self, stage: InterceptStage, code: InterceptedCode) -> Option<Verdict> {
        let m_code = (code.code_type == dcs_protocol::CodeType::M).then_some(code.major_number).flatten();

        let candidates: Vec<mpsc::Sender<Offer>> = {
            let interceptors = self.interceptors.read().await;
            interceptors
                .iter()
                .filter(|i| i.options.matches(code.channel, stage, m_code))
                .map(|i| i.offer_tx.clone())
                .collect()
        };

        let mut offered_code = code;
        offered_code.stage = Some(stage);

        for offer_tx in candidates {
            let (verdict_tx, verdict_rx) = oneshot::channel();
            let offer = Offer { code: offered_code.clone(), verdict_tx };
            if offer_tx.send(offer).await.is_err() {
                continue; // interceptor vanished between the filter check and the send
            }
            match verdict_rx.await {
                Ok(Verdict::Ignore) => continue,
                Ok(verdict) => return Some(verdict),
                Err(_) => continue, // interceptor disconnected while awaiting verdict: equivalent to Ignore
            }
        }
        None
    }
}

impl Default for InterceptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcs_protocol::{CodeChannel, CodeResult, CodeType};

    fn sample_code(channel: CodeChannel) -> InterceptedCode {
        InterceptedCode { code_type: CodeType::G, major_number: Some(28), minor_number: None, channel, stage: None }
    }

    #[tokio::test]
    async fn no_interceptors_means_no_verdict() {
        let registry = InterceptRegistry::new();
        let verdict = registry.offer(InterceptStage::PreCode, sample_code(CodeChannel::Http)).await;
        assert!(verdict.is_none());
    }

    #[tokio::test]
    async fn a_matching_interceptor_can_resolve_the_code() {
        let registry = InterceptRegistry::new();
        let (tx, mut rx) = mpsc::channel(1);
        registry.register(1, InterceptOptions::default(), tx).await;

        let responder = tokio::spawn(async move {
            let offer = rx.recv().await.unwrap();
            assert_eq!(offer.code.channel, CodeChannel::Http);
            let _ = offer.verdict_tx.send(Verdict::Resolve { result: CodeResult { content: Some("ok\n".into()) } });
        });

        let verdict = registry.offer(InterceptStage::PreCode, sample_code(CodeChannel::Http)).await;
        assert!(matches!(verdict, Some(Verdict::Resolve { .. })));
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn a_filter_mismatch_skips_straight_through() {
        let registry = InterceptRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        let options = InterceptOptions { channels: Some([CodeChannel::Telnet].into_iter().collect()), ..Default::default() };
        registry.register(1, options, tx).await;

        let verdict = registry.offer(InterceptStage::PreCode, sample_code(CodeChannel::Http)).await;
        assert!(verdict.is_none());
    }

    #[tokio::test]
    async fn ignore_falls_through_to_the_next_interceptor() {
        let registry = InterceptRegistry::new();
        let (tx_a, mut rx_a) = mpsc::channel(1);
        let (tx_b, mut rx_b) = mpsc::channel(1);
        registry.register(1, InterceptOptions::default(), tx_a).await;
        registry.register(2, InterceptOptions::default(), tx_b).await;

        let a = tokio::spawn(async move {
            let offer = rx_a.recv().await.unwrap();
            let _ = offer.verdict_tx.send(Verdict::Ignore);
        });
        let b = tokio::spawn(async move {
            let offer = rx_b.recv().await.unwrap();
            let _ = offer.verdict_tx.send(Verdict::Cancel);
        });

        let verdict = registry.offer(InterceptStage::PreCode, sample_code(CodeChannel::Http)).await;
        assert!(matches!(verdict, Some(Verdict::Cancel)));
        a.await.unwrap();
        b.await.unwrap();
    }

    #[tokio::test]
    async fn unregistering_removes_the_interceptor_from_future_offers() {
        let registry = InterceptRegistry::new();
        let (tx, _rx) = mpsc::channel(1);
        registry.register(1, InterceptOptions::default(), tx).await;
        registry.unregister(1).await;

        let verdict = registry.offer(InterceptStage::PreCode, sample_code(CodeChannel::Http)).await;
        assert!(verdict.is_none());
    }
}
