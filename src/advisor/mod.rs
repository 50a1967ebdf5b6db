//! Optional LLM advisor stage.
//!
//! A supplementary, low-precision pass: it only runs when the cheap
//! stages left gaps, it is bounded by a timeout and a global
//! concurrency cap, and every failure degrades to "no additional
//! diagnostics" — advisor trouble never becomes a pipeline error.

pub mod client;
pub mod parse;
pub mod prompts;

pub use client::{CompletionBackend, LlmError, OpenRouterBackend};

use crate::config::AnalysisConfig;
use crate::diagnostic::Diagnostic;
use crate::fragment::SourceFragment;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

pub struct LlmAdvisor {
    backend: Arc<dyn CompletionBackend>,
    /// Caps simultaneous in-flight requests; excess requests are
    /// skipped rather than queued, since the code under the cursor
    /// keeps changing and a stale answer has little value.
    permits: Arc<Semaphore>,
    model: String,
    timeout: Duration,
    max_tokens: u32,
    temperature: f32,
    min_fragment_len: usize,
    max_fragment_len: usize,
    max_existing: usize,
    confidence_threshold: f64,
}

impl LlmAdvisor {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: &AnalysisConfig) -> Self {
        Self {
            backend,
            permits: Arc::new(Semaphore::new(config.max_concurrent_advisor.max(1))),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.advisor_timeout_secs),
            max_tokens: config.advisor_max_tokens,
            temperature: config.advisor_temperature,
            min_fragment_len: config.min_fragment_len,
            max_fragment_len: config.max_fragment_len,
            max_existing: config.max_existing_for_advisor,
            confidence_threshold: config.advisor_confidence_threshold,
        }
    }

    /// Deep-analyze a fragment if the gates allow it. Always returns
    /// a (possibly empty) list, never an error.
    pub async fn maybe_analyze(
        &self,
        fragment: &SourceFragment,
        existing: &[Diagnostic],
    ) -> Vec<Diagnostic> {
        if !self.backend.is_available() {
            return Vec::new();
        }
        let len = fragment.byte_len();
        if len < self.min_fragment_len || len > self.max_fragment_len {
            return Vec::new();
        }
        // The cheap stages already found plenty; don't spend a call.
        if existing.len() >= self.max_existing {
            return Vec::new();
        }
        let Ok(_permit) = self.permits.try_acquire() else {
            return Vec::new();
        };

        let prompt = prompts::build_prompt(fragment, existing);
        let call = self
            .backend
            .complete(&self.model, &prompt, self.max_tokens, self.temperature);

        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(reply)) => parse::parse_reply(&reply, self.confidence_threshold),
            Ok(Err(err)) => {
                eprintln!("  Warning: advisor call failed: {}", err);
                Vec::new()
            }
            Err(_) => {
                eprintln!(
                    "  Warning: advisor call timed out after {}s",
                    self.timeout.as_secs()
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::{DiagnosticKind, DiagnosticSource};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted backend: returns a fixed reply and counts calls.
    struct MockBackend {
        reply: String,
        available: bool,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl MockBackend {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                available: true,
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }
    }

    #[async_trait]
    impl CompletionBackend for MockBackend {
        fn is_available(&self) -> bool {
            self.available
        }

        async fn complete(
            &self,
            _model: &str,
            _prompt: &str,
            _max_tokens: u32,
            _temperature: f32,
        ) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(self.reply.clone())
        }
    }

    fn fragment(len: usize) -> SourceFragment {
        let text: String = "x = 1\n".repeat(len / 6 + 1);
        SourceFragment::new(text, "python", "test.py")
    }

    fn config() -> AnalysisConfig {
        AnalysisConfig::default()
    }

    #[tokio::test]
    async fn test_happy_path_parses_findings() {
        let backend = Arc::new(MockBackend::new(
            "ERROR|0|0|SYNTAX|ERROR|Broken|Fix|0.99",
        ));
        let advisor = LlmAdvisor::new(backend.clone(), &config());
        let diags = advisor.maybe_analyze(&fragment(100), &[]).await;
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::LlmSyntax);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unavailable_backend_skipped() {
        let mut backend = MockBackend::new("ERROR|0|0|SYNTAX|ERROR|Broken|Fix|0.99");
        backend.available = false;
        let backend = Arc::new(backend);
        let advisor = LlmAdvisor::new(backend.clone(), &config());
        assert!(advisor.maybe_analyze(&fragment(100), &[]).await.is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_short_fragment_skipped() {
        let backend = Arc::new(MockBackend::new("NO_ERRORS"));
        let advisor = LlmAdvisor::new(backend.clone(), &config());
        let tiny = SourceFragment::new("x=1", "python", "t.py");
        assert!(advisor.maybe_analyze(&tiny, &[]).await.is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enough_existing_findings_skips_call() {
        let backend = Arc::new(MockBackend::new("NO_ERRORS"));
        let advisor = LlmAdvisor::new(backend.clone(), &config());
        let existing: Vec<Diagnostic> = (0..5)
            .map(|n| {
                Diagnostic::new(
                    DiagnosticKind::MissingColon,
                    DiagnosticSource::Structure,
                    n,
                    0,
                    "missing colon",
                )
            })
            .collect();
        assert!(advisor
            .maybe_analyze(&fragment(100), &existing)
            .await
            .is_empty());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_empty() {
        let mut backend = MockBackend::new("ERROR|0|0|SYNTAX|ERROR|Broken|Fix|0.99");
        backend.delay = Some(Duration::from_secs(60));
        let backend = Arc::new(backend);
        let mut cfg = config();
        cfg.advisor_timeout_secs = 1;
        let advisor = LlmAdvisor::new(backend, &cfg);

        tokio::time::pause();
        let handle = tokio::spawn({
            let frag = fragment(100);
            async move { advisor.maybe_analyze(&frag, &[]).await }
        });
        tokio::time::advance(Duration::from_secs(2)).await;
        let diags = handle.await.unwrap();
        assert!(diags.is_empty());
    }

    #[tokio::test]
    async fn test_confidence_gate_applies() {
        let backend = Arc::new(MockBackend::new(
            "ERROR|0|0|SYNTAX|ERROR|Low|Fix|0.80\nERROR|1|0|SYNTAX|ERROR|High|Fix|0.99",
        ));
        let advisor = LlmAdvisor::new(backend, &config());
        let diags = advisor.maybe_analyze(&fragment(100), &[]).await;
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].message, "High");
    }
}
