//! Pipeline orchestration: cache probe, parallel heuristic stages,
//! optional advisor fusion, then correlation and filtering into a
//! small, deterministically ordered diagnostic list.
//!
//! No error state ever crosses this boundary: callers see a list of
//! diagnostics or an empty list, and every internal failure degrades
//! to reduced-but-valid output.

use crate::advisor::{CompletionBackend, LlmAdvisor};
use crate::analysis::delimiters::DelimiterScanner;
use crate::analysis::patterns::PatternLibrary;
use crate::analysis::semantics::SemanticHeuristics;
use crate::analysis::structure::StructuralAnalyzer;
use crate::cache::AnalysisCache;
use crate::config::AnalysisConfig;
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::fragment::{Fingerprint, SourceFragment};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Per-stage invocation counters. Lets callers (and the cache tests)
/// verify that a cache hit really skipped the stages.
#[derive(Default)]
pub struct PipelineStats {
    scanner_runs: AtomicUsize,
    structure_runs: AtomicUsize,
    semantics_runs: AtomicUsize,
    advisor_runs: AtomicUsize,
    cache_hits: AtomicUsize,
}

impl PipelineStats {
    pub fn scanner_runs(&self) -> usize {
        self.scanner_runs.load(Ordering::Relaxed)
    }
    pub fn structure_runs(&self) -> usize {
        self.structure_runs.load(Ordering::Relaxed)
    }
    pub fn semantics_runs(&self) -> usize {
        self.semantics_runs.load(Ordering::Relaxed)
    }
    pub fn advisor_runs(&self) -> usize {
        self.advisor_runs.load(Ordering::Relaxed)
    }
    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }
}

pub struct DiagnosticPipeline {
    config: AnalysisConfig,
    cache: AnalysisCache,
    scanner: Arc<DelimiterScanner>,
    structure: Arc<StructuralAnalyzer>,
    semantics: Arc<SemanticHeuristics>,
    advisor: Option<LlmAdvisor>,
    suppression: PatternLibrary,
    /// Latest fingerprint seen per origin. A run whose fingerprint is
    /// no longer the latest has been superseded by an edit: it skips
    /// the advisor and does not write the cache.
    latest: Mutex<HashMap<String, Fingerprint>>,
    stats: PipelineStats,
}

impl DiagnosticPipeline {
    pub fn new(config: AnalysisConfig) -> Self {
        let cache = AnalysisCache::new(config.cache_ttl_secs, config.cache_max_entries);
        Self {
            config,
            cache,
            scanner: Arc::new(DelimiterScanner::new()),
            structure: Arc::new(StructuralAnalyzer::new()),
            semantics: Arc::new(SemanticHeuristics::new()),
            advisor: None,
            suppression: PatternLibrary::new(),
            latest: Mutex::new(HashMap::new()),
            stats: PipelineStats::default(),
        }
    }

    /// Attach an advisor backend; without one the deep pass is skipped.
    pub fn with_advisor(mut self, backend: Arc<dyn CompletionBackend>) -> Self {
        self.advisor = Some(LlmAdvisor::new(backend, &self.config));
        self
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Analyze one fragment. Always returns a (possibly empty) list.
    pub async fn analyze(&self, fragment: &SourceFragment) -> Vec<Diagnostic> {
        if !self.config.enable_error_detection {
            return Vec::new();
        }
        // Oversized input: bail rather than blow the latency budget
        // on a partial scan.
        if fragment.byte_len() > self.config.max_fragment_len {
            return Vec::new();
        }

        let fingerprint = fragment.fingerprint();
        self.register_latest(fragment.origin(), fingerprint);

        if let Some(cached) = self.cache.get(&fingerprint) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return cached;
        }

        let started = Instant::now();
        let mut merged = self.run_heuristic_stages(fragment).await;

        // The heuristic stages are pure, so a superseded run can still
        // hand its caller these results; only the advisor call and the
        // cache write are worth skipping.
        if let Some(advisor) = &self.advisor {
            if self.is_latest(fragment.origin(), &fingerprint) {
                self.stats.advisor_runs.fetch_add(1, Ordering::Relaxed);
                let advisor_diags = advisor.maybe_analyze(fragment, &merged).await;
                if self.is_latest(fragment.origin(), &fingerprint) {
                    merged.extend(advisor_diags);
                }
            }
        }

        let widths = fragment.line_widths();
        let clamped: Vec<Diagnostic> = merged.into_iter().map(|d| d.clamped_to(&widths)).collect();
        let correlated = correlate(clamped);
        let output = self.filter(correlated, fragment);

        if self.is_latest(fragment.origin(), &fingerprint) {
            self.cache.put(
                fingerprint,
                output.clone(),
                started.elapsed().as_millis() as u64,
            );
        }
        output
    }

    async fn run_heuristic_stages(&self, fragment: &SourceFragment) -> Vec<Diagnostic> {
        self.stats.scanner_runs.fetch_add(1, Ordering::Relaxed);
        self.stats.structure_runs.fetch_add(1, Ordering::Relaxed);
        self.stats.semantics_runs.fetch_add(1, Ordering::Relaxed);

        let scan_text = fragment.shared_text();
        let scanner = Arc::clone(&self.scanner);
        let scan = tokio::task::spawn_blocking(move || scanner.scan(&scan_text));

        let structure_text = fragment.shared_text();
        let structure = Arc::clone(&self.structure);
        let structural = tokio::task::spawn_blocking(move || structure.analyze(&structure_text));

        let semantics_text = fragment.shared_text();
        let semantics = Arc::clone(&self.semantics);
        let semantic =
            tokio::task::spawn_blocking(move || semantics.analyze(&semantics_text, &semantics_text));

        let (scan, structural, semantic) = tokio::join!(scan, structural, semantic);

        // A panicked stage contributes nothing; the others still count.
        let mut merged = Vec::new();
        for result in [scan, structural, semantic] {
            match result {
                Ok(diags) => merged.extend(diags),
                Err(err) => eprintln!("  Warning: analysis stage failed: {}", err),
            }
        }
        merged
    }

    /// Confidence floor, curated suppression list, then the output cap
    /// (keeping the highest-confidence subset in positional order).
    fn filter(&self, diagnostics: Vec<Diagnostic>, fragment: &SourceFragment) -> Vec<Diagnostic> {
        let lines: Vec<&str> = fragment.text().lines().collect();
        let mut kept: Vec<Diagnostic> = diagnostics
            .into_iter()
            .filter(|d| d.confidence >= self.config.confidence_floor)
            .filter(|d| !self.is_suppressed(d, &lines))
            .collect();

        let cap = self.config.max_diagnostics;
        if kept.len() > cap {
            let mut by_confidence: Vec<(usize, f64)> = kept
                .iter()
                .enumerate()
                .map(|(idx, d)| (idx, d.confidence))
                .collect();
            by_confidence.sort_by(|a, b| {
                b.1.partial_cmp(&a.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            });
            let keep: std::collections::HashSet<usize> =
                by_confidence.into_iter().take(cap).map(|(idx, _)| idx).collect();
            kept = kept
                .into_iter()
                .enumerate()
                .filter(|(idx, _)| keep.contains(idx))
                .map(|(_, d)| d)
                .collect();
        }
        kept
    }

    /// Curated false-positive suppression. These exist because the
    /// heuristic rules over-fire on common valid constructs; each arm
    /// names the construct it protects.
    fn is_suppressed(&self, diagnostic: &Diagnostic, lines: &[&str]) -> bool {
        let Some(line) = lines.get(diagnostic.line) else {
            return false;
        };
        match diagnostic.kind {
            // `match(x)` / `print(x)`-style complete calls are not
            // statement heads that need a colon.
            DiagnosticKind::MissingColon => self.suppression.is_complete_call(line),
            // Advisor findings on plain assignments or complete calls
            // are the classic "LLM invents a problem" shape.
            DiagnosticKind::LlmSyntax
            | DiagnosticKind::LlmSemantic
            | DiagnosticKind::LlmLogical
            | DiagnosticKind::LlmStructural => {
                line.trim_start().starts_with('#')
                    || self.suppression.is_assignment(line)
                    || self.suppression.is_complete_call(line)
            }
            _ => false,
        }
    }

    fn register_latest(&self, origin: &str, fingerprint: Fingerprint) {
        if let Ok(mut latest) = self.latest.lock() {
            latest.insert(origin.to_string(), fingerprint);
        }
    }

    fn is_latest(&self, origin: &str, fingerprint: &Fingerprint) -> bool {
        self.latest
            .lock()
            .map(|latest| latest.get(origin) == Some(fingerprint))
            .unwrap_or(true)
    }
}

/// Correlation: advisor findings lose position ties to heuristic
/// findings, duplicates collapse to the highest-confidence instance,
/// and the result is sorted (line asc, column asc, confidence desc)
/// for deterministic output.
fn correlate(diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    let heuristic_positions: std::collections::HashSet<(usize, usize)> = diagnostics
        .iter()
        .filter(|d| d.source.is_heuristic())
        .map(|d| d.position())
        .collect();

    let mut best: HashMap<(usize, usize, DiagnosticKind), Diagnostic> = HashMap::new();
    for diagnostic in diagnostics {
        if !diagnostic.source.is_heuristic()
            && heuristic_positions.contains(&diagnostic.position())
        {
            continue;
        }
        match best.get(&diagnostic.dedup_key()) {
            Some(existing) if existing.confidence >= diagnostic.confidence => {}
            _ => {
                best.insert(diagnostic.dedup_key(), diagnostic);
            }
        }
    }

    let mut out: Vec<Diagnostic> = best.into_values().collect();
    out.sort_by(|a, b| {
        a.line
            .cmp(&b.line)
            .then(a.column.cmp(&b.column))
            .then(
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.rule_id.cmp(b.rule_id))
    });
    out
}
