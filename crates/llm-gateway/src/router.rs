//! Routes a request to the model tier suited to its complexity, falling back
//! through the other tiers (in `Fast -> Standard -> Complex` order) when the
//! preferred tier's provider is down or circuit-broken.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::provider::LLMProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskComplexity {
    Fast,
    Standard,
    Complex,
}

const FALLBACK_ORDER: [TaskComplexity; 3] = [TaskComplexity::Fast, TaskComplexity::Standard, TaskComplexity::Complex];

type ExclusionChecker = Box<dyn Fn(&str) -> bool + Send + Sync>;

#[derive(Default)]
struct Metrics {
    selection_count: HashMap<TaskComplexity, u64>,
    fallback_count: u64,
    last_selection: Option<(TaskComplexity, String)>,
}

/// Owns one provider per complexity tier. A provider that can't serve its
/// own tier (unavailable, or excluded by the circuit breaker) falls back to
/// the next tier in [`FALLBACK_ORDER`].
pub struct ModelRouter {
    providers: HashMap<TaskComplexity, Arc<dyn LLMProvider>>,
    exclusion_checker: Mutex<Option<ExclusionChecker>>,
    metrics: Mutex<Metrics>,
}

impl ModelRouter {
    pub fn new(providers: HashMap<TaskComplexity, Arc<dyn LLMProvider>>) -> Result<Self> {
        if providers.is_empty() {
            return Err(Error::Message("at least one provider required".into()));
        }
        Ok(Self { providers, exclusion_checker: Mutex::new(None), metrics: Mutex::new(Metrics::default()) })
    }

    /// Wires in the circuit breaker's exclusion check. Called once by the
    /// gateway after both are constructed.
    pub fn set_exclusion_checker(&self, checker: impl Fn(&str) -> bool + Send + Sync + 'static) {
        *self.exclusion_checker.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(checker));
    }

    #[must_use]
    pub fn available_tiers(&self) -> Vec<TaskComplexity> {
        self.providers.keys().copied().collect()
    }

    #[must_use]
    pub fn fallback_count(&self) -> u64 {
        self.metrics.lock().unwrap_or_else(|e| e.into_inner()).fallback_count
    }

    #[must_use]
    pub fn last_selection(&self) -> Option<(TaskComplexity, String)> {
        self.metrics.lock().unwrap_or_else(|e| e.into_inner()).last_selection.clone()
    }

    /// Infers a task's complexity tier from keywords in its description.
    /// Falls back to `Standard` when nothing matches.
    #[must_use]
    pub fn infer_complexity(task_description: &str) -> TaskComplexity {
        let desc = task_description.to_lowercase();
        const FAST_KEYWORDS: [&str; 4] = ["parse", "extract", "format", "summarize"];
        const COMPLEX_KEYWORDS: [&str; 4] = ["exploit", "chain", "debug", "analyze vulnerability"];

        if FAST_KEYWORDS.iter().any(|kw| desc.contains(kw)) {
            return TaskComplexity::Fast;
        }
        if COMPLEX_KEYWORDS.iter().any(|kw| desc.contains(kw)) {
            return TaskComplexity::Complex;
        }
        TaskComplexity::Standard
    }

    pub fn get_provider_for_tier(&self, tier: TaskComplexity) -> Option<Arc<dyn LLMProvider>> {
        self.providers.get(&tier).cloned()
    }

    fn is_excluded(&self, model_name: &str) -> bool {
        match self.exclusion_checker.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(checker) => checker(model_name),
            None => false,
        }
    }

    fn is_usable(&self, provider: &Arc<dyn LLMProvider>) -> bool {
        provider.is_available() && !self.is_excluded(provider.model_name())
    }

    fn find_available_provider(&self, requested_tier: TaskComplexity) -> Option<Arc<dyn LLMProvider>> {
        let start = FALLBACK_ORDER.iter().position(|t| *t == requested_tier).unwrap_or(0);

        for tier in &FALLBACK_ORDER[start..] {
            if let Some(provider) = self.providers.get(tier) {
                if self.is_usable(provider) {
                    if *tier != requested_tier {
                        tracing::warn!(requested = ?requested_tier, fallback = ?tier, "model_fallback");
                    }
                    return Some(Arc::clone(provider));
                }
            }
        }

        for tier in &FALLBACK_ORDER {
            if *tier == requested_tier {
                continue;
            }
            if let Some(provider) = self.providers.get(tier) {
                if self.is_usable(provider) {
                    tracing::warn!(requested = ?requested_tier, fallback = ?tier, "model_fallback");
                    return Some(Arc::clone(provider));
                }
            }
        }

        None
    }

    /// Selects a provider for `complexity`, falling back to another tier if
    /// the preferred one is unavailable or excluded.
    pub fn select_model(&self, complexity: TaskComplexity) -> Result<Arc<dyn LLMProvider>> {
        let preferred = self.providers.get(&complexity).filter(|p| self.is_usable(p));

        let provider = match preferred {
            Some(provider) => Arc::clone(provider),
            None => {
                let provider = self.find_available_provider(complexity).ok_or_else(|| Error::ProviderUnavailable {
                    provider: "router".into(),
                    reason: format!("no available provider for tier {complexity:?}"),
                })?;
                let mut metrics = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
                metrics.fallback_count += 1;
                provider
            }
        };

        let mut metrics = self.metrics.lock().unwrap_or_else(|e| e.into_inner());
        *metrics.selection_count.entry(complexity).or_insert(0) += 1;
        metrics.last_selection = Some((complexity, provider.model_name().to_string()));
        drop(metrics);

        tracing::info!(tier = ?complexity, model = provider.model_name(), "model_selected");
        Ok(provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MockLLMProvider;

    #[test]
    fn infer_complexity_matches_keywords() {
        assert_eq!(ModelRouter::infer_complexity("please parse this output"), TaskComplexity::Fast);
        assert_eq!(ModelRouter::infer_complexity("chain this exploit"), TaskComplexity::Complex);
        assert_eq!(ModelRouter::infer_complexity("what should the agent do next"), TaskComplexity::Standard);
    }

    #[test]
    fn select_model_prefers_requested_tier() {
        let mut providers: HashMap<TaskComplexity, Arc<dyn LLMProvider>> = HashMap::new();
        providers.insert(TaskComplexity::Fast, Arc::new(MockLLMProvider::new("fast-model", "ok")));
        providers.insert(TaskComplexity::Standard, Arc::new(MockLLMProvider::new("standard-model", "ok")));
        let router = ModelRouter::new(providers).expect("non-empty providers");
        let provider = router.select_model(TaskComplexity::Fast).expect("fast provider available");
        assert_eq!(provider.model_name(), "fast-model");
        assert_eq!(router.fallback_count(), 0);
    }

    #[test]
    fn select_model_falls_back_when_preferred_tier_unavailable() {
        let mut providers: HashMap<TaskComplexity, Arc<dyn LLMProvider>> = HashMap::new();
        providers.insert(TaskComplexity::Fast, Arc::new(MockLLMProvider::new("fast-model", "ok").unavailable()));
        providers.insert(TaskComplexity::Standard, Arc::new(MockLLMProvider::new("standard-model", "ok")));
        let router = ModelRouter::new(providers).expect("non-empty providers");

        let provider = router.select_model(TaskComplexity::Fast).expect("falls back to standard");
        assert_eq!(provider.model_name(), "standard-model");
        assert_eq!(router.fallback_count(), 1);
    }

    #[test]
    fn select_model_errors_when_nothing_available() {
        let mut providers: HashMap<TaskComplexity, Arc<dyn LLMProvider>> = HashMap::new();
        providers.insert(TaskComplexity::Fast, Arc::new(MockLLMProvider::new("fast-model", "ok").unavailable()));
        let router = ModelRouter::new(providers).expect("non-empty providers");
        assert!(router.select_model(TaskComplexity::Fast).is_err());
    }

    #[test]
    fn exclusion_checker_routes_around_excluded_model() {
        let mut providers: HashMap<TaskComplexity, Arc<dyn LLMProvider>> = HashMap::new();
        providers.insert(TaskComplexity::Fast, Arc::new(MockLLMProvider::new("fast-model", "ok")));
        providers.insert(TaskComplexity::Standard, Arc::new(MockLLMProvider::new("standard-model", "ok")));
        let router = ModelRouter::new(providers).expect("non-empty providers");
        router.set_exclusion_checker(|model| model == "fast-model");

        let provider = router.select_model(TaskComplexity::Fast).expect("falls back past excluded model");
        assert_eq!(provider.model_name(), "standard-model");
    }
}
