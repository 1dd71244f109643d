//! Pluggable biomedical concept linker.
//!
//! The scorer depends on the linker only through `extract_cuis`/`extract_cuis_many`;
//! concrete linkers are configuration, not part of this core. The default `StubLinker`
//! returns empty CUI sets so the core remains usable without a real linker wired up.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;

/// A biomedical concept linker: maps free text to normalized Concept Unique
/// Identifiers. Implementations are expected to be heavy to initialize and cheap to
/// query once warm — the process-wide `concept_linker()` accessor below handles the
/// one-time initialization guard.
#[async_trait]
pub trait ConceptLinker: Send + Sync {
    async fn extract_cuis(&self, text: &str) -> HashSet<String>;

    async fn extract_cuis_many(&self, texts: &[String]) -> HashSet<String> {
        let mut all = HashSet::new();
        for text in texts {
            all.extend(self.extract_cuis(text).await);
        }
        all
    }
}

/// Linker that never links anything. Used when no real concept-linking backend is
/// configured; the condition-match rule in the scorer then falls back to its
/// substring-match path.
#[derive(Debug, Default)]
pub struct StubLinker;

#[async_trait]
impl ConceptLinker for StubLinker {
    async fn extract_cuis(&self, _text: &str) -> HashSet<String> {
        HashSet::new()
    }
}

static CONCEPT_LINKER: OnceLock<Arc<dyn ConceptLinker>> = OnceLock::new();

/// Returns the process-wide concept linker, initializing it with `StubLinker` on first
/// use if `install_concept_linker` was never called.
pub fn concept_linker() -> Arc<dyn ConceptLinker> {
    CONCEPT_LINKER
        .get_or_init(|| Arc::new(StubLinker) as Arc<dyn ConceptLinker>)
        .clone()
}

/// Installs a non-default linker before first use. Returns `false` (and leaves the
/// existing linker in place) if the process-wide linker was already initialized.
pub fn install_concept_linker(linker: Arc<dyn ConceptLinker>) -> bool {
    CONCEPT_LINKER.set(linker).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_linker_returns_no_cuis() {
        let linker = StubLinker;
        let cuis = linker.extract_cuis("non-small cell lung cancer").await;
        assert!(cuis.is_empty());
    }

    #[tokio::test]
    async fn extract_cuis_many_unions_individual_results() {
        struct FixedLinker;

        #[async_trait]
        impl ConceptLinker for FixedLinker {
            async fn extract_cuis(&self, text: &str) -> HashSet<String> {
                if text == "a" {
                    HashSet::from(["C1".to_string()])
                } else {
                    HashSet::from(["C2".to_string()])
                }
            }
        }

        let linker = FixedLinker;
        let cuis = linker
            .extract_cuis_many(&["a".to_string(), "b".to_string()])
            .await;
        assert_eq!(cuis, HashSet::from(["C1".to_string(), "C2".to_string()]));
    }
}
