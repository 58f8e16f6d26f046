use std::sync::Arc;

use jobfeed_core::{CompanyMatch, MatchMethod};
use jobfeed_storage::{EmployerCatalog, StoreError};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::similarity::{CharSetSimilarity, Similarity};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatcherConfig {
    pub fuzzy_threshold: f64,
    pub domain_confidence: f64,
    pub candidate_limit: i64,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.8,
            domain_confidence: 0.85,
            candidate_limit: 10,
        }
    }
}

/// Host of `url` without a leading `www.`; bare hosts are accepted.
pub fn registrable_host(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }
    let parsed = Url::parse(url).or_else(|_| Url::parse(&format!("https://{url}"))).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// Resolves free-text company identification to an employer: exact name,
/// then fuzzy name, then website domain.
pub struct CompanyMatcher {
    catalog: Arc<dyn EmployerCatalog>,
    similarity: Arc<dyn Similarity>,
    config: MatcherConfig,
}

impl CompanyMatcher {
    pub fn new(catalog: Arc<dyn EmployerCatalog>, config: MatcherConfig) -> Self {
        Self {
            catalog,
            similarity: Arc::new(CharSetSimilarity),
            config,
        }
    }

    pub fn with_similarity(mut self, similarity: Arc<dyn Similarity>) -> Self {
        self.similarity = similarity;
        self
    }

    pub async fn match_company(
        &self,
        name: Option<&str>,
        url: Option<&str>,
    ) -> Result<Option<CompanyMatch>, StoreError> {
        if let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) {
            if let Some(employer) = self.catalog.find_employer_by_exact_name(name).await? {
                return Ok(Some(CompanyMatch {
                    employer_id: employer.id,
                    confidence: 1.0,
                    method: MatchMethod::ExactName,
                }));
            }

            let candidates = self
                .catalog
                .search_employers_by_name(name, self.config.candidate_limit)
                .await?;
            let best = candidates
                .iter()
                .map(|employer| (employer.id, self.similarity.similarity(name, &employer.name)))
                .max_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((employer_id, score)) = best.filter(|(_, s)| *s > self.config.fuzzy_threshold) {
                return Ok(Some(CompanyMatch {
                    employer_id,
                    confidence: score,
                    method: MatchMethod::FuzzyName,
                }));
            }
        }

        if let Some(host) = url.and_then(registrable_host) {
            if let Some(employer) = self.catalog.find_employer_by_website_host(&host).await? {
                return Ok(Some(CompanyMatch {
                    employer_id: employer.id,
                    confidence: self.config.domain_confidence,
                    method: MatchMethod::Domain,
                }));
            }
        }

        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobfeed_storage::{EmployerCatalog, MemoryStore};

    async fn matcher() -> (CompanyMatcher, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.add_employer("Acme", Some("https://www.acme.example")).await;
        store.add_employer("Globex Corporation", Some("https://globex.example/careers")).await;
        (CompanyMatcher::new(store.clone(), MatcherConfig::default()), store)
    }

    #[test]
    fn hosts_drop_www_and_accept_bare_domains() {
        assert_eq!(registrable_host("https://www.Acme.example/jobs"), Some("acme.example".into()));
        assert_eq!(registrable_host("acme.example"), Some("acme.example".into()));
        assert_eq!(registrable_host("  "), None);
    }

    #[tokio::test]
    async fn exact_name_wins_with_full_confidence() {
        let (matcher, _) = matcher().await;
        let found = matcher.match_company(Some(" acme "), None).await.unwrap().unwrap();
        assert_eq!(found.method, MatchMethod::ExactName);
        assert_eq!(found.confidence, 1.0);
    }

    #[tokio::test]
    async fn near_names_match_fuzzily_above_threshold() {
        let (matcher, _) = matcher().await;
        let found = matcher
            .match_company(Some("Globex Corporatio"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.method, MatchMethod::FuzzyName);
        assert!(found.confidence > 0.8);

        // "Globex" covers too little of "Globex Corporation" to clear the bar.
        assert!(matcher.match_company(Some("Globex"), None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn domain_is_the_last_resort() {
        let (matcher, _) = matcher().await;
        let found = matcher
            .match_company(Some("Unknown Trading Name"), Some("https://jobs.acme.example/apply"))
            .await
            .unwrap();
        assert!(found.is_none());

        let found = matcher
            .match_company(Some("Unknown Trading Name"), Some("http://www.acme.example/"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.method, MatchMethod::Domain);
        assert_eq!(found.confidence, 0.85);
    }

    #[tokio::test]
    async fn placeholder_employer_is_never_a_match() {
        let (matcher, store) = matcher().await;
        let placeholder = store.placeholder_employer().await.unwrap();
        let found = matcher.match_company(Some(&placeholder.name), None).await.unwrap();
        assert!(found.is_none());
    }
}
