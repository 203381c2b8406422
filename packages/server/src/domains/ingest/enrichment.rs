//! Concurrent menu/review enrichment.
//!
//! For every discovered restaurant two independent jobs are submitted to a
//! bounded worker pool: one hunting menu data, one hunting reviews. Each
//! job is a two-stage pipeline - rank candidate pages from web search,
//! then walk the ranking extracting from one page at a time until a page
//! yields parseable data.
//!
//! Failure isolation is per-job: a job that fails (or times out) is
//! counted and dropped; it never aborts the batch or wedges the drain.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::domains::ingest::parser;
use crate::kernel::ServerDeps;

const RANK_MENU_INSTRUCTIONS: &str = "Below is a numbered list of web search results. \
    Return the indices of the entries ordered by how likely the page is to contain \
    the restaurant's menu. Return the indices separated by commas, nothing else.";

const RANK_REVIEW_INSTRUCTIONS: &str = "Below is a numbered list of web search results. \
    Return the indices of the entries ordered by how likely the page is to contain \
    restaurant reviews. Return the indices separated by commas, nothing else.";

const EXTRACT_MENU_INSTRUCTIONS: &str = "Below are the contents of a web page. \
    What can be ordered from the menu? Format the output as JSON: an array of objects \
    with \"dish\" and \"price\" fields. Omit currency; if a price is not stated, \
    use \"unknown\".";

const EXTRACT_REVIEW_INSTRUCTIONS: &str = "Below are the contents of a web page. \
    What are the reviews of the restaurant? Format the output as JSON: an array of \
    objects in the form [{\"review\":\"review text\",\"score\":1.5}] with score \
    between 1 and 5.";

/// Enrichment tuning knobs.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Worker pool width.
    pub workers: usize,
    /// Hard deadline per job; bounds the pool drain.
    pub job_timeout: std::time::Duration,
    /// Search results requested per job.
    pub max_results: usize,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            workers: 8,
            job_timeout: std::time::Duration::from_secs(120),
            max_results: 10,
        }
    }
}

/// Per-batch outcome counts. The pipeline never fails as a whole; these
/// exist for observability.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichmentSummary {
    pub submitted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum JobKind {
    Menu,
    Review,
}

impl JobKind {
    /// Topic token appended to the search query. Reviews use the Polish
    /// "opinie" - the corpus this system grew up on is Polish-language.
    fn search_topic(self) -> &'static str {
        match self {
            JobKind::Menu => "menu",
            JobKind::Review => "opinie",
        }
    }

    fn rank_instructions(self) -> &'static str {
        match self {
            JobKind::Menu => RANK_MENU_INSTRUCTIONS,
            JobKind::Review => RANK_REVIEW_INSTRUCTIONS,
        }
    }

    fn extract_instructions(self) -> &'static str {
        match self {
            JobKind::Menu => EXTRACT_MENU_INSTRUCTIONS,
            JobKind::Review => EXTRACT_REVIEW_INSTRUCTIONS,
        }
    }

    fn label(self) -> &'static str {
        match self {
            JobKind::Menu => "menu",
            JobKind::Review => "review",
        }
    }
}

/// Run menu and review jobs for every restaurant name in `names`,
/// blocking until the pool drains.
pub async fn enrich(
    deps: &ServerDeps,
    config: &EnrichmentConfig,
    names: &[String],
    place: &str,
) -> EnrichmentSummary {
    let semaphore = Arc::new(Semaphore::new(config.workers));
    let mut jobs = JoinSet::new();

    let mut summary = EnrichmentSummary {
        submitted: names.len() * 2,
        ..Default::default()
    };

    for name in names {
        for kind in [JobKind::Menu, JobKind::Review] {
            let semaphore = semaphore.clone();
            let deps = deps.clone();
            let config = config.clone();
            let name = name.clone();
            let place = place.to_string();

            jobs.spawn(async move {
                let _permit = semaphore.acquire_owned().await.unwrap();

                let outcome =
                    tokio::time::timeout(config.job_timeout, run_job(&deps, &config, &name, &place, kind))
                        .await;

                match outcome {
                    Ok(Ok(count)) => {
                        info!(
                            restaurant = %name,
                            kind = kind.label(),
                            items = count,
                            "Enrichment job finished"
                        );
                        true
                    }
                    Ok(Err(e)) => {
                        warn!(restaurant = %name, kind = kind.label(), error = %e, "Enrichment job failed");
                        false
                    }
                    Err(_) => {
                        warn!(restaurant = %name, kind = kind.label(), "Enrichment job timed out");
                        false
                    }
                }
            });
        }
    }

    while let Some(joined) = jobs.join_next().await {
        match joined {
            Ok(true) => summary.succeeded += 1,
            Ok(false) => summary.failed += 1,
            Err(e) => {
                warn!(error = %e, "Enrichment job panicked");
                summary.failed += 1;
            }
        }
    }

    info!(
        submitted = summary.submitted,
        succeeded = summary.succeeded,
        failed = summary.failed,
        "Enrichment batch drained"
    );

    summary
}

/// One two-stage job. Returns the number of items written.
async fn run_job(
    deps: &ServerDeps,
    config: &EnrichmentConfig,
    name: &str,
    place: &str,
    kind: JobKind,
) -> Result<usize> {
    // Rank stage
    let query = format!("{} {} {}", name, place, kind.search_topic());
    let results = deps
        .search
        .search(&query, config.max_results)
        .await
        .context("Search failed")?;

    if results.is_empty() {
        anyhow::bail!("No search results for '{}'", query);
    }

    let listing: String = results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}: {} | {} | {}\n", i, r.title, r.url, r.snippet))
        .collect();

    let ranking = deps
        .ai
        .complete(kind.rank_instructions(), &listing)
        .await
        .context("Ranking completion failed")?;

    let order = parse_ranking(&ranking, results.len());
    if order.is_empty() {
        anyhow::bail!("Unusable ranking: {}", ranking);
    }

    // Extract stage: first page that yields parseable data wins.
    for index in order {
        let url = &results[index].url;

        let page = match deps.fetcher.fetch(url).await {
            Ok(page) => page,
            Err(e) => {
                debug!(url = %url, error = %e, "Candidate fetch failed, trying next");
                continue;
            }
        };

        let extracted = match deps.ai.complete(kind.extract_instructions(), &page).await {
            Ok(text) => text,
            Err(e) => {
                debug!(url = %url, error = %e, "Candidate extraction failed, trying next");
                continue;
            }
        };

        let written = match kind {
            JobKind::Menu => match parser::parse_menu(&extracted) {
                Ok(rows) => {
                    deps.graph.upsert_menu_items(name, &rows).await?;
                    rows.len()
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Candidate parse failed, trying next");
                    continue;
                }
            },
            JobKind::Review => match parser::parse_reviews(&extracted) {
                Ok(rows) => {
                    deps.graph.upsert_reviews(name, &rows).await?;
                    rows.len()
                }
                Err(e) => {
                    debug!(url = %url, error = %e, "Candidate parse failed, trying next");
                    continue;
                }
            },
        };

        return Ok(written);
    }

    anyhow::bail!("All ranked candidates exhausted without usable data")
}

/// Parse a comma-separated index ranking, keeping only in-range indices
/// and dropping duplicates while preserving order.
fn parse_ranking(ranking: &str, len: usize) -> Vec<usize> {
    let mut seen = vec![false; len];
    ranking
        .split(',')
        .filter_map(|token| token.trim().parse::<usize>().ok())
        .filter(|&i| {
            if i < len && !seen[i] {
                seen[i] = true;
                true
            } else {
                false
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use nominatim_client::MockPlaceDirectory;
    use tempfile::TempDir;

    use crate::domains::chat::audit::AuditTrail;
    use crate::graph::MemoryGraphStore;
    use crate::kernel::test_dependencies::{MockCompletion, MockFetcher, MockSearch};

    fn test_deps(
        graph: Arc<MemoryGraphStore>,
        ai: MockCompletion,
        search: MockSearch,
        fetcher: MockFetcher,
        audit_dir: &TempDir,
    ) -> ServerDeps {
        ServerDeps::new(
            graph,
            Arc::new(ai),
            Arc::new(search),
            Arc::new(fetcher),
            Arc::new(MockPlaceDirectory::new()),
            Arc::new(AuditTrail::new(audit_dir.path())),
        )
    }

    #[test]
    fn ranking_parser_is_lenient() {
        assert_eq!(parse_ranking("2, 0, 1", 3), vec![2, 0, 1]);
        assert_eq!(parse_ranking("1, oops, 9, 1, 0", 2), vec![1, 0]);
        assert!(parse_ranking("no numbers here", 3).is_empty());
    }

    #[tokio::test]
    async fn menu_and_review_jobs_write_through_the_store() {
        let graph = Arc::new(MemoryGraphStore::new());
        let audit_dir = TempDir::new().unwrap();

        let search = MockSearch::new()
            .with_urls("menu", &["https://menus.example/studencka"])
            .with_urls("opinie", &["https://reviews.example/studencka"]);
        let fetcher = MockFetcher::new()
            .with_page("https://menus.example/studencka", "<html>menu page</html>")
            .with_page("https://reviews.example/studencka", "<html>reviews</html>");
        let ai = MockCompletion::new()
            .with_response("separated by commas", "0")
            .with_response(
                "ordered from the menu",
                r#"[{"dish":"Pierogi","price":25.5}]"#,
            )
            .with_response(
                "What are the reviews",
                r#"[{"review":"Świetne","score":5}]"#,
            );

        let deps = test_deps(graph.clone(), ai, search, fetcher, &audit_dir);
        let summary = enrich(
            &deps,
            &EnrichmentConfig::default(),
            &["Studencka".to_string()],
            "Warszawa",
        )
        .await;

        assert_eq!(summary.submitted, 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(graph.menu_items("Studencka").len(), 1);
        assert_eq!(graph.reviews("Studencka").len(), 1);
    }

    #[tokio::test]
    async fn one_failing_entity_does_not_stop_the_batch() {
        let graph = Arc::new(MemoryGraphStore::new());
        let audit_dir = TempDir::new().unwrap();

        // Search results only exist for Studencka; Widmo's jobs fail.
        let search = MockSearch::new()
            .with_urls("Studencka", &["https://pages.example/studencka"]);
        let fetcher = MockFetcher::new()
            .with_page("https://pages.example/studencka", "<html>page</html>");
        let ai = MockCompletion::new()
            .with_response("separated by commas", "0")
            .with_response("ordered from the menu", r#"[{"dish":"Bigos"}]"#)
            .with_response("What are the reviews", r#"[{"review":"Ok","score":3}]"#);

        let deps = test_deps(graph.clone(), ai, search, fetcher, &audit_dir);
        let summary = enrich(
            &deps,
            &EnrichmentConfig::default(),
            &["Studencka".to_string(), "Widmo".to_string()],
            "Warszawa",
        )
        .await;

        assert_eq!(summary.submitted, 4);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(graph.menu_items("Studencka").len(), 1);
        assert!(graph.menu_items("Widmo").is_empty());
    }

    #[tokio::test]
    async fn extract_stage_falls_through_to_next_ranked_candidate() {
        let graph = Arc::new(MemoryGraphStore::new());
        let audit_dir = TempDir::new().unwrap();

        let search = MockSearch::new().with_urls(
            "menu",
            &["https://bad.example/page", "https://good.example/page"],
        );
        // First-ranked page fetches but extracts garbage; second succeeds.
        let fetcher = MockFetcher::new()
            .with_page("https://bad.example/page", "<html>nothing here</html>")
            .with_page("https://good.example/page", "<html>menu</html>");
        let ai = MockCompletion::new()
            .with_response("separated by commas", "0, 1")
            .with_response("ordered from the menu", "{}")
            .with_response("ordered from the menu", r#"[{"dish":"Pierogi"}]"#);

        let deps = test_deps(graph.clone(), ai, search, fetcher, &audit_dir);
        let config = EnrichmentConfig::default();
        let result = run_job(&deps, &config, "Studencka", "Warszawa", JobKind::Menu).await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(graph.menu_items("Studencka")[0].dish, "Pierogi");
    }

    #[tokio::test]
    async fn exhausted_candidates_fail_the_job() {
        let graph = Arc::new(MemoryGraphStore::new());
        let audit_dir = TempDir::new().unwrap();

        let search = MockSearch::new().with_urls("menu", &["https://bad.example/page"]);
        let fetcher =
            MockFetcher::new().with_page("https://bad.example/page", "<html>x</html>");
        let ai = MockCompletion::new()
            .with_response("separated by commas", "0")
            .with_response("ordered from the menu", "[]");

        let deps = test_deps(graph.clone(), ai, search, fetcher, &audit_dir);
        let config = EnrichmentConfig::default();
        let result = run_job(&deps, &config, "Studencka", "Warszawa", JobKind::Menu).await;

        assert!(result.is_err());
        assert!(graph.menu_items("Studencka").is_empty());
    }
}
