//! Crawl scheduling with bounded concurrency and partial-failure
//! isolation.
//!
//! [`CrawlScheduler`] owns the run state machine (`idle → running →
//! idle`): at most one crawl runs per scheduler, and within a run each
//! publisher visit is an independent unit of work. One publisher's
//! failure lands in the [`CrawlRun`] error list and never rolls back or
//! aborts another publisher's upsert. Per-publisher advisory locks keep
//! an on-demand crawl and a periodic tick from visiting the same
//! publisher at once; the loser skips, it does not error.

use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use federated_index::{
    agent_url_host, normalize_agent_url, Agent, AgentType, CrawlFailure, CrawlRun, CrawlRunStatus,
    FederatedIndex, UpsertOutcome,
};

use crate::error::{RegistryError, RegistryResult};
use crate::fetch::DocumentFetcher;
use crate::metrics::METRICS;
use crate::roster::AgentRoster;
use crate::validator;

/// Scheduler knobs.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Maximum in-flight publisher visits per run. Bounded regardless of
    /// roster size so one cycle cannot exhaust outbound connections.
    pub max_concurrency: usize,
    /// Pause between periodic crawl cycles.
    pub interval: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            interval: Duration::from_secs(60 * 60),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-publisher advisory locks
// ---------------------------------------------------------------------------

/// Set of publisher domains currently being visited, across all entry
/// points into the same scheduler.
#[derive(Default)]
struct PublisherLocks {
    held: Mutex<HashSet<String>>,
}

impl PublisherLocks {
    /// Take the advisory lock for `domain`, or `None` when another visit
    /// holds it.
    fn try_acquire(self: &Arc<Self>, domain: &str) -> Option<PublisherLockGuard> {
        let mut held = self.held.lock().expect("publisher lock set poisoned");
        if held.insert(domain.to_string()) {
            Some(PublisherLockGuard {
                locks: Arc::clone(self),
                domain: domain.to_string(),
            })
        } else {
            None
        }
    }
}

struct PublisherLockGuard {
    locks: Arc<PublisherLocks>,
    domain: String,
}

impl Drop for PublisherLockGuard {
    fn drop(&mut self) {
        if let Ok(mut held) = self.locks.held.lock() {
            held.remove(&self.domain);
        }
    }
}

/// Clears the running flag on every exit path out of a crawl.
struct ActiveGuard<'a>(&'a AtomicBool);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Outcome of one publisher visit inside a run.
enum VisitOutcome {
    /// Document ingested; carries the index's upsert classification.
    Ingested(UpsertOutcome),
    /// Fetch never produced a document; prior index data untouched.
    Unreachable(String),
    /// Document rejected by validation; publisher marked invalid.
    Rejected(String),
    /// The index itself refused the write.
    StoreFailed(String),
    /// Another crawl held this publisher's advisory lock.
    Skipped,
}

struct PublisherVisit {
    domain: String,
    outcome: VisitOutcome,
}

/// Single-owner crawl state machine. Clone the [`Arc`] to share between
/// the periodic task and on-demand callers.
pub struct CrawlScheduler {
    fetcher: Arc<dyn DocumentFetcher>,
    index: Arc<dyn FederatedIndex>,
    config: CrawlConfig,
    crawl_active: AtomicBool,
    locks: Arc<PublisherLocks>,
}

impl CrawlScheduler {
    pub fn new(
        fetcher: Arc<dyn DocumentFetcher>,
        index: Arc<dyn FederatedIndex>,
        config: CrawlConfig,
    ) -> Self {
        Self {
            fetcher,
            index,
            config,
            crawl_active: AtomicBool::new(false),
            locks: Arc::new(PublisherLocks::default()),
        }
    }

    /// Whether a crawl is currently running on this scheduler.
    pub fn is_crawling(&self) -> bool {
        self.crawl_active.load(Ordering::SeqCst)
    }

    /// Execute one crawl pass over `agents` and return its summary.
    ///
    /// Registered agents are seeded into the index first, then their
    /// sales-type hosts are visited with bounded concurrency. Per-unit
    /// failures are captured on the returned [`CrawlRun`]; the only
    /// error this call itself surfaces is [`RegistryError::CrawlInProgress`]
    /// when another pass is already running.
    #[instrument(skip(self, agents), fields(agent_count = agents.len()))]
    pub async fn crawl_all_agents(&self, agents: &[Agent]) -> RegistryResult<CrawlRun> {
        if self
            .crawl_active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(RegistryError::CrawlInProgress);
        }
        let _active = ActiveGuard(&self.crawl_active);

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut errors: Vec<CrawlFailure> = Vec::new();

        if agents.is_empty() {
            warn!("crawl requested with an empty agent roster");
            let run = CrawlRun {
                run_id,
                status: CrawlRunStatus::Failed,
                started_at,
                finished_at: Utc::now(),
                agents_attempted: 0,
                agents_succeeded: 0,
                agents_failed: 0,
                publishers_unchanged: 0,
                publishers_skipped: 0,
                errors: vec![CrawlFailure {
                    agent_url: String::new(),
                    error: "empty agent roster".to_string(),
                }],
            };
            self.index.record_crawl_run(run.clone()).await?;
            return Ok(run);
        }

        // Seed the roster into the index. A rejected entry (bad URL) is
        // recorded and skipped, never fatal to the run.
        for agent in agents {
            if let Err(e) = self.index.register_agent(agent.clone()).await {
                warn!(agent_url = %agent.url, error = %e, "agent registration rejected");
                errors.push(CrawlFailure {
                    agent_url: agent.url.clone(),
                    error: e.to_string(),
                });
            }
        }

        let domains = publisher_targets(agents);
        let attempted = domains.len();
        debug!(publishers = attempted, "crawl targets resolved");

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
        let mut join_set = JoinSet::new();
        for domain in domains {
            let fetcher = Arc::clone(&self.fetcher);
            let index = Arc::clone(&self.index);
            let locks = Arc::clone(&self.locks);
            let semaphore = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let _lock = match locks.try_acquire(&domain) {
                    Some(guard) => guard,
                    None => {
                        debug!(domain = %domain, "publisher held by another crawl; skipping");
                        return PublisherVisit {
                            domain,
                            outcome: VisitOutcome::Skipped,
                        };
                    }
                };
                let outcome = visit_publisher(fetcher.as_ref(), index.as_ref(), &domain).await;
                PublisherVisit { domain, outcome }
            });
        }

        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut unchanged = 0usize;
        let mut skipped = 0usize;

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(visit) => match visit.outcome {
                    VisitOutcome::Ingested(UpsertOutcome::Unchanged) => {
                        succeeded += 1;
                        unchanged += 1;
                    }
                    VisitOutcome::Ingested(_) => succeeded += 1,
                    VisitOutcome::Skipped => skipped += 1,
                    VisitOutcome::Unreachable(error)
                    | VisitOutcome::Rejected(error)
                    | VisitOutcome::StoreFailed(error) => {
                        warn!(domain = %visit.domain, error = %error, "publisher visit failed");
                        failed += 1;
                        errors.push(CrawlFailure {
                            agent_url: visit.domain,
                            error,
                        });
                    }
                },
                Err(e) => {
                    warn!(error = %e, "crawl task join error");
                    failed += 1;
                    errors.push(CrawlFailure {
                        agent_url: String::new(),
                        error: format!("crawl task join error: {e}"),
                    });
                }
            }
        }

        let status = if errors.is_empty() {
            CrawlRunStatus::Success
        } else {
            CrawlRunStatus::PartialSuccess
        };
        let run = CrawlRun {
            run_id,
            status,
            started_at,
            finished_at: Utc::now(),
            agents_attempted: attempted,
            agents_succeeded: succeeded,
            agents_failed: failed,
            publishers_unchanged: unchanged,
            publishers_skipped: skipped,
            errors,
        };
        self.index.record_crawl_run(run.clone()).await?;
        METRICS.flush();
        info!(
            run_id = %run.run_id,
            status = ?run.status,
            attempted = run.agents_attempted,
            succeeded = run.agents_succeeded,
            failed = run.agents_failed,
            skipped = run.publishers_skipped,
            duration_ms = run.duration_ms(),
            "crawl run finished"
        );
        Ok(run)
    }

    /// Arm the recurring crawl. The first cycle starts immediately, then
    /// one per configured interval; a cycle that overlaps a still-running
    /// crawl is skipped, not queued.
    pub fn start_periodic(self: &Arc<Self>, roster: Arc<dyn AgentRoster>) -> ScheduleHandle {
        let scheduler = Arc::clone(self);
        info!(interval_secs = scheduler.config.interval.as_secs(), "periodic crawl armed");
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.config.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let agents = match roster.list_agents(None).await {
                    Ok(agents) => agents,
                    Err(e) => {
                        warn!(error = %e, "agent roster unavailable; skipping cycle");
                        continue;
                    }
                };
                match scheduler.crawl_all_agents(&agents).await {
                    Ok(run) => {
                        debug!(run_id = %run.run_id, status = ?run.status, "periodic crawl finished")
                    }
                    Err(RegistryError::CrawlInProgress) => {
                        debug!("crawl already running; periodic tick skipped")
                    }
                    Err(e) => warn!(error = %e, "periodic crawl failed"),
                }
            }
        });
        ScheduleHandle { task }
    }
}

/// Handle to the recurring crawl task.
pub struct ScheduleHandle {
    task: tokio::task::JoinHandle<()>,
}

impl ScheduleHandle {
    /// Stop the recurring crawl. A publisher visit mid-flight is dropped
    /// at its next await point; the index never sees a torn write.
    pub fn stop(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Publisher domains to visit for this roster: deduplicated hosts of the
/// sales-type agents. Only agents the index would accept count — an
/// entry rejected at registration must not turn into a visit.
fn publisher_targets(agents: &[Agent]) -> BTreeSet<String> {
    agents
        .iter()
        .filter(|agent| agent.agent_type == AgentType::Sales)
        .filter_map(|agent| normalize_agent_url(&agent.url).ok())
        .filter_map(|url| agent_url_host(&url))
        .collect()
}

/// Validate-then-upsert for one publisher; the independent unit of work.
async fn visit_publisher(
    fetcher: &dyn DocumentFetcher,
    index: &dyn FederatedIndex,
    domain: &str,
) -> VisitOutcome {
    let result = validator::validate_domain(fetcher, domain).await;
    if result.is_network_failure() {
        METRICS.inc_fetch_failures();
        return VisitOutcome::Unreachable(result.error_summary());
    }
    if !result.valid {
        METRICS.inc_documents_invalid();
    }
    match index.upsert_publisher(domain, &result).await {
        Ok(outcome) => {
            METRICS.inc_publishers_crawled();
            match outcome {
                UpsertOutcome::Inserted { agents_discovered }
                | UpsertOutcome::Updated { agents_discovered } => {
                    METRICS.add_agents_discovered(agents_discovered as u64);
                    VisitOutcome::Ingested(outcome)
                }
                UpsertOutcome::Unchanged => {
                    METRICS.inc_publishers_unchanged();
                    VisitOutcome::Ingested(outcome)
                }
                UpsertOutcome::MarkedInvalid => VisitOutcome::Rejected(result.error_summary()),
                UpsertOutcome::Skipped => VisitOutcome::Unreachable(result.error_summary()),
            }
        }
        Err(e) => VisitOutcome::StoreFailed(e.to_string()),
    }
}
