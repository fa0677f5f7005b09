// SPDX-FileCopyrightText: 2026 NeuroBridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Eye-gaze ingest: consent gate, filtering, per-second sampling and
//! per-block aggregation.
//!
//! Telemetry is best-effort. Once a batch passes the consent gate, storage
//! failures are logged and the accepted count is still returned.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use neurobridge_config::model::GazeConfig;
use neurobridge_core::types::{GazeBlockStat, GazeEvent, format_timestamp, now_timestamp};
use neurobridge_core::{Metadata, NeuroError, RequestContext};
use neurobridge_storage::Database;
use neurobridge_storage::queries::gaze::{self, BlockStatDelta};
use neurobridge_storage::queries::prefs;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::new_id;

/// Prefs key that grants gaze collection.
pub const CONSENT_KEY: &str = "allowEyeTracking";

/// Hits without a usable `dt_ms` count for this long.
const DEFAULT_DT_MS: i64 = 100;
const MAX_DT_MS: i64 = 2000;

/// Raw-event retention runs at most this often per process.
const RETENTION_INTERVAL: Duration = Duration::from_secs(3600);

/// Per-second sample counters untouched for this long are forgotten.
const SAMPLE_WINDOW: Duration = Duration::from_secs(120);

/// One gaze sample as sent by the client. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GazeHit {
    pub block_id: String,
    pub line_id: Option<String>,
    pub x: f64,
    pub y: f64,
    /// In `[0, 1]`.
    pub confidence: f64,
    /// Epoch seconds.
    pub ts: f64,
    pub dt_ms: Option<i64>,
    pub read_credit: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GazeIngestRequest {
    /// Defaults to the caller's auth session.
    pub session_id: Option<String>,
    pub path_id: Option<String>,
    pub node_id: Option<String>,
    pub hits: Vec<GazeHit>,
}

/// A hit that survived filtering, with normalized values.
#[derive(Debug, Clone, PartialEq)]
struct AcceptedHit {
    block_id: String,
    line_id: Option<String>,
    x: f64,
    y: f64,
    confidence: f64,
    ts: f64,
    dt_ms: i64,
    read_credit: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct BlockAggregate {
    fixation_ms: i64,
    fixation_count: i64,
    read_credit: f64,
    last_ts: f64,
    line_ms: BTreeMap<String, i64>,
}

/// Hits accepted so far per user and whole second of `ts`, across batches.
#[derive(Debug, Default)]
struct SampleBudget {
    seen: HashMap<(String, i64), (usize, Instant)>,
}

impl SampleBudget {
    /// Count one hit against `(user_id, second)` unless `limit` is reached.
    fn admit(&mut self, user_id: &str, second: i64, limit: usize) -> bool {
        let (count, touched) = self
            .seen
            .entry((user_id.to_string(), second))
            .or_insert((0, Instant::now()));
        *touched = Instant::now();
        if *count >= limit {
            return false;
        }
        *count += 1;
        true
    }

    fn prune(&mut self, window: Duration) {
        self.seen.retain(|_, (_, touched)| touched.elapsed() < window);
    }
}

pub struct GazeService {
    db: Database,
    config: GazeConfig,
    consent: Mutex<HashMap<String, (bool, Instant)>>,
    sampled: Mutex<SampleBudget>,
    last_retention: Mutex<Option<Instant>>,
}

impl GazeService {
    pub fn new(db: Database, config: GazeConfig) -> Self {
        Self {
            db,
            config,
            consent: Mutex::new(HashMap::new()),
            sampled: Mutex::new(SampleBudget::default()),
            last_retention: Mutex::new(None),
        }
    }

    /// Ingest a batch, returning how many hits were accepted.
    pub async fn ingest(&self, ctx: &RequestContext, req: GazeIngestRequest) -> Result<usize, NeuroError> {
        let identity = ctx
            .identity()
            .ok_or_else(|| NeuroError::unauthenticated("gaze ingest needs a session"))?;
        let user_id = identity.user_id.as_str();
        if !self.config.enabled {
            return Ok(0);
        }
        if !self.has_consent(user_id).await? {
            debug!(user_id, "gaze consent not granted, batch dropped");
            return Ok(0);
        }

        let session_id = req
            .session_id
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| identity.session_id.clone());
        let accepted = {
            let mut budget = self.sampled.lock().unwrap_or_else(PoisonError::into_inner);
            budget.prune(SAMPLE_WINDOW);
            filter_and_sample(req.hits, &self.config, &mut budget, user_id)
        };
        if accepted.is_empty() {
            return Ok(0);
        }

        let now = now_timestamp();
        for (block_id, agg) in aggregate(&accepted) {
            let delta = BlockStatDelta {
                id: new_id(),
                user_id: user_id.to_string(),
                session_id: session_id.clone(),
                block_id: block_id.clone(),
                path_id: req.path_id.clone(),
                node_id: req.node_id.clone(),
                fixation_ms: agg.fixation_ms,
                fixation_count: agg.fixation_count,
                read_credit: agg.read_credit,
                last_seen_at: ts_to_timestamp(agg.last_ts),
                line_ms: agg.line_ms,
            };
            if let Err(e) = gaze::upsert_block_stat(&self.db, &delta, &now).await {
                warn!(user_id, block_id = %block_id, error = %e, "gaze stat upsert failed");
            }
        }

        if self.config.store_raw {
            let events = accepted
                .iter()
                .map(|hit| GazeEvent {
                    id: new_id(),
                    user_id: user_id.to_string(),
                    session_id: session_id.clone(),
                    path_id: req.path_id.clone(),
                    node_id: req.node_id.clone(),
                    block_id: hit.block_id.clone(),
                    line_id: hit.line_id.clone(),
                    x: hit.x,
                    y: hit.y,
                    confidence: hit.confidence,
                    dt_ms: hit.dt_ms,
                    read_credit: hit.read_credit,
                    occurred_at: ts_to_timestamp(hit.ts),
                    created_at: now.clone(),
                })
                .collect();
            if let Err(e) = gaze::insert_events(&self.db, events).await {
                warn!(user_id, error = %e, "raw gaze insert failed");
            }
        }

        self.maybe_apply_retention(user_id).await;
        Ok(accepted.len())
    }

    /// The caller's prefs, empty when never set.
    pub async fn get_prefs(&self, ctx: &RequestContext) -> Result<Metadata, NeuroError> {
        Ok(prefs::get_prefs(&self.db, ctx.user_id()?)
            .await?
            .unwrap_or_default())
    }

    /// Replace the caller's prefs and drop their cached consent.
    pub async fn set_prefs(&self, ctx: &RequestContext, new_prefs: Metadata) -> Result<Metadata, NeuroError> {
        let user_id = ctx.user_id()?;
        prefs::upsert_prefs(&self.db, &new_id(), user_id, &new_prefs, &now_timestamp()).await?;
        if let Ok(mut cache) = self.consent.lock() {
            cache.remove(user_id);
        }
        info!(user_id, consent = consent_from(&new_prefs), "personalization prefs updated");
        Ok(new_prefs)
    }

    pub async fn block_stats(&self, ctx: &RequestContext, session_id: &str) -> Result<Vec<GazeBlockStat>, NeuroError> {
        gaze::list_block_stats(&self.db, ctx.user_id()?, session_id).await
    }

    async fn has_consent(&self, user_id: &str) -> Result<bool, NeuroError> {
        let ttl = Duration::from_secs(self.config.consent_cache_secs);
        if let Ok(cache) = self.consent.lock()
            && let Some((granted, at)) = cache.get(user_id)
            && at.elapsed() < ttl
        {
            return Ok(*granted);
        }

        let granted = prefs::get_prefs(&self.db, user_id)
            .await?
            .is_some_and(|p| consent_from(&p));
        if let Ok(mut cache) = self.consent.lock() {
            cache.retain(|_, (_, at)| at.elapsed() < ttl);
            cache.insert(user_id.to_string(), (granted, Instant::now()));
        }
        Ok(granted)
    }

    async fn maybe_apply_retention(&self, user_id: &str) {
        let due = match self.last_retention.lock() {
            Ok(mut last) => {
                let due = last.is_none_or(|at| at.elapsed() >= RETENTION_INTERVAL);
                if due {
                    *last = Some(Instant::now());
                }
                due
            }
            Err(_) => false,
        };
        if !due {
            return;
        }

        let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(self.config.retention_days));
        match gaze::delete_events_before(&self.db, user_id, &format_timestamp(cutoff)).await {
            Ok(0) => {}
            Ok(deleted) => info!(user_id, deleted, "expired raw gaze events removed"),
            Err(e) => warn!(user_id, error = %e, "gaze retention sweep failed"),
        }
    }
}

fn consent_from(prefs: &Metadata) -> bool {
    prefs.get(CONSENT_KEY).and_then(Value::as_bool).unwrap_or(false)
}

/// Cap the batch, drop unusable hits, normalize values, then keep at most
/// `max_points_per_sec` hits per user and whole second of `ts`, counting
/// hits `budget` already accepted from earlier batches.
fn filter_and_sample(
    hits: Vec<GazeHit>,
    config: &GazeConfig,
    budget: &mut SampleBudget,
    user_id: &str,
) -> Vec<AcceptedHit> {
    let min_confidence = f64::from(config.min_confidence_pct) / 100.0;

    hits.into_iter()
        .take(config.max_batch)
        .filter(|hit| !hit.block_id.trim().is_empty())
        .filter(|hit| hit.confidence >= min_confidence)
        .filter_map(|hit| {
            if !budget.admit(user_id, hit.ts.floor() as i64, config.max_points_per_sec) {
                return None;
            }

            let dt_ms = match hit.dt_ms {
                Some(dt) if dt > 0 && dt <= MAX_DT_MS => dt,
                _ => DEFAULT_DT_MS,
            };
            let read_credit = hit
                .read_credit
                .filter(|c| c.is_finite())
                .unwrap_or(0.0)
                .clamp(0.0, 1.0);
            Some(AcceptedHit {
                block_id: hit.block_id,
                line_id: hit.line_id.filter(|l| !l.is_empty()),
                x: hit.x,
                y: hit.y,
                confidence: hit.confidence,
                ts: hit.ts,
                dt_ms,
                read_credit,
            })
        })
        .collect()
}

fn aggregate(hits: &[AcceptedHit]) -> BTreeMap<String, BlockAggregate> {
    let mut blocks: BTreeMap<String, BlockAggregate> = BTreeMap::new();
    for hit in hits {
        let agg = blocks.entry(hit.block_id.clone()).or_default();
        agg.fixation_ms += hit.dt_ms;
        agg.fixation_count += 1;
        agg.read_credit = agg.read_credit.max(hit.read_credit);
        agg.last_ts = agg.last_ts.max(hit.ts);
        if let Some(line) = &hit.line_id {
            *agg.line_ms.entry(line.clone()).or_insert(0) += hit.dt_ms;
        }
    }
    blocks
}

fn ts_to_timestamp(ts: f64) -> String {
    chrono::DateTime::from_timestamp_millis((ts * 1000.0) as i64)
        .filter(|_| ts.is_finite() && ts > 0.0)
        .map(format_timestamp)
        .unwrap_or_else(now_timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use neurobridge_test_utils::{authenticated, seed_user};
    use serde_json::json;

    fn hit(block: &str, ts: f64) -> GazeHit {
        GazeHit {
            block_id: block.into(),
            line_id: None,
            x: 0.5,
            y: 0.5,
            confidence: 0.9,
            ts,
            dt_ms: Some(50),
            read_credit: Some(0.2),
        }
    }

    fn consent(granted: bool) -> Metadata {
        let mut prefs = Metadata::new();
        prefs.insert(CONSENT_KEY.into(), json!(granted));
        prefs
    }

    fn sample(hits: Vec<GazeHit>, config: &GazeConfig) -> Vec<AcceptedHit> {
        filter_and_sample(hits, config, &mut SampleBudget::default(), "u1")
    }

    async fn service(config: GazeConfig) -> (Database, GazeService, RequestContext) {
        let db = Database::open_in_memory().await.unwrap();
        seed_user(&db, "u1").await;
        let service = GazeService::new(db.clone(), config);
        (db, service, authenticated("u1"))
    }

    #[test]
    fn filter_drops_blank_and_low_confidence_and_normalizes() {
        let config = GazeConfig::default();
        let mut low = hit("b1", 10.0);
        low.confidence = 0.39;
        let mut odd = hit("b1", 10.1);
        odd.dt_ms = Some(5000);
        odd.read_credit = Some(3.0);
        let mut zero = hit("b2", 10.2);
        zero.dt_ms = Some(0);
        zero.read_credit = None;

        let accepted = sample(vec![hit(" ", 10.0), low, odd, zero], &config);
        assert_eq!(accepted.len(), 2);
        assert_eq!((accepted[0].dt_ms, accepted[0].read_credit), (100, 1.0));
        assert_eq!((accepted[1].dt_ms, accepted[1].read_credit), (100, 0.0));
    }

    #[test]
    fn sampling_bounds_each_second() {
        let config = GazeConfig {
            max_points_per_sec: 3,
            ..GazeConfig::default()
        };
        let hits: Vec<_> = (0..10)
            .map(|i| hit("b1", 100.0 + f64::from(i) * 0.05))
            .chain((0..2).map(|i| hit("b1", 101.0 + f64::from(i) * 0.1)))
            .collect();
        let accepted = sample(hits, &config);
        let in_first = accepted.iter().filter(|h| h.ts < 101.0).count();
        assert_eq!(in_first, 3);
        assert_eq!(accepted.len(), 5);
    }

    #[test]
    fn sample_budget_is_per_user() {
        let config = GazeConfig {
            max_points_per_sec: 2,
            ..GazeConfig::default()
        };
        let mut budget = SampleBudget::default();
        let batch = || vec![hit("b1", 50.1), hit("b1", 50.2), hit("b1", 50.3)];
        assert_eq!(filter_and_sample(batch(), &config, &mut budget, "u1").len(), 2);
        assert!(filter_and_sample(batch(), &config, &mut budget, "u1").is_empty());
        assert_eq!(filter_and_sample(batch(), &config, &mut budget, "u2").len(), 2);

        budget.prune(Duration::ZERO);
        assert_eq!(filter_and_sample(batch(), &config, &mut budget, "u1").len(), 2);
    }

    #[test]
    fn batch_is_truncated() {
        let config = GazeConfig {
            max_batch: 4,
            max_points_per_sec: 100,
            ..GazeConfig::default()
        };
        let hits = (0..10).map(|i| hit("b1", f64::from(i))).collect();
        assert_eq!(sample(hits, &config).len(), 4);
    }

    #[test]
    fn aggregate_sums_per_block_and_line() {
        let mut a = hit("b1", 5.0);
        a.line_id = Some("l1".into());
        let mut b = hit("b1", 6.0);
        b.line_id = Some("l1".into());
        b.read_credit = Some(0.7);
        let accepted = sample(vec![a, b, hit("b2", 7.0)], &GazeConfig::default());
        let blocks = aggregate(&accepted);

        let b1 = &blocks["b1"];
        assert_eq!((b1.fixation_ms, b1.fixation_count), (100, 2));
        assert_eq!(b1.read_credit, 0.7);
        assert_eq!(b1.last_ts, 6.0);
        assert_eq!(b1.line_ms["l1"], 100);
        assert_eq!(blocks["b2"].fixation_count, 1);
    }

    #[tokio::test]
    async fn without_consent_nothing_is_written() {
        let (db, service, ctx) = service(GazeConfig {
            store_raw: true,
            ..GazeConfig::default()
        })
        .await;
        let req = GazeIngestRequest {
            hits: vec![hit("b1", 1.0)],
            ..GazeIngestRequest::default()
        };
        assert_eq!(service.ingest(&ctx, req.clone()).await.unwrap(), 0);

        service.set_prefs(&ctx, consent(false)).await.unwrap();
        assert_eq!(service.ingest(&ctx, req).await.unwrap(), 0);

        assert_eq!(gaze::count_events(&db, "u1").await.unwrap(), 0);
        assert!(service.block_stats(&ctx, "session-u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn consented_ingest_upserts_block_stats() {
        let (db, service, ctx) = service(GazeConfig {
            store_raw: true,
            ..GazeConfig::default()
        })
        .await;
        service.set_prefs(&ctx, consent(true)).await.unwrap();

        let mut lined = hit("b1", 1_700_000_000.2);
        lined.line_id = Some("l3".into());
        let req = GazeIngestRequest {
            session_id: Some("s1".into()),
            path_id: Some("p1".into()),
            hits: vec![lined, hit("b1", 1_700_000_000.4)],
            ..GazeIngestRequest::default()
        };
        assert_eq!(service.ingest(&ctx, req.clone()).await.unwrap(), 2);
        assert_eq!(service.ingest(&ctx, req).await.unwrap(), 2);

        let stats = service.block_stats(&ctx, "s1").await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].fixation_ms, 200);
        assert_eq!(stats[0].fixation_count, 4);
        assert_eq!(stats[0].metadata["lines"]["l3"], 100);
        assert!(stats[0].last_seen_at.starts_with("2023-11-14T22:13:20"));
        assert_eq!(gaze::count_events(&db, "u1").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn sampling_spans_batches_in_the_same_second() {
        let (_, service, ctx) = service(GazeConfig::default()).await;
        service.set_prefs(&ctx, consent(true)).await.unwrap();
        let batch = || GazeIngestRequest {
            session_id: Some("s1".into()),
            hits: (0..30).map(|i| hit("b1", 100.0 + f64::from(i) / 40.0)).collect(),
            ..GazeIngestRequest::default()
        };

        assert_eq!(service.ingest(&ctx, batch()).await.unwrap(), 30);
        assert_eq!(service.ingest(&ctx, batch()).await.unwrap(), 0);

        let stats = service.block_stats(&ctx, "s1").await.unwrap();
        assert_eq!(stats[0].fixation_count, 30);
    }

    #[tokio::test]
    async fn revoking_consent_takes_effect_immediately() {
        let (_, service, ctx) = service(GazeConfig::default()).await;
        service.set_prefs(&ctx, consent(true)).await.unwrap();
        let req = GazeIngestRequest {
            hits: vec![hit("b1", 1.0)],
            ..GazeIngestRequest::default()
        };
        assert_eq!(service.ingest(&ctx, req.clone()).await.unwrap(), 1);

        service.set_prefs(&ctx, consent(false)).await.unwrap();
        assert_eq!(service.ingest(&ctx, req).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn disabled_ingest_accepts_nothing() {
        let (_, service, ctx) = service(GazeConfig {
            enabled: false,
            ..GazeConfig::default()
        })
        .await;
        service.set_prefs(&ctx, consent(true)).await.unwrap();
        let req = GazeIngestRequest {
            hits: vec![hit("b1", 1.0)],
            ..GazeIngestRequest::default()
        };
        assert_eq!(service.ingest(&ctx, req).await.unwrap(), 0);
    }
}
