//! Visitor statistics service
//!
//! Reads go through the TTL cache: a hit returns immediately, a miss fans
//! out the independent queries, shapes the rows and stores the result.
//! Writes persist one row and then drop the cached aggregates that the new
//! row makes stale. Cached pages are left alone and age out on their own
//! (shorter) TTL, trading a little freshness for fewer count queries.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::analytics::geoip::GeoLocator;
use crate::analytics::models::{
    HealthReport, PaginatedVisitors, VisitEvent, VisitorStats, VisitorSummary, DIRECT_REFERER,
    UNKNOWN,
};
use crate::analytics::queries::VisitorQueries;
use crate::analytics::user_agent::classify;
use crate::cache::{keys, TtlCache};
use crate::config::CacheConfig;
use crate::storage::{QueryExecutor, QueryResult, RowSet, Value};

/// Number of visits embedded in [`VisitorStats::recent`]
pub const STATS_RECENT_LIMIT: u32 = 10;

/// Everything the service keeps in its cache
#[derive(Debug, Clone, PartialEq)]
pub enum CachedRead {
    Stats(VisitorStats),
    Page(PaginatedVisitors),
    Count(i64),
    Recent(Vec<VisitorSummary>),
}

pub struct VisitorService {
    executor: Arc<dyn QueryExecutor>,
    cache: TtlCache<CachedRead>,
    queries: VisitorQueries,
    ttls: CacheConfig,
    locator: GeoLocator,
}

impl VisitorService {
    pub fn new(executor: Arc<dyn QueryExecutor>, ttls: CacheConfig) -> Self {
        Self::with_cache(executor, TtlCache::new(), ttls)
    }

    /// Build the service around an existing cache instance
    pub fn with_cache(
        executor: Arc<dyn QueryExecutor>,
        cache: TtlCache<CachedRead>,
        ttls: CacheConfig,
    ) -> Self {
        let queries = VisitorQueries::new(executor.dialect());
        Self {
            executor,
            cache,
            queries,
            ttls,
            locator: GeoLocator::placeholder(),
        }
    }

    pub fn with_locator(mut self, locator: GeoLocator) -> Self {
        self.locator = locator;
        self
    }

    pub fn cache(&self) -> &TtlCache<CachedRead> {
        &self.cache
    }

    /// Distinct-session totals plus the latest visits
    pub async fn get_stats(&self) -> QueryResult<VisitorStats> {
        if let Some(CachedRead::Stats(stats)) = self.cache.get(keys::VISITOR_STATS) {
            debug!("Serving visitor stats from cache");
            return Ok(stats);
        }

        let recent_params = [Value::from(i64::from(STATS_RECENT_LIMIT))];
        let (aggregate, recent) = tokio::try_join!(
            self.executor.execute(&self.queries.stats, &[]),
            self.executor.execute(&self.queries.recent, &recent_params),
        )?;

        let row = aggregate.first();
        let stats = VisitorStats {
            total: row.and_then(|r| r.get_i64("total_visitors")).unwrap_or(0),
            today: row.and_then(|r| r.get_i64("today_visitors")).unwrap_or(0),
            recent: summaries(&recent),
        };

        self.cache.set_with_ttl(
            keys::VISITOR_STATS,
            CachedRead::Stats(stats.clone()),
            ttl(self.ttls.stats_ttl_ms),
        );
        debug!(total = stats.total, today = stats.today, "Visitor stats cached");

        Ok(stats)
    }

    /// One page of visits, newest first. `page` is 1-based; both arguments
    /// are expected to be validated by the caller.
    pub async fn get_paginated(&self, page: u32, page_size: u32) -> QueryResult<PaginatedVisitors> {
        let key = keys::visitors_page(page, page_size);
        if let Some(CachedRead::Page(cached)) = self.cache.get(&key) {
            debug!(page, page_size, "Serving visitor page from cache");
            return Ok(cached);
        }

        let offset = i64::from(page.saturating_sub(1)) * i64::from(page_size);
        let window_params = [Value::from(i64::from(page_size)), Value::from(offset)];
        let (window, count) = tokio::try_join!(
            self.executor.execute(&self.queries.page, &window_params),
            self.executor.execute(&self.queries.count_rows, &[]),
        )?;

        let visitors = summaries(&window);
        let total = first_count(&count, "total");
        let has_more = offset + (visitors.len() as i64) < total;
        let result = PaginatedVisitors {
            visitors,
            total,
            has_more,
        };

        self.cache.set_with_ttl(
            key,
            CachedRead::Page(result.clone()),
            ttl(self.ttls.page_ttl_ms),
        );

        Ok(result)
    }

    /// Distinct sessions ever recorded
    pub async fn get_total_visitors(&self) -> QueryResult<i64> {
        self.cached_count(
            keys::TOTAL_VISITORS,
            &self.queries.total_sessions,
            "total",
            self.ttls.total_ttl_ms,
        )
        .await
    }

    /// Distinct sessions seen on the current calendar day
    pub async fn get_today_visitors(&self) -> QueryResult<i64> {
        self.cached_count(
            keys::TODAY_VISITORS,
            &self.queries.today_sessions,
            "today",
            self.ttls.today_ttl_ms,
        )
        .await
    }

    pub async fn get_recent_visitors(&self, limit: u32) -> QueryResult<Vec<VisitorSummary>> {
        let key = keys::recent_visitors(limit);
        if let Some(CachedRead::Recent(recent)) = self.cache.get(&key) {
            return Ok(recent);
        }

        let rows = self
            .executor
            .execute(&self.queries.recent, &[Value::from(i64::from(limit))])
            .await?;
        let recent = summaries(&rows);

        self.cache.set_with_ttl(
            key,
            CachedRead::Recent(recent.clone()),
            ttl(self.ttls.recent_ttl_ms),
        );

        Ok(recent)
    }

    /// Persist one visit, then invalidate the aggregates it affects.
    ///
    /// Nothing is invalidated when the insert fails.
    pub async fn record_visit(
        &self,
        ip_address: &str,
        user_agent: Option<&str>,
        referer: &str,
        session_id: &str,
    ) -> QueryResult<()> {
        let event = self.build_event(ip_address, user_agent, referer, session_id);

        let params = [
            Value::from(event.ip_address.as_str()),
            Value::from(event.user_agent.as_deref()),
            Value::from(event.referer.as_str()),
            Value::from(event.location.country.as_str()),
            Value::from(event.location.region.as_str()),
            Value::from(event.location.city.as_str()),
            Value::from(event.client.device.as_str()),
            Value::from(event.client.browser.as_str()),
            Value::from(event.client.os.as_str()),
            Value::from(event.session_id.as_str()),
        ];
        self.executor.execute(&self.queries.insert, &params).await?;

        self.cache.delete(keys::VISITOR_STATS);
        self.cache.delete(keys::TOTAL_VISITORS);
        self.cache.delete(keys::TODAY_VISITORS);
        self.cache.delete_prefix(keys::RECENT_VISITORS_PREFIX);

        info!(
            device = event.client.device.as_str(),
            browser = event.client.browser.as_str(),
            "Visit recorded, visitor caches invalidated"
        );
        Ok(())
    }

    /// Drop every cached read unconditionally
    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("Visitor cache cleared");
    }

    /// Probe the store. The server version is diagnostic only, so failing
    /// to read it degrades to "unknown" instead of failing the probe.
    pub async fn health(&self) -> HealthReport {
        let backend = self.executor.dialect().name().to_string();
        let timestamp = chrono::Utc::now().to_rfc3339();

        let test_result = match self.executor.execute(self.queries.ping, &[]).await {
            Ok(rows) => rows.first().and_then(|r| r.get_i64("test")),
            Err(e) => {
                return HealthReport {
                    healthy: false,
                    backend,
                    version: UNKNOWN.to_string(),
                    test_result: None,
                    error: Some(e.to_string()),
                    timestamp,
                };
            }
        };

        let version = match self.executor.execute(self.queries.version, &[]).await {
            Ok(rows) => rows
                .first()
                .and_then(|r| r.get_str("version"))
                .unwrap_or(UNKNOWN)
                .to_string(),
            Err(e) => {
                warn!("Failed to read database version: {}", e);
                UNKNOWN.to_string()
            }
        };

        HealthReport {
            healthy: true,
            backend,
            version,
            test_result,
            error: None,
            timestamp,
        }
    }

    fn build_event(
        &self,
        ip_address: &str,
        user_agent: Option<&str>,
        referer: &str,
        session_id: &str,
    ) -> VisitEvent {
        let referer = match referer.trim() {
            "" => DIRECT_REFERER,
            r => r,
        };

        VisitEvent {
            ip_address: ip_address.to_string(),
            user_agent: user_agent.map(str::to_string),
            referer: referer.to_string(),
            client: classify(user_agent),
            location: self.locator.locate(ip_address),
            session_id: session_id.to_string(),
        }
    }

    async fn cached_count(
        &self,
        key: &str,
        sql: &str,
        column: &str,
        ttl_ms: u64,
    ) -> QueryResult<i64> {
        if let Some(CachedRead::Count(count)) = self.cache.get(key) {
            return Ok(count);
        }

        let rows = self.executor.execute(sql, &[]).await?;
        let count = first_count(&rows, column);
        self.cache
            .set_with_ttl(key, CachedRead::Count(count), ttl(ttl_ms));

        Ok(count)
    }
}

fn ttl(ms: u64) -> Duration {
    Duration::from_millis(ms)
}

fn summaries(rows: &RowSet) -> Vec<VisitorSummary> {
    rows.rows.iter().map(VisitorSummary::from_row).collect()
}

fn first_count(rows: &RowSet, column: &str) -> i64 {
    rows.first().and_then(|r| r.get_i64(column)).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Dialect, QueryError, Row};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Executor that answers from canned row sets and records every statement
    #[derive(Default)]
    struct ScriptedExecutor {
        calls: Mutex<Vec<(String, Vec<Value>)>>,
        fail_on: Mutex<Option<&'static str>>,
    }

    impl ScriptedExecutor {
        fn failing_on(fragment: &'static str) -> Self {
            let executor = Self::default();
            *executor.fail_on.lock().unwrap() = Some(fragment);
            executor
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }

        fn last_params(&self) -> Vec<Value> {
            self.calls.lock().unwrap().last().unwrap().1.clone()
        }
    }

    fn summary_row(id: i64) -> Row {
        Row::new()
            .with("id", id)
            .with("country", "unknown")
            .with("region", "unknown")
            .with("city", "unknown")
            .with("device_type", "desktop")
            .with("browser", "Firefox")
            .with("os", "Linux")
            .with("visited_at", "2026-10-17 10:00:00.000")
    }

    #[async_trait]
    impl QueryExecutor for ScriptedExecutor {
        fn dialect(&self) -> Dialect {
            Dialect::Sqlite
        }

        async fn init(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn execute(&self, sql: &str, params: &[Value]) -> QueryResult<RowSet> {
            self.calls
                .lock()
                .unwrap()
                .push((sql.to_string(), params.to_vec()));

            if let Some(fragment) = *self.fail_on.lock().unwrap() {
                if sql.contains(fragment) {
                    return Err(QueryError::Query(format!("scripted failure on {fragment}")));
                }
            }

            if sql.starts_with("INSERT") {
                return Ok(RowSet::affected(1));
            }
            if sql.contains("total_visitors") {
                return Ok(RowSet::from_rows(vec![Row::new()
                    .with("total_visitors", 25i64)
                    .with("today_visitors", 4i64)
                    .with("total_records", 30i64)]));
            }
            if sql.contains("LIMIT") {
                let limit = params.first().and_then(Value::as_i64).unwrap_or(0);
                let offset = params.get(1).and_then(Value::as_i64).unwrap_or(0);
                let rows = (offset..30)
                    .take(limit as usize)
                    .map(|i| summary_row(30 - i))
                    .collect();
                return Ok(RowSet::from_rows(rows));
            }
            if sql.contains("COUNT(*) AS total") {
                return Ok(RowSet::from_rows(vec![Row::new().with("total", 30i64)]));
            }
            if sql.contains("AS today") {
                return Ok(RowSet::from_rows(vec![Row::new().with("today", 4i64)]));
            }
            if sql.contains("AS total") {
                return Ok(RowSet::from_rows(vec![Row::new().with("total", 25i64)]));
            }
            Ok(RowSet::default())
        }
    }

    /// Executor whose every statement returns an empty result
    struct EmptyExecutor;

    #[async_trait]
    impl QueryExecutor for EmptyExecutor {
        fn dialect(&self) -> Dialect {
            Dialect::MySql
        }

        async fn init(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn execute(&self, _sql: &str, _params: &[Value]) -> QueryResult<RowSet> {
            Ok(RowSet::default())
        }
    }

    fn service(executor: Arc<ScriptedExecutor>) -> VisitorService {
        VisitorService::new(executor, CacheConfig::default())
    }

    #[tokio::test]
    async fn test_stats_second_call_served_from_cache() {
        let executor = Arc::new(ScriptedExecutor::default());
        let service = service(Arc::clone(&executor));

        let first = service.get_stats().await.unwrap();
        assert_eq!(executor.call_count(), 2);

        let second = service.get_stats().await.unwrap();
        assert_eq!(executor.call_count(), 2);
        assert_eq!(first, second);
        assert_eq!(first.total, 25);
        assert_eq!(first.today, 4);
        assert_eq!(first.recent.len(), STATS_RECENT_LIMIT as usize);
    }

    #[tokio::test]
    async fn test_stats_default_to_zero_on_empty_results() {
        let service = VisitorService::new(Arc::new(EmptyExecutor), CacheConfig::default());

        let stats = service.get_stats().await.unwrap();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.today, 0);
        assert!(stats.recent.is_empty());

        let page = service.get_paginated(1, 20).await.unwrap();
        assert_eq!(page.total, 0);
        assert!(!page.has_more);
    }

    #[tokio::test]
    async fn test_stats_failure_propagates_and_caches_nothing() {
        let executor = Arc::new(ScriptedExecutor::failing_on("ORDER BY"));
        let service = service(Arc::clone(&executor));

        let err = service.get_stats().await.unwrap_err();
        assert_eq!(
            err,
            QueryError::Query("scripted failure on ORDER BY".to_string())
        );
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_page_count_failure_propagates_and_caches_nothing() {
        let executor = Arc::new(ScriptedExecutor::failing_on("COUNT(*) AS total"));
        let service = service(Arc::clone(&executor));

        let err = service.get_paginated(1, 20).await.unwrap_err();
        assert_eq!(
            err,
            QueryError::Query("scripted failure on COUNT(*) AS total".to_string())
        );
        assert!(service.cache().get(&keys::visitors_page(1, 20)).is_none());
        assert!(service.cache().is_empty());
    }

    #[tokio::test]
    async fn test_paginated_offset_and_has_more() {
        let executor = Arc::new(ScriptedExecutor::default());
        let service = service(Arc::clone(&executor));

        let page = service.get_paginated(2, 20).await.unwrap();
        assert_eq!(page.visitors.len(), 10);
        assert_eq!(page.total, 30);
        assert!(!page.has_more);

        let calls = executor.calls.lock().unwrap().clone();
        let window = calls.iter().find(|(sql, _)| sql.contains("OFFSET")).unwrap();
        assert_eq!(window.1, vec![Value::Int(20), Value::Int(20)]);
    }

    #[tokio::test]
    async fn test_distinct_pages_use_distinct_entries() {
        let executor = Arc::new(ScriptedExecutor::default());
        let service = service(Arc::clone(&executor));

        let first = service.get_paginated(1, 10).await.unwrap();
        let second = service.get_paginated(2, 10).await.unwrap();
        assert_eq!(executor.call_count(), 4);
        assert_ne!(first.visitors[0].id, second.visitors[0].id);
        assert!(first.has_more);

        service.get_paginated(1, 10).await.unwrap();
        service.get_paginated(2, 10).await.unwrap();
        assert_eq!(executor.call_count(), 4);
    }

    #[tokio::test]
    async fn test_record_visit_invalidates_aggregates_but_not_pages() {
        let executor = Arc::new(ScriptedExecutor::default());
        let service = service(Arc::clone(&executor));

        service.get_stats().await.unwrap();
        service.get_total_visitors().await.unwrap();
        service.get_today_visitors().await.unwrap();
        service.get_recent_visitors(5).await.unwrap();
        service.get_paginated(1, 20).await.unwrap();

        service
            .record_visit("203.0.113.1", None, "", "session-1")
            .await
            .unwrap();

        let cache = service.cache();
        assert!(cache.get(keys::VISITOR_STATS).is_none());
        assert!(cache.get(keys::TOTAL_VISITORS).is_none());
        assert!(cache.get(keys::TODAY_VISITORS).is_none());
        assert!(cache.get(&keys::recent_visitors(5)).is_none());
        assert!(cache.get(&keys::visitors_page(1, 20)).is_some());
    }

    #[tokio::test]
    async fn test_failed_insert_leaves_cache_untouched() {
        let executor = Arc::new(ScriptedExecutor::failing_on("INSERT"));
        let service = service(Arc::clone(&executor));
        service.get_stats().await.unwrap();

        let err = service
            .record_visit("203.0.113.1", None, "direct", "session-1")
            .await
            .unwrap_err();

        assert!(matches!(err, QueryError::Query(_)));
        assert!(service.cache().get(keys::VISITOR_STATS).is_some());
    }

    #[tokio::test]
    async fn test_record_visit_classifies_and_defaults_referer() {
        let executor = Arc::new(ScriptedExecutor::default());
        let service = service(Arc::clone(&executor));

        service
            .record_visit(
                "unknown",
                Some("Mozilla/5.0 (iPhone; CPU iPhone OS 17_4 like Mac OS X) Mobile Safari/604.1"),
                "  ",
                "session-1",
            )
            .await
            .unwrap();

        let params = executor.last_params();
        assert_eq!(params[0], Value::from("unknown"));
        assert_eq!(params[2], Value::from("direct"));
        assert_eq!(params[3], Value::from("unknown"));
        assert_eq!(params[6], Value::from("mobile"));
        assert_eq!(params[7], Value::from("Safari"));
        assert_eq!(params[8], Value::from("iOS"));
        assert_eq!(params[9], Value::from("session-1"));
    }

    #[tokio::test]
    async fn test_missing_user_agent_is_stored_as_null_and_unknown() {
        let executor = Arc::new(ScriptedExecutor::default());
        let service = service(Arc::clone(&executor));

        service
            .record_visit("203.0.113.1", None, "https://example.com", "s")
            .await
            .unwrap();

        let params = executor.last_params();
        assert_eq!(params[1], Value::Null);
        assert_eq!(params[6], Value::from("unknown"));
        assert_eq!(params[7], Value::from("unknown"));
        assert_eq!(params[8], Value::from("unknown"));
    }

    #[tokio::test]
    async fn test_clear_cache_forces_requery() {
        let executor = Arc::new(ScriptedExecutor::default());
        let service = service(Arc::clone(&executor));

        service.get_total_visitors().await.unwrap();
        service.get_total_visitors().await.unwrap();
        assert_eq!(executor.call_count(), 1);

        service.clear_cache();
        assert_eq!(service.get_total_visitors().await.unwrap(), 25);
        assert_eq!(executor.call_count(), 2);
    }

    #[tokio::test]
    async fn test_health_swallows_version_failure_only() {
        let executor = Arc::new(ScriptedExecutor::failing_on("version"));
        let report = service(Arc::clone(&executor)).health().await;
        assert!(report.healthy);
        assert_eq!(report.version, UNKNOWN);

        let executor = Arc::new(ScriptedExecutor::failing_on("SELECT 1"));
        let report = service(Arc::clone(&executor)).health().await;
        assert!(!report.healthy);
        assert!(report.error.is_some());
    }
}
