//! SQL for the visitors table, rendered once per dialect

use crate::storage::Dialect;

const SUMMARY_COLUMNS: &str = "id, country, region, city, device_type, browser, os, visited_at";

/// Ties on `visited_at` fall back to insertion order
const NEWEST_FIRST: &str = "ORDER BY visited_at DESC, id DESC";

#[derive(Debug, Clone)]
pub struct VisitorQueries {
    /// Distinct sessions overall and today, plus the raw row count
    pub stats: String,
    /// Latest visits; binds the limit
    pub recent: String,
    /// Window of visits; binds limit then offset
    pub page: String,
    pub count_rows: String,
    pub total_sessions: String,
    pub today_sessions: String,
    /// Binds the ten visit columns in table order
    pub insert: String,
    pub ping: &'static str,
    pub version: &'static str,
}

impl VisitorQueries {
    pub fn new(dialect: Dialect) -> Self {
        let today = dialect.is_today("visited_at");

        Self {
            stats: format!(
                "SELECT COUNT(DISTINCT session_id) AS total_visitors, \
                 COUNT(DISTINCT CASE WHEN {today} THEN session_id END) AS today_visitors, \
                 COUNT(*) AS total_records \
                 FROM visitors"
            ),
            recent: format!(
                "SELECT {SUMMARY_COLUMNS} FROM visitors {NEWEST_FIRST} LIMIT {}",
                dialect.placeholder(1)
            ),
            page: format!(
                "SELECT {SUMMARY_COLUMNS} FROM visitors {NEWEST_FIRST} LIMIT {} OFFSET {}",
                dialect.placeholder(1),
                dialect.placeholder(2)
            ),
            count_rows: "SELECT COUNT(*) AS total FROM visitors".to_string(),
            total_sessions: "SELECT COUNT(DISTINCT session_id) AS total FROM visitors".to_string(),
            today_sessions: format!(
                "SELECT COUNT(DISTINCT session_id) AS today FROM visitors WHERE {today}"
            ),
            insert: format!(
                "INSERT INTO visitors (ip_address, user_agent, referer, country, region, city, \
                 device_type, browser, os, session_id) VALUES ({})",
                dialect.placeholders(10)
            ),
            ping: "SELECT 1 AS test",
            version: dialect.version_query(),
        }
    }
}
