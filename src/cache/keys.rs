//! Cache keys for visitor reads.
//!
//! Parameterless aggregates use fixed literals. Parameterised reads append
//! their parameters in declaration order, each behind a `_` separator, so
//! equal parameters give equal keys and different parameters never collide.

pub const VISITOR_STATS: &str = "visitor_stats";
pub const TOTAL_VISITORS: &str = "total_visitors";
pub const TODAY_VISITORS: &str = "today_visitors";

/// Common prefix of every `recent_visitors_{limit}` key
pub const RECENT_VISITORS_PREFIX: &str = "recent_visitors_";

const VISITORS_PAGE_PREFIX: &str = "visitors_page_";

pub fn recent_visitors(limit: u32) -> String {
    format!("{RECENT_VISITORS_PREFIX}{limit}")
}

pub fn visitors_page(page: u32, page_size: u32) -> String {
    format!("{VISITORS_PAGE_PREFIX}{page}_{page_size}")
}
