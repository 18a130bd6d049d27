use std::sync::atomic::{AtomicU64, Ordering};

use log::*;

use crate::{
    pipeline::topics::{InvalidPattern, TopicPattern, Topics},
    vm_types::LogCategory,
};

/// The result of classifying a topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route<'t> {
    pub category: LogCategory,
    /// The topic level captured by the pattern's wildcard: a machine code or a correlation token. `None` for
    /// unclassified topics.
    pub segment: Option<&'t str>,
}

impl Route<'_> {
    pub fn is_classified(&self) -> bool {
        self.category != LogCategory::Unclassified
    }
}

/// Classifies inbound topics into log categories.
///
/// Classification is pure and total. The first matching pattern wins; a topic no pattern matches is
/// [`LogCategory::Unclassified`]. The router also keeps a count of messages that were dropped instead of processed.
#[derive(Debug)]
pub struct TopicRouter {
    routes: Vec<(TopicPattern, LogCategory)>,
    dropped: AtomicU64,
}

impl TopicRouter {
    pub fn new(topics: &Topics) -> Result<Self, InvalidPattern> {
        let routes = topics
            .routes()
            .into_iter()
            .map(|(pattern, category)| TopicPattern::parse(&pattern).map(|p| (p, category)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { routes, dropped: AtomicU64::new(0) })
    }

    pub fn classify<'t>(&self, topic: &'t str) -> Route<'t> {
        self.routes
            .iter()
            .find_map(|(pattern, category)| {
                let captures = pattern.captures(topic)?;
                let segment = captures.first().copied().filter(|s| !s.is_empty())?;
                Some(Route { category: *category, segment: Some(segment) })
            })
            .unwrap_or(Route { category: LogCategory::Unclassified, segment: None })
    }

    pub(crate) fn record_drop(&self, topic: &str) {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        trace!("🚦️ Dropped message on {topic}. {total} dropped so far");
    }

    /// The number of messages that were logged but not processed, because their topic was unrecognised or their
    /// payload was malformed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
