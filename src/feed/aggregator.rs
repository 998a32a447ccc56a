use std::sync::Arc;

use thiserror::Error;

use super::fetcher::FetchOutcome;
use super::item::{Feed, SortOrder};
use super::parser::{parse, ParseError};
use super::source::Source;

/// Why a source contributed fewer items than its document holds.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// No bytes before the batch deadline. The source is excluded.
    #[error("Fetch timed out")]
    FetchTimeout,
    /// Network or file-system failure. The source is excluded.
    #[error("Fetch failed: {0}")]
    FetchIo(String),
    /// Document is not well-formed XML. The source is excluded.
    #[error("Document parse error: {0}")]
    DocumentParse(String),
    /// Some item dates were unusable; see [`ParseError::ItemDates`].
    #[error("Item date parse error: {0}")]
    ItemDateParse(String),
}

/// A per-source problem reported alongside the feed.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub source: Arc<Source>,
    pub error: SourceError,
}

/// Result of one aggregation: the (possibly partial) feed and what went wrong.
#[derive(Debug, Default)]
pub struct Aggregation {
    pub feed: Feed,
    pub diagnostics: Vec<Diagnostic>,
}

/// Merges the fetch outcomes of one cycle into a single sorted [`Feed`].
///
/// `outcomes` must be in input source order; that order is the first
/// tie-break when item dates are equal. Runs on the calling task only.
///
/// # Behavior
///
/// - `Bytes` outcomes are parsed; every item gets a reference to its source
/// - `TimedOut` and `Failed` outcomes contribute nothing and produce one
///   diagnostic each
/// - A document parse error excludes only that source
/// - The merged items are sorted by date in `order`
pub fn aggregate<I>(outcomes: I, order: SortOrder) -> Aggregation
where
    I: IntoIterator<Item = (Arc<Source>, FetchOutcome)>,
{
    let mut items = Vec::new();
    let mut diagnostics = Vec::new();

    for (source_index, (source, outcome)) in outcomes.into_iter().enumerate() {
        let bytes = match outcome {
            FetchOutcome::Bytes(bytes) => bytes,
            FetchOutcome::TimedOut => {
                tracing::warn!(source = %source.path, "Skipping source: fetch timed out");
                diagnostics.push(Diagnostic {
                    source,
                    error: SourceError::FetchTimeout,
                });
                continue;
            }
            FetchOutcome::Failed(e) => {
                tracing::warn!(source = %source.path, error = %e, "Skipping source: fetch failed");
                diagnostics.push(Diagnostic {
                    source,
                    error: SourceError::FetchIo(e.to_string()),
                });
                continue;
            }
        };

        let parsed = parse(&bytes, &source);
        let count = parsed.items.len();
        items.extend(parsed.items.into_iter().map(|mut item| {
            item.origin.source_index = source_index;
            item
        }));

        match parsed.error {
            None => {
                tracing::debug!(source = %source.path, items = count, "Normalized source");
            }
            Some(ParseError::Malformed(detail)) => {
                tracing::warn!(source = %source.path, error = %detail, "Skipping source: malformed document");
                diagnostics.push(Diagnostic {
                    source,
                    error: SourceError::DocumentParse(detail),
                });
            }
            Some(e @ ParseError::ItemDates { .. }) => {
                tracing::warn!(source = %source.path, items = count, error = %e, "Source has unparseable item dates");
                diagnostics.push(Diagnostic {
                    source,
                    error: SourceError::ItemDateParse(e.to_string()),
                });
            }
        }
    }

    let mut feed = Feed::from_items(items);
    feed.sort_by(order);

    tracing::info!(
        items = feed.len(),
        diagnostics = diagnostics.len(),
        order = %order,
        "Aggregated feed"
    );

    Aggregation { feed, diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::fetcher::FetchError;
    use crate::feed::source::SourceKind;
    use pretty_assertions::assert_eq;

    fn rss(prefix: &str, days: &[u32]) -> FetchOutcome {
        let items: String = days
            .iter()
            .enumerate()
            .map(|(i, day)| {
                format!(
                    "<item><title>{prefix}{i}</title><pubDate>{day:02} Jan 2024 00:00:00 GMT</pubDate></item>"
                )
            })
            .collect();
        FetchOutcome::Bytes(
            format!(r#"<rss version="2.0"><channel><title>{prefix}</title>{items}</channel></rss>"#)
                .into_bytes(),
        )
    }

    fn source(path: &str) -> Arc<Source> {
        Arc::new(Source::new(path, path.to_uppercase(), SourceKind::Http))
    }

    fn titles(aggregation: &Aggregation) -> Vec<String> {
        aggregation.feed.iter().map(|i| i.title.clone()).collect()
    }

    #[test]
    fn test_two_rss_sources_descending() {
        let result = aggregate(
            vec![
                (source("a"), rss("a", &[1, 4, 5])),
                (source("b"), rss("b", &[2, 3, 6])),
            ],
            SortOrder::Descending,
        );

        assert_eq!(result.feed.len(), 6);
        assert!(result.diagnostics.is_empty());
        assert_eq!(titles(&result), ["b2", "a2", "a1", "b1", "b0", "a0"]);
    }

    #[test]
    fn test_failed_and_timed_out_sources_excluded() {
        let result = aggregate(
            vec![
                (source("ok"), rss("ok", &[1, 2])),
                (source("slow"), FetchOutcome::TimedOut),
                (source("gone"), FetchOutcome::Failed(FetchError::HttpStatus(410))),
            ],
            SortOrder::Ascending,
        );

        assert_eq!(titles(&result), ["ok0", "ok1"]);
        let reported: Vec<_> = result
            .diagnostics
            .iter()
            .map(|d| (d.source.path.as_str(), d.error.clone()))
            .collect();
        assert_eq!(
            reported,
            [
                ("slow", SourceError::FetchTimeout),
                ("gone", SourceError::FetchIo("HTTP error: status 410".to_string())),
            ]
        );
    }

    #[test]
    fn test_malformed_source_among_valid_ones() {
        let result = aggregate(
            vec![
                (source("a"), rss("a", &[1])),
                (source("broken"), FetchOutcome::Bytes(b"<rss><channel>".to_vec())),
                (source("c"), rss("c", &[2])),
            ],
            SortOrder::Descending,
        );

        assert_eq!(titles(&result), ["c0", "a0"]);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].source.path, "broken");
        assert!(matches!(result.diagnostics[0].error, SourceError::DocumentParse(_)));
    }

    #[test]
    fn test_items_reference_their_source() {
        let a = source("a");
        let result = aggregate(vec![(Arc::clone(&a), rss("a", &[1]))], SortOrder::Descending);
        let item_source = result.feed.items()[0].source().unwrap();
        assert!(Arc::ptr_eq(&item_source, &a));
    }

    #[test]
    fn test_equal_dates_break_ties_by_source_order() {
        let inputs = || {
            vec![
                (source("a"), rss("a", &[7, 7])),
                (source("b"), rss("b", &[7])),
            ]
        };

        let first = aggregate(inputs(), SortOrder::Ascending);
        let second = aggregate(inputs(), SortOrder::Ascending);
        assert_eq!(titles(&first), ["a0", "a1", "b0"]);
        assert_eq!(titles(&first), titles(&second));

        let descending = aggregate(inputs(), SortOrder::Descending);
        assert_eq!(titles(&descending), ["b0", "a1", "a0"]);
    }

    #[test]
    fn test_item_date_problems_reported_once() {
        let xml = br#"<rss><channel>
            <item><title>x</title><pubDate>soon</pubDate></item>
            <item><title>y</title><pubDate>later</pubDate></item>
        </channel></rss>"#;
        let result = aggregate(
            vec![(source("dates"), FetchOutcome::Bytes(xml.to_vec()))],
            SortOrder::Descending,
        );

        assert_eq!(result.feed.len(), 2);
        assert_eq!(result.diagnostics.len(), 1);
        assert!(matches!(result.diagnostics[0].error, SourceError::ItemDateParse(_)));
    }

    #[test]
    fn test_empty_input() {
        let result = aggregate(Vec::new(), SortOrder::Descending);
        assert!(result.feed.is_empty());
        assert!(result.diagnostics.is_empty());
    }
}
