// # Log Module
//
// Structuring and querying of operational log lines.
//
// The parser is a stateless line scanner producing borrowed views into the
// caller's buffer; the indexer holds owned copies in an append-only
// in-memory buffer and answers substring/level/time-range queries with a
// linear scan. Durable indexing is deliberately out of scope.
//
// ## Example
//
// ```rust
// use opspulse::log::{LogIndexer, LogLevel, LogParser, ParserConfig, SearchQuery};
//
// let parser = LogParser::new(ParserConfig::default());
// let entry = parser.parse("[ERROR] disk failure on /dev/sda");
// assert_eq!(entry.level, LogLevel::Error);
//
// let mut indexer = LogIndexer::new(Default::default());
// indexer.add(&entry);
//
// let hits = indexer.search(&SearchQuery {
//     query: Some("disk".to_string()),
//     ..SearchQuery::default()
// });
// assert_eq!(hits.total_matches, 1);
// ```

pub mod indexer;
pub mod parser;

pub use indexer::{IndexedEntry, IndexerConfig, LogIndexer, SearchQuery, SearchResult};
pub use parser::{LogEntry, LogFormat, LogLevel, LogParser, ParserConfig};
