// In-memory log indexer
//
// An append-only buffer of owned entries with linear-scan search. Entries
// accumulate until the shard threshold, at which point the buffer is
// flushed; durable shards and the inverted index are future work, so flush
// currently just clears the buffer. Searches filter by minimum level, time
// range, and message substring, honoring offset/limit pagination.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clock;
use crate::log::parser::{LogEntry, LogLevel};

const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;
const DEFAULT_SHARD_SIZE: usize = 10_000;
const DEFAULT_SEARCH_LIMIT: usize = 100;

/// Indexer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerConfig {
    /// Destination for durable shards; accepted but unused until shard
    /// persistence lands.
    pub index_path: Option<PathBuf>,
    /// Advisory in-memory ceiling in bytes (0 selects 64 MiB).
    pub memory_limit: usize,
    /// Advisory; shard compression applies only to persisted shards.
    pub enable_compression: bool,
    /// Entries buffered before an implicit flush (0 selects 10000).
    pub shard_size: usize,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            memory_limit: DEFAULT_MEMORY_LIMIT,
            enable_compression: false,
            shard_size: DEFAULT_SHARD_SIZE,
        }
    }
}

/// An owned copy of a parsed entry, safe to retain after the parser's
/// input buffer is gone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedEntry {
    pub timestamp: u64,
    pub level: LogLevel,
    pub message: String,
    pub source: Option<String>,
    pub raw: String,
    pub fields: Vec<(String, String)>,
}

impl From<&LogEntry<'_>> for IndexedEntry {
    fn from(entry: &LogEntry<'_>) -> Self {
        Self {
            timestamp: entry.timestamp,
            level: entry.level,
            message: entry.message.to_string(),
            source: entry.source.map(str::to_string),
            raw: entry.raw.to_string(),
            fields: entry
                .fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

/// Search parameters. Zero-valued time bounds mean "no bound"; a `limit`
/// of 0 selects the default of 100.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Substring that must occur in the message.
    pub query: Option<String>,
    pub start_time: u64,
    pub end_time: u64,
    pub min_level: LogLevel,
    /// Substring that must occur in the entry source.
    pub source_filter: Option<String>,
    /// Buffer position to start scanning from.
    pub offset: usize,
    pub limit: usize,
}

/// Result of a search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub entries: Vec<IndexedEntry>,
    pub total_matches: usize,
    pub search_time_ns: u64,
}

/// Append-only in-memory index with linear-scan search.
pub struct LogIndexer {
    index_path: Option<PathBuf>,
    memory_limit: usize,
    enable_compression: bool,
    shard_size: usize,
    buffer: Vec<IndexedEntry>,
}

impl LogIndexer {
    pub fn new(config: IndexerConfig) -> Self {
        let memory_limit = if config.memory_limit == 0 {
            DEFAULT_MEMORY_LIMIT
        } else {
            config.memory_limit
        };
        let shard_size = if config.shard_size == 0 {
            DEFAULT_SHARD_SIZE
        } else {
            config.shard_size
        };

        Self {
            index_path: config.index_path,
            memory_limit,
            enable_compression: config.enable_compression,
            shard_size,
            buffer: Vec::with_capacity(1024),
        }
    }

    /// Append an owned copy of `entry`. Reaching the shard threshold
    /// triggers an implicit [`flush`](LogIndexer::flush).
    pub fn add(&mut self, entry: &LogEntry<'_>) {
        self.buffer.push(IndexedEntry::from(entry));
        if self.buffer.len() >= self.shard_size {
            self.flush();
        }
    }

    /// Append a batch of entries, flushing at each shard boundary crossed.
    pub fn add_batch(&mut self, entries: &[LogEntry<'_>]) {
        for entry in entries {
            self.add(entry);
        }
    }

    /// Clear the buffer. Capacity is retained; the persisted-shard write
    /// will slot in here once the on-disk format exists.
    pub fn flush(&mut self) {
        debug!(flushed = self.buffer.len(), "indexer buffer flushed");
        self.buffer.clear();
    }

    /// Merge and optimize persisted shards. No-op until shards exist.
    pub fn compact(&mut self) {}

    /// Linear scan over the buffered entries.
    pub fn search(&self, query: &SearchQuery) -> SearchResult {
        let started = clock::now();
        let limit = if query.limit == 0 {
            DEFAULT_SEARCH_LIMIT
        } else {
            query.limit
        };

        let mut entries = Vec::new();
        for entry in self.buffer.iter().skip(query.offset) {
            if entries.len() >= limit {
                break;
            }
            if entry.level < query.min_level {
                continue;
            }
            if query.start_time > 0 && entry.timestamp < query.start_time {
                continue;
            }
            if query.end_time > 0 && entry.timestamp > query.end_time {
                continue;
            }
            if let Some(needle) = &query.query {
                if !entry.message.contains(needle.as_str()) {
                    continue;
                }
            }
            if let Some(source) = &query.source_filter {
                match &entry.source {
                    Some(s) if s.contains(source.as_str()) => {}
                    _ => continue,
                }
            }
            entries.push(entry.clone());
        }

        let total_matches = entries.len();
        SearchResult {
            entries,
            total_matches,
            search_time_ns: clock::now().saturating_sub(started),
        }
    }

    /// Entries currently buffered.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Current buffer capacity; never shrinks across flushes.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Configured shard threshold.
    pub fn shard_size(&self) -> usize {
        self.shard_size
    }

    /// Advisory memory ceiling from the configuration.
    pub fn memory_limit(&self) -> usize {
        self.memory_limit
    }

    /// Destination configured for durable shards, if any.
    pub fn index_path(&self) -> Option<&PathBuf> {
        self.index_path.as_ref()
    }

    /// Whether persisted shards would be compressed.
    pub fn compression_enabled(&self) -> bool {
        self.enable_compression
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::parser::{LogParser, ParserConfig};

    fn indexer_with_shard(shard_size: usize) -> LogIndexer {
        LogIndexer::new(IndexerConfig {
            shard_size,
            ..IndexerConfig::default()
        })
    }

    fn entry(level: LogLevel, timestamp: u64, message: &str) -> IndexedEntry {
        IndexedEntry {
            timestamp,
            level,
            message: message.to_string(),
            source: None,
            raw: message.to_string(),
            fields: Vec::new(),
        }
    }

    fn add_owned(indexer: &mut LogIndexer, e: IndexedEntry) {
        indexer.buffer.push(e);
    }

    #[test]
    fn test_add_and_search_substring() {
        let mut indexer = indexer_with_shard(0);
        let parser = LogParser::new(ParserConfig::default());

        indexer.add(&parser.parse("[ERROR] disk failure"));
        indexer.add(&parser.parse("[INFO] heartbeat ok"));
        indexer.add(&parser.parse("[WARN] disk nearly full"));

        let result = indexer.search(&SearchQuery {
            query: Some("disk".to_string()),
            ..SearchQuery::default()
        });

        assert_eq!(result.total_matches, 2);
        assert_eq!(result.entries[0].message, "disk failure");
        assert_eq!(result.entries[1].message, "disk nearly full");
    }

    #[test]
    fn test_min_level_filter() {
        let mut indexer = indexer_with_shard(0);
        add_owned(&mut indexer, entry(LogLevel::Debug, 0, "a"));
        add_owned(&mut indexer, entry(LogLevel::Warn, 0, "b"));
        add_owned(&mut indexer, entry(LogLevel::Fatal, 0, "c"));

        let result = indexer.search(&SearchQuery {
            min_level: LogLevel::Warn,
            ..SearchQuery::default()
        });
        assert_eq!(result.total_matches, 2);
    }

    #[test]
    fn test_time_range_filter() {
        let mut indexer = indexer_with_shard(0);
        for ts in [100u64, 200, 300, 400] {
            add_owned(&mut indexer, entry(LogLevel::Info, ts, "t"));
        }

        let result = indexer.search(&SearchQuery {
            start_time: 150,
            end_time: 350,
            ..SearchQuery::default()
        });
        assert_eq!(result.total_matches, 2);
        assert_eq!(result.entries[0].timestamp, 200);
        assert_eq!(result.entries[1].timestamp, 300);
    }

    #[test]
    fn test_offset_and_limit() {
        let mut indexer = indexer_with_shard(0);
        for i in 0..10 {
            add_owned(&mut indexer, entry(LogLevel::Info, i, &format!("m{i}")));
        }

        let result = indexer.search(&SearchQuery {
            offset: 4,
            limit: 3,
            ..SearchQuery::default()
        });
        assert_eq!(result.total_matches, 3);
        assert_eq!(result.entries[0].message, "m4");
        assert_eq!(result.entries[2].message, "m6");
    }

    #[test]
    fn test_default_limit_is_100() {
        let mut indexer = indexer_with_shard(0);
        for i in 0..150 {
            add_owned(&mut indexer, entry(LogLevel::Info, i, "x"));
        }

        let result = indexer.search(&SearchQuery::default());
        assert_eq!(result.total_matches, 100);
    }

    #[test]
    fn test_source_filter() {
        let mut indexer = indexer_with_shard(0);
        let mut tagged = entry(LogLevel::Info, 0, "hello");
        tagged.source = Some("api-gateway".to_string());
        add_owned(&mut indexer, tagged);
        add_owned(&mut indexer, entry(LogLevel::Info, 0, "hello"));

        let result = indexer.search(&SearchQuery {
            source_filter: Some("gateway".to_string()),
            ..SearchQuery::default()
        });
        assert_eq!(result.total_matches, 1);
    }

    #[test]
    fn test_implicit_flush_at_shard_size() {
        let mut indexer = indexer_with_shard(3);
        let parser = LogParser::new(ParserConfig::default());

        indexer.add(&parser.parse("[INFO] one"));
        indexer.add(&parser.parse("[INFO] two"));
        assert_eq!(indexer.len(), 2);

        indexer.add(&parser.parse("[INFO] three"));
        assert_eq!(indexer.len(), 0);
    }

    #[test]
    fn test_flush_retains_capacity() {
        let mut indexer = indexer_with_shard(0);
        for i in 0..100 {
            add_owned(&mut indexer, entry(LogLevel::Info, i, "x"));
        }
        let cap_before = indexer.capacity();

        indexer.flush();
        assert_eq!(indexer.len(), 0);
        assert!(indexer.capacity() >= cap_before);
    }

    #[test]
    fn test_owned_entries_survive_input_drop() {
        let mut indexer = indexer_with_shard(0);
        {
            let parser = LogParser::new(ParserConfig::default());
            let line = String::from("[ERROR] transient buffer");
            indexer.add(&parser.parse(&line));
            // line drops here; the stored entry owns its strings.
        }

        let result = indexer.search(&SearchQuery::default());
        assert_eq!(result.entries[0].message, "transient buffer");
        assert_eq!(result.entries[0].raw, "[ERROR] transient buffer");
    }

    #[test]
    fn test_config_defaults_normalized() {
        let indexer = LogIndexer::new(IndexerConfig {
            memory_limit: 0,
            shard_size: 0,
            ..IndexerConfig::default()
        });
        assert_eq!(indexer.shard_size(), 10_000);
        assert_eq!(indexer.memory_limit(), 64 * 1024 * 1024);
    }

    #[test]
    fn test_compact_is_noop() {
        let mut indexer = indexer_with_shard(0);
        add_owned(&mut indexer, entry(LogLevel::Info, 0, "kept"));
        indexer.compact();
        assert_eq!(indexer.len(), 1);
    }
}
