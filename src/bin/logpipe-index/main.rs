// SPDX-License-Identifier: Apache-2.0

use clap::{Args, Parser};
use logpipe::search::{BulkDocument, ElasticClient, SearchBackend, SearchConfig, index_mapping};
use serde_json::Value;
use std::error::Error;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const BULK_CHUNK_SIZE: usize = 500;

#[derive(Debug, clap::Subcommand)]
enum Commands {
    /// Create an index with the log entry mapping
    Create {
        index: String,
    },

    /// Bulk-index a file of JSON log lines
    Add {
        log_file: PathBuf,
        index: String,
    },

    /// Return version
    Version,
}

#[derive(Debug, Args, Clone)]
struct Connection {
    /// Search engine base URL
    #[arg(long, global = true, env = "LOGPIPE_SEARCH_ADDRESS", default_value = "http://localhost:9200")]
    address: String,

    /// Basic auth username
    #[arg(long, global = true, env = "LOGPIPE_SEARCH_USERNAME")]
    username: Option<String>,

    /// Basic auth password
    #[arg(long, global = true, env = "LOGPIPE_SEARCH_PASSWORD")]
    password: Option<String>,

    /// Hex SHA-256 fingerprint of the server certificate, colons optional
    #[arg(long, global = true, env = "LOGPIPE_SEARCH_CERT_FINGERPRINT")]
    cert_fingerprint: Option<String>,
}

impl Connection {
    fn connect(&self) -> Result<ElasticClient, Box<dyn Error + Send + Sync>> {
        let mut config = SearchConfig::new(self.address.clone());
        if let Some(username) = &self.username {
            config = config.with_basic_auth(
                username.clone(),
                self.password.clone().unwrap_or_default(),
            );
        }
        if let Some(fingerprint) = &self.cert_fingerprint {
            config = config.with_cert_fingerprint(fingerprint.clone());
        }
        Ok(ElasticClient::new(&config)?)
    }
}

#[derive(Debug, Parser)]
#[command(name = "logpipe-index")]
#[command(bin_name = "logpipe-index")]
#[command(version, about = "Manage the log search index", long_about = None)]
#[command(subcommand_required = true)]
struct Arguments {
    #[command(flatten)]
    connection: Connection,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Default, PartialEq)]
struct AddSummary {
    lines: usize,
    indexed: usize,
    failed: usize,
}

fn main() -> ExitCode {
    let opt = Arguments::parse();

    let result = match opt.command {
        Commands::Version => {
            println!("{}", get_version());
            return ExitCode::SUCCESS;
        }
        Commands::Create { index } => create(&opt.connection, &index),
        Commands::Add { log_file, index } => add(&opt.connection, &log_file, &index),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            ExitCode::from(1)
        }
    }
}

#[tokio::main]
async fn create(connection: &Connection, index: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let client = connection.connect()?;
    client.create_index(index, &index_mapping()).await?;
    println!("created index {}", index);
    Ok(())
}

#[tokio::main]
async fn add(
    connection: &Connection,
    log_file: &Path,
    index: &str,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let file = File::open(log_file)
        .map_err(|e| format!("failed to open {}: {}", log_file.display(), e))?;
    let client = connection.connect()?;

    let summary = add_lines(&client, BufReader::new(file), index).await?;
    println!(
        "read {} lines, indexed {}, failed {}",
        summary.lines, summary.indexed, summary.failed
    );
    if summary.failed > 0 {
        return Err(format!("{} entries were not indexed", summary.failed).into());
    }
    Ok(())
}

/// Indexes every non-empty line, `BULK_CHUNK_SIZE` documents per request. Lines
/// that are not JSON objects with a string `id` count as failures.
async fn add_lines(
    backend: &dyn SearchBackend,
    reader: impl BufRead,
    index: &str,
) -> Result<AddSummary, Box<dyn Error + Send + Sync>> {
    let mut summary = AddSummary::default();
    let mut chunk = Vec::with_capacity(BULK_CHUNK_SIZE);

    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;

        match document(&line) {
            Some(doc) => chunk.push(doc),
            None => {
                eprintln!("line {}: not a log entry", n + 1);
                summary.failed += 1;
            }
        }

        if chunk.len() == BULK_CHUNK_SIZE {
            flush(backend, index, &mut chunk, &mut summary).await?;
        }
    }
    flush(backend, index, &mut chunk, &mut summary).await?;

    Ok(summary)
}

fn document(line: &str) -> Option<BulkDocument> {
    let source: Value = serde_json::from_str(line).ok()?;
    let id = source.get("id")?.as_str()?.to_string();
    Some(BulkDocument { id, source })
}

async fn flush(
    backend: &dyn SearchBackend,
    index: &str,
    chunk: &mut Vec<BulkDocument>,
    summary: &mut AddSummary,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    if chunk.is_empty() {
        return Ok(());
    }
    let outcome = backend.bulk_index(index, chunk).await?;
    for failure in &outcome.failures {
        eprintln!(
            "document {}: {} ({}): {}",
            failure.id, failure.reason, failure.status, failure.detail
        );
    }
    summary.indexed += outcome.indexed;
    summary.failed += outcome.failures.len();
    chunk.clear();
    Ok(())
}

fn get_version() -> String {
    // Set during CI
    let version_build = option_env!("BUILD_SHORT_SHA").unwrap_or("dev");

    format!("{}-{}", env!("CARGO_PKG_VERSION"), version_build)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use logpipe::search::{BulkFailure, BulkOutcome, SearchError};
    use std::sync::Mutex;

    #[derive(Default)]
    struct ChunkRecorder {
        chunks: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl SearchBackend for ChunkRecorder {
        async fn ping(&self) -> Result<(), SearchError> {
            Ok(())
        }

        async fn create_index(&self, _index: &str, _body: &Value) -> Result<(), SearchError> {
            Ok(())
        }

        async fn bulk_index(
            &self,
            _index: &str,
            docs: &[BulkDocument],
        ) -> Result<BulkOutcome, SearchError> {
            self.chunks.lock().unwrap().push(docs.len());
            let failures: Vec<BulkFailure> = docs
                .iter()
                .filter(|d| d.id == "bad")
                .map(|d| BulkFailure {
                    id: d.id.clone(),
                    status: 400,
                    reason: "mapper_parsing_exception".to_string(),
                    detail: "failed to parse".to_string(),
                })
                .collect();
            Ok(BulkOutcome {
                indexed: docs.len() - failures.len(),
                failures,
            })
        }

        async fn search(&self, _index: &str, _body: &Value) -> Result<Value, SearchError> {
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_add_in_chunks() {
        let mut input = String::new();
        for i in 0..1200 {
            input.push_str(&format!("{{\"id\":\"doc{}\",\"msg\":\"m\"}}\n", i));
        }
        input.push('\n');
        input.push_str("not json\n");
        input.push_str("{\"id\":\"bad\"}\n");

        let backend = ChunkRecorder::default();
        let summary = add_lines(&backend, input.as_bytes(), "logs").await.unwrap();

        assert_eq!(*backend.chunks.lock().unwrap(), vec![500, 500, 201]);
        assert_eq!(
            summary,
            AddSummary {
                lines: 1202,
                indexed: 1200,
                failed: 2,
            }
        );
    }

    #[test]
    fn test_document_requires_id() {
        assert!(document(r#"{"id":"2abc","msg":"x"}"#).is_some());
        assert!(document(r#"{"msg":"x"}"#).is_none());
        assert!(document(r#"{"id":7}"#).is_none());
        assert!(document("[1,2]").is_none());
    }

    #[test]
    fn test_cli_parse() {
        let opt = Arguments::try_parse_from([
            "logpipe-index",
            "add",
            "entries.log",
            "logs",
            "--address",
            "https://search:9200",
        ])
        .unwrap();
        assert_eq!(opt.connection.address, "https://search:9200");
        match opt.command {
            Commands::Add { log_file, index } => {
                assert_eq!(log_file, PathBuf::from("entries.log"));
                assert_eq!(index, "logs");
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
