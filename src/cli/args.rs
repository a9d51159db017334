//! Command-line argument definitions.

use std::path::PathBuf;

use clap::Parser;

use capflow_core::{Backpressure, SessionConfig};

use super::OutputFormat;

/// Replay a capture file through the capflow engine and filter its frames.
#[derive(Parser, Debug)]
#[command(name = "capflow")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// PCAP or PCAPNG file to replay
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// List the built-in dissectors and stream analyzers, then exit
    #[arg(long = "list-dissectors")]
    pub list_dissectors: bool,

    /// Only print frames matching this filter expression
    #[arg(short = 'e', long = "filter", value_name = "EXPR")]
    pub filter: Option<String>,

    /// Output format for stdout
    #[arg(long = "format", value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Dissector worker threads (default: available parallelism)
    #[arg(long = "workers")]
    pub workers: Option<usize>,

    /// Stream analyzer worker threads (default: available parallelism)
    #[arg(long = "stream-workers")]
    pub stream_workers: Option<usize>,

    /// Filter worker threads (default: available parallelism)
    #[arg(long = "filter-workers")]
    pub filter_workers: Option<usize>,

    /// Capacity of the dissector input queue
    #[arg(long = "queue-capacity", default_value = "4096")]
    pub queue_capacity: usize,

    /// Drop capture records instead of waiting when the input queue is full
    #[arg(long = "drop-when-full")]
    pub drop_when_full: bool,

    /// Maximum bytes buffered per flow direction before the flow is closed
    #[arg(long = "stream-buffer-limit", value_name = "BYTES")]
    pub stream_buffer_limit: Option<usize>,

    /// TCP ports the HTTP analyzer accepts (default: all)
    #[arg(long = "http-ports", value_name = "PORTS", value_delimiter = ',')]
    pub http_ports: Vec<u16>,

    /// Print a summary of the session when done
    #[arg(long = "stats")]
    pub stats: bool,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    /// Session configuration described by these arguments.
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new().with_queue_capacity(self.queue_capacity);
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(workers) = self.stream_workers {
            config = config.with_stream_workers(workers);
        }
        if let Some(workers) = self.filter_workers {
            config = config.with_filter_workers(workers);
        }
        if let Some(limit) = self.stream_buffer_limit {
            config = config.with_stream_buffer_limit(limit);
        }
        if self.drop_when_full {
            config = config.with_backpressure(Backpressure::Drop);
        }
        if !self.http_ports.is_empty() {
            config = config.with_option(
                capflow_core::stream::analyzers::HTTP_PORTS_OPTION,
                self.http_ports.clone(),
            );
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_to_config() {
        let args = Args::parse_from([
            "capflow",
            "capture.pcap",
            "--workers",
            "3",
            "--drop-when-full",
            "--http-ports",
            "80,8080",
            "-e",
            "http",
        ]);
        assert_eq!(args.filter.as_deref(), Some("http"));
        assert_eq!(args.file, Some(PathBuf::from("capture.pcap")));

        let config = args.session_config();
        assert_eq!(config.workers, 3);
        assert_eq!(config.backpressure, Backpressure::Drop);
        assert_eq!(config.queue_capacity, 4096);
        let ports = config.port_set("httpPorts");
        assert!(ports.contains(&80) && ports.contains(&8080));
    }

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["capflow", "capture.pcap"]);
        let config = args.session_config();
        assert_eq!(config.backpressure, Backpressure::Block);
        assert!(config.options.is_empty());
        assert_eq!(args.format, OutputFormat::Table);
    }

    #[test]
    fn test_list_without_file() {
        let args = Args::parse_from(["capflow", "--list-dissectors"]);
        assert!(args.list_dissectors);
        assert!(args.file.is_none());
    }
}
