//! capflow CLI entry point.

use std::io;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use capflow::cli::{Args, OutputFormatter};
use capflow::replay::{replay, CaptureReader};
use capflow_core::{
    default_dissectors, Dissector, HttpLineAnalyzer, Session, StreamAnalyzer, Token, TokenRegistry,
};

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();

    if args.list_dissectors {
        list_dissectors();
        return Ok(());
    }

    let file = args
        .file
        .as_deref()
        .context("capture file required. Use --help for usage.")?;

    let session = Session::new(args.session_config());
    session.start()?;

    let mut reader = CaptureReader::open(file)?;
    let stats = replay(&session, &mut reader)
        .with_context(|| format!("failed to replay {}", file.display()))?;
    session.stop();

    let end = session.store().len() as u64 + 1;
    let ids = match &args.filter {
        Some(expr) => session.filter(expr, 1..end)?,
        None => (1..end).collect(),
    };
    let frames: Vec<_> = ids.iter().filter_map(|id| session.store().get(*id)).collect();

    let formatter = OutputFormatter::new(args.format, session.tokens());
    formatter.write(&frames, &mut io::stdout().lock())?;

    if args.stats {
        let status = session.status();
        eprintln!("packets read:     {}", stats.packets);
        eprintln!("frames stored:    {}", status.frames);
        eprintln!("dropped (full):   {}", status.dropped);
        eprintln!("store version:    {}", status.version);
        eprintln!("frames matched:   {}", frames.len());
    }

    Ok(())
}

fn list_dissectors() {
    let tokens = TokenRegistry::new();
    let names = |hints: &[Token]| -> String {
        hints
            .iter()
            .filter_map(|t| tokens.string(*t))
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };

    println!("Built-in dissectors:");
    println!("{:-<50}", "");
    for dissector in default_dissectors(&tokens) {
        println!("  {:<12} hints: {}", dissector.name(), names(dissector.hints()));
    }

    let http = HttpLineAnalyzer::new(&tokens);
    println!();
    println!("Built-in stream analyzers:");
    println!("{:-<50}", "");
    println!("  {:<12} hints: {}", http.name(), names(http.hints()));
}
