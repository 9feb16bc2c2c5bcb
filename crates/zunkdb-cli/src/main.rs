//! zunkctl — command-line interface for the ZunkDB chunk back-end.

use anyhow::{Context, Result};
use zunkdb_client::{Mode, ZunkDbBackend};
use zunkdb_core::{Digest, CHUNK_SIZE};

fn print_usage() {
    println!("Usage: zunkctl --spec <zunkdb-spec> <command>");
    println!();
    println!("Commands");
    println!("  read <hex-digest> [out-file]    Fetch a chunk, write to out-file (default: stdout)");
    println!("  write <hex-digest> <in-file>    Publish a chunk from in-file under digest");
    println!();
    println!(
        "Spec: zunkdb:<host>:<port>[,timeout=<seconds>][,concurrency=<n>]"
    );
    println!();
    println!("Examples:");
    println!("  zunkctl --spec zunkdb:10.0.0.1:7000 read 3a7bd3e2360a...");
    println!("  zunkctl --spec zunkdb:10.0.0.1:7000,timeout=5 write 3a7bd3e2... chunk.bin");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut spec: Option<String> = None;
    let mut remaining: Vec<String> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == "--spec" {
            i += 1;
            spec = Some(
                args.get(i)
                    .context("--spec requires a value")?
                    .clone(),
            );
        } else {
            remaining.push(args[i].clone());
        }
        i += 1;
    }

    let remaining_refs: Vec<&str> = remaining.iter().map(|s| s.as_str()).collect();

    match remaining_refs.as_slice() {
        ["read", hex_digest] => {
            let spec = spec.context("--spec is required")?;
            cmd_read(&spec, hex_digest, None).await
        }
        ["read", hex_digest, out_file] => {
            let spec = spec.context("--spec is required")?;
            cmd_read(&spec, hex_digest, Some(out_file)).await
        }
        ["write", hex_digest, in_file] => {
            let spec = spec.context("--spec is required")?;
            cmd_write(&spec, hex_digest, in_file).await
        }
        ["help"] | ["--help"] | ["-h"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}

async fn cmd_read(spec: &str, hex_digest: &str, out_file: Option<&str>) -> Result<()> {
    let digest: Digest = hex_digest
        .parse()
        .with_context(|| format!("not a valid digest: {hex_digest}"))?;
    let backend = ZunkDbBackend::open(spec, Mode::ReadOnly)?;

    tracing::info!(digest = %hex_digest, "reading chunk");
    let mut buf = [0u8; CHUNK_SIZE];
    if let Err(err) = backend.read_chunk(&mut buf, digest).await {
        tracing::error!(%err, "read_chunk failed");
        return Err(err).context("read_chunk failed");
    }

    match out_file {
        Some(path) => std::fs::write(path, buf).with_context(|| format!("writing {path}"))?,
        None => {
            use std::io::Write;
            std::io::stdout().write_all(&buf)?;
        }
    }
    Ok(())
}

async fn cmd_write(spec: &str, hex_digest: &str, in_file: &str) -> Result<()> {
    let digest: Digest = hex_digest
        .parse()
        .with_context(|| format!("not a valid digest: {hex_digest}"))?;
    let bytes = std::fs::read(in_file).with_context(|| format!("reading {in_file}"))?;
    anyhow::ensure!(
        bytes.len() == CHUNK_SIZE,
        "{in_file} is {} bytes, expected {CHUNK_SIZE}",
        bytes.len()
    );
    let mut chunk = [0u8; CHUNK_SIZE];
    chunk.copy_from_slice(&bytes);

    tracing::info!(digest = %hex_digest, bytes = chunk.len(), "writing chunk");
    let backend = ZunkDbBackend::open(spec, Mode::ReadWrite)?;
    if let Err(err) = backend.write_chunk(&chunk, digest).await {
        tracing::error!(%err, "write_chunk failed");
        return Err(err).context("write_chunk failed");
    }

    println!("stored {hex_digest}");
    Ok(())
}
