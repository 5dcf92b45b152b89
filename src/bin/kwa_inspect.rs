//! KWA archive inspector
//!
//! Prints the index header of an archive and, optionally, a summary of every
//! decoded frame.

use anyhow::{Context, Result};
use clap::Parser;
use kwa_archive::{ArchiveReader, DecodedFrame, IndexHeader, StoredImage};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "kwa-inspect")]
#[command(about = "Inspect a KWA frame archive")]
struct Args {
    /// Path to the archive's .index file
    index: PathBuf,

    /// Decode every frame record, not just the index
    #[arg(short = 'f', long)]
    frames: bool,

    /// Also decode the .meta file and compare it against the data records
    #[arg(short = 'm', long)]
    meta: bool,

    /// Emit JSON instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct FrameSummary {
    offset: u64,
    image: Option<ImageSummary>,
    #[serde(flatten)]
    frame: DecodedFrame,
}

#[derive(Serialize)]
struct ImageSummary {
    kind: &'static str,
    stored_bytes: usize,
}

#[derive(Serialize)]
struct Report {
    header: IndexHeader,
    data_version: i64,
    frame_count: usize,
    first_timestamp_us: Option<i64>,
    last_timestamp_us: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frames: Option<Vec<FrameSummary>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    meta_frames: Option<usize>,
}

fn summarize_image(image: &StoredImage) -> ImageSummary {
    let kind = match image {
        StoredImage::Raw(_) => "raw",
        StoredImage::Compressed { .. } => "jpeg",
    };
    ImageSummary {
        kind,
        stored_bytes: image.stored_len(),
    }
}

fn build_report(reader: &ArchiveReader, args: &Args) -> Result<Report> {
    let entries = &reader.index().entries;

    let frames = if args.frames {
        let mut frames = Vec::with_capacity(entries.len());
        for (n, entry) in entries.iter().enumerate() {
            let frame = reader
                .read_frame(n)
                .with_context(|| format!("decoding frame {} at offset {}", n, entry.offset))?;
            frames.push(FrameSummary {
                offset: entry.offset,
                image: frame.image.as_ref().map(summarize_image),
                frame,
            });
        }
        Some(frames)
    } else {
        None
    };

    let meta_frames = if args.meta {
        let meta = reader.read_meta().context("decoding meta file")?;
        match meta {
            Some(meta) => {
                if meta.len() != reader.len() {
                    anyhow::bail!(
                        "meta file holds {} records, index lists {}",
                        meta.len(),
                        reader.len()
                    );
                }
                for (n, (record, entry)) in meta.iter().zip(entries).enumerate() {
                    if record.timestamp_us != entry.timestamp_us {
                        anyhow::bail!(
                            "meta record {} has timestamp {}us, index says {}us",
                            n,
                            record.timestamp_us,
                            entry.timestamp_us
                        );
                    }
                }
                Some(meta.len())
            }
            None => None,
        }
    } else {
        None
    };

    Ok(Report {
        header: reader.index().header.clone(),
        data_version: reader.data_version().as_i64(),
        frame_count: reader.len(),
        first_timestamp_us: entries.first().map(|e| e.timestamp_us),
        last_timestamp_us: entries.last().map(|e| e.timestamp_us),
        frames,
        meta_frames,
    })
}

fn print_text(report: &Report) {
    let header = &report.header;
    println!("index version:  {}", header.version);
    println!("data file:      {}", header.data_file);
    println!(
        "meta file:      {}",
        header.meta_file.as_deref().unwrap_or("(none)")
    );
    println!("mission id:     {}", header.mission_id);
    println!("stream id:      {}", header.stream_id);
    println!("data version:   {}", report.data_version);
    println!("frames:         {}", report.frame_count);
    if let (Some(first), Some(last)) = (report.first_timestamp_us, report.last_timestamp_us) {
        println!("time span:      {}us .. {}us", first, last);
    }
    if let Some(count) = report.meta_frames {
        println!("meta records:   {} (consistent)", count);
    }

    if let Some(frames) = &report.frames {
        println!();
        println!(
            "{:>8} {:>16} {:>12} {:>10} {:>9} {:>6} {:>14}",
            "frame", "timestamp_us", "offset", "size", "gsd", "ref", "image"
        );
        for summary in frames {
            let f = &summary.frame;
            let image = summary
                .image
                .as_ref()
                .map(|i| format!("{} {}B", i.kind, i.stored_bytes))
                .unwrap_or_default();
            println!(
                "{:>8} {:>16} {:>12} {:>10} {:>9.3} {:>6} {:>14}",
                f.frame_number,
                f.timestamp_us,
                summary.offset,
                format!("{}x{}", f.width, f.height),
                f.gsd,
                f.reference_frame,
                image
            );
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kwa_archive=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    info!("Inspecting {:?}", args.index);
    let reader = ArchiveReader::open(&args.index)
        .with_context(|| format!("opening archive {:?}", args.index))?;
    let report = build_report(&reader, &args)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&report);
    }

    Ok(())
}
