use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use mp4demux::{DemuxOptions, MediaTime, Mp4File, Packet, ReadMode};
use serde::Serialize;

mod common;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SeekMode {
    Closest,
    NextSync,
    LastSync,
}

#[derive(Debug, Parser)]
#[command(name = "mp4samples", about = "Read MP4 track samples through the demuxer")]
struct Args {
    /// Input MP4 file
    input: PathBuf,

    /// Only read the track at this 0-based position (default: all tracks)
    #[arg(long)]
    track: Option<usize>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    /// Limit number of samples printed per track
    #[arg(long)]
    limit: Option<usize>,

    /// Start reading at this time in seconds instead of the first sample
    #[arg(long)]
    seek: Option<f64>,

    /// Which sync sample a seek lands on
    #[arg(long, value_enum, default_value_t = SeekMode::Closest)]
    mode: SeekMode,

    /// Show DTS/PTS in seconds as well as ticks
    #[arg(long)]
    timing: bool,

    /// Leading payload bytes to show per sample
    #[arg(long, default_value_t = 8)]
    preview: usize,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Serialize)]
struct SampleRow {
    track: usize,
    index: usize,
    offset: u64,
    size: usize,
    dts: u64,
    pts: Option<u64>,
    timescale: u32,
    sync: bool,
    flags: u32,
    preview: String,
}

impl SampleRow {
    fn new(p: &Packet, preview: usize) -> Self {
        SampleRow {
            track: p.track,
            index: p.index,
            offset: p.offset,
            size: p.data.len(),
            dts: p.dts,
            pts: p.pts,
            timescale: p.timescale,
            sync: p.is_sync(),
            flags: p.flags.bits(),
            preview: hex::encode(&p.data[..p.data.len().min(preview)]),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    common::init_tracing(args.verbose);

    let mut mp4 = Mp4File::open(std::fs::File::open(&args.input)?)?;
    let positions: Vec<usize> = match args.track {
        Some(t) => {
            mp4.configure(&DemuxOptions::only(t));
            vec![t]
        }
        None => (0..mp4.tracks().len()).collect(),
    };

    let mut rows = Vec::new();
    for &pos in &positions {
        let timescale = mp4
            .track(pos)
            .map(|t| t.timescale())
            .ok_or_else(|| anyhow::anyhow!("no track at position {pos}"))?;
        let mut mode = match args.seek {
            Some(secs) => {
                let t = MediaTime::from_secs_f64(secs, timescale);
                match args.mode {
                    SeekMode::Closest => ReadMode::SeekClosest(t),
                    SeekMode::NextSync => ReadMode::SeekNextSync(t),
                    SeekMode::LastSync => ReadMode::SeekLastSync(t),
                }
            }
            None => ReadMode::First,
        };
        let limit = args.limit.unwrap_or(usize::MAX);
        let mut n = 0;
        while n < limit {
            let Some(pkt) = mp4.read(pos, mode)? else {
                break;
            };
            rows.push(SampleRow::new(&pkt, args.preview));
            mode = ReadMode::Next;
            n += 1;
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        print_text(&mp4, &rows, &args);
    }

    Ok(())
}

fn print_text<R>(mp4: &Mp4File<R>, rows: &[SampleRow], args: &Args) {
    let mut current = None;
    for r in rows {
        if current != Some(r.track) {
            current = Some(r.track);
            if let Some(t) = mp4.track(r.track) {
                println!(
                    "{}: {}, timescale {}, {} samples",
                    common::track_label(r.track, t.index, t.track_id),
                    t.codec,
                    t.timescale(),
                    t.samples().len()
                );
            }
            println!(
                "  {:>6} {:>10} {:>8} {:>10} {:>10} {:>4}  data",
                "#", "offset", "size", "dts", "pts", "sync"
            );
        }
        let pts = r.pts.map(|p| p.to_string()).unwrap_or_else(|| "-".into());
        println!(
            "  {:>6} {:>10} {:>8} {:>10} {:>10} {:>4}  {}",
            r.index,
            r.offset,
            r.size,
            r.dts,
            pts,
            if r.sync { "*" } else { "" },
            r.preview
        );
        if args.timing && r.timescale != 0 {
            let secs = |v: u64| v as f64 / r.timescale as f64;
            match r.pts {
                Some(p) => println!("           dts={:.6}s pts={:.6}s", secs(r.dts), secs(p)),
                None => println!("           dts={:.6}s", secs(r.dts)),
            }
        }
    }
    if rows.is_empty() {
        println!("(no samples)");
    }
}
