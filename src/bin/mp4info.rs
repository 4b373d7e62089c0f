use clap::{ArgAction, Parser};
use mp4demux::{MediaFormats, Mp4File, TrackKind};
use std::fs::File;

mod common;

#[derive(Parser, Debug)]
#[command(version, about = "Simple MP4 media info (like mp4info)")]
struct Args {
    /// MP4/MOV file path
    path: String,

    /// Output as JSON instead of human-readable text
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Debug logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    common::init_tracing(args.verbose);

    let mp4 = Mp4File::init(File::open(&args.path)?)?;
    let info = mp4.formats();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        let ft = mp4.file_type();
        println!("File: {}", args.path);
        println!("Major brand: {}", ft.major_brand);
        println!("Minor version: {}", ft.minor_version);
        if !ft.compatible_brands.is_empty() {
            let brands: Vec<String> = ft.compatible_brands.iter().map(|b| b.to_string()).collect();
            println!("Compatible brands: {}", brands.join(", "));
        }
        print_human(&info);
    }

    Ok(())
}

fn print_human(info: &MediaFormats) {
    println!(
        "Movie duration: {} ticks @ {} -> {:.3} s",
        info.duration.value,
        info.timescale,
        info.duration.as_secs_f64()
    );

    if info.tracks.is_empty() {
        println!("Tracks: (none)");
        return;
    }

    println!("Tracks:");
    for (pos, t) in info.tracks.iter().enumerate() {
        println!("  {}:", common::track_label(pos, t.index, t.track_id));
        println!("    handler: {}", t.handler);
        println!("    codec: {} ({})", t.codec, t.sample_entry);
        match &t.kind {
            TrackKind::Video { width, height } => {
                println!("    type: video");
                println!("    size: {}x{}", width, height);
            }
            TrackKind::Audio {
                sample_rate,
                channels,
                bits_per_sample,
            } => {
                println!("    type: audio");
                println!(
                    "    format: {} Hz, {} ch, {} bit",
                    sample_rate, channels, bits_per_sample
                );
            }
        }
        println!("    timescale: {}", t.duration.timescale);
        println!(
            "    duration: {} ticks -> {:.3} s",
            t.duration.value,
            t.duration.as_secs_f64()
        );
        if t.start_time.value != 0 {
            println!("    start: {} ticks", t.start_time.value);
        }
        println!("    language: {}", t.language);
        println!("    samples: {}", t.sample_count);
        if t.bitrate != 0 {
            println!("    bitrate: {} bit/s", t.bitrate);
        }
        for (name, bytes) in &t.codec_config {
            println!("    {}: {} bytes", name, bytes.len());
        }
    }
}
