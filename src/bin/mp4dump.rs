use clap::{ArgAction, Parser};
use mp4demux::{BoxNode, Mp4File, box_tree, default_registry, hex_range};
use std::fs::File;

mod common;

#[derive(Parser, Debug)]
#[command(version, about = "MP4/QuickTime box tree explorer")]
struct Args {
    /// MP4/MOV file path
    path: String,

    /// Only print subtree(s) matching a dotted path (e.g. moov.trak[0].mdia.minf.stbl)
    #[arg(long = "filter")]
    filter: Option<String>,

    /// Hex-dump the payload of every box with this 4CC (e.g. --raw stsd)
    #[arg(long = "raw")]
    raw: Option<String>,

    /// Limit recursion depth
    #[arg(long, default_value_t = 64)]
    max_depth: usize,

    /// Print decoded values
    #[arg(long, action = ArgAction::SetTrue)]
    decode: bool,

    /// Bytes to show when dumping raw (0 means entire payload)
    #[arg(long, default_value_t = 0)]
    bytes: u64,

    /// Emit JSON instead of a text tree
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Debug logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    common::init_tracing(args.verbose);

    let reg = default_registry();
    let f = File::open(&args.path)?;
    let file_len = f.metadata()?.len();
    let mp4 = Mp4File::init_with_registry(f, &reg)?;
    let top = box_tree(&mp4, &reg, args.max_depth);

    let targets: Vec<&BoxNode> = match &args.filter {
        Some(path) => select_by_path(&top, path),
        None => top.iter().collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
        return Ok(());
    }

    for b in &targets {
        print_box(b, 0, args.decode);
    }

    if let Some(sel) = &args.raw {
        let mut f = mp4.into_inner();
        let mut matches = Vec::new();
        for b in &top {
            collect_by_type(b, sel, &mut matches);
        }
        for (i, b) in matches.into_iter().enumerate() {
            let len = if args.bytes == 0 {
                b.payload_size
            } else {
                args.bytes.min(b.payload_size)
            };
            let dump = hex_range(&mut f, file_len, b.payload_offset, len)?;
            println!(
                "\n== Dump {} ({}) payload: offset={:#x}, len={} ==",
                i, b.typ, dump.offset, dump.length
            );
            print!("{}", dump.hex);
        }
    }

    Ok(())
}

fn print_box(b: &BoxNode, depth: usize, decode: bool) {
    let indent = "  ".repeat(depth);
    let extra = match (b.kind, b.version, b.flags) {
        ("container", _, _) => " (container)".to_string(),
        (_, Some(v), Some(fl)) => format!(" (ver={v}, flags=0x{fl:06x})"),
        _ => String::new(),
    };
    println!(
        "{indent}{:>8} {:>10} {}{} {}",
        format!("{:#x}", b.offset),
        b.size,
        b.typ,
        extra,
        b.full_name
    );
    if decode && let Some(v) = &b.value {
        println!("{indent}        -> {v}");
    }
    for c in b.children.iter().flatten() {
        print_box(c, depth + 1, decode);
    }
}

fn collect_by_type<'a>(b: &'a BoxNode, typ: &str, out: &mut Vec<&'a BoxNode>) {
    if b.typ == typ {
        out.push(b);
    }
    for c in b.children.iter().flatten() {
        collect_by_type(c, typ, out);
    }
}

/// Resolve `a.b[1].c`: each segment names a type, `[n]` picks the n-th match.
fn select_by_path<'a>(roots: &'a [BoxNode], path: &str) -> Vec<&'a BoxNode> {
    let mut current: Vec<&BoxNode> = roots.iter().collect();
    let mut first = true;
    for seg in path.split('.') {
        let (name, nth) = match seg.split_once('[') {
            Some((n, rest)) => (n, rest.trim_end_matches(']').parse::<usize>().ok()),
            None => (seg, None),
        };
        let pool: Vec<&BoxNode> = if first {
            current
        } else {
            current
                .iter()
                .flat_map(|b| b.children.iter().flatten())
                .collect()
        };
        first = false;
        let matching: Vec<&BoxNode> = pool.into_iter().filter(|b| b.typ == name).collect();
        current = match nth {
            Some(i) => matching.get(i).copied().into_iter().collect(),
            None => matching,
        };
    }
    current
}
