use tracing_subscriber::EnvFilter;

/// Log to stderr; `RUST_LOG` wins over `-v`.
pub fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Tracks are named by the 0-based position `--track` takes, then the
/// 1-based `trak` index and the track id.
#[allow(dead_code)]
pub fn track_label(position: usize, index: usize, track_id: u32) -> String {
    format!("Track {position} (trak #{index}, id {track_id})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_leads_with_the_position() {
        assert_eq!(track_label(0, 1, 7), "Track 0 (trak #1, id 7)");
    }
}
