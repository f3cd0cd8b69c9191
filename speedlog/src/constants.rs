//! Log format constants and operator defaults

/// Column headers, in the order the sampler writes them
pub const COL_TIMESTAMP: &str = "Timestamp";
pub const COL_DOWNLOAD: &str = "Download";
pub const COL_UPLOAD: &str = "Upload";
pub const COL_PING: &str = "Ping";
pub const COL_JITTER: &str = "Jitter";
pub const COL_PACKET_LOSS: &str = "Packet Loss";

/// Timestamp format used in the log (local wall clock, second resolution)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Time-of-day format for range bounds
pub const TIME_OF_DAY_FORMAT: &str = "%H:%M:%S";

/// Provider throughput is reported in bits per second
pub const BITS_PER_MEGABIT: f64 = 1_000_000.0;

pub const DEFAULT_LOG_PATH: &str = "network_log.csv";
pub const DEFAULT_SAMPLE_INTERVAL_S: u64 = 30;
pub const DEFAULT_REFRESH_INTERVAL_S: u64 = 5;
pub const DEFAULT_DOWNLOAD_THRESHOLD_MBPS: f64 = 10.0;
pub const DEFAULT_UPLOAD_THRESHOLD_MBPS: f64 = 5.0;

/// Samples older than this many sample intervals mark the view as stale
pub const STALE_INTERVALS: u64 = 3;

/// Upper bound for any configured interval (one week)
pub const MAX_INTERVAL_S: u64 = 7 * 24 * 60 * 60;
