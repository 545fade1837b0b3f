//! Human-readable rendering of byte sizes and durations for report lines

const SIZE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Render a byte count as `<value> <unit>`, rounded to two decimals
pub fn format_file_size(bytes: u64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    let rounded = (size * 100.0).round() / 100.0;
    format!("{} {}", rounded, SIZE_UNITS[unit])
}

/// Render milliseconds as `1h 2m 3s 4ms`, omitting zero leading parts
pub fn format_duration_ms(ms: u64) -> String {
    let millis = ms % 1000;
    let seconds = (ms / 1000) % 60;
    let minutes = (ms / (1000 * 60)) % 60;
    let hours = ms / (1000 * 60 * 60);

    let mut parts = Vec::with_capacity(4);
    if hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if minutes > 0 {
        parts.push(format!("{}m", minutes));
    }
    if seconds > 0 {
        parts.push(format!("{}s", seconds));
    }
    parts.push(format!("{}ms", millis));
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(1023), "1023 B");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(2 * 1024 * 1024), "2 MB");
        assert_eq!(format_file_size(1_234_567), "1.18 MB");
    }

    #[test]
    fn test_format_file_size_caps_at_largest_unit() {
        let huge = 2048u64 * 1024 * 1024 * 1024 * 1024;
        assert_eq!(format_file_size(huge), "2048 TB");
    }

    #[test]
    fn test_format_duration_ms() {
        assert_eq!(format_duration_ms(0), "0ms");
        assert_eq!(format_duration_ms(999), "999ms");
        assert_eq!(format_duration_ms(1_500), "1s 500ms");
        assert_eq!(format_duration_ms(61_001), "1m 1s 1ms");
        assert_eq!(format_duration_ms(3_600_000), "1h 0ms");
    }
}
