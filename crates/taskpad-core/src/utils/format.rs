use chrono::Duration;

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Format a date string to a more readable format
pub fn format_date(date: &str) -> String {
    // Try to parse ISO format and convert to readable
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date) {
        dt.format("%b %d, %Y").to_string()
    } else if let Ok(d) = chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d") {
        d.format("%b %d, %Y").to_string()
    } else if date.len() >= 10 && date.is_char_boundary(10) {
        date[..10].to_string()
    } else {
        date.to_string()
    }
}

/// Compact remaining-time display: "45s", "4m 30s", "2h 5m", "3d 4h".
pub fn format_remaining(remaining: Duration) -> String {
    let secs = remaining.num_seconds().max(0);
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3_600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86_400 {
        format!("{}h {}m", secs / 3_600, (secs % 3_600) / 60)
    } else {
        format!("{}d {}h", secs / 86_400, (secs % 86_400) / 3_600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("Hello", 10), "Hello");
        assert_eq!(truncate_string("Hello World", 8), "Hello...");
        assert_eq!(truncate_string("Hi", 2), "Hi");
        assert_eq!(truncate_string("Tarefa pública", 9), "Tarefa...");
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2024-03-10T12:00:00Z"), "Mar 10, 2024");
        assert_eq!(format_date("2024-03-10"), "Mar 10, 2024");
        assert_eq!(format_date("2024-03-10 junk"), "2024-03-10");
        assert_eq!(format_date("soon"), "soon");
    }

    #[test]
    fn test_format_remaining() {
        assert_eq!(format_remaining(Duration::seconds(-5)), "0s");
        assert_eq!(format_remaining(Duration::seconds(45)), "45s");
        assert_eq!(format_remaining(Duration::seconds(270)), "4m 30s");
        assert_eq!(format_remaining(Duration::seconds(7_500)), "2h 5m");
        assert_eq!(format_remaining(Duration::seconds(273_600)), "3d 4h");
    }
}
