/// Utility functions and helpers
use url::Url;

/// Collapse runs of whitespace into single spaces and trim the ends
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Return the trimmed text, or `None` when nothing is left
pub fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// True when the text is a non-empty run of ASCII digits
pub fn is_all_digits(text: &str) -> bool {
    !text.is_empty() && text.chars().all(|c| c.is_ascii_digit())
}

/// Resolve a possibly relative reference against the page address
pub fn resolve_url(base: &str, reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    match Url::parse(base).and_then(|base_url| base_url.join(reference)) {
        Ok(absolute) => Some(absolute.to_string()),
        Err(_) => Url::parse(reference).ok().map(|u| u.to_string()),
    }
}

/// Accept only absolute http(s) addresses as product targets
pub fn is_valid_page_url(url: &str) -> bool {
    Url::parse(url)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

/// Format duration in human readable format
pub fn format_duration(duration: std::time::Duration) -> String {
    let total_millis = duration.as_millis();

    if total_millis < 1000 {
        format!("{}ms", total_millis)
    } else if total_millis < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let total_seconds = duration.as_secs();
        format!("{}m {}s", total_seconds / 60, total_seconds % 60)
    }
}

/// Generate unique identifier for a run
pub fn generate_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
