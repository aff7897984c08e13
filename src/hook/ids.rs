use regex::Regex;

/// Numeric id in the last path segment of a resource URL, e.g.
/// `https://acme.example/api/v1/users/7` → `7`.
pub fn last_segment_id(url: &str) -> Option<u64> {
    url.trim_end_matches('/').rsplit('/').next()?.parse().ok()
}

/// Numeric id following a named segment, e.g. `document/(\d+)`.
pub fn segment_id(path: &str, segment: &str) -> Option<u64> {
    let pattern = Regex::new(&format!(r"{}/(\d+)", regex::escape(segment))).ok()?;
    pattern
        .captures(path)
        .and_then(|captures| captures.get(1))
        .and_then(|id| id.as_str().parse().ok())
}

pub fn document_id(path: &str) -> Option<u64> {
    segment_id(path, "document")
}

pub fn queue_id(path: &str) -> Option<u64> {
    segment_id(path, "queues")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_last_segment() {
        assert_eq!(last_segment_id("https://acme.example/api/v1/users/7"), Some(7));
        assert_eq!(last_segment_id("https://acme.example/api/v1/users/7/"), Some(7));
        assert_eq!(last_segment_id("https://acme.example/api/v1/users/me"), None);
        assert_eq!(last_segment_id(""), None);
    }

    #[test]
    fn extracts_named_segment() {
        assert_eq!(document_id("/document/42"), Some(42));
        assert_eq!(document_id("/document/42/edit"), Some(42));
        assert_eq!(queue_id("https://acme.example/api/v1/queues/9"), Some(9));
        assert_eq!(queue_id("queues/12"), Some(12));
        assert_eq!(queue_id("/documents"), None);
        assert_eq!(document_id("/queues/3"), None);
    }
}
