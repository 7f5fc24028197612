//! Agreement between DNS servers
//!
//! An IP is believed when at least two successful servers returned it, or
//! when only one server succeeded at all. If nothing reaches that bar, the
//! answer of the fastest successful server wins.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::Resolution;

/// Reduce per-server resolutions to the believed-current IPs
///
/// The result is sorted; callers should still treat it as a set. An empty
/// result means no server produced a usable answer.
pub fn reduce(results: &[Resolution]) -> Vec<String> {
    let successful: Vec<&Resolution> = results.iter().filter(|r| r.is_success()).collect();
    if successful.is_empty() {
        return Vec::new();
    }

    let threshold = if successful.len() >= 2 { 2 } else { 1 };

    // A server repeating an IP in one answer still counts once.
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for resolution in &successful {
        let distinct: BTreeSet<&str> = resolution.addresses.iter().map(String::as_str).collect();
        for ip in distinct {
            *counts.entry(ip).or_default() += 1;
        }
    }

    let agreed: Vec<String> = counts
        .into_iter()
        .filter(|(_, count)| *count >= threshold)
        .map(|(ip, _)| ip.to_string())
        .collect();

    if !agreed.is_empty() {
        return agreed;
    }

    match fastest(results) {
        Some(resolution) => {
            let distinct: BTreeSet<&String> = resolution.addresses.iter().collect();
            distinct.into_iter().cloned().collect()
        }
        None => Vec::new(),
    }
}

/// The quickest successful resolution that returned at least one address
pub fn fastest(results: &[Resolution]) -> Option<&Resolution> {
    results
        .iter()
        .filter(|r| r.is_success() && !r.addresses.is_empty())
        .min_by_key(|r| r.latency)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResolutionError;
    use std::time::Duration;

    fn ok(server: &str, ms: u64, ips: &[&str]) -> Resolution {
        Resolution::success(
            server,
            ips.iter().map(|s| s.to_string()).collect(),
            Duration::from_millis(ms),
        )
    }

    fn failed(server: &str) -> Resolution {
        Resolution::failure(server, ResolutionError::Timeout, Duration::from_secs(5))
    }

    #[test]
    fn test_majority_wins() {
        let results = vec![
            ok("s1", 30, &["198.51.100.1"]),
            ok("s2", 10, &["198.51.100.1"]),
            ok("s3", 5, &["198.51.100.2"]),
        ];
        assert_eq!(reduce(&results), vec!["198.51.100.1".to_string()]);
    }

    #[test]
    fn test_all_distinct_falls_back_to_fastest() {
        let results = vec![
            ok("s1", 30, &["198.51.100.1"]),
            ok("s2", 10, &["198.51.100.2"]),
            ok("s3", 20, &["198.51.100.3"]),
        ];
        assert_eq!(reduce(&results), vec!["198.51.100.2".to_string()]);
    }

    #[test]
    fn test_single_success_is_accepted() {
        let results = vec![failed("s1"), ok("s2", 10, &["198.51.100.9"]), failed("s3")];
        assert_eq!(reduce(&results), vec!["198.51.100.9".to_string()]);
    }

    #[test]
    fn test_all_failures_yield_nothing() {
        let results = vec![failed("s1"), failed("s2")];
        assert!(reduce(&results).is_empty());
        assert!(reduce(&[]).is_empty());
    }

    #[test]
    fn test_empty_answers_yield_nothing() {
        let results = vec![ok("s1", 10, &[]), ok("s2", 20, &[])];
        assert!(reduce(&results).is_empty());
    }

    #[test]
    fn test_multiple_agreed_ips() {
        let results = vec![
            ok("s1", 10, &["198.51.100.1", "198.51.100.2"]),
            ok("s2", 20, &["198.51.100.2", "198.51.100.1"]),
        ];
        assert_eq!(
            reduce(&results),
            vec!["198.51.100.1".to_string(), "198.51.100.2".to_string()]
        );
    }

    #[test]
    fn test_duplicates_within_one_answer_count_once() {
        let results = vec![
            ok("s1", 10, &["198.51.100.1", "198.51.100.1"]),
            ok("s2", 5, &["198.51.100.2"]),
        ];
        // No IP reaches two servers, so the fastest answer wins.
        assert_eq!(reduce(&results), vec!["198.51.100.2".to_string()]);
    }

    #[test]
    fn test_fastest_skips_failures_and_empty_answers() {
        let results = vec![
            ok("empty", 1, &[]),
            failed("dead"),
            ok("slow", 50, &["198.51.100.1"]),
            ok("quick", 20, &["198.51.100.2"]),
        ];
        assert_eq!(fastest(&results).map(|r| r.server.as_str()), Some("quick"));
    }
}
