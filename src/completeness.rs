// 📄 Page-Completeness Validator
// Page markers ("Page 2 of 6", "3/6", "Page 4") → which pages we saw, which
// are missing. Never blocks analysis; it only annotates the result.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::OnceLock;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletenessStatus {
    Complete,
    Incomplete,
    /// No usable markers at all
    Unverifiable,
}

/// One marker found in the text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMarker {
    pub page: u32,
    pub total: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementPageInfo {
    /// Physical pages handed to us
    pub total_pages: usize,
    pub discovered_pages: BTreeSet<u32>,
    pub expected_pages: Option<u32>,
    pub missing_pages: Vec<u32>,

    /// (before, after) pairs of discovered numbers more than one apart
    pub sequence_gaps: Vec<(u32, u32)>,

    /// Physical pages beyond the stated total
    pub surplus_pages: usize,

    pub status: CompletenessStatus,
    pub confidence: f64,
}

impl StatementPageInfo {
    pub fn is_complete(&self) -> bool {
        self.status == CompletenessStatus::Complete
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletenessConfig {
    /// Largest believable page number; guards "12/31"-style dates
    pub page_ceiling: u32,
}

impl Default for CompletenessConfig {
    fn default() -> Self {
        CompletenessConfig { page_ceiling: 100 }
    }
}

// ============================================================================
// MARKER SCANNING
// ============================================================================

fn page_of_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\bpage\s+(?P<n>\d{1,4})(?:\s*(?:of|/)\s*(?P<m>\d{1,4}))?\b").expect("page marker regex")
    })
}

/// "3/6" or "3 of 6" alone on its line
fn bare_fraction_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^\s*(?P<n>\d{1,4})\s*(?:/|of)\s*(?P<m>\d{1,4})\s*$").expect("bare page regex")
    })
}

pub struct CompletenessValidator {
    config: CompletenessConfig,
}

impl CompletenessValidator {
    pub fn new(config: CompletenessConfig) -> Self {
        CompletenessValidator { config }
    }

    fn accept(&self, page: u32, total: Option<u32>) -> Option<PageMarker> {
        let ceiling = self.config.page_ceiling;
        if page == 0 || page > ceiling {
            return None;
        }
        match total {
            Some(m) if m < page || m > ceiling => None,
            _ => Some(PageMarker { page, total }),
        }
    }

    /// Every page marker in every page, in document order
    pub fn scan_markers(&self, pages: &[String]) -> Vec<PageMarker> {
        let mut markers = Vec::new();

        for line in pages.iter().flat_map(|p| p.lines()) {
            if let Some(caps) = bare_fraction_re().captures(line) {
                let n = caps["n"].parse().ok();
                let m = caps["m"].parse().ok();
                if let (Some(n), Some(m)) = (n, m) {
                    markers.extend(self.accept(n, Some(m)));
                }
                continue;
            }

            for caps in page_of_re().captures_iter(line) {
                let Some(n) = caps["n"].parse().ok() else {
                    continue;
                };
                let m = caps.name("m").and_then(|m| m.as_str().parse().ok());
                markers.extend(self.accept(n, m));
            }
        }

        markers
    }

    pub fn validate(&self, pages: &[String]) -> StatementPageInfo {
        let markers = self.scan_markers(pages);
        validate_markers(&markers, pages.len())
    }
}

impl Default for CompletenessValidator {
    fn default() -> Self {
        CompletenessValidator::new(CompletenessConfig::default())
    }
}

// ============================================================================
// VALIDATION
// ============================================================================

/// Build the completeness report from already-accepted markers.
pub fn validate_markers(markers: &[PageMarker], physical_pages: usize) -> StatementPageInfo {
    let discovered: BTreeSet<u32> = markers.iter().map(|m| m.page).collect();

    // Disagreeing totals: the largest one wins
    let expected = markers.iter().filter_map(|m| m.total).max();

    let missing_pages: Vec<u32> = match expected {
        Some(total) => (1..=total).filter(|p| !discovered.contains(p)).collect(),
        None => Vec::new(),
    };

    let ordered: Vec<u32> = discovered.iter().copied().collect();
    let sequence_gaps: Vec<(u32, u32)> = ordered
        .windows(2)
        .filter(|w| w[1] - w[0] > 1)
        .map(|w| (w[0], w[1]))
        .collect();

    let surplus_pages = match expected {
        Some(total) => physical_pages.saturating_sub(total as usize),
        None => 0,
    };

    let (status, confidence) = if discovered.is_empty() {
        (CompletenessStatus::Unverifiable, 0.5)
    } else if !missing_pages.is_empty() {
        let total = expected.unwrap_or(1).max(1) as f64;
        let seen = total - missing_pages.len() as f64;
        (CompletenessStatus::Incomplete, (seen / total).clamp(0.0, 1.0))
    } else if !sequence_gaps.is_empty() {
        (CompletenessStatus::Incomplete, 0.6)
    } else if expected.is_some() {
        (CompletenessStatus::Complete, 1.0)
    } else {
        // Contiguous "Page N" markers but no stated total
        (CompletenessStatus::Complete, 0.8)
    };

    StatementPageInfo {
        total_pages: physical_pages,
        discovered_pages: discovered,
        expected_pages: expected,
        missing_pages,
        sequence_gaps,
        surplus_pages,
        status,
        confidence,
    }
}

// ============================================================================
// TESTS
// ============================================================================
