//! Blocking detection
//!
//! Rules, first match wins:
//! 1. Status 403, 429, 503 or 509 is a defensive block
//! 2. A literal CAPTCHA marker in the body is a CAPTCHA
//! 3. A blocking indicator in the body (case-insensitive) is a defensive block
//! 4. Anything else is clean

use crate::config::DetectionConfig;
use crate::fetch::{BlockKind, FetchOutcome, FetchResult};
use crate::ConfigError;
use aho_corasick::AhoCorasick;

/// Statuses sites use to push back on automated traffic
const BLOCKING_STATUSES: [u16; 4] = [403, 429, 503, 509];

/// Verdict on a completed response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Clean,
    Blocked(BlockKind),
}

#[derive(Debug, Clone)]
pub struct BlockingDetector {
    captcha_markers: Option<AhoCorasick>,
    blocking_indicators: Option<AhoCorasick>,
}

impl BlockingDetector {
    /// Builds the marker and indicator matchers
    pub fn new(config: &DetectionConfig) -> Result<Self, ConfigError> {
        let captcha_markers = build_matcher(&config.captcha_markers, false)?;
        let blocking_indicators = build_matcher(&config.blocking_indicators, true)?;

        Ok(Self {
            captcha_markers,
            blocking_indicators,
        })
    }

    /// Classifies a response by its status and body
    pub fn classify(&self, result: &FetchResult) -> Classification {
        if let Some(status) = result.status {
            if BLOCKING_STATUSES.contains(&status) {
                return Classification::Blocked(BlockKind::Defensive);
            }
        }

        if let Some(markers) = &self.captcha_markers {
            if markers.is_match(&result.body) {
                return Classification::Blocked(BlockKind::Captcha);
            }
        }

        if let Some(indicators) = &self.blocking_indicators {
            if indicators.is_match(&result.body) {
                return Classification::Blocked(BlockKind::Defensive);
            }
        }

        Classification::Clean
    }

    /// Applies the classification to a result's outcome tag
    ///
    /// Transport errors carry no response to judge and pass through unchanged.
    pub fn label(&self, mut result: FetchResult) -> FetchResult {
        if matches!(result.outcome, FetchOutcome::TransportError(_)) {
            return result;
        }

        result.outcome = match self.classify(&result) {
            Classification::Clean => FetchOutcome::Success,
            Classification::Blocked(kind) => FetchOutcome::Blocked(kind),
        };
        result
    }
}

fn build_matcher(
    patterns: &[String],
    case_insensitive: bool,
) -> Result<Option<AhoCorasick>, ConfigError> {
    let patterns: Vec<&str> = patterns
        .iter()
        .map(|p| p.as_str())
        .filter(|p| !p.is_empty())
        .collect();

    if patterns.is_empty() {
        return Ok(None);
    }

    AhoCorasick::builder()
        .ascii_case_insensitive(case_insensitive)
        .build(patterns)
        .map(Some)
        .map_err(|e| ConfigError::Validation(format!("Invalid detection pattern: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::TransportKind;
    use std::time::Duration;

    fn detector() -> BlockingDetector {
        BlockingDetector::new(&DetectionConfig::default()).unwrap()
    }

    fn response(status: u16, body: &str) -> FetchResult {
        FetchResult::completed(
            "https://example.com/search",
            status,
            body.to_string(),
            Duration::from_millis(120),
            TransportKind::Direct,
        )
    }

    #[test]
    fn test_blocking_statuses_are_defensive() {
        let detector = detector();
        for status in [403, 429, 503, 509] {
            assert_eq!(
                detector.classify(&response(status, "<html>results</html>")),
                Classification::Blocked(BlockKind::Defensive),
                "status {}",
                status
            );
        }
    }

    #[test]
    fn test_status_rule_precedes_captcha_marker() {
        let body = r#"<div class="g-recaptcha" data-sitekey="abc"></div>"#;
        assert_eq!(
            detector().classify(&response(429, body)),
            Classification::Blocked(BlockKind::Defensive)
        );
    }

    #[test]
    fn test_captcha_marker() {
        let body = r#"<html><div id="rc-anchor-container"></div></html>"#;
        assert_eq!(
            detector().classify(&response(200, body)),
            Classification::Blocked(BlockKind::Captcha)
        );
    }

    #[test]
    fn test_captcha_markers_are_case_sensitive() {
        let body = "<html><p>G-RECAPTCHA-LIKE TEXT</p></html>";
        assert_eq!(
            detector().classify(&response(200, body)),
            Classification::Clean
        );
    }

    #[test]
    fn test_indicator_is_case_insensitive() {
        let body = "<html><h1>Our systems have detected Unusual Traffic</h1></html>";
        assert_eq!(
            detector().classify(&response(200, body)),
            Classification::Blocked(BlockKind::Defensive)
        );
    }

    #[test]
    fn test_clean_page() {
        let body = r#"<html><a href="https://jobs.example.org/1"><h3>Engineer</h3></a></html>"#;
        assert_eq!(
            detector().classify(&response(200, body)),
            Classification::Clean
        );
        assert_eq!(detector().classify(&response(404, "")), Classification::Clean);
    }

    #[test]
    fn test_custom_vocabulary() {
        let config = DetectionConfig {
            captcha_markers: vec!["hcaptcha-box".to_string()],
            blocking_indicators: vec!["Slow Down".to_string()],
        };
        let detector = BlockingDetector::new(&config).unwrap();

        assert_eq!(
            detector.classify(&response(200, "<div class=hcaptcha-box>")),
            Classification::Blocked(BlockKind::Captcha)
        );
        assert_eq!(
            detector.classify(&response(200, "please slow down")),
            Classification::Blocked(BlockKind::Defensive)
        );
        assert_eq!(
            detector.classify(&response(200, r#"<div class="g-recaptcha">"#)),
            Classification::Clean
        );
    }

    #[test]
    fn test_empty_vocabulary() {
        let config = DetectionConfig {
            captcha_markers: Vec::new(),
            blocking_indicators: vec![String::new()],
        };
        let detector = BlockingDetector::new(&config).unwrap();
        assert_eq!(
            detector.classify(&response(200, "anything")),
            Classification::Clean
        );
        assert_eq!(
            detector.classify(&response(503, "anything")),
            Classification::Blocked(BlockKind::Defensive)
        );
    }

    #[test]
    fn test_label() {
        let detector = detector();

        let labeled = detector.label(response(200, r#"<div class="g-recaptcha">"#));
        assert_eq!(labeled.outcome, FetchOutcome::Blocked(BlockKind::Captcha));

        let labeled = detector.label(response(200, "<html>ok</html>"));
        assert_eq!(labeled.outcome, FetchOutcome::Success);

        let failed = FetchResult::transport_error(
            "https://example.com/",
            "connection refused",
            Duration::ZERO,
            TransportKind::Direct,
        );
        let labeled = detector.label(failed);
        assert_eq!(
            labeled.outcome,
            FetchOutcome::TransportError("connection refused".to_string())
        );
    }
}
