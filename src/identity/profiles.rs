//! Built-in fingerprint profiles
//!
//! Each profile bundles a user agent with the client-hint headers a real
//! browser of that family sends, so the presented fingerprint stays coherent.

/// Presented client characteristics resembling one real browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintProfile {
    /// Short stable name, usable from configuration
    pub tag: &'static str,
    pub user_agent: &'static str,
    /// `sec-ch-ua` value; empty for browsers that do not send client hints
    pub sec_ch_ua: &'static str,
    pub sec_ch_ua_mobile: &'static str,
    pub sec_ch_ua_platform: &'static str,
    pub accept_language: &'static str,
    pub viewport_width: u32,
    pub viewport_height: u32,
}

pub(crate) const PROFILES: &[FingerprintProfile] = &[
    FingerprintProfile {
        tag: "chrome-windows",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        sec_ch_ua: r#""Chromium";v="131", "Not_A Brand";v="24", "Google Chrome";v="131""#,
        sec_ch_ua_mobile: "?0",
        sec_ch_ua_platform: "\"Windows\"",
        accept_language: "en-US,en;q=0.9",
        viewport_width: 1920,
        viewport_height: 1080,
    },
    FingerprintProfile {
        tag: "chrome-macos",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
        sec_ch_ua: r#""Chromium";v="131", "Not_A Brand";v="24", "Google Chrome";v="131""#,
        sec_ch_ua_mobile: "?0",
        sec_ch_ua_platform: "\"macOS\"",
        accept_language: "en-US,en;q=0.9",
        viewport_width: 1440,
        viewport_height: 900,
    },
    FingerprintProfile {
        tag: "chrome-linux",
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36",
        sec_ch_ua: r#""Chromium";v="130", "Not_A Brand";v="24", "Google Chrome";v="130""#,
        sec_ch_ua_mobile: "?0",
        sec_ch_ua_platform: "\"Linux\"",
        accept_language: "en-US,en;q=0.9",
        viewport_width: 1920,
        viewport_height: 1080,
    },
    FingerprintProfile {
        tag: "edge-windows",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36 Edg/131.0.0.0",
        sec_ch_ua: r#""Chromium";v="131", "Not_A Brand";v="24", "Microsoft Edge";v="131""#,
        sec_ch_ua_mobile: "?0",
        sec_ch_ua_platform: "\"Windows\"",
        accept_language: "en-US,en;q=0.9",
        viewport_width: 1920,
        viewport_height: 1080,
    },
    FingerprintProfile {
        tag: "firefox-windows",
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
        sec_ch_ua: "",
        sec_ch_ua_mobile: "",
        sec_ch_ua_platform: "",
        accept_language: "en-US,en;q=0.5",
        viewport_width: 1920,
        viewport_height: 1080,
    },
    FingerprintProfile {
        tag: "safari-macos",
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
        sec_ch_ua: "",
        sec_ch_ua_mobile: "",
        sec_ch_ua_platform: "",
        accept_language: "en-US,en;q=0.9",
        viewport_width: 1440,
        viewport_height: 900,
    },
];

/// Looks up a built-in profile by its tag
pub fn profile_by_tag(tag: &str) -> Option<&'static FingerprintProfile> {
    PROFILES.iter().find(|p| p.tag == tag)
}

impl FingerprintProfile {
    /// Navigation request headers matching this profile
    ///
    /// The user agent itself is included so the header set can be applied
    /// as one unit.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("User-Agent", self.user_agent.to_string()),
            (
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"
                    .to_string(),
            ),
            ("Accept-Language", self.accept_language.to_string()),
            ("Cache-Control", "no-cache".to_string()),
            ("DNT", "1".to_string()),
            ("Upgrade-Insecure-Requests", "1".to_string()),
            ("Sec-Fetch-Dest", "document".to_string()),
            ("Sec-Fetch-Mode", "navigate".to_string()),
            ("Sec-Fetch-Site", "none".to_string()),
            ("Sec-Fetch-User", "?1".to_string()),
        ];

        if !self.sec_ch_ua.is_empty() {
            headers.push(("sec-ch-ua", self.sec_ch_ua.to_string()));
            headers.push(("sec-ch-ua-mobile", self.sec_ch_ua_mobile.to_string()));
            headers.push(("sec-ch-ua-platform", self.sec_ch_ua_platform.to_string()));
        }

        headers
    }
}
