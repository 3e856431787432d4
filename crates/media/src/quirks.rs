//! Per-site adjustments for the extractor strategy.
//!
//! A site with no entry gets the defaults: browser headers, the size-budget
//! format, mp4 merging and no retry.

use crate::mime::host_matches;

#[derive(Debug, Clone, Copy)]
pub struct SiteQuirk {
    pub domain: &'static str,
    /// Prefer GIF renditions and skip mp4 merging.
    pub gif_priority: bool,
    /// Replaces the default user agent.
    pub user_agent: Option<&'static str>,
    /// Added to (or replacing) the default request headers.
    pub headers: &'static [(&'static str, &'static str)],
    /// Passed verbatim as `--extractor-args`.
    pub extractor_args: &'static [&'static str],
    /// Format expression for one retry after a not-found transfer error.
    pub not_found_retry_format: Option<&'static str>,
    /// Shown to the requester when that retry also fails.
    pub not_found_hint: Option<&'static str>,
}

impl SiteQuirk {
    const fn gif_host(domain: &'static str) -> Self {
        Self {
            domain,
            gif_priority: true,
            user_agent: None,
            headers: &[],
            extractor_args: &[],
            not_found_retry_format: None,
            not_found_hint: None,
        }
    }
}

const XHAMSTER: SiteQuirk = SiteQuirk {
    domain: "xhamster.com",
    gif_priority: false,
    user_agent: None,
    headers: &[
        ("Sec-Fetch-Site", "same-origin"),
        ("Sec-Fetch-Mode", "cors"),
        ("Sec-Fetch-Dest", "video"),
        ("Pragma", "no-cache"),
        ("Cache-Control", "no-cache"),
    ],
    extractor_args: &[],
    not_found_retry_format: Some("best[ext=mp4]/best"),
    not_found_hint: Some(
        "this site may require browser cookies; set YTDLP_COOKIES or YTDLP_COOKIE_HEADER",
    ),
};

const REDDIT: SiteQuirk = SiteQuirk {
    domain: "reddit.com",
    gif_priority: false,
    user_agent: Some(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) \
         Chrome/131.0.0.0 Safari/537.36",
    ),
    headers: &[
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,\
             image/apng,*/*;q=0.8",
        ),
        ("Accept-Language", "en-US,en;q=0.9"),
        ("Sec-Fetch-Dest", "document"),
        ("Sec-Fetch-Mode", "navigate"),
        ("Sec-Fetch-Site", "none"),
        ("Sec-Fetch-User", "?1"),
        ("Upgrade-Insecure-Requests", "1"),
    ],
    extractor_args: &["reddit:sort=best"],
    not_found_retry_format: None,
    not_found_hint: None,
};

static QUIRKS: &[SiteQuirk] = &[
    XHAMSTER,
    REDDIT,
    SiteQuirk::gif_host("gfycat.com"),
    SiteQuirk::gif_host("redgifs.com"),
    SiteQuirk::gif_host("myteenwebcam.com"),
    SiteQuirk::gif_host("thefapp.com"),
    SiteQuirk::gif_host("xgroovy.com"),
    SiteQuirk::gif_host("xgifer.com"),
    SiteQuirk::gif_host("hentaigifz.com"),
    SiteQuirk::gif_host("hardcoregify.com"),
];

/// Quirks for the site serving `host`, if any.
pub fn quirk_for(host: &str) -> Option<&'static SiteQuirk> {
    QUIRKS.iter().find(|q| host_matches(host, q.domain))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_quirks_by_domain_suffix() {
        let quirk = quirk_for("de.xhamster.com").unwrap();
        assert_eq!(quirk.not_found_retry_format, Some("best[ext=mp4]/best"));
        assert!(quirk_for("www.redgifs.com").unwrap().gif_priority);
        assert_eq!(
            quirk_for("old.reddit.com").unwrap().extractor_args,
            &["reddit:sort=best"]
        );
        assert!(quirk_for("youtube.com").is_none());
    }
}
