//! URL and content classification. Everything here is pure.

use std::path::Path;

use {linkfetch_common::PresentationKind, url::Url};

/// Where a URL points, decided from its host alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// A page on a known media-hosting site; needs the extractor.
    VideoSite,
    /// Anything else; fetched as a plain file.
    DirectLink,
}

/// Coarse category of a retrieved artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    Video,
    Gif,
    Document,
}

impl From<ContentKind> for PresentationKind {
    fn from(kind: ContentKind) -> Self {
        match kind {
            ContentKind::Video => Self::Video,
            ContentKind::Gif => Self::Animation,
            ContentKind::Document => Self::Document,
        }
    }
}

/// Media-hosting sites served through the extractor. Subdomains match too.
pub const VIDEO_SITES: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "vimeo.com",
    "dailymotion.com",
    "xvideos.com",
    "pornhub.com",
    "xnxx.com",
    "redtube.com",
    "xhamster.com",
    "spankbang.com",
    "eporner.com",
    "youporn.com",
    "porn300.com",
    "xgroovy.com",
    "pornone.com",
    "txxx.com",
    "hqporner.com",
    "upornia.com",
    "porntrex.com",
    "thumbzilla.com",
    "myteenwebcam.com",
    "thefapp.com",
    "gfycat.com",
    "redgifs.com",
    "xgifer.com",
    "hentaigifz.com",
    "hardcoregify.com",
    "twitter.com",
    "x.com",
    "instagram.com",
    "tiktok.com",
    "facebook.com",
    "twitch.tv",
    "reddit.com",
    "beeg.com",
    "yourporn.sexy",
    "xmoviesforyou.com",
    "porngo.com",
    "youjizz.com",
    "motherless.com",
    "3movs.com",
    "tube8.com",
    "porndig.com",
    "cumlouder.com",
    "porndoe.com",
    "pornhat.com",
    "ok.xxx",
    "porn00.com",
    "pornhoarder.com",
    "pornhits.com",
    "pornhd3x.com",
    "xxxfiles.com",
    "tnaflix.com",
    "porndish.com",
    "fullporner.com",
    "porn4days.com",
    "whoreshub.com",
    "paradisehill.com",
    "trendyporn.com",
    "pornhd8k.com",
    "xfreehd.com",
    "perfectgirls.com",
    "yourdailypornvideos.com",
    "anysex.com",
    "erome.com",
    "vxxx.com",
    "veporn.com",
    "drtuber.com",
    "netfapx.com",
    "letsjerk.com",
    "pornobae.com",
    "pornmz.com",
    "xmegadrive.com",
    "hitprn.com",
    "czechvideo.com",
    "joysporn.com",
];

const VIDEO_EXTENSIONS: &[&str] = &[
    "mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "mpeg", "mpg",
];

/// MIME types whose conventional extension differs from `mime_guess`'s first pick.
const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("video/mp4", ".mp4"),
    ("video/webm", ".webm"),
    ("video/quicktime", ".mov"),
    ("video/x-matroska", ".mkv"),
    ("image/gif", ".gif"),
    ("image/jpeg", ".jpg"),
    ("image/png", ".png"),
    ("audio/mpeg", ".mp3"),
    ("application/pdf", ".pdf"),
    ("application/zip", ".zip"),
    ("text/plain", ".txt"),
];

/// Whether `host` is `domain` or one of its subdomains.
pub(crate) fn host_matches(host: &str, domain: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    host == domain || host.ends_with(&format!(".{domain}"))
}

/// Classify a URL by matching its host against [`VIDEO_SITES`].
#[must_use]
pub fn classify_source(url: &Url) -> SourceKind {
    let Some(host) = url.host_str() else {
        return SourceKind::DirectLink;
    };
    if VIDEO_SITES.iter().any(|site| host_matches(host, site)) {
        SourceKind::VideoSite
    } else {
        SourceKind::DirectLink
    }
}

/// File extension (with leading dot) for a URL, preferring the path suffix
/// and falling back to the content type. Empty when neither yields one.
#[must_use]
pub fn infer_extension(url: &Url, content_type: Option<&str>) -> String {
    let from_path = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|last| Path::new(last).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty());
    if let Some(ext) = from_path {
        return format!(".{ext}");
    }

    content_type
        .map(essence)
        .filter(|ct| !ct.is_empty())
        .and_then(extension_for_mime)
        .unwrap_or_default()
}

fn extension_for_mime(mime: &str) -> Option<String> {
    let mime = mime.to_ascii_lowercase();
    if let Some((_, ext)) = PREFERRED_EXTENSIONS.iter().find(|(m, _)| *m == mime) {
        return Some((*ext).to_string());
    }
    mime_guess::get_mime_extensions_str(&mime)
        .and_then(|exts| exts.first())
        .map(|ext| format!(".{ext}"))
}

/// Strip parameters (`; charset=...`) from a content type.
fn essence(content_type: &str) -> &str {
    content_type.split(';').next().unwrap_or_default().trim()
}

/// Classify an artifact by file name, with the content type as a secondary
/// signal.
#[must_use]
pub fn classify_content_kind(filename: &str, content_type: Option<&str>) -> ContentKind {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let content_type = content_type.map(|ct| essence(ct).to_ascii_lowercase());

    if ext.as_deref() == Some("gif") || content_type.as_deref() == Some("image/gif") {
        return ContentKind::Gif;
    }
    if ext.is_some_and(|e| VIDEO_EXTENSIONS.contains(&e.as_str()))
        || content_type.is_some_and(|ct| ct.starts_with("video/"))
    {
        return ContentKind::Video;
    }
    ContentKind::Document
}
