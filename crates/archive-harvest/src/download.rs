//! Direct HTTP download of resolved asset URLs, plus file naming helpers.

use std::path::{Path, PathBuf};
use std::time::Instant;

use futures::StreamExt;
use reqwest::header::HeaderMap;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::classify;
use crate::config::{HttpSettings, PortalSettings};
use crate::types::{AssetDescriptor, DownloadOutcome, HarvestError, HarvestResult};

/// Query parameters that commonly carry the original filename on download endpoints.
const FILE_NAME_PARAMS: &[&str] = &["fileName", "filename", "orgFileName", "orgnlAtchFileNm", "name"];

/// A file written to disk.
#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub duration_ms: u64,
}

/// `<prefix>_<timestamp>.<ext-or-bin>`
pub fn fallback_file_name(prefix: &str, ext: Option<&str>) -> String {
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S%3f");
    let ext = ext.filter(|e| !e.is_empty()).unwrap_or("bin");
    format!("{prefix}_{stamp}.{ext}")
}

/// Best-effort filename from a URL: the last path segment if it has an
/// extension, otherwise a filename-bearing query parameter.
pub fn file_name_from_url(url: &Url) -> Option<String> {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .map(decode)
        .filter(|s| !s.is_empty());

    if let Some(seg) = &segment {
        if classify::extension(seg).is_some() && !is_script_endpoint(seg) {
            return Some(seg.clone());
        }
    }

    url.query_pairs()
        .find(|(k, v)| FILE_NAME_PARAMS.contains(&k.as_ref()) && !v.is_empty())
        .map(|(_, v)| v.into_owned())
}

/// Replace characters that cannot appear in a filename on common filesystems.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    cleaned.trim_matches('.').to_string()
}

fn decode(s: &str) -> String {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

fn is_script_endpoint(segment: &str) -> bool {
    matches!(
        classify::extension(segment).as_deref(),
        Some("do" | "jsp" | "php" | "asp" | "aspx" | "action")
    )
}

/// Streams asset URLs to disk.
#[derive(Clone)]
pub struct Downloader {
    client: reqwest::Client,
    headers: HeaderMap,
    fallback_prefix: String,
}

impl Downloader {
    pub fn new(http: &HttpSettings, portal: &PortalSettings, fallback_prefix: &str) -> Self {
        Self {
            client: crate::http::build_client(http, http.download_timeout()),
            headers: crate::http::portal_headers(http, portal),
            fallback_prefix: fallback_prefix.to_string(),
        }
    }

    /// GET `url` and stream the body into `dir/file_name`.
    ///
    /// The directory is created first. An existing file is never overwritten;
    /// the name gets a numeric suffix instead. Non-2xx responses and empty
    /// bodies are errors, and only the file this call created is removed.
    pub async fn fetch_to(&self, url: &str, file_name: &str, dir: &Path) -> HarvestResult<DownloadedFile> {
        let start = Instant::now();
        tokio::fs::create_dir_all(dir).await?;

        let name = match sanitize_file_name(file_name) {
            n if n.is_empty() => fallback_file_name(&self.fallback_prefix, None),
            n => n,
        };

        let response = self
            .client
            .get(url)
            .headers(self.headers.clone())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HarvestError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let (path, file) = claim_path(dir, &name).await?;
        let written = match stream_to_file(response, file).await {
            Ok(0) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(HarvestError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("empty response body from {url}"),
                )));
            }
            Ok(n) => n,
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e);
            }
        };

        let size_bytes = tokio::fs::metadata(&path)
            .await
            .map(|m| m.len())
            .unwrap_or(written);

        Ok(DownloadedFile {
            path,
            size_bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Download one descriptor, folding any failure into the outcome.
    pub async fn download(&self, descriptor: &AssetDescriptor, dir: &Path) -> DownloadOutcome {
        let start = Instant::now();
        let Some(url) = descriptor.url.as_deref() else {
            return DownloadOutcome::failed(descriptor.clone(), "descriptor has no download URL", None);
        };

        match self.fetch_to(url, &descriptor.file_name, dir).await {
            Ok(file) => DownloadOutcome::succeeded(
                descriptor.clone(),
                file.path,
                file.size_bytes,
                file.duration_ms,
            ),
            Err(e) => DownloadOutcome::failed(
                descriptor.clone(),
                e.to_string(),
                Some(start.elapsed().as_millis() as u64),
            ),
        }
    }
}

/// Create `dir/name` exclusively, moving to `stem_1.ext`, `stem_2.ext`, ...
/// while the name is taken.
async fn claim_path(dir: &Path, name: &str) -> HarvestResult<(PathBuf, tokio::fs::File)> {
    let mut n = 0usize;
    loop {
        let path = dir.join(numbered_name(name, n));
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
            Err(e) => return Err(e.into()),
        }
    }
}

/// `image.jpg` with 2 becomes `image_2.jpg`; 0 leaves the name alone.
pub fn numbered_name(name: &str, n: usize) -> String {
    if n == 0 {
        return name.to_string();
    }
    let path = Path::new(name);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or(name);
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_{n}.{ext}"),
        None => format!("{stem}_{n}"),
    }
}

async fn stream_to_file(response: reqwest::Response, mut file: tokio::fs::File) -> HarvestResult<u64> {
    let mut stream = response.bytes_stream();
    let mut written = 0u64;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MediaType, SourceMethod};
    use serde_json::Value;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn descriptor(url: Option<String>, name: &str) -> AssetDescriptor {
        AssetDescriptor {
            url,
            display_text: name.to_string(),
            file_name: name.to_string(),
            file_size: "Unknown".to_string(),
            source_method: SourceMethod::DomImageTag,
            media_type: MediaType::Image,
            raw_metadata: Value::Null,
        }
    }

    fn downloader() -> Downloader {
        Downloader::new(&HttpSettings::default(), &PortalSettings::default(), "asset")
    }

    #[test]
    fn test_fallback_name_shape() {
        let n = fallback_file_name("photo", Some("jpg"));
        assert!(n.starts_with("photo_"));
        assert!(n.ends_with(".jpg"));
        assert!(fallback_file_name("photo", None).ends_with(".bin"));
    }

    #[test]
    fn test_file_name_from_url() {
        let u = Url::parse("https://x.go.kr/img/%ED%95%9C.jpg").unwrap();
        assert_eq!(file_name_from_url(&u).as_deref(), Some("한.jpg"));

        let u = Url::parse("https://x.go.kr/fileDownload.do?atcflNo=1&fileName=a.png").unwrap();
        assert_eq!(file_name_from_url(&u).as_deref(), Some("a.png"));

        let u = Url::parse("https://x.go.kr/fileDownload.do?atcflNo=1").unwrap();
        assert_eq!(file_name_from_url(&u), None);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize_file_name("../a/b:c.jpg"), "_a_b_c.jpg");
        assert_eq!(sanitize_file_name("  ok.png "), "ok.png");
    }

    #[tokio::test]
    async fn test_download_writes_file_and_creates_dir() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img/x.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 2048]))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/deeper");
        let d = descriptor(Some(format!("{}/img/x.jpg", server.uri())), "x.jpg");

        let outcome = downloader().download(&d, &dir).await;
        assert!(outcome.success, "{:?}", outcome.error_message);
        assert_eq!(outcome.size_bytes, Some(2048));
        assert!(dir.join("x.jpg").exists());
    }

    #[tokio::test]
    async fn test_non_2xx_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let d = descriptor(Some(format!("{}/missing.jpg", server.uri())), "missing.jpg");
        let outcome = downloader().download(&d, tmp.path()).await;

        assert!(!outcome.success);
        assert!(outcome.error_message.unwrap().contains("404"));
        assert!(!tmp.path().join("missing.jpg").exists());
    }

    #[tokio::test]
    async fn test_empty_body_is_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let d = descriptor(Some(format!("{}/empty.jpg", server.uri())), "empty.jpg");
        let outcome = downloader().download(&d, tmp.path()).await;

        assert!(!outcome.success);
        assert!(outcome.error_message.unwrap().contains("empty"));
        assert!(!tmp.path().join("empty.jpg").exists());
    }

    #[tokio::test]
    async fn test_missing_url_is_failure() {
        let tmp = tempfile::tempdir().unwrap();
        let outcome = downloader()
            .download(&descriptor(None, "a.jpg"), tmp.path())
            .await;
        assert!(!outcome.success);
        assert!(outcome.file_path.is_none());
    }

    #[test]
    fn test_numbered_name() {
        assert_eq!(numbered_name("image.jpg", 0), "image.jpg");
        assert_eq!(numbered_name("image.jpg", 2), "image_2.jpg");
        assert_eq!(numbered_name("README", 1), "README_1");
        assert_eq!(numbered_name("scan.tar.gz", 1), "scan.tar_1.gz");
    }

    #[tokio::test]
    async fn test_same_name_never_overwrites() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a/image.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"FIRST".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b/image.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"SECOND".to_vec()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/c/image.jpg"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let tmp = tempfile::tempdir().unwrap();
        let dl = downloader();
        let fetch = |dir: &str| descriptor(Some(format!("{}/{dir}/image.jpg", server.uri())), "image.jpg");
        let first = dl.download(&fetch("a"), tmp.path()).await;
        let second = dl.download(&fetch("b"), tmp.path()).await;
        let empty = dl.download(&fetch("c"), tmp.path()).await;

        assert!(first.success && second.success);
        assert_ne!(first.file_path, second.file_path);
        assert_eq!(std::fs::read(tmp.path().join("image.jpg")).unwrap(), b"FIRST");
        assert_eq!(std::fs::read(tmp.path().join("image_1.jpg")).unwrap(), b"SECOND");

        assert!(!empty.success);
        assert!(tmp.path().join("image.jpg").exists());
        assert!(tmp.path().join("image_1.jpg").exists());
        assert!(!tmp.path().join("image_2.jpg").exists());
    }
}
