//! Blocking HTTP client for the IPUMS extract API.

use std::fs::{File, create_dir_all};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Request, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue, LOCATION};
use reqwest::{StatusCode, Url, redirect};
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::{ClientConfig, PollConfig};
use crate::error::{AppError, ErrorKind};
use crate::ipums::extract::{ExtractInfo, ExtractRequest, parse_extract_number};
use crate::ipums::poll::wait_until_complete;

pub const API_KEY_VAR: &str = "IPUMS_API_KEY";

/// Read buffer size for streamed downloads.
const DOWNLOAD_CHUNK_BYTES: usize = 1024 * 1024;

/// Raw API key. The v1 API takes it verbatim in `Authorization` (no `Bearer`).
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(raw: impl AsRef<str>) -> Result<Self, AppError> {
        let key = raw.as_ref().trim();
        if key.is_empty() {
            return Err(AppError::config(format!("Set {API_KEY_VAR} in your environment.")));
        }
        Ok(Self(key.to_string()))
    }

    /// Load `.env` (if any) and read the key from the process environment.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        Self::new(lookup(API_KEY_VAR).unwrap_or_default())
    }

    /// `abcdef...wxyz`, safe to log.
    pub fn preview(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 10 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }

    fn header_value(&self) -> Result<HeaderValue, AppError> {
        let mut value = HeaderValue::from_str(&self.0)
            .map_err(|e| AppError::config(format!("{API_KEY_VAR} is not a valid header value: {e}")))?;
        value.set_sensitive(true);
        Ok(value)
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ApiKey").field(&self.preview()).finish()
    }
}

/// Record of one completed `download_all` run, written as `manifest.json`.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadManifest {
    pub extract: Option<u64>,
    pub downloaded_at: DateTime<Utc>,
    pub files: Vec<DownloadedFile>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadedFile {
    pub artifact: String,
    pub url: String,
    pub path: PathBuf,
    pub bytes: u64,
}

pub struct IpumsClient {
    /// Used for submission; redirects are followed by hand.
    submit_http: Client,
    http: Client,
    api_key: ApiKey,
    config: ClientConfig,
}

impl IpumsClient {
    pub fn new(api_key: ApiKey, config: ClientConfig) -> Result<Self, AppError> {
        let submit_http = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::http(format!("Failed to build HTTP client: {e}")))?;
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AppError::http(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            submit_http,
            http,
            api_key,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn headers(&self) -> Result<HeaderMap, AppError> {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, self.api_key.header_value()?);
        h.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        h.insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(h)
    }

    fn query(&self) -> [(&str, &str); 2] {
        [
            ("collection", self.config.collection.as_str()),
            ("version", self.config.version.as_str()),
        ]
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Build (but do not send) the submission request.
    pub fn build_submit_request(&self, payload: &ExtractRequest) -> Result<Request, AppError> {
        self.submit_http
            .post(self.endpoint("extracts"))
            .query(&self.query())
            .headers(self.headers()?)
            .json(payload)
            .build()
            .map_err(|e| AppError::http(format!("Failed to build extract request: {e}")))
    }

    /// Submit an extract and return its number.
    pub fn submit_extract(&self, payload: &ExtractRequest) -> Result<u64, AppError> {
        let request = self.build_submit_request(payload)?;
        ensure_authorization(&request)?;
        info!(url = %request.url(), "submitting extract");
        debug!(
            auth_len = self.api_key.0.len(),
            auth_preview = %self.api_key.preview(),
            "outgoing authorization header present"
        );

        let mut resp = self
            .submit_http
            .execute(request)
            .map_err(|e| AppError::http(format!("Extract submission failed: {e}")))?;
        info!(status = %resp.status(), "submission response");

        if is_redirect(resp.status()) {
            if let Some(target) = redirect_target(&resp)? {
                info!(location = %target, "following redirect");
                resp = self
                    .submit_http
                    .post(target)
                    .headers(self.headers()?)
                    .json(payload)
                    .send()
                    .map_err(|e| AppError::http(format!("Redirected submission failed: {e}")))?;
                info!(status = %resp.status(), "redirected submission response");
            }
        }

        let status = resp.status();
        let body = resp
            .text()
            .map_err(|e| AppError::http(format!("Failed to read submission response: {e}")))?;
        debug!(%body, "submission body");

        check_status(status, &body)?;
        parse_extract_number(&body)
    }

    /// Fetch the current status record of an extract.
    pub fn get_extract(&self, number: u64) -> Result<ExtractInfo, AppError> {
        let resp = self
            .http
            .get(self.endpoint(&format!("extracts/{number}")))
            .query(&self.query())
            .headers(self.headers()?)
            .send()
            .map_err(|e| AppError::http(format!("Status request for extract {number} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(AppError::http(format!(
                "Status request for extract {number} failed with {status}: {body}"
            )));
        }

        let value = resp
            .json()
            .map_err(|e| AppError::format(format!("Failed to parse extract {number} status: {e}")))?;
        ExtractInfo::from_value(value)
    }

    pub fn wait_for_extract(&self, number: u64, poll: PollConfig) -> Result<ExtractInfo, AppError> {
        wait_until_complete(number, poll, |n| self.get_extract(n), std::thread::sleep)
    }

    /// Stream one artifact to `dest`, returning the byte count.
    ///
    /// A partially written file is left in place on error.
    pub fn download_file(&self, url: &str, dest: &Path) -> Result<u64, AppError> {
        let mut resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, self.api_key.header_value()?)
            .timeout(self.config.download_timeout)
            .send()
            .map_err(|e| AppError::http(format!("Download of '{url}' failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(AppError::http(format!(
                "Download of '{url}' failed with status {}.",
                resp.status()
            )));
        }

        let mut file = File::create(dest)
            .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", dest.display())))?;
        stream_to(&mut resp, &mut file, url)
    }

    /// Download every artifact of a completed extract into `out_dir`.
    pub fn download_all(&self, info: &ExtractInfo, out_dir: &Path) -> Result<DownloadManifest, AppError> {
        if info.download_links.is_empty() {
            return Err(AppError::format(format!(
                "No download_links found on completed extract: {}",
                info.raw
            )));
        }

        create_dir_all(out_dir)
            .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", out_dir.display())))?;

        let mut files = Vec::with_capacity(info.download_links.len());
        for (artifact, link) in &info.download_links {
            let dest = out_dir.join(file_name_from_url(&link.url)?);
            info!(%artifact, dest = %dest.display(), "downloading");
            let bytes = self.download_file(&link.url, &dest)?;
            files.push(DownloadedFile {
                artifact: artifact.clone(),
                url: link.url.clone(),
                path: dest,
                bytes,
            });
        }

        let manifest = DownloadManifest {
            extract: info.number,
            downloaded_at: Utc::now(),
            files,
        };
        write_manifest(&out_dir.join("manifest.json"), &manifest)?;
        Ok(manifest)
    }
}

/// Fail fast if the built request lost its `Authorization` header.
pub fn ensure_authorization(request: &Request) -> Result<(), AppError> {
    match request.headers().get(AUTHORIZATION) {
        Some(v) if !v.as_bytes().is_empty() => Ok(()),
        _ => Err(AppError::config(
            "Outgoing request has no usable Authorization header.",
        )),
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

fn redirect_target(resp: &Response) -> Result<Option<Url>, AppError> {
    let Some(location) = resp.headers().get(LOCATION) else {
        return Ok(None);
    };
    let location = location
        .to_str()
        .map_err(|e| AppError::format(format!("Invalid Location header: {e}")))?;
    resp.url()
        .join(location)
        .map(Some)
        .map_err(|e| AppError::format(format!("Invalid redirect target '{location}': {e}")))
}

/// Map a submission status to the error the caller sees.
pub fn check_status(status: StatusCode, body: &str) -> Result<(), AppError> {
    if status == StatusCode::FORBIDDEN {
        return Err(AppError::new(
            ErrorKind::Permission,
            format!(
                "403 Forbidden from IPUMS. Common causes:\n \
                 - Your IPUMS account is not registered/approved for this collection\n \
                 - Wrong API key\nResponse body: {body}"
            ),
        ));
    }
    if !status.is_success() {
        return Err(AppError::http(format!(
            "Extract submission failed with status {status}: {body}"
        )));
    }
    Ok(())
}

/// Last path segment of a download URL.
pub fn file_name_from_url(url: &str) -> Result<String, AppError> {
    let parsed = Url::parse(url).map_err(|e| AppError::format(format!("Invalid download URL '{url}': {e}")))?;
    parsed
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::format(format!("Download URL '{url}' has no file name.")))
}

fn stream_to(reader: &mut impl Read, writer: &mut impl Write, url: &str) -> Result<u64, AppError> {
    let mut buf = vec![0u8; DOWNLOAD_CHUNK_BYTES];
    let mut total = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| AppError::http(format!("Download of '{url}' interrupted: {e}")))?;
        if n == 0 {
            break;
        }
        writer
            .write_all(&buf[..n])
            .map_err(|e| AppError::io(format!("Failed to write '{url}' to disk: {e}")))?;
        total += n as u64;
    }
    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush '{url}': {e}")))?;
    Ok(total)
}

fn write_manifest(path: &Path, manifest: &DownloadManifest) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, manifest)
        .map_err(|e| AppError::io(format!("Failed to write download manifest: {e}")))
}
