//! S3 object storage source and sink

use super::sigv4::{self, AwsCredentials, SigningRequest};
use super::{decode_text, parse_csv, write_csv_bytes, DataSink, DataSource, TextEncoding};
use crate::error::{PipelineError, Result, SourceIoKind};
use chrono::Utc;
use polars::prelude::*;
use reqwest::blocking::Client;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Connection settings for an S3 bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint (e.g. a local MinIO). Uses path-style addressing when set.
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            region: default_region(),
            endpoint: None,
            timeout_secs: 60,
        }
    }
}

fn default_region() -> String {
    std::env::var("AWS_REGION")
        .or_else(|_| std::env::var("AWS_DEFAULT_REGION"))
        .ok()
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| "us-east-1".to_string())
}

impl S3Config {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// `s3://bucket/key` form used in logs and errors
    pub fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key.trim_start_matches('/'))
    }

    /// Resolve the object URL and the host header value used for signing
    pub fn object_url(&self, key: &str) -> Result<(Url, String)> {
        if self.bucket.is_empty() {
            return Err(PipelineError::Config("S3 bucket name is empty".to_string()));
        }
        let encoded_key = sigv4::uri_encode_path(key.trim_start_matches('/'));
        let raw = match &self.endpoint {
            Some(endpoint) => format!(
                "{}/{}/{}",
                endpoint.trim_end_matches('/'),
                self.bucket,
                encoded_key
            ),
            None => format!(
                "https://{}.s3.{}.amazonaws.com/{}",
                self.bucket, self.region, encoded_key
            ),
        };
        let url = Url::parse(&raw)
            .map_err(|e| PipelineError::Config(format!("invalid S3 URL '{}': {}", raw, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| PipelineError::Config(format!("S3 URL '{}' has no host", raw)))?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Ok((url, host))
    }
}

/// Map a failed S3 response onto a source error kind
pub fn classify_s3_failure(status: u16, body: &str) -> SourceIoKind {
    if status == 404 || body.contains("<Code>NoSuchKey</Code>") || body.contains("<Code>NoSuchBucket</Code>") {
        SourceIoKind::NotFound
    } else if status == 403 || body.contains("<Code>AccessDenied</Code>") {
        SourceIoKind::PermissionDenied
    } else {
        SourceIoKind::Service
    }
}

fn error_code(body: &str) -> Option<&str> {
    let start = body.find("<Code>")? + "<Code>".len();
    let end = body[start..].find("</Code>")? + start;
    Some(&body[start..end])
}

/// Minimal blocking S3 client supporting GetObject and PutObject
#[derive(Debug, Clone)]
pub struct S3Client {
    config: S3Config,
    credentials: Option<AwsCredentials>,
    http: Client,
}

impl S3Client {
    /// Build a client using credentials from the environment, if any
    pub fn new(config: S3Config) -> Result<Self> {
        let credentials = AwsCredentials::from_env();
        if credentials.is_none() {
            warn!(bucket = %config.bucket, "No AWS credentials in environment, requests will be unsigned");
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            config,
            credentials,
            http,
        })
    }

    pub fn with_credentials(mut self, credentials: AwsCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn config(&self) -> &S3Config {
        &self.config
    }

    fn send(&self, method: Method, key: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        let location = self.config.location(key);
        let (url, host) = self.config.object_url(key)?;

        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(credentials) = &self.credentials {
            let payload_sha256 = sigv4::sha256_hex(&body);
            let signing = SigningRequest {
                method: method.as_str(),
                host: &host,
                canonical_uri: url.path(),
                payload_sha256: &payload_sha256,
                region: &self.config.region,
            };
            for (name, value) in sigv4::sign_headers(&signing, credentials, Utc::now())? {
                // reqwest derives Host from the URL
                if name != "host" {
                    request = request.header(name, value);
                }
            }
        }
        if !body.is_empty() {
            request = request.body(body);
        }

        debug!(method = %method, location = %location, "Sending S3 request");
        let response = request.send().map_err(|e| {
            error!(location = %location, error = %e, "S3 request failed");
            PipelineError::source_io(SourceIoKind::Transport, &location, e.to_string())
        })?;

        let status = response.status();
        let bytes = response
            .bytes()
            .map_err(|e| PipelineError::source_io(SourceIoKind::Transport, &location, e.to_string()))?;

        if status.is_success() {
            return Ok(bytes.to_vec());
        }

        let text = String::from_utf8_lossy(&bytes);
        let kind = classify_s3_failure(status.as_u16(), &text);
        let message = match error_code(&text) {
            Some(code) => format!("HTTP {} ({})", status.as_u16(), code),
            None => format!("HTTP {}", status.as_u16()),
        };
        error!(location = %location, kind = %kind, status = status.as_u16(), "S3 request rejected");
        Err(PipelineError::source_io(kind, location, message))
    }

    /// Fetch an object's bytes
    pub fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.send(Method::GET, key, Vec::new())
    }

    /// Upload bytes as an object
    pub fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.send(Method::PUT, key, body).map(|_| ())
    }
}

/// Reads CSV objects from an S3 bucket
#[derive(Debug, Clone)]
pub struct S3CsvSource {
    client: S3Client,
    encoding: TextEncoding,
    allow_empty: bool,
}

impl S3CsvSource {
    pub fn new(client: S3Client) -> Self {
        Self {
            client,
            encoding: TextEncoding::Utf8,
            allow_empty: true,
        }
    }

    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn allow_empty(mut self, allow: bool) -> Self {
        self.allow_empty = allow;
        self
    }
}

impl DataSource for S3CsvSource {
    fn read(&self, key: &str) -> Result<DataFrame> {
        let location = self.client.config().location(key);
        info!(location = %location, "Reading data");
        let bytes = self.client.get_object(key)?;
        let text = decode_text(bytes, self.encoding, &location)?;
        let df = parse_csv(text, &location, self.allow_empty)?;
        info!(location = %location, rows = df.height(), cols = df.width(), "Loaded dataset");
        Ok(df)
    }

    fn describe(&self) -> String {
        format!("s3 bucket '{}' ({})", self.client.config().bucket, self.client.config().region)
    }
}

/// Writes CSV objects to an S3 bucket
#[derive(Debug, Clone)]
pub struct S3CsvSink {
    client: S3Client,
}

impl S3CsvSink {
    pub fn new(client: S3Client) -> Self {
        Self { client }
    }
}

impl DataSink for S3CsvSink {
    fn write(&self, df: &mut DataFrame, destination: &str) -> Result<()> {
        let bytes = write_csv_bytes(df)?;
        self.client.put_object(destination, bytes)?;
        info!(location = %self.client.config().location(destination), rows = df.height(), "Saved dataset");
        Ok(())
    }
}
