//! Flat-file bar provider.
//!
//! Reads one daily CSV per ticker, either from an S3-compatible object
//! store (path-style `{endpoint}/{bucket}/{key}`, requests signed with
//! SigV4) or from a local directory mirroring the same key layout.
//!
//! Expected columns: `timestamp,open,high,low,close,volume`. Header
//! matching is case-insensitive and `date`/`datetime` are accepted for the
//! timestamp. A file without a volume column scores as neutral volume.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{Client, Request, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::BarProvider;
use crate::config::{AppConfig, FlatFileConfig};
use crate::types::{Bar, DataError, DataOrigin, Quote};

const PROVIDER: &str = "flat_file";

type HmacSha256 = Hmac<Sha256>;

const SIGV4_ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

#[derive(Debug, Clone)]
pub enum FlatFileLocation {
    Remote { endpoint: String, bucket: String },
    Local(PathBuf),
}

/// Object-store key pair and signing region.
pub struct S3Credentials {
    pub access_key: String,
    pub secret_key: SecretString,
    pub region: String,
}

impl S3Credentials {
    pub fn new(access_key: &str, secret_key: &str, region: &str) -> Self {
        Self {
            access_key: access_key.to_string(),
            secret_key: SecretString::new(secret_key.to_string()),
            region: region.to_string(),
        }
    }

    /// Derive the SigV4 signing key for one day, region and service.
    pub fn signing_key(&self, date: &str, service: &str) -> Result<Vec<u8>> {
        let secret = format!("AWS4{}", self.secret_key.expose_secret());
        let k_date = hmac_sha256(secret.as_bytes(), date.as_bytes())?;
        let k_region = hmac_sha256(&k_date, self.region.as_bytes())?;
        let k_service = hmac_sha256(&k_region, service.as_bytes())?;
        hmac_sha256(&k_service, b"aws4_request")
    }
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| anyhow::anyhow!("HMAC error: {e}"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Host header value, with the port when it isn't the scheme default.
fn host_header(url: &Url) -> Result<String> {
    let host = url.host_str().context("object-store URL has no host")?;
    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

pub struct FlatFileProvider {
    http: Client,
    location: FlatFileLocation,
    key_template: String,
    credentials: Option<S3Credentials>,
}

impl FlatFileProvider {
    pub fn new(
        location: FlatFileLocation,
        key_template: &str,
        credentials: Option<S3Credentials>,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .user_agent("OMNISCIENT/0.1.0")
            .build()
            .context("Failed to build flat-file HTTP client")?;
        Ok(Self {
            http,
            location,
            key_template: key_template.to_string(),
            credentials,
        })
    }

    /// Build from config. A remote store needs both keys; they are read
    /// from the env vars the config names.
    pub fn from_config(cfg: &FlatFileConfig) -> Result<Self> {
        if let Some(dir) = &cfg.local_dir {
            return Self::new(FlatFileLocation::Local(dir.clone()), &cfg.key_template, None);
        }

        let (Some(access_env), Some(secret_env)) = (&cfg.access_key_env, &cfg.secret_key_env) else {
            bail!("flat-file store at {} has no credential env vars configured", cfg.endpoint);
        };
        let access = AppConfig::resolve_env(access_env)?;
        let secret = AppConfig::resolve_env(secret_env)?;

        let location = FlatFileLocation::Remote {
            endpoint: cfg.endpoint.clone(),
            bucket: cfg.bucket.clone(),
        };
        let credentials = S3Credentials::new(&access, &secret, &cfg.region);
        Self::new(location, &cfg.key_template, Some(credentials))
    }

    /// Object key for a ticker.
    pub fn key_for(&self, ticker: &str) -> String {
        let ticker = urlencoding::encode(&ticker.to_uppercase()).into_owned();
        self.key_template.replace("{ticker}", &ticker)
    }

    /// GET for one object, SigV4-signed when credentials are set.
    fn object_request(
        &self,
        endpoint: &str,
        bucket: &str,
        key: &str,
        now: DateTime<Utc>,
    ) -> Result<Request> {
        let url = Url::parse(&format!("{}/{}/{}", endpoint.trim_end_matches('/'), bucket, key))
            .with_context(|| format!("Invalid object-store URL for {key}"))?;

        let Some(creds) = &self.credentials else {
            return Ok(self.http.get(url).build()?);
        };

        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();
        let host = host_header(&url)?;
        let payload_hash = hex::encode(Sha256::digest(b""));

        let canonical_request = format!(
            "GET\n{path}\n{query}\nhost:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{payload_hash}",
            path = url.path(),
            query = url.query().unwrap_or(""),
        );
        let scope = format!("{date}/{}/s3/aws4_request", creds.region);
        let string_to_sign = format!(
            "{SIGV4_ALGORITHM}\n{amz_date}\n{scope}\n{}",
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );
        let signing_key = creds.signing_key(&date, "s3")?;
        let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())?);

        let authorization = format!(
            "{SIGV4_ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            creds.access_key
        );

        Ok(self
            .http
            .get(url)
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hash)
            .header(reqwest::header::AUTHORIZATION, authorization)
            .build()?)
    }

    async fn read_remote(&self, endpoint: &str, bucket: &str, key: &str) -> Result<String, DataError> {
        let request = self
            .object_request(endpoint, bucket, key, Utc::now())
            .map_err(|e| DataError::Provider {
                provider: PROVIDER.to_string(),
                message: format!("cannot build request for {key}: {e}"),
            })?;

        let resp = self.http.execute(request).await.map_err(|e| DataError::Provider {
            provider: PROVIDER.to_string(),
            message: format!("request failed for {key}: {e}"),
        })?;

        if !resp.status().is_success() {
            return Err(DataError::Provider {
                provider: PROVIDER.to_string(),
                message: format!("{} for {key}", resp.status()),
            });
        }

        resp.text().await.map_err(|e| DataError::Provider {
            provider: PROVIDER.to_string(),
            message: format!("failed to read body for {key}: {e}"),
        })
    }

    async fn read_local(&self, dir: &Path, key: &str) -> Result<String, DataError> {
        let path = dir.join(key);
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| DataError::Provider {
                provider: PROVIDER.to_string(),
                message: format!("cannot read {}: {e}", path.display()),
            })
    }
}

#[async_trait]
impl BarProvider for FlatFileProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    fn origin(&self) -> DataOrigin {
        DataOrigin::FlatFile
    }

    fn is_remote(&self) -> bool {
        matches!(self.location, FlatFileLocation::Remote { .. })
    }

    async fn fetch_bars(&self, ticker: &str) -> Result<Vec<Bar>, DataError> {
        let key = self.key_for(ticker);
        let text = match &self.location {
            FlatFileLocation::Remote { endpoint, bucket } => {
                self.read_remote(endpoint, bucket, &key).await?
            }
            FlatFileLocation::Local(dir) => self.read_local(dir, &key).await?,
        };
        parse_csv(&text)
    }

    async fn fetch_quote(&self, ticker: &str) -> Result<Quote, DataError> {
        let bars = self.fetch_bars(ticker).await?;
        let last = bars
            .iter()
            .max_by_key(|b| b.timestamp)
            .ok_or_else(|| DataError::Provider {
                provider: PROVIDER.to_string(),
                message: format!("no rows for {ticker}"),
            })?;
        Ok(Quote {
            ticker: ticker.to_uppercase(),
            price: last.close,
            volume: last.volume,
            timestamp: last.timestamp,
            source: DataOrigin::FlatFile,
        })
    }
}

// ---------------------------------------------------------------------------
// CSV parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FlatFileRow {
    #[serde(alias = "date", alias = "datetime")]
    timestamp: String,
    #[serde(default)]
    open: Option<f64>,
    #[serde(default)]
    high: Option<f64>,
    #[serde(default)]
    low: Option<f64>,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DD` or epoch millis.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d.and_time(chrono::NaiveTime::default()).and_utc());
    }
    raw.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)
}

/// Parse a daily CSV into bars. Rows with unreadable timestamps are dropped.
pub fn parse_csv(text: &str) -> Result<Vec<Bar>, DataError> {
    let parse_err = |message: String| DataError::Parse {
        provider: PROVIDER.to_string(),
        message,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers: csv::StringRecord = reader
        .headers()
        .map_err(|e| parse_err(e.to_string()))?
        .iter()
        .map(|h| h.to_lowercase())
        .collect();
    reader.set_headers(headers);

    let mut bars = Vec::new();
    let mut dropped = 0usize;
    for row in reader.deserialize::<FlatFileRow>() {
        let row = row.map_err(|e| parse_err(e.to_string()))?;
        let Some(timestamp) = parse_timestamp(&row.timestamp) else {
            dropped += 1;
            continue;
        };
        let close = row.close;
        bars.push(Bar {
            timestamp,
            open: row.open.unwrap_or(close),
            high: row.high.unwrap_or(close),
            low: row.low.unwrap_or(close),
            close,
            volume: row.volume.unwrap_or(0.0),
        });
    }

    if dropped > 0 {
        debug!(dropped, kept = bars.len(), "Dropped flat-file rows with bad timestamps");
    }
    Ok(bars)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    fn temp_dir() -> PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("omniscient_flat_{}", uuid::Uuid::new_v4()));
        p
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let d = parse_timestamp("2025-02-03").unwrap();
        assert_eq!((d.year(), d.month(), d.day(), d.hour()), (2025, 2, 3, 0));

        let d = parse_timestamp("2025-02-03 15:30:00").unwrap();
        assert_eq!(d.hour(), 15);

        let d = parse_timestamp("2025-02-03T10:00:00-05:00").unwrap();
        assert_eq!(d.hour(), 15);

        let d = parse_timestamp("1738540800000").unwrap();
        assert_eq!((d.year(), d.month(), d.day()), (2025, 2, 3));

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_parse_csv_case_insensitive_headers() {
        let text = "Date,Open,High,Low,Close,Volume\n\
                    2025-01-02,10,11,9,10.5,1000\n\
                    2025-01-03,10.5,12,10,11.5,1500\n";
        let bars = parse_csv(text).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].close, 11.5);
        assert_eq!(bars[1].volume, 1500.0);
        assert_eq!(bars[0].high, 11.0);
    }

    #[test]
    fn test_parse_csv_without_volume() {
        let text = "timestamp,close\n2025-01-02,10\n2025-01-03,11\n";
        let bars = parse_csv(text).unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].volume, 0.0);
        assert_eq!(bars[0].open, 10.0);
    }

    #[test]
    fn test_parse_csv_drops_bad_timestamps() {
        let text = "timestamp,close,volume\nnot-a-date,10,1\n2025-01-03,11,1\n";
        let bars = parse_csv(text).unwrap();
        assert_eq!(bars.len(), 1);
    }

    #[test]
    fn test_parse_csv_bad_number_is_error() {
        let text = "timestamp,close\n2025-01-02,abc\n";
        assert!(matches!(parse_csv(text), Err(DataError::Parse { .. })));
    }

    #[test]
    fn test_key_template() {
        let p = FlatFileProvider::new(
            FlatFileLocation::Local(PathBuf::from("/tmp")),
            "stocks/{ticker}/daily.csv",
            None,
        )
        .unwrap();
        assert_eq!(p.key_for("nvda"), "stocks/NVDA/daily.csv");
        assert_eq!(p.key_for("BRK/B"), "stocks/BRK%2FB/daily.csv");
        assert!(!p.is_remote());
    }

    fn signed_provider(secret: &str) -> FlatFileProvider {
        FlatFileProvider::new(
            FlatFileLocation::Remote {
                endpoint: "https://files.example.com/".into(),
                bucket: "flatfiles".into(),
            },
            "stocks/{ticker}/daily.csv",
            Some(S3Credentials::new("AKIDEXAMPLE", secret, "us-east-1")),
        )
        .unwrap()
    }

    fn header<'a>(req: &'a Request, name: &str) -> Option<&'a str> {
        req.headers().get(name).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn test_remote_location_is_remote() {
        let p = signed_provider("secret");
        assert!(p.is_remote());
        assert_eq!(p.origin(), DataOrigin::FlatFile);
    }

    #[test]
    fn test_signing_key_derivation() {
        // Published SigV4 key-derivation example (IAM service).
        let creds = S3Credentials::new(
            "AKIDEXAMPLE",
            "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY",
            "us-east-1",
        );
        let key = creds.signing_key("20120215", "iam").unwrap();
        assert_eq!(
            hex::encode(key),
            "f4780e2d9f65fa895f9c67b32ce1baf0b0d8a43505a000a1a9e090d414db404d"
        );
    }

    #[test]
    fn test_object_request_is_signed() {
        let p = signed_provider("secret");
        let now = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let req = p
            .object_request("https://files.example.com/", "flatfiles", &p.key_for("nvda"), now)
            .unwrap();

        assert_eq!(
            req.url().as_str(),
            "https://files.example.com/flatfiles/stocks/NVDA/daily.csv"
        );
        assert_eq!(header(&req, "x-amz-date"), Some("20250102T030405Z"));
        assert_eq!(
            header(&req, "x-amz-content-sha256"),
            Some("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );

        let auth = header(&req, "authorization").unwrap();
        let prefix = "AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/20250102/us-east-1/s3/aws4_request, \
                      SignedHeaders=host;x-amz-content-sha256;x-amz-date, Signature=";
        assert!(auth.starts_with(prefix), "{auth}");
        let signature = &auth[prefix.len()..];
        assert_eq!(signature.len(), 64);
        assert!(signature.chars().all(|c| c.is_ascii_hexdigit()));

        // Same inputs sign the same; a different secret does not.
        let again = p
            .object_request("https://files.example.com", "flatfiles", "stocks/NVDA/daily.csv", now)
            .unwrap();
        assert_eq!(header(&again, "authorization"), Some(auth));
        let other = signed_provider("other-secret")
            .object_request("https://files.example.com", "flatfiles", "stocks/NVDA/daily.csv", now)
            .unwrap();
        assert_ne!(header(&other, "authorization"), Some(auth));
    }

    #[test]
    fn test_object_request_keeps_custom_port_in_host() {
        let url = Url::parse("http://localhost:9000/flatfiles/a.csv").unwrap();
        assert_eq!(host_header(&url).unwrap(), "localhost:9000");
        let url = Url::parse("https://files.example.com/flatfiles/a.csv").unwrap();
        assert_eq!(host_header(&url).unwrap(), "files.example.com");
    }

    #[test]
    fn test_unsigned_without_credentials() {
        let p = FlatFileProvider::new(
            FlatFileLocation::Remote {
                endpoint: "https://files.example.com".into(),
                bucket: "flatfiles".into(),
            },
            "{ticker}.csv",
            None,
        )
        .unwrap();
        let req = p
            .object_request("https://files.example.com", "flatfiles", "NVDA.csv", Utc::now())
            .unwrap();
        assert!(header(&req, "authorization").is_none());
    }

    #[test]
    fn test_from_config_resolves_keys_from_env() {
        let id = uuid::Uuid::new_v4().simple().to_string().to_uppercase();
        let access_env = format!("OMNISCIENT_TEST_ACCESS_{id}");
        let secret_env = format!("OMNISCIENT_TEST_SECRET_{id}");

        let cfg = FlatFileConfig {
            access_key_env: Some(access_env.clone()),
            secret_key_env: Some(secret_env.clone()),
            region: "eu-west-1".to_string(),
            ..FlatFileConfig::default()
        };

        // Keys not set yet: the remote store can't be used.
        assert!(FlatFileProvider::from_config(&cfg).is_err());

        std::env::set_var(&access_env, "AKIDFROMENV");
        std::env::set_var(&secret_env, "s3cr3t");
        let p = FlatFileProvider::from_config(&cfg).unwrap();
        assert!(p.is_remote());

        let now = Utc.with_ymd_and_hms(2025, 3, 4, 0, 0, 0).unwrap();
        let req = p
            .object_request(&cfg.endpoint, &cfg.bucket, &p.key_for("AAPL"), now)
            .unwrap();
        assert_eq!(
            req.url().as_str(),
            "https://files.massive.com/flatfiles/stocks/AAPL/daily.csv"
        );
        let auth = header(&req, "authorization").unwrap();
        assert!(auth.contains("Credential=AKIDFROMENV/20250304/eu-west-1/s3/aws4_request"));

        std::env::remove_var(&access_env);
        std::env::remove_var(&secret_env);
    }

    #[test]
    fn test_from_config_local_needs_no_keys() {
        let cfg = FlatFileConfig {
            local_dir: Some(PathBuf::from("/tmp/bars")),
            access_key_env: None,
            secret_key_env: None,
            ..FlatFileConfig::default()
        };
        let p = FlatFileProvider::from_config(&cfg).unwrap();
        assert!(!p.is_remote());
    }

    #[tokio::test]
    async fn test_local_fetch_and_quote() {
        let dir = temp_dir();
        std::fs::create_dir_all(dir.join("stocks/AAPL")).unwrap();
        std::fs::write(
            dir.join("stocks/AAPL/daily.csv"),
            "timestamp,open,high,low,close,volume\n\
             2025-01-03,2,2,2,2,20\n\
             2025-01-02,1,1,1,1,10\n",
        )
        .unwrap();

        let p = FlatFileProvider::new(
            FlatFileLocation::Local(dir.clone()),
            "stocks/{ticker}/daily.csv",
            None,
        )
        .unwrap();

        let bars = p.fetch_bars("aapl").await.unwrap();
        assert_eq!(bars.len(), 2);

        let q = p.fetch_quote("aapl").await.unwrap();
        assert_eq!(q.price, 2.0);
        assert_eq!(q.ticker, "AAPL");
        assert_eq!(q.source, DataOrigin::FlatFile);

        assert!(p.fetch_bars("MSFT").await.is_err());

        std::fs::remove_dir_all(dir).unwrap();
    }
}
