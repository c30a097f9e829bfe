// src/reports/mod.rs — Report/Export Bridge
//
// Two retrieval modes against the report collaborator:
//   (a) direct spreadsheet blob from the webhook endpoint
//   (b) JSON row data plus a separately hosted CSV URL from the API

use serde::Deserialize;

use crate::core::types::{CsvRef, ProductRow};
use crate::infra::errors::VendoraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportKind {
    NearlyExpired,
    Recalled,
    HighQuality,
}

impl ReportKind {
    pub fn label(&self) -> &'static str {
        match self {
            ReportKind::NearlyExpired => "nearly expired products",
            ReportKind::Recalled => "recalled products",
            ReportKind::HighQuality => "high quality products",
        }
    }

    fn webhook_path(&self) -> &'static str {
        match self {
            ReportKind::NearlyExpired => "/reports/nearly-expired-products",
            ReportKind::Recalled => "/reports/recalled-products",
            ReportKind::HighQuality => "/reports/high-quality-products",
        }
    }

    fn api_path(&self) -> &'static str {
        match self {
            ReportKind::NearlyExpired => "/products/nearly-expired",
            ReportKind::Recalled => "/products/recalled",
            ReportKind::HighQuality => "/products/high-quality",
        }
    }

    pub fn default_csv_filename(&self) -> &'static str {
        match self {
            ReportKind::NearlyExpired => "nearly-expired-products.csv",
            ReportKind::Recalled => "recalled-products.csv",
            ReportKind::HighQuality => "high-quality-products.csv",
        }
    }
}

/// Kind-specific report parameters. Unset fields fall back to the
/// collaborator defaults (3-month window, quality threshold 3.0 on the
/// API, 2.0 on the spreadsheet webhook).
#[derive(Debug, Clone, Default)]
pub struct ReportParams {
    pub vendor_id: Option<u64>,
    pub months: Option<u32>,
    pub min_quality: Option<f64>,
    pub limit: Option<u32>,
    pub skip: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportApiWire {
    #[serde(default)]
    data: ReportApiData,
}

#[derive(Debug, Default, Deserialize)]
struct ReportApiData {
    #[serde(default)]
    products: Vec<ProductRow>,
    #[serde(default)]
    csv_url: Option<String>,
}

pub struct ReportClient {
    client: reqwest::Client,
    webhook_base: String,
    api_base: String,
    bearer_token: Option<String>,
}

impl ReportClient {
    pub fn new(webhook_base: String, api_base: String, bearer_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_base: webhook_base.trim_end_matches('/').to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            bearer_token,
        }
    }

    fn transport(e: reqwest::Error) -> VendoraError {
        VendoraError::Report {
            message: e.to_string(),
            empty: false,
        }
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, VendoraError> {
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(VendoraError::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VendoraError::Report {
                message: format!("HTTP {status}: {body}"),
                empty: false,
            });
        }
        Ok(response)
    }

    fn api_body(&self, kind: ReportKind, params: &ReportParams, download_csv: bool) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        match kind {
            ReportKind::NearlyExpired => {
                body.insert("months".into(), params.months.unwrap_or(3).into());
                body.insert("limit".into(), params.limit.unwrap_or(50).into());
                body.insert("skip".into(), params.skip.unwrap_or(0).into());
            }
            ReportKind::Recalled => {}
            ReportKind::HighQuality => {
                body.insert(
                    "min_quality".into(),
                    params.min_quality.unwrap_or(3.0).into(),
                );
                if let Some(limit) = params.limit {
                    body.insert("limit".into(), limit.into());
                }
            }
        }
        if let Some(vendor_id) = params.vendor_id {
            body.insert("vendor_id".into(), vendor_id.into());
        }
        if download_csv {
            body.insert("download_csv".into(), true.into());
        }
        serde_json::Value::Object(body)
    }

    async fn api_call(
        &self,
        kind: ReportKind,
        params: &ReportParams,
        download_csv: bool,
    ) -> Result<ReportApiData, VendoraError> {
        let mut request = self
            .client
            .post(format!("{}{}", self.api_base, kind.api_path()))
            .json(&self.api_body(kind, params, download_csv));
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(Self::transport)?;
        let wire: ReportApiWire = Self::check(response)
            .await?
            .json()
            .await
            .map_err(Self::transport)?;
        Ok(wire.data)
    }

    /// Mode (b), rows only: JSON row data for inline previews.
    pub async fn fetch_products(
        &self,
        kind: ReportKind,
        params: &ReportParams,
    ) -> Result<Vec<ProductRow>, VendoraError> {
        Ok(self.api_call(kind, params, false).await?.products)
    }

    /// Mode (b), export: JSON response carrying a hosted CSV URL. A missing
    /// URL is the distinct "no matching products" outcome, not a transport
    /// failure.
    pub async fn fetch_csv_url(
        &self,
        kind: ReportKind,
        params: &ReportParams,
    ) -> Result<CsvRef, VendoraError> {
        let data = self.api_call(kind, params, true).await?;
        match data.csv_url {
            Some(url) => {
                let filename = csv_filename_from_url(&url)
                    .unwrap_or_else(|| kind.default_csv_filename().to_string());
                Ok(CsvRef { url, filename })
            }
            None => Err(VendoraError::Report {
                message: format!("No {} found. Please try again later.", kind.label()),
                empty: true,
            }),
        }
    }

    /// Mode (a): the spreadsheet blob, for immediate save-to-disk. Returns
    /// the raw bytes and the filename announced by Content-Disposition
    /// (falling back to `report.xlsx`).
    pub async fn fetch_spreadsheet(
        &self,
        kind: ReportKind,
        params: &ReportParams,
    ) -> Result<(Vec<u8>, String), VendoraError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        match kind {
            ReportKind::NearlyExpired => {
                query.push(("months", params.months.unwrap_or(3).to_string()));
            }
            ReportKind::Recalled => {}
            ReportKind::HighQuality => {
                query.push(("min_score", params.min_quality.unwrap_or(2.0).to_string()));
            }
        }

        let mut request = self
            .client
            .get(format!("{}{}", self.webhook_base, kind.webhook_path()))
            .query(&query)
            .header(
                reqwest::header::ACCEPT,
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            );
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = Self::check(request.send().await.map_err(Self::transport)?).await?;

        let filename = response
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(filename_from_disposition)
            .unwrap_or_else(|| "report.xlsx".to_string());

        let bytes = response.bytes().await.map_err(Self::transport)?.to_vec();
        if bytes.is_empty() {
            return Err(VendoraError::Report {
                message: format!("No {} found. Please try again later.", kind.label()),
                empty: true,
            });
        }
        Ok((bytes, filename))
    }
}

/// Recover a filename from a Content-Disposition header: RFC 5987
/// `filename*=UTF-8''…` takes precedence over a plain `filename=`.
pub fn filename_from_disposition(value: &str) -> Option<String> {
    for part in value.split(';').map(str::trim) {
        if let Some(encoded) = part.strip_prefix("filename*=UTF-8''") {
            return Some(percent_decode(encoded));
        }
    }
    for part in value.split(';').map(str::trim) {
        if let Some(name) = part.strip_prefix("filename=") {
            return Some(name.trim_matches('"').to_string());
        }
    }
    None
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).expect("ascii hex");
            if let Ok(byte) = u8::from_str_radix(hex, 16) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Derive a filename from a hosted CSV URL when its path ends in `.csv`.
pub fn csv_filename_from_url(raw: &str) -> Option<String> {
    let parsed = url::Url::parse(raw).ok()?;
    let last = parsed.path_segments()?.next_back()?.to_string();
    if last.ends_with(".csv") {
        Some(last)
    } else {
        None
    }
}
