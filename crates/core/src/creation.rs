//! Creation Requests
//!
//! `RawCreation` is the JSON body accepted by the API. It is normalized into a
//! `CreationRequest` where blank values are gone and the proxy is either
//! complete or absent.

use std::path::PathBuf;
use serde::{Deserialize, Serialize};

/// Global HTTP proxy pushed into Android settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    pub host: String,
    pub port: u16,
    /// Comma separated, e.g. ".example.com,.example.org"
    pub exclusions: Option<String>,
}

/// Everything needed to build a new instance from a template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationRequest {
    pub name: String,
    /// Instance to copy from
    pub source_index: i32,
    pub run_after_create: bool,
    pub apk_paths: Vec<PathBuf>,
    pub cert_paths: Vec<PathBuf>,
    pub proxy: Option<ProxySettings>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

impl CreationRequest {
    /// Minimal request: copy `source_index` under `name`, leave it stopped
    pub fn new(name: &str, source_index: i32) -> Self {
        Self {
            name: name.to_string(),
            source_index,
            run_after_create: false,
            apk_paths: Vec::new(),
            cert_paths: Vec::new(),
            proxy: None,
            manufacturer: None,
            model: None,
        }
    }

    pub fn run_after_create(mut self, run: bool) -> Self {
        self.run_after_create = run;
        self
    }

    pub fn with_apk(mut self, path: impl Into<PathBuf>) -> Self {
        self.apk_paths.push(path.into());
        self
    }

    pub fn with_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.cert_paths.push(path.into());
        self
    }

    pub fn with_proxy(mut self, proxy: ProxySettings) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_device(mut self, manufacturer: Option<&str>, model: Option<&str>) -> Self {
        self.manufacturer = non_blank(manufacturer.map(str::to_string));
        self.model = non_blank(model.map(str::to_string));
        self
    }

    /// Whether a modify step is needed
    pub fn has_device_overrides(&self) -> bool {
        self.manufacturer.is_some() || self.model.is_some()
    }
}

/// Creation body as posted by clients
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCreation {
    pub name: String,
    pub from_index: Option<i32>,
    pub run_after_create: bool,
    pub install_apk_paths: Option<Vec<String>>,
    pub install_cert_paths: Option<Vec<String>>,
    pub http_proxy_host: Option<String>,
    pub http_proxy_port: Option<u16>,
    pub http_proxy_exclusion_list: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
}

impl From<RawCreation> for CreationRequest {
    fn from(raw: RawCreation) -> Self {
        let proxy = match (non_blank(raw.http_proxy_host), raw.http_proxy_port) {
            (Some(host), Some(port)) => Some(ProxySettings {
                host,
                port,
                exclusions: non_blank(raw.http_proxy_exclusion_list),
            }),
            _ => None,
        };

        Self {
            name: raw.name,
            // index 0 is the stock instance every LDPlayer install ships with
            source_index: raw.from_index.unwrap_or(0),
            run_after_create: raw.run_after_create,
            apk_paths: paths(raw.install_apk_paths),
            cert_paths: paths(raw.install_cert_paths),
            proxy,
            manufacturer: non_blank(raw.manufacturer),
            model: non_blank(raw.model),
        }
    }
}

fn paths(raw: Option<Vec<String>>) -> Vec<PathBuf> {
    raw.unwrap_or_default()
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .collect()
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
