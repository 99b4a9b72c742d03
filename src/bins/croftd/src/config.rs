//! Daemon configuration.
//!
//! All of it is read once at startup (YAML file plus command-line
//! overrides) and is immutable afterwards.

use serde::Deserialize;

/// Complete daemon configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub http: HttpConfig,
    pub hss: HssConfig,
    pub cache: CacheConfig,
    pub schemes: SchemeConfig,
    pub diameter: DiameterConfig,
}

/// HTTP ingress settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpConfig {
    /// Bind address
    pub addr: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8888".to_string(),
        }
    }
}

/// HSS settings. When `enabled` is false the daemon is the master copy of
/// its subscriber data and never talks Diameter.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HssConfig {
    pub enabled: bool,
    /// Diameter peer address
    pub addr: String,
    pub dest_realm: String,
    pub dest_host: String,
    /// S-CSCF name placed in MAR/SAR Server-Name
    pub server_name: String,
    /// Half the cache lifetime of HSS-sourced data, in seconds. Records are
    /// written with twice this TTL and refreshed against the HSS once the
    /// remaining TTL drops below it.
    pub reregistration_time: u32,
    /// Deadline for one Diameter exchange, in milliseconds
    pub timeout_ms: u64,
}

impl Default for HssConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "127.0.0.1:3868".to_string(),
            dest_realm: "example.com".to_string(),
            dest_host: "hss.example.com".to_string(),
            server_name: "sip:scscf.example.com".to_string(),
            reregistration_time: 1800,
            timeout_ms: 200,
        }
    }
}

/// Cache behaviour knobs
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// TTL in seconds for opportunistic private-to-public identity caching
    /// after a successful digest fetch; 0 disables the write
    pub impu_cache_ttl: u32,
    /// Consult the cache for authentication vectors before the HSS
    pub query_cache_av: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            impu_cache_ttl: 0,
            query_cache_av: false,
        }
    }
}

/// Wire names of the authentication schemes
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchemeConfig {
    pub digest: String,
    pub aka: String,
    pub unknown: String,
}

impl Default for SchemeConfig {
    fn default() -> Self {
        Self {
            digest: "SIP Digest".to_string(),
            aka: "Digest-AKAv1-MD5".to_string(),
            unknown: "Unknown".to_string(),
        }
    }
}

/// Local Diameter identity
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiameterConfig {
    pub origin_host: String,
    pub origin_realm: String,
}

impl Default for DiameterConfig {
    fn default() -> Self {
        Self {
            origin_host: "croft.example.com".to_string(),
            origin_realm: "example.com".to_string(),
        }
    }
}

impl Config {
    /// Parse a YAML configuration document
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}
