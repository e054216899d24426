//! Server configuration
//!
//! Configuration is loaded from environment variables.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Public base URL for embed link generation (optional)
    pub public_base_url: Option<String>,

    /// Bridge protocol configuration
    pub bridge: BridgeOptions,

    /// Viewer bundle serving configuration
    pub bundle: BundleConfig,
}

/// Bridge-related configuration
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// How long a render call waits for the viewer's ready signal
    pub ready_timeout: Duration,
    /// Capacity of streaming event subscriber channels
    pub event_buffer: usize,
}

/// Static serving of the embedded viewer's prebuilt bundle
#[derive(Debug, Clone, Default)]
pub struct BundleConfig {
    /// Directory holding the bundle (index.html + assets); serving is
    /// disabled when unset
    pub dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_base_url: None,
            bridge: BridgeOptions::default(),
            bundle: BundleConfig::default(),
        }
    }
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(30),
            event_buffer: 16,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Server config
        if let Ok(host) = env::var("HOST") {
            config.host = host;
        }
        if let Ok(port) = env::var("PORT")
            && let Ok(p) = port.parse()
        {
            config.port = p;
        }
        if let Ok(url) = env::var("PUBLIC_BASE_URL")
            && !url.is_empty()
        {
            config.public_base_url = Some(url);
        }

        // Bridge config
        if let Ok(val) = env::var("READY_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.bridge.ready_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("EVENT_BUFFER_SIZE")
            && let Ok(size) = val.parse()
        {
            config.bridge.event_buffer = size;
        }

        // Bundle config
        if let Ok(dir) = env::var("VIEWER_BUNDLE_DIR")
            && !dir.is_empty()
        {
            config.bundle.dir = Some(PathBuf::from(dir));
        }

        config
    }
}
