//! Request payload types and validation errors

use crate::protocol::{ViewMode, ViewerSettings};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default overlay colormap when none is specified
pub(crate) const DEFAULT_OVERLAY_COLORMAP: &str = "red";
/// Default overlay opacity when none is specified
pub(crate) const DEFAULT_OVERLAY_OPACITY: f32 = 0.5;
/// Default widget height in pixels
pub const DEFAULT_HEIGHT: u32 = 600;

/// Errors raised by pre-transport validation; nothing is sent when one occurs
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("volume bytes must not be empty; omit the volume to render an empty canvas")]
    EmptyVolume,

    #[error("overlay {0}: byte payload is required")]
    MissingOverlayData(usize),

    #[error("overlay {0}: either a name or a fallback filename is required")]
    MissingOverlayName(usize),

    #[error("overlay {index}: opacity {opacity} is outside [0, 1]")]
    OpacityOutOfRange { index: usize, opacity: f32 },

    #[error("height must be a positive number of pixels")]
    ZeroHeight,

    #[error("instance key must not be empty")]
    EmptyInstanceKey,
}

/// Failure to recover raw bytes from a transport encoding
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// The primary volume handed to the encoder.
///
/// The caller owns the bytes; the bridge only ever holds transport-encoded
/// copies since the channel may cross a process boundary.
#[derive(Debug, Clone)]
pub struct VolumePayload {
    /// Raw file bytes, immutable once handed to the encoder
    pub bytes: Bytes,
    /// Short path-free label used for display only
    pub filename: String,
}

impl VolumePayload {
    pub fn new(bytes: impl Into<Bytes>, filename: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
        }
    }
}

/// A secondary volume rendered on top of the primary with its own colormap
/// and opacity. Sequence order determines stacking: later entries render on
/// top.
#[derive(Debug, Clone)]
pub struct OverlaySpec {
    pub bytes: Bytes,
    /// User-supplied display name
    pub name: Option<String>,
    /// Fallback used when no name is given
    pub filename: Option<String>,
    pub colormap: Option<String>,
    pub opacity: Option<f32>,
}

impl OverlaySpec {
    pub fn new(bytes: impl Into<Bytes>, name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            name: Some(name.into()),
            filename: None,
            colormap: None,
            opacity: None,
        }
    }

    pub fn with_colormap(mut self, colormap: impl Into<String>) -> Self {
        self.colormap = Some(colormap.into());
        self
    }

    pub fn with_opacity(mut self, opacity: f32) -> Self {
        self.opacity = Some(opacity);
        self
    }
}

/// One render call against a viewer instance
#[derive(Debug, Clone)]
pub struct ViewerRequest {
    /// Primary volume; `None` renders an empty canvas
    pub volume: Option<VolumePayload>,
    /// Overlays in stacking order
    pub overlays: Vec<OverlaySpec>,
    /// Widget height in pixels
    pub height: u32,
    pub view_mode: ViewMode,
    /// Whether the embed renders the styled viewer shell or a bare canvas
    pub styled: bool,
    pub settings: ViewerSettings,
    /// Identifies this viewer instance within the host session
    pub instance_key: String,
}

impl ViewerRequest {
    /// A request with all defaults and no volume (empty canvas)
    pub fn new(instance_key: impl Into<String>) -> Self {
        Self {
            volume: None,
            overlays: Vec::new(),
            height: DEFAULT_HEIGHT,
            view_mode: ViewMode::default(),
            styled: true,
            settings: ViewerSettings::default(),
            instance_key: instance_key.into(),
        }
    }

    pub fn with_volume(mut self, volume: VolumePayload) -> Self {
        self.volume = Some(volume);
        self
    }

    pub fn with_overlay(mut self, overlay: OverlaySpec) -> Self {
        self.overlays.push(overlay);
        self
    }

    pub fn with_view_mode(mut self, view_mode: ViewMode) -> Self {
        self.view_mode = view_mode;
        self
    }

    pub fn with_settings(mut self, settings: ViewerSettings) -> Self {
        self.settings = settings;
        self
    }
}

/// Transport representation of the primary volume.
///
/// `data` is base64 text; the empty string is the designated "no volume"
/// marker, distinct from a present-but-empty buffer (which fails validation).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportVolume {
    pub data: String,
    pub uri: String,
}

impl TransportVolume {
    /// Whether this is the "render empty canvas" marker
    pub fn is_empty_marker(&self) -> bool {
        self.data.is_empty()
    }
}

/// Transport representation of one overlay layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportOverlay {
    pub data: String,
    pub uri: String,
    pub colormap: String,
    pub opacity: f32,
}

/// A fully validated, transport-encoded render request
#[derive(Debug, Clone)]
pub struct EncodedRequest {
    pub instance_key: String,
    pub settings: ViewerSettings,
    pub view_mode: ViewMode,
    pub volume: TransportVolume,
    pub overlays: Vec<TransportOverlay>,
    pub height: u32,
    pub styled: bool,
}

impl EncodedRequest {
    /// Image slots the canvas must allocate: one for the primary volume plus
    /// one per overlay
    pub fn layer_count(&self) -> u32 {
        1 + self.overlays.len() as u32
    }
}
