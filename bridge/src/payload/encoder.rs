//! Pure transforms from caller-owned bytes to the transport representation.
//!
//! The channel in the reference deployment is text/JSON and cannot carry raw
//! binary, so payloads travel as base64. All validation happens here, before
//! anything touches the transport.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;

use super::types::{
    DEFAULT_OVERLAY_COLORMAP, DEFAULT_OVERLAY_OPACITY, DecodeError, EncodedRequest, OverlaySpec,
    TransportOverlay, TransportVolume, ValidationError, ViewerRequest, VolumePayload,
};

/// Encode the primary volume.
///
/// `None` produces the explicit "no volume" marker (empty data string), which
/// the viewer renders as an empty canvas. A present-but-empty buffer is a
/// caller error, never silently degraded to the marker.
pub fn encode(volume: Option<&VolumePayload>) -> Result<TransportVolume, ValidationError> {
    let Some(volume) = volume else {
        return Ok(TransportVolume {
            data: String::new(),
            uri: String::new(),
        });
    };

    if volume.bytes.is_empty() {
        return Err(ValidationError::EmptyVolume);
    }

    Ok(TransportVolume {
        data: BASE64.encode(&volume.bytes),
        uri: volume.filename.clone(),
    })
}

/// Encode one overlay, applying the colormap/opacity defaults.
///
/// The `index` only labels validation errors so the caller knows which entry
/// to fix.
pub fn encode_overlay(
    spec: &OverlaySpec,
    index: usize,
) -> Result<TransportOverlay, ValidationError> {
    if spec.bytes.is_empty() {
        return Err(ValidationError::MissingOverlayData(index));
    }

    let uri = spec
        .name
        .as_deref()
        .or(spec.filename.as_deref())
        .filter(|name| !name.is_empty())
        .ok_or(ValidationError::MissingOverlayName(index))?
        .to_string();

    let opacity = spec.opacity.unwrap_or(DEFAULT_OVERLAY_OPACITY);
    if !(0.0..=1.0).contains(&opacity) {
        return Err(ValidationError::OpacityOutOfRange { index, opacity });
    }

    Ok(TransportOverlay {
        data: BASE64.encode(&spec.bytes),
        uri,
        colormap: spec
            .colormap
            .clone()
            .unwrap_or_else(|| DEFAULT_OVERLAY_COLORMAP.to_string()),
        opacity,
    })
}

/// Validate and encode a whole render request
pub fn encode_request(request: &ViewerRequest) -> Result<EncodedRequest, ValidationError> {
    if request.instance_key.is_empty() {
        return Err(ValidationError::EmptyInstanceKey);
    }
    if request.height == 0 {
        return Err(ValidationError::ZeroHeight);
    }

    let volume = encode(request.volume.as_ref())?;
    let overlays = request
        .overlays
        .iter()
        .enumerate()
        .map(|(index, spec)| encode_overlay(spec, index))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(EncodedRequest {
        instance_key: request.instance_key.clone(),
        settings: request.settings,
        view_mode: request.view_mode,
        volume,
        overlays,
        height: request.height,
        styled: request.styled,
    })
}

/// Recover raw bytes from a transport encoding (the viewer-side inverse)
pub fn decode(data: &str) -> Result<Vec<u8>, DecodeError> {
    Ok(BASE64.decode(data)?)
}
