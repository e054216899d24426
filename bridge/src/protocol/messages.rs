use serde::{Deserialize, Serialize};

/// Host to viewer messages
///
/// The wire encoding is JSON with an adjacent `type`/`body` pair, matching
/// what the embedded viewer's message listener dispatches on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum HostMessage {
    /// Display settings; must precede any image data so the first frame
    /// already renders with them
    InitSettings(SettingsBody),
    /// Declares how many image slots the canvas allocates
    InitCanvas { n: u32 },
    /// One image layer: the base volume or an overlay
    AddImage(ImageBody),
}

/// Viewer to host messages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "camelCase")]
pub enum ViewerMessage {
    /// Viewer runtime constructed; safe to start the load sequence
    Ready,
    /// User clicked a voxel in a loaded volume
    #[serde(rename = "voxel_click")]
    VoxelClick(VoxelClick),
    /// Free-form diagnostic payload; logged and discarded
    DebugAnswer(serde_json::Value),
    /// Image parse failure reported by the viewer
    Error { message: String },
}

/// Body of the `initSettings` message
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsBody {
    pub show_crosshairs: bool,
    pub radiological_convention: bool,
    pub colorbar: bool,
    pub interpolation: bool,
    /// Initial slice layout for the canvas
    pub slice_type: ViewMode,
}

impl SettingsBody {
    pub fn new(settings: ViewerSettings, view_mode: ViewMode) -> Self {
        Self {
            show_crosshairs: settings.crosshair,
            radiological_convention: settings.radiological,
            colorbar: settings.colorbar,
            interpolation: settings.interpolation,
            slice_type: view_mode,
        }
    }
}

/// Body of an `addImage` message; one per image layer.
///
/// `data` is the base64 transport encoding of the raw file bytes. An empty
/// string is the designated "no volume" marker: the viewer renders an empty
/// canvas instead of treating it as an error. Colormap and opacity are only
/// present on overlay layers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBody {
    pub data: String,
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub colormap: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f32>,
}

/// Voxel click payload, passed through verbatim from the viewer's own
/// coordinate computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoxelClick {
    /// Integer voxel indices [i, j, k]
    pub voxel: [i32; 3],
    /// World coordinates in millimeters
    pub mm: [f64; 3],
    /// Intensity at the clicked voxel
    pub value: f64,
    /// Display label of the clicked volume
    pub filename: String,
}

/// Interaction event delivered to the host, consumed at most once per
/// render cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InteractionEvent {
    VoxelClick(VoxelClick),
}

/// Recognized display settings with their enumerated defaults.
///
/// Unknown keys in a deserialized settings object are ignored, not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerSettings {
    pub crosshair: bool,
    pub radiological: bool,
    pub colorbar: bool,
    pub interpolation: bool,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            crosshair: true,
            radiological: false,
            colorbar: false,
            interpolation: true,
        }
    }
}

/// Canvas view mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    Axial,
    Coronal,
    Sagittal,
    #[serde(rename = "3d")]
    Render,
    #[default]
    Multiplanar,
}

impl HostMessage {
    /// Get the message type name for metrics
    pub fn message_type(&self) -> &'static str {
        match self {
            HostMessage::InitSettings(_) => "init_settings",
            HostMessage::InitCanvas { .. } => "init_canvas",
            HostMessage::AddImage(_) => "add_image",
        }
    }
}

impl ViewerMessage {
    /// Get the message type name for metrics
    pub fn message_type(&self) -> &'static str {
        match self {
            ViewerMessage::Ready => "ready",
            ViewerMessage::VoxelClick(_) => "voxel_click",
            ViewerMessage::DebugAnswer(_) => "debug_answer",
            ViewerMessage::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_init_settings_wire_shape() {
        let msg = HostMessage::InitSettings(SettingsBody::new(
            ViewerSettings::default(),
            ViewMode::Axial,
        ));
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "initSettings",
                "body": {
                    "showCrosshairs": true,
                    "radiologicalConvention": false,
                    "colorbar": false,
                    "interpolation": true,
                    "sliceType": "axial",
                }
            })
        );
    }

    #[test]
    fn test_init_canvas_wire_shape() {
        let msg = HostMessage::InitCanvas { n: 3 };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"type": "initCanvas", "body": {"n": 3}}));
    }

    #[test]
    fn test_add_image_omits_absent_overlay_fields() {
        let msg = HostMessage::AddImage(ImageBody {
            data: "AAAA".to_string(),
            uri: "brain.nii".to_string(),
            colormap: None,
            opacity: None,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({"type": "addImage", "body": {"data": "AAAA", "uri": "brain.nii"}})
        );
    }

    #[test]
    fn test_ready_parses_without_body() {
        let msg: ViewerMessage = serde_json::from_str(r#"{"type":"ready"}"#).unwrap();
        assert!(matches!(msg, ViewerMessage::Ready));
    }

    #[test]
    fn test_voxel_click_round_trip() {
        let text = r#"{
            "type": "voxel_click",
            "body": {
                "voxel": [10, 20, 30],
                "mm": [1.0, 2.0, 3.0],
                "value": 0.5,
                "filename": "test.nii"
            }
        }"#;
        let msg: ViewerMessage = serde_json::from_str(text).unwrap();
        let ViewerMessage::VoxelClick(click) = &msg else {
            panic!("expected voxel_click, got {:?}", msg);
        };
        assert_eq!(click.voxel, [10, 20, 30]);
        assert_eq!(click.mm, [1.0, 2.0, 3.0]);
        assert_eq!(click.value, 0.5);
        assert_eq!(click.filename, "test.nii");

        let round = serde_json::to_string(&msg).unwrap();
        let again: ViewerMessage = serde_json::from_str(&round).unwrap();
        assert_eq!(again.message_type(), "voxel_click");
    }

    #[test]
    fn test_interaction_event_is_flat() {
        let event = InteractionEvent::VoxelClick(VoxelClick {
            voxel: [1, 2, 3],
            mm: [0.5, 1.5, 2.5],
            value: 7.0,
            filename: "t1.nii.gz".to_string(),
        });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "voxel_click");
        assert_eq!(value["voxel"], json!([1, 2, 3]));
        assert_eq!(value["filename"], "t1.nii.gz");
    }

    #[test]
    fn test_settings_defaults() {
        let settings = ViewerSettings::default();
        assert!(settings.crosshair);
        assert!(!settings.radiological);
        assert!(!settings.colorbar);
        assert!(settings.interpolation);
    }

    #[test]
    fn test_settings_ignore_unknown_fields() {
        let settings: ViewerSettings =
            serde_json::from_str(r#"{"crosshair": false, "zoom_drag": true}"#).unwrap();
        assert!(!settings.crosshair);
        assert!(settings.interpolation);
    }

    #[test]
    fn test_view_mode_names() {
        assert_eq!(serde_json::to_value(ViewMode::Render).unwrap(), json!("3d"));
        assert_eq!(
            serde_json::from_value::<ViewMode>(json!("multiplanar")).unwrap(),
            ViewMode::Multiplanar
        );
        assert_eq!(ViewMode::default(), ViewMode::Multiplanar);
    }
}
