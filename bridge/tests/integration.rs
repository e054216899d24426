//! Integration Tests for the NiiVue Bridge Server
//!
//! These tests drive the full WebSocket + HTTP surface with a fake embedded
//! viewer on one side and a reqwest host on the other, verifying the system
//! as a whole rather than individual units.

use niivue_bridge::BridgeConfig;
use serde_json::{Value, json};
use std::time::Duration;

mod common;
use common::*;

// ============================================================================
// HTTP Route Integration Tests
// ============================================================================

mod http_routes {
    use super::*;

    #[tokio::test]
    async fn test_health_endpoint_returns_ok() {
        let server = spawn_test_server().await;

        let response = reqwest::get(server.http("/health")).await.unwrap();
        assert_eq!(response.status(), 200);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert!(body["version"].is_string());
    }

    #[tokio::test]
    async fn test_status_of_unknown_instance_is_404() {
        let server = spawn_test_server().await;

        let response = reqwest::get(server.http("/api/viewer/nothing/status"))
            .await
            .unwrap();
        assert_eq!(response.status(), 404);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "unknown_instance");
    }

    #[tokio::test]
    async fn test_delete_unknown_instance_is_404() {
        let server = spawn_test_server().await;
        let client = reqwest::Client::new();

        let response = client
            .delete(server.http("/api/viewer/nothing"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    }

    #[tokio::test]
    async fn test_render_rejects_invalid_overlay() {
        let server = spawn_test_server().await;
        let client = reqwest::Client::new();

        // overlay without any usable name fails validation before transport
        let response = client
            .post(server.http("/api/viewer/demo/render"))
            .json(&json!({
                "volume": b64(&[0u8; 16]),
                "filename": "t1.nii",
                "overlays": [{"data": b64(&[1u8; 4])}],
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 400);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "validation");
    }
}

// ============================================================================
// End-to-End Viewer Flow Tests
// ============================================================================

mod viewer_flow {
    use super::*;

    #[tokio::test]
    async fn test_end_to_end_axial_scenario() {
        let server = spawn_test_server().await;
        let client = reqwest::Client::new();

        let mut viewer = FakeViewer::connect(&server, "demo").await;
        viewer.send_ready().await;

        let response = client
            .post(server.http("/api/viewer/demo/render"))
            .json(&json!({
                "volume": b64(&[0u8; 1000]),
                "filename": "test.nii",
                "view_mode": "axial",
                "height": 600,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["outcome"], "delivered");
        assert_eq!(body["generation"], 1);

        // the load sequence arrives strictly ordered
        let messages = viewer.next_messages(3).await;
        assert_eq!(messages[0]["type"], "initSettings");
        assert_eq!(messages[0]["body"]["sliceType"], "axial");
        assert_eq!(messages[0]["body"]["showCrosshairs"], true);
        assert_eq!(messages[1]["type"], "initCanvas");
        assert_eq!(messages[1]["body"]["n"], 1);
        assert_eq!(messages[2]["type"], "addImage");
        assert_eq!(messages[2]["body"]["uri"], "test.nii");
        {
            use base64::Engine as _;
            let data = messages[2]["body"]["data"].as_str().unwrap();
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(data)
                .unwrap();
            assert_eq!(bytes, vec![0u8; 1000]);
        }

        // no click event until one is injected
        let response = reqwest::get(server.http("/api/viewer/demo/event"))
            .await
            .unwrap();
        assert_eq!(response.json::<Value>().await.unwrap(), Value::Null);

        viewer
            .send_voxel_click([10, 20, 30], [1.0, 2.0, 3.0], 0.5, "test.nii")
            .await;

        let event: Value = reqwest::get(server.http("/api/viewer/demo/event?wait_ms=2000"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(event["type"], "voxel_click");
        assert_eq!(event["voxel"], json!([10, 20, 30]));
        assert_eq!(event["mm"], json!([1.0, 2.0, 3.0]));
        assert_eq!(event["value"], 0.5);
        assert_eq!(event["filename"], "test.nii");

        // consumed at most once
        let response = reqwest::get(server.http("/api/viewer/demo/event"))
            .await
            .unwrap();
        assert_eq!(response.json::<Value>().await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_two_overlay_scenario() {
        let server = spawn_test_server().await;
        let client = reqwest::Client::new();

        let mut viewer = FakeViewer::connect(&server, "overlaid").await;
        viewer.send_ready().await;

        let response = client
            .post(server.http("/api/viewer/overlaid/render"))
            .json(&json!({
                "volume": b64(&[7u8; 64]),
                "filename": "base.nii",
                "overlays": [
                    {"data": b64(&[1u8; 8]), "name": "red.nii", "colormap": "red", "opacity": 0.5},
                    {"data": b64(&[2u8; 8]), "name": "blue.nii", "colormap": "blue", "opacity": 0.3},
                ],
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);

        let messages = viewer.next_messages(5).await;
        assert_eq!(messages[1]["type"], "initCanvas");
        assert_eq!(messages[1]["body"]["n"], 3);

        // base first, then overlays in stacking order
        assert_eq!(messages[2]["body"]["uri"], "base.nii");
        assert!(messages[2]["body"].get("colormap").is_none());
        assert_eq!(messages[3]["body"]["uri"], "red.nii");
        assert_eq!(messages[3]["body"]["colormap"], "red");
        assert_eq!(messages[3]["body"]["opacity"], 0.5);
        assert_eq!(messages[4]["body"]["uri"], "blue.nii");
        assert_eq!(messages[4]["body"]["colormap"], "blue");
        assert_eq!(messages[4]["body"]["opacity"], 0.3);
    }

    #[tokio::test]
    async fn test_pre_ready_request_buffers_until_ready() {
        let server = spawn_test_server().await;
        let client = reqwest::Client::new();

        // viewer connects but its runtime is still constructing
        let mut viewer = FakeViewer::connect(&server, "slow").await;

        let render = {
            let client = client.clone();
            let url = server.http("/api/viewer/slow/render");
            tokio::spawn(async move {
                client
                    .post(url)
                    .json(&json!({"volume": b64(&[0u8; 32]), "filename": "t1.nii"}))
                    .send()
                    .await
                    .unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        let status: Value = reqwest::get(server.http("/api/viewer/slow/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["phase"], "awaiting_ready");
        assert_eq!(status["latest_generation"], 1);
        assert_eq!(status["loaded_generation"], 0);
        assert_eq!(status["connected"], true);

        viewer.send_ready().await;

        let response = render.await.unwrap();
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["outcome"], "delivered");

        let messages = viewer.next_messages(3).await;
        assert_eq!(messages[2]["body"]["uri"], "t1.nii");

        let status: Value = reqwest::get(server.http("/api/viewer/slow/status"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["phase"], "ready");
        assert_eq!(status["loaded_generation"], 1);
    }

    #[tokio::test]
    async fn test_render_times_out_without_viewer() {
        let server = spawn_test_server_with(BridgeConfig {
            ready_timeout: Duration::from_millis(200),
            ..BridgeConfig::default()
        })
        .await;
        let client = reqwest::Client::new();

        let response = client
            .post(server.http("/api/viewer/hung/render"))
            .json(&json!({"volume": b64(&[0u8; 8]), "filename": "t1.nii"}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 504);

        let body: Value = response.json().await.unwrap();
        assert_eq!(body["code"], "initialization_timeout");
    }

    #[tokio::test]
    async fn test_stale_click_rejected_after_new_render() {
        let server = spawn_test_server().await;
        let client = reqwest::Client::new();

        let mut viewer = FakeViewer::connect(&server, "demo").await;
        viewer.send_ready().await;

        client
            .post(server.http("/api/viewer/demo/render"))
            .json(&json!({"volume": b64(&[0u8; 16]), "filename": "old.nii"}))
            .send()
            .await
            .unwrap();
        viewer.next_messages(3).await;

        // click lands against the old volume but is never consumed...
        viewer
            .send_voxel_click([1, 2, 3], [0.1, 0.2, 0.3], 9.0, "old.nii")
            .await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        // ...before the host renders a different volume under the same key
        client
            .post(server.http("/api/viewer/demo/render"))
            .json(&json!({"volume": b64(&[0u8; 16]), "filename": "new.nii"}))
            .send()
            .await
            .unwrap();
        viewer.next_messages(3).await;

        // the stale click must not surface as the new render's result
        let response = reqwest::get(server.http("/api/viewer/demo/event"))
            .await
            .unwrap();
        assert_eq!(response.json::<Value>().await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_viewer_reconnect_replays_last_request() {
        let server = spawn_test_server().await;
        let client = reqwest::Client::new();

        let mut viewer = FakeViewer::connect(&server, "demo").await;
        viewer.send_ready().await;

        client
            .post(server.http("/api/viewer/demo/render"))
            .json(&json!({"volume": b64(&[3u8; 24]), "filename": "t1.nii"}))
            .send()
            .await
            .unwrap();
        viewer.next_messages(3).await;

        // the embed reloads: connection drops, a fresh runtime reconnects
        drop(viewer);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut viewer = FakeViewer::connect(&server, "demo").await;
        viewer.send_ready().await;

        let messages = viewer.next_messages(3).await;
        assert_eq!(messages[0]["type"], "initSettings");
        assert_eq!(messages[2]["body"]["uri"], "t1.nii");
    }
}
