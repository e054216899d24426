//! Test Utilities Module
//!
//! Provides helper fixtures for exercising the bridge without a live
//! viewer. This module is only compiled when running tests.

#![cfg(test)]

use crate::bridge::transport::{Transport, TransportError};
use crate::payload::{ViewerRequest, VolumePayload};
use crate::protocol::{HostMessage, ViewerMessage, VoxelClick};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// A transport that records every delivered message, with optional failure
/// injection for exercising the no-retry error path.
pub struct RecordingTransport {
    deliveries: Mutex<Vec<(String, HostMessage)>>,
    failures_remaining: Mutex<usize>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            deliveries: Mutex::new(Vec::new()),
            failures_remaining: Mutex::new(0),
        })
    }

    /// Make the next `n` deliveries fail with a `TransportError`
    pub fn fail_next_deliveries(&self, n: usize) {
        *self.failures_remaining.lock().unwrap() = n;
    }

    pub fn messages_for(&self, instance_key: &str) -> Vec<HostMessage> {
        self.deliveries
            .lock()
            .unwrap()
            .iter()
            .filter(|(key, _)| key == instance_key)
            .map(|(_, message)| message.clone())
            .collect()
    }

    pub fn message_types(&self, instance_key: &str) -> Vec<&'static str> {
        self.messages_for(instance_key)
            .iter()
            .map(|message| message.message_type())
            .collect()
    }

    /// Uris of `addImage` messages for a key, in delivery order
    pub fn add_image_uris(&self, instance_key: &str) -> Vec<String> {
        self.messages_for(instance_key)
            .into_iter()
            .filter_map(|message| match message {
                HostMessage::AddImage(body) => Some(body.uri),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn deliver(
        &self,
        instance_key: &str,
        message: &HostMessage,
    ) -> Result<(), TransportError> {
        {
            let mut failures = self.failures_remaining.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(TransportError::Delivery("injected failure".to_string()));
            }
        }
        self.deliveries
            .lock()
            .unwrap()
            .push((instance_key.to_string(), message.clone()));
        Ok(())
    }
}

/// A request carrying a 1000-byte zeroed volume under the given display name
pub fn named_volume_request(instance_key: &str, filename: &str) -> ViewerRequest {
    ViewerRequest::new(instance_key).with_volume(VolumePayload::new(vec![0u8; 1000], filename))
}

/// The canonical simulated click from the end-to-end scenarios
pub fn voxel_click_message(filename: &str) -> ViewerMessage {
    ViewerMessage::VoxelClick(VoxelClick {
        voxel: [10, 20, 30],
        mm: [1.0, 2.0, 3.0],
        value: 0.5,
        filename: filename.to_string(),
    })
}
