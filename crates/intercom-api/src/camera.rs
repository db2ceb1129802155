// Camera endpoints

use std::time::Duration;

use bytes::Bytes;
use reqwest::Method;

use crate::client::{DeviceClient, parse_envelope};
use crate::error::Error;
use crate::models::{CameraCapsResult, Resolution};
use crate::stream::{FrameStream, frame_stream};

const SNAPSHOT_PATH: &str = "/api/camera/snapshot";

impl DeviceClient {
    /// Supported JPEG resolutions and video sources.
    ///
    /// `GET /api/camera/caps`
    pub async fn get_camera_caps(&self) -> Result<CameraCapsResult, Error> {
        self.get_json("/api/camera/caps", &[], None).await
    }

    /// Fetch one JPEG frame from the internal camera.
    ///
    /// `GET /api/camera/snapshot?width=&height=&source=internal`
    pub async fn get_snapshot(&self, resolution: Resolution) -> Result<Bytes, Error> {
        let raw = self
            .request(Method::GET, SNAPSHOT_PATH, &snapshot_query(resolution, None), None)
            .await?;

        // Failures come back as a JSON envelope instead of an image.
        if raw.is_json() || !raw.status.is_success() {
            parse_envelope::<serde_json::Value>(SNAPSHOT_PATH, &raw)?;
            return Err(Error::Status {
                status: raw.status.as_u16(),
                path: SNAPSHOT_PATH.to_owned(),
            });
        }
        Ok(raw.body)
    }

    /// Open a multipart MJPEG stream at `fps` frames per second.
    ///
    /// The stream ends with an error if no bytes arrive for `idle_timeout`.
    /// `GET /api/camera/snapshot?width=&height=&source=internal&fps=`
    pub async fn open_snapshot_stream(
        &self,
        resolution: Resolution,
        fps: u32,
        idle_timeout: Duration,
    ) -> Result<FrameStream, Error> {
        let resp = self
            .open(SNAPSHOT_PATH, &snapshot_query(resolution, Some(fps.max(1))))
            .await?;
        frame_stream(resp, idle_timeout)
    }
}

fn snapshot_query(resolution: Resolution, fps: Option<u32>) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("width", resolution.width.to_string()),
        ("height", resolution.height.to_string()),
        ("source", "internal".to_owned()),
    ];
    if let Some(fps) = fps {
        query.push(("fps", fps.to_string()));
    }
    query
}
