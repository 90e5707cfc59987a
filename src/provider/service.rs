use crate::error::{FaceGateError, Result};
use crate::frame::Frame;
use crate::provider::protocol::{Request, Response, MAX_MESSAGE_BYTES};
use crate::provider::{Embedding, FaceProvider, Verification};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Client for an out-of-process embedding service over a Unix socket.
///
/// Messages are length-prefixed bincode. One request is in flight at a time;
/// the connection is serialized behind a mutex and re-established on demand,
/// so a service restart costs one failed call, not a dead client.
pub struct ServiceProvider {
    socket_path: PathBuf,
    connect_retries: u32,
    model_id: String,
    conn: Mutex<Option<UnixStream>>,
}

impl ServiceProvider {
    /// Connect and perform the model-id handshake. The id tags every
    /// embedding this provider produces.
    pub fn connect(socket_path: &Path, connect_retries: u32) -> Result<Self> {
        let mut provider = Self {
            socket_path: socket_path.to_path_buf(),
            connect_retries,
            model_id: String::new(),
            conn: Mutex::new(None),
        };
        match provider.call(&Request::ModelInfo)? {
            Response::ModelInfo {
                model_id,
                dimensions,
            } => {
                tracing::info!(
                    "Connected to embedding provider {} ({} dimensions)",
                    model_id,
                    dimensions
                );
                provider.model_id = model_id;
                Ok(provider)
            }
            other => Err(unexpected(other)),
        }
    }

    fn connect_with_retry(&self) -> Result<UnixStream> {
        let mut last_err = None;
        for attempt in 0..self.connect_retries.max(1) {
            match UnixStream::connect(&self.socket_path) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(Duration::from_secs(120)))?;
                    stream.set_write_timeout(Some(Duration::from_secs(10)))?;
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to connect to provider (attempt {}): {}",
                        attempt + 1,
                        e
                    );
                    last_err = Some(e);
                    std::thread::sleep(Duration::from_millis(500));
                }
            }
        }
        Err(FaceGateError::Provider(format!(
            "Cannot reach embedding service at {}: {}",
            self.socket_path.display(),
            last_err.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    fn call(&self, request: &Request) -> Result<Response> {
        let mut guard = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if guard.is_none() {
            *guard = Some(self.connect_with_retry()?);
        }
        let stream = guard.as_mut().unwrap();

        let result = Self::exchange(stream, request);
        if result.is_err() {
            // Drop the broken connection; the next call reconnects.
            *guard = None;
        }
        result
    }

    fn exchange(stream: &mut UnixStream, request: &Request) -> Result<Response> {
        let request_data = bincode::serialize(request)
            .map_err(|e| FaceGateError::Provider(format!("Failed to serialize request: {}", e)))?;
        stream.write_all(&(request_data.len() as u32).to_le_bytes())?;
        stream.write_all(&request_data)?;
        stream.flush()?;

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf)?;
        let response_len = u32::from_le_bytes(len_buf) as usize;
        if response_len > MAX_MESSAGE_BYTES {
            return Err(FaceGateError::Provider("Response too large".into()));
        }

        let mut response_buf = vec![0u8; response_len];
        stream.read_exact(&mut response_buf)?;
        bincode::deserialize(&response_buf)
            .map_err(|e| FaceGateError::Provider(format!("Failed to deserialize response: {}", e)))
    }
}

fn unexpected(response: Response) -> FaceGateError {
    match response {
        Response::Error(msg) => FaceGateError::Provider(format!("Service error: {}", msg)),
        other => FaceGateError::Provider(format!("Unexpected response: {:?}", other)),
    }
}

impl FaceProvider for ServiceProvider {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn has_face(&self, frame: &Frame) -> Result<bool> {
        match self.call(&Request::HasFace {
            frame: frame.clone(),
        })? {
            Response::FacePresent { present } => Ok(present),
            other => Err(unexpected(other)),
        }
    }

    fn embed(&self, frame: &Frame) -> Result<Embedding> {
        match self.call(&Request::Embed {
            frame: frame.clone(),
        })? {
            Response::Embedding { vector } => Ok(vector),
            Response::Error(msg) => Err(FaceGateError::EmbeddingExtractionFailed(msg)),
            other => Err(unexpected(other)),
        }
    }

    fn verify(&self, live: &Frame, reference: &Frame) -> Result<Verification> {
        match self.call(&Request::Verify {
            live: live.clone(),
            reference: reference.clone(),
        })? {
            Response::Verified { matched, distance } => Ok(Verification { matched, distance }),
            other => Err(unexpected(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ColorSpace;
    use std::os::unix::net::UnixListener;

    fn serve_one(listener: UnixListener, responses: Vec<Response>) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            for response in responses {
                let mut len_buf = [0u8; 4];
                stream.read_exact(&mut len_buf).unwrap();
                let len = u32::from_le_bytes(len_buf) as usize;
                let mut buf = vec![0u8; len];
                stream.read_exact(&mut buf).unwrap();
                let _request: Request = bincode::deserialize(&buf).unwrap();

                let data = bincode::serialize(&response).unwrap();
                stream.write_all(&(data.len() as u32).to_le_bytes()).unwrap();
                stream.write_all(&data).unwrap();
            }
        })
    }

    #[test]
    fn handshake_and_embed_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("provider.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let server = serve_one(
            listener,
            vec![
                Response::ModelInfo {
                    model_id: "facenet".into(),
                    dimensions: 128,
                },
                Response::Embedding {
                    vector: vec![0.5, 0.25],
                },
            ],
        );

        let provider = ServiceProvider::connect(&socket, 1).unwrap();
        assert_eq!(provider.model_id(), "facenet");

        let frame = Frame::new(1, 1, ColorSpace::Rgb, vec![0, 0, 0]).unwrap();
        assert_eq!(provider.embed(&frame).unwrap(), vec![0.5, 0.25]);
        server.join().unwrap();
    }

    #[test]
    fn service_error_maps_to_extraction_failure() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("provider.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let server = serve_one(
            listener,
            vec![
                Response::ModelInfo {
                    model_id: "facenet".into(),
                    dimensions: 128,
                },
                Response::Error("no face crop".into()),
            ],
        );

        let provider = ServiceProvider::connect(&socket, 1).unwrap();
        let frame = Frame::new(1, 1, ColorSpace::Rgb, vec![0, 0, 0]).unwrap();
        match provider.embed(&frame) {
            Err(FaceGateError::EmbeddingExtractionFailed(_)) => {}
            other => panic!("expected EmbeddingExtractionFailed, got {:?}", other),
        }
        server.join().unwrap();
    }
}
