//! Framed attach protocol spoken on a job's upgraded connection
//!
//! Every frame is `[kind: u8][len: u32 BE][payload]`. Output frames carry raw
//! bytes, the exit frame carries a big-endian `i32` and ends the job.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{DeployError, Result};

const KIND_STDOUT: u8 = 1;
const KIND_STDERR: u8 = 2;
const KIND_EXIT: u8 = 3;
const KIND_ERROR: u8 = 4;

/// Upper bound on a single frame payload (16MB)
pub const MAX_FRAME_LEN: u32 = 16 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    Exit(i32),
    /// Job failed on the remote side before producing an exit status
    Error(String),
}

impl Frame {
    pub fn encode(&self) -> Vec<u8> {
        let (kind, payload): (u8, Vec<u8>) = match self {
            Frame::Stdout(data) => (KIND_STDOUT, data.clone()),
            Frame::Stderr(data) => (KIND_STDERR, data.clone()),
            Frame::Exit(code) => (KIND_EXIT, code.to_be_bytes().to_vec()),
            Frame::Error(msg) => (KIND_ERROR, msg.as_bytes().to_vec()),
        };
        let mut buf = Vec::with_capacity(5 + payload.len());
        buf.push(kind);
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&payload);
        buf
    }
}

/// Reads one frame. Returns `Ok(None)` on a clean end of stream between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Frame>>
where
    R: AsyncRead + Unpin,
{
    let mut kind = [0u8; 1];
    if reader.read(&mut kind).await? == 0 {
        return Ok(None);
    }

    let len = reader.read_u32().await?;
    if len > MAX_FRAME_LEN {
        return Err(DeployError::AttachError(format!(
            "frame of {} bytes exceeds limit of {}",
            len, MAX_FRAME_LEN
        )));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload).await?;

    let frame = match kind[0] {
        KIND_STDOUT => Frame::Stdout(payload),
        KIND_STDERR => Frame::Stderr(payload),
        KIND_EXIT => {
            let bytes: [u8; 4] = payload.as_slice().try_into().map_err(|_| {
                DeployError::AttachError(format!("exit frame has {} bytes, expected 4", len))
            })?;
            Frame::Exit(i32::from_be_bytes(bytes))
        }
        KIND_ERROR => Frame::Error(String::from_utf8_lossy(&payload).into_owned()),
        other => {
            return Err(DeployError::AttachError(format!(
                "unknown frame type {}",
                other
            )));
        }
    };
    Ok(Some(frame))
}

/// Consumes an attached job's output stream.
pub struct AttachClient<S> {
    stream: S,
}

impl<S> AttachClient<S>
where
    S: AsyncRead + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Copies output frames to `stdout`/`stderr` until the job exits and
    /// returns its exit status.
    pub async fn receive<O, E>(&mut self, stdout: &mut O, stderr: &mut E) -> Result<i32>
    where
        O: AsyncWrite + Unpin,
        E: AsyncWrite + Unpin,
    {
        loop {
            match read_frame(&mut self.stream).await? {
                Some(Frame::Stdout(data)) => stdout.write_all(&data).await?,
                Some(Frame::Stderr(data)) => stderr.write_all(&data).await?,
                Some(Frame::Exit(code)) => {
                    stdout.flush().await?;
                    stderr.flush().await?;
                    debug!("Attached job exited with status {}", code);
                    return Ok(code);
                }
                Some(Frame::Error(msg)) => return Err(DeployError::AttachError(msg)),
                None => {
                    return Err(DeployError::AttachError(
                        "stream closed before exit status was received".to_string(),
                    ));
                }
            }
        }
    }
}
