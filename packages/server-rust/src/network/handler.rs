//! Per-connection request handling.
//!
//! One connection carries exactly one request:
//!
//! ```text
//! header (16 bytes) -> bounds check -> body -> decode Command
//!   -> dispatch pipeline -> encode envelope -> write -> close
//! ```
//!
//! Every path that still has a usable connection writes one envelope, and
//! every path closes the connection exactly once.

use std::sync::Arc;

use nado_core::frame::{self, HEADER_LEN};
use nado_core::{Codec, Command, ErrorCode, ResponseEnvelope};
use tower::ServiceExt;
use tracing::{debug, warn};

use super::connection::{ConnectionId, Transport};
use crate::service::middleware::DispatchService;
use crate::service::operation::DispatchError;

/// Serves single-request connections against a dispatch pipeline.
pub struct ConnectionHandler<C> {
    pipeline: DispatchService,
    codec: Arc<C>,
    max_body_size: usize,
}

impl<C> Clone for ConnectionHandler<C> {
    fn clone(&self) -> Self {
        Self {
            pipeline: self.pipeline.clone(),
            codec: Arc::clone(&self.codec),
            max_body_size: self.max_body_size,
        }
    }
}

impl<C> std::fmt::Debug for ConnectionHandler<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandler")
            .field("max_body_size", &self.max_body_size)
            .finish_non_exhaustive()
    }
}

impl<C: Codec> ConnectionHandler<C> {
    #[must_use]
    pub fn new(pipeline: DispatchService, codec: Arc<C>, max_body_size: usize) -> Self {
        Self {
            pipeline,
            codec,
            max_body_size,
        }
    }

    /// Runs the whole exchange on `transport` and closes it.
    ///
    /// Takes the handler by value; clone it per connection.
    pub async fn handle<T: Transport>(self, id: ConnectionId, mut transport: T) {
        let Self {
            pipeline,
            codec,
            max_body_size,
        } = self;

        let envelope = match read_command(&*codec, &mut transport, max_body_size).await {
            Ok(command) => match pipeline.oneshot(command).await {
                Ok(envelope) => Some(envelope),
                Err(e) => {
                    debug!(conn = %id, error = %e, "dispatch failed");
                    Some(e.into_envelope())
                }
            },
            Err(DispatchError::Transport(e)) => {
                warn!(conn = %id, error = %e, "transport error while reading request");
                None
            }
            Err(e) => {
                warn!(conn = %id, peer = ?transport.peer(), error = %e, "request rejected");
                Some(e.into_envelope())
            }
        };

        if let Some(envelope) = envelope {
            if let Err(e) = write_envelope(&*codec, &mut transport, &envelope).await {
                warn!(conn = %id, error = %e, "failed to write response");
            }
        }

        if let Err(e) = transport.close().await {
            debug!(conn = %id, error = %e, "close failed");
        }
    }
}

/// Reads and decodes the request. The declared length is checked before any
/// body buffer is allocated.
async fn read_command<C: Codec, T: Transport>(
    codec: &C,
    transport: &mut T,
    max_body_size: usize,
) -> Result<Command, DispatchError> {
    let header = transport.read_exact(HEADER_LEN).await?;
    let declared = frame::parse_header(&header)?;
    if declared > max_body_size {
        return Err(DispatchError::OutOfBounds {
            declared,
            max: max_body_size,
        });
    }
    let body = transport.read_exact(declared).await?;
    Ok(codec.decode(&body)?)
}

async fn write_envelope<C: Codec, T: Transport>(
    codec: &C,
    transport: &mut T,
    envelope: &ResponseEnvelope,
) -> Result<(), DispatchError> {
    let bytes = match codec.encode(envelope) {
        Ok(bytes) => bytes,
        Err(e) => {
            // A unit returned data the codec cannot carry.
            warn!(error = %e, "envelope encoding failed");
            let fallback = ResponseEnvelope::error(ErrorCode::ServerError, "unencodable response");
            codec.encode(&fallback)?
        }
    };
    transport.write(&bytes).await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
