//! Request handler that routes requests to the log.

use std::sync::Arc;

use stratum_storage::{Log, Record, StorageError};
use stratum_wire::{
    ConsumeResponse, ErrorCode, HandshakeResponse, ProduceResponse, Request, RequestId, Response,
    ResponsePayload, PROTOCOL_VERSION,
};
use tracing::error;

use crate::auth::{Acl, Action};

/// Handles requests by routing them to log operations.
///
/// A request normally yields one response; `ConsumeStream` yields one
/// response per record plus a terminator, all carrying the request id.
pub struct RequestHandler {
    log: Arc<Log>,
    acl: Option<Acl>,
}

impl RequestHandler {
    pub fn new(log: Arc<Log>, acl: Option<Acl>) -> Self {
        Self { log, acl }
    }

    /// Handles a request on behalf of `subject`.
    pub fn handle(&self, request: Request, subject: Option<&str>) -> Vec<Response> {
        use stratum_wire::RequestPayload::*;

        let id = request.id;
        match request.payload {
            Handshake(req) => {
                if req.client_version != PROTOCOL_VERSION {
                    return vec![Response::error(
                        id,
                        ErrorCode::InvalidRequest,
                        format!(
                            "unsupported client version: {}, server is {}",
                            req.client_version, PROTOCOL_VERSION
                        ),
                    )];
                }

                vec![Response::new(
                    id,
                    ResponsePayload::Handshake(HandshakeResponse {
                        server_version: PROTOCOL_VERSION,
                        subject: req.identity,
                    }),
                )]
            }

            Produce(req) => {
                if let Some(denied) = self.authorize(id, subject, Action::Produce) {
                    return vec![denied];
                }

                match self.log.append(Record::new(req.value)) {
                    Ok(offset) => vec![Response::new(
                        id,
                        ResponsePayload::Produce(ProduceResponse { offset }),
                    )],
                    Err(e) => vec![storage_error_response(id, &e)],
                }
            }

            Consume(req) => {
                if let Some(denied) = self.authorize(id, subject, Action::Consume) {
                    return vec![denied];
                }

                match self.log.read(req.offset) {
                    Ok(record) => vec![consume_response(id, record)],
                    Err(e) => vec![storage_error_response(id, &e)],
                }
            }

            ConsumeStream(req) => {
                if let Some(denied) = self.authorize(id, subject, Action::Consume) {
                    return vec![denied];
                }

                let mut responses = Vec::new();
                let mut offset = req.from_offset;
                loop {
                    match self.log.read(offset) {
                        Ok(record) => {
                            offset = record.offset().next();
                            responses.push(consume_response(id, record));
                        }
                        Err(StorageError::OffsetOutOfRange { .. }) => {
                            // Reached the tail; finish the stream cleanly.
                            responses.push(Response::new(id, ResponsePayload::EndOfStream));
                            return responses;
                        }
                        Err(e) => {
                            responses.push(storage_error_response(id, &e));
                            return responses;
                        }
                    }
                }
            }
        }
    }

    fn authorize(
        &self,
        id: RequestId,
        subject: Option<&str>,
        action: Action,
    ) -> Option<Response> {
        let Some(acl) = &self.acl else {
            return None;
        };

        if acl.is_allowed(subject, action) {
            return None;
        }

        let message = match subject {
            Some(subject) => format!("subject {subject} may not {action}"),
            None => format!("no identity presented, {action} denied"),
        };
        Some(Response::error(id, ErrorCode::Unauthorized, message))
    }
}

fn consume_response(id: RequestId, record: Record) -> Response {
    Response::new(
        id,
        ResponsePayload::Consume(ConsumeResponse {
            offset: record.offset(),
            value: record.into_value().to_vec(),
        }),
    )
}

/// Maps a storage failure to its wire representation.
///
/// `OffsetOutOfRange` is the only storage error remote clients can act on;
/// everything else is logged here and reported opaquely.
fn storage_error_response(id: RequestId, err: &StorageError) -> Response {
    match err {
        StorageError::OffsetOutOfRange { offset } => Response::error(
            id,
            ErrorCode::OffsetOutOfRange,
            format!("offset out of range: {offset}"),
        ),
        other => {
            error!(error = %other, "storage operation failed");
            Response::error(id, ErrorCode::InternalError, "internal error")
        }
    }
}
