//! # Responder Table
//!
//! Commands are dispatched through a lookup table keyed by `CommandKind`,
//! built once at startup. Each end of a connection carries its own table:
//! racks answer inventory commands, regions answer `Identify` and report
//! submissions.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use shared_types::EventLoopId;

use crate::commands::{CommandKind, Request, Response};
use crate::error::RpcError;

/// Handler for one command kind.
#[async_trait]
pub trait CommandResponder: Send + Sync {
    async fn respond(&self, request: Request) -> Result<Response, RpcError>;
}

/// Lookup table from command kind to handler.
#[derive(Default)]
pub struct ResponderTable {
    handlers: HashMap<CommandKind, Arc<dyn CommandResponder>>,
}

impl ResponderTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `kind`, replacing any previous one.
    #[must_use]
    pub fn with(mut self, kind: CommandKind, responder: Arc<dyn CommandResponder>) -> Self {
        self.handlers.insert(kind, responder);
        self
    }

    /// Kinds this table can answer.
    #[must_use]
    pub fn kinds(&self) -> Vec<CommandKind> {
        self.handlers.keys().copied().collect()
    }

    /// Dispatch one invocation.
    pub async fn dispatch(&self, request: Request) -> Result<Response, RpcError> {
        let kind = request.kind();
        match self.handlers.get(&kind) {
            Some(handler) => handler.respond(request).await,
            None => Err(RpcError::UnhandledCommand { kind }),
        }
    }
}

/// Answers `Identify` with a fixed event-loop identity.
pub struct IdentifyResponder {
    ident: EventLoopId,
}

impl IdentifyResponder {
    pub fn new(ident: EventLoopId) -> Self {
        Self { ident }
    }
}

#[async_trait]
impl CommandResponder for IdentifyResponder {
    async fn respond(&self, _request: Request) -> Result<Response, RpcError> {
        Ok(Response::Identify {
            ident: self.ident.clone(),
        })
    }
}
