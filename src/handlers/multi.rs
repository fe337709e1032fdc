//! Composite handler for one routing key.
//!
//! # Responsibilities
//! - Build every configured sub-handler through the factory
//! - Route user and node messages to the sub-handler owning the method
//! - Fan out start/close to every sub-handler
//!
//! # Design Decisions
//! - With exactly one sub-handler every method goes to it, so single-handler
//!   DONs keep working when the handler does not list its methods
//! - Sub-handlers start in configuration order and fail fast
//! - Close visits every sub-handler and aggregates the failures

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::api::{Message, Request, Response};
use crate::config::{DonConfig, HandlerConfig};
use crate::handlers::{Callback, Don, Handler, HandlerError, HandlerFactory};

pub struct MultiHandler {
    /// Sub-handlers in configuration order.
    handlers: Vec<(String, Arc<dyn Handler>)>,
    by_method: HashMap<String, Arc<dyn Handler>>,
}

impl MultiHandler {
    /// Build sub-handlers from `configs` using `factory`.
    pub fn new(
        configs: &[HandlerConfig],
        don: &DonConfig,
        connector: Arc<dyn Don>,
        factory: &dyn HandlerFactory,
    ) -> Result<Self, HandlerError> {
        let mut handlers = Vec::with_capacity(configs.len());
        for config in configs {
            let handler = factory.new_handler(&config.name, &config.config, don, connector.clone())?;
            handlers.push((config.name.clone(), handler));
        }
        Self::from_handlers(handlers)
    }

    /// Index already-built sub-handlers.
    pub fn from_handlers(handlers: Vec<(String, Arc<dyn Handler>)>) -> Result<Self, HandlerError> {
        let mut by_method: HashMap<String, Arc<dyn Handler>> = HashMap::new();
        let mut names = std::collections::HashSet::new();

        for (name, handler) in &handlers {
            if !names.insert(name.as_str()) {
                return Err(HandlerError::DuplicateHandler(name.clone()));
            }
            for method in handler.methods() {
                if by_method.contains_key(&method) {
                    return Err(HandlerError::DuplicateMethod(method));
                }
                by_method.insert(method, handler.clone());
            }
        }

        Ok(Self { handlers, by_method })
    }

    fn route(&self, method: &str) -> Result<&Arc<dyn Handler>, HandlerError> {
        if let [(_, only)] = self.handlers.as_slice() {
            return Ok(only);
        }
        self.by_method
            .get(method)
            .ok_or_else(|| HandlerError::MethodNotFound(method.to_string()))
    }

    fn wrap(method: &str, source: HandlerError) -> HandlerError {
        HandlerError::Routing {
            method: method.to_string(),
            source: Box::new(source),
        }
    }
}

#[async_trait]
impl Handler for MultiHandler {
    fn methods(&self) -> Vec<String> {
        let mut methods: Vec<String> = self.by_method.keys().cloned().collect();
        methods.sort();
        methods
    }

    async fn handle_legacy_user_message(
        &self,
        message: Message,
        callback: Callback,
    ) -> Result<(), HandlerError> {
        let method = message.body.method.clone();
        let handler = self.route(&method).map_err(|e| Self::wrap(&method, e))?;
        handler
            .handle_legacy_user_message(message, callback)
            .await
            .map_err(|e| Self::wrap(&method, e))
    }

    async fn handle_jsonrpc_user_message(
        &self,
        request: Request,
        callback: Callback,
    ) -> Result<(), HandlerError> {
        let method = request.method.clone();
        let handler = self.route(&method).map_err(|e| Self::wrap(&method, e))?;
        handler
            .handle_jsonrpc_user_message(request, callback)
            .await
            .map_err(|e| Self::wrap(&method, e))
    }

    async fn handle_node_message(
        &self,
        response: Response,
        node_address: &str,
    ) -> Result<(), HandlerError> {
        let method = response.method.clone();
        let handler = self.route(&method).map_err(|e| Self::wrap(&method, e))?;
        handler
            .handle_node_message(response, node_address)
            .await
            .map_err(|e| Self::wrap(&method, e))
    }

    async fn start(&self) -> Result<(), HandlerError> {
        for (name, handler) in &self.handlers {
            handler.start().await?;
            tracing::debug!(handler = %name, "Handler started");
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), HandlerError> {
        let mut errors = Vec::new();
        for (name, handler) in &self.handlers {
            if let Err(e) = handler.close().await {
                tracing::warn!(handler = %name, error = %e, "Handler close failed");
                errors.push(e);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(HandlerError::Multiple(errors))
        }
    }
}
