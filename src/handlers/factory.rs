//! Handler construction by type name.

use std::sync::Arc;

use crate::config::DonConfig;
use crate::handlers::dummy::DummyHandler;
use crate::handlers::{Don, Handler, HandlerError};

pub const DUMMY_HANDLER_TYPE: &str = "dummy";

/// Builds a handler from its type name and raw JSON config.
pub trait HandlerFactory: Send + Sync {
    fn new_handler(
        &self,
        handler_type: &str,
        config: &serde_json::Value,
        don: &DonConfig,
        connector: Arc<dyn Don>,
    ) -> Result<Arc<dyn Handler>, HandlerError>;
}

/// Factory for the handler types shipped with the gateway.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandlerFactory;

impl HandlerFactory for DefaultHandlerFactory {
    fn new_handler(
        &self,
        handler_type: &str,
        config: &serde_json::Value,
        don: &DonConfig,
        connector: Arc<dyn Don>,
    ) -> Result<Arc<dyn Handler>, HandlerError> {
        match handler_type {
            DUMMY_HANDLER_TYPE => Ok(Arc::new(DummyHandler::new(config, don, connector)?)),
            other => Err(HandlerError::UnknownHandlerType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::DonError;
    use crate::api::Request;
    use async_trait::async_trait;

    struct NoopDon;

    #[async_trait]
    impl Don for NoopDon {
        async fn send_to_node(&self, _node: &str, _request: &Request) -> Result<(), DonError> {
            Ok(())
        }
    }

    #[test]
    fn test_builds_dummy_handler() {
        let handler = DefaultHandlerFactory
            .new_handler(
                "dummy",
                &serde_json::json!({"methods": ["svc.a", "svc.b"]}),
                &DonConfig::default(),
                Arc::new(NoopDon),
            )
            .unwrap();
        assert_eq!(handler.methods(), vec!["svc.a", "svc.b"]);
    }

    #[test]
    fn test_unknown_type() {
        let err = DefaultHandlerFactory
            .new_handler("nope", &serde_json::Value::Null, &DonConfig::default(), Arc::new(NoopDon))
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "unknown handler type: nope");
    }
}
