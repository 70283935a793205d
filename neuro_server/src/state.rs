use std::sync::Arc;

use neuro_core::training::CompletionHandler;

#[derive(Clone)]
pub struct ServerState {
    completion_handler: Arc<dyn CompletionHandler>,
}

impl From<Arc<dyn CompletionHandler>> for ServerState {
    fn from(completion_handler: Arc<dyn CompletionHandler>) -> Self {
        Self { completion_handler }
    }
}

impl ServerState {
    pub fn completion_handler(&self) -> &Arc<dyn CompletionHandler> {
        &self.completion_handler
    }
}
