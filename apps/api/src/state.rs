use std::sync::Arc;

use crate::config::Config;
use crate::runs::collaborators::CollaboratorFactory;
use crate::session::SessionStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub sessions: SessionStore,
    /// Builds the model/search/fetch collaborators for each run from its credentials.
    /// Default: `HttpCollaborators`; tests inject stubs.
    pub collaborators: Arc<dyn CollaboratorFactory>,
}
