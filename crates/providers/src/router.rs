use anyhow::Result;
use shared::settings::BackendSettings;
use shared::storage::KeyValueStore;
use std::sync::Arc;

use crate::azure::AzureBackend;
use crate::backend::ChatBackend;
use crate::mock::{MockBackend, MockOptions};

/// Pick the backend named by the settings. The mock keeps its state in
/// `store`; the remote backend needs an endpoint and an API key.
pub fn select_backend(
    settings: &BackendSettings,
    store: Arc<dyn KeyValueStore>,
) -> Result<Arc<dyn ChatBackend>> {
    if settings.mock_mode {
        tracing::info!("using mock chat backend");
        return Ok(Arc::new(MockBackend::new(
            store,
            MockOptions::from_settings(settings),
        )));
    }

    let backend = AzureBackend::from_settings(settings)?;
    tracing::info!(endpoint = %settings.api_endpoint, "using remote chat backend");
    Ok(Arc::new(backend))
}
