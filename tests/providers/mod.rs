mod media_backends;
mod registry;
mod storyboard_backends;

use storyforge_core::config::ProviderConfig;
use wiremock::MockServer;

/// Provider configuration pointing `backend` at the mock server
pub fn config_for(backend: &str, server: &MockServer) -> ProviderConfig {
    ProviderConfig {
        timeout_seconds: 5,
        ..ProviderConfig::new(backend, server.uri())
    }
}
