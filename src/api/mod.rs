// HTTP APIs: admin settings and browser session tokens

pub mod session;
pub mod settings;

pub use session::{create_session_router, SessionAppState};
pub use settings::{create_settings_router, SettingsAppState};

use axum::Router;
use tower_http::cors::CorsLayer;

/// Full application router.
///
/// CORS is only opened on the session routes; settings stay same-origin.
pub fn create_app(settings: SettingsAppState, session: SessionAppState) -> Router {
    create_settings_router(settings)
        .merge(create_session_router(session).layer(CorsLayer::permissive()))
}
