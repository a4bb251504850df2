use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use fdk_core::constants::routes;

use crate::handlers::{
    auth_handler, auto_install_handler, install_handler, uninstall_handler, webhook_handler,
};
use crate::middleware::{application_proxy_middleware, platform_api_middleware, session_middleware};
use crate::state::FdkState;

/// `/fp/*` install flow routes, plus the webhook route when `webhook_path` is set
pub fn fdk_routes(state: FdkState, webhook_path: Option<&str>) -> Router {
    let with_session = Router::new()
        .route(routes::AUTH, get(auth_handler))
        .route(routes::AUTO_INSTALL, post(auto_install_handler))
        .route_layer(from_fn_with_state(state.clone(), session_middleware));

    let mut router = Router::new()
        .route(routes::INSTALL, get(install_handler))
        .route(routes::UNINSTALL, post(uninstall_handler))
        .merge(with_session);

    if let Some(path) = webhook_path {
        router = router.route(path, post(webhook_handler));
    }

    router.with_state(state)
}

/// Wrap extension-defined routes so each request carries a session and a platform client
pub fn platform_api_routes(state: FdkState, routes: Router<FdkState>) -> Router {
    routes
        .route_layer(from_fn_with_state(state.clone(), platform_api_middleware))
        .route_layer(from_fn_with_state(state.clone(), session_middleware))
        .with_state(state)
}

/// Wrap storefront proxy routes so each request carries the application context
pub fn application_proxy_routes(state: FdkState, routes: Router<FdkState>) -> Router {
    routes
        .route_layer(from_fn_with_state(state.clone(), application_proxy_middleware))
        .with_state(state)
}
