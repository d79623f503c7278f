//! Router construction for the sabakan REST server (spec.md §6).

use axum::routing::{delete, get};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Build the full axum router with all routes and shared state.
pub fn build_router(state: AppState) -> Router {
    let router = Router::new()
        .route(
            "/config/ipam",
            get(handlers::config::get_ipam).put(handlers::config::put_ipam),
        )
        .route(
            "/config/dhcp",
            get(handlers::config::get_dhcp).put(handlers::config::put_dhcp),
        )
        .route(
            "/machines",
            get(handlers::machines::list_machines).post(handlers::machines::register_machines),
        )
        .route(
            "/machines/:serial",
            delete(handlers::machines::delete_machine_handler),
        )
        .route(
            "/state/:serial",
            get(handlers::state::get_state).put(handlers::state::put_state),
        )
        .route(
            "/crypts/:serial/:disk",
            get(handlers::crypts::get_crypt).put(handlers::crypts::put_crypt),
        )
        .route("/crypts/:serial", delete(handlers::crypts::delete_crypts))
        .route(
            "/assets/:name",
            get(handlers::assets::get_asset)
                .put(handlers::assets::put_asset)
                .delete(handlers::assets::delete_asset),
        );

    #[cfg(feature = "ignition-routes")]
    let router = router
        .route(
            "/ignitions/:role",
            get(handlers::ignitions::list_ignitions).post(handlers::ignitions::put_ignition),
        )
        .route(
            "/ignitions/:role/:id",
            get(handlers::ignitions::get_ignition).delete(handlers::ignitions::delete_ignition),
        );

    Router::new()
        .nest("/api/v1", router)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
