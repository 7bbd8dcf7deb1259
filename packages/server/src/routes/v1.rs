use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::config::AppConfig;
use crate::handlers;
use crate::state::AppState;

pub fn routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .merge(image_routes(config))
        .merge(media_routes())
        .merge(dlq_routes())
}

fn image_routes(config: &AppConfig) -> OpenApiRouter<AppState> {
    let upload = OpenApiRouter::new()
        .routes(routes!(handlers::image::upload_image))
        .layer(handlers::image::upload_body_limit(
            config.storage.max_blob_size,
        ));

    OpenApiRouter::new()
        .routes(routes!(handlers::image::get_image))
        .merge(upload)
}

fn media_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::media::get_media))
}

fn dlq_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::dlq::list_dlq_messages))
        .routes(routes!(
            handlers::dlq::get_dlq_message,
            handlers::dlq::delete_dlq_message
        ))
        .routes(routes!(handlers::dlq::retry_dlq_message))
}
