use axum::{Json, response::IntoResponse};

use postboard_types::api::{DataResponse, RouteInfo};

/// (endpoint, methods, url) for every route the router serves.
const ROUTES: &[(&str, &[&str], &str)] = &[
    ("home", &["GET"], "/"),
    ("get_messages", &["GET"], "/messages"),
    ("add_message", &["POST"], "/messages"),
    ("update_message", &["PUT"], "/messages"),
    ("get_tags", &["GET"], "/tags"),
    ("add_tags", &["POST"], "/tags"),
    ("add_message_tags", &["POST"], "/message_tags"),
];

/// GET /: lists the API's routes.
pub async fn home() -> impl IntoResponse {
    let data = ROUTES
        .iter()
        .map(|(endpoint, methods, url)| RouteInfo {
            endpoint: endpoint.to_string(),
            methods: methods.iter().map(|m| m.to_string()).collect(),
            url: url.to_string(),
        })
        .collect();

    Json(DataResponse { data })
}
