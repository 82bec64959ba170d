use axum::response::Html;

const INDEX_HTML: &str = include_str!("../../../assets/index.html");

/// GET /
///
/// Built-in viewer page, used when no `static_dir` is configured
pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}
