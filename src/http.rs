//! HTTP route layer: `/api/convert/{converter}`.
//!
//! GET returns the converter's parameter schema; POST accepts a multipart
//! form (`file` plus camelCase option fields) and answers with the
//! converted bytes or a JSON error envelope whose status comes from the
//! error taxonomy. The envelope is always `{"error": "..."}`; unknown
//! converters answer 404 with the fixed message `Converter not found` so
//! clients can match on it.

use crate::convert::{ConversionRequest, Orchestrator};
use crate::error::{ConvertError, ErrorKind};
use crate::options::ConversionOptions;
use axum::body::Body;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Uploads beyond this never reach the registry's per-converter limits.
const BODY_LIMIT: usize = 64 * 1024 * 1024;

#[derive(Clone)]
struct AppState {
    orchestrator: Orchestrator,
}

/// Build the API router.
pub fn router(orchestrator: Orchestrator) -> Router {
    Router::new()
        .route("/api/convert/{converter}", get(schema).post(convert))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(AppState { orchestrator })
}

/// Bind and serve until the task is cancelled.
pub async fn serve(addr: SocketAddr, orchestrator: Orchestrator) -> Result<(), ConvertError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ConvertError::Internal(format!("failed to bind {addr}: {e}")))?;
    info!(%addr, "listening");
    axum::serve(listener, router(orchestrator))
        .await
        .map_err(|e| ConvertError::Internal(format!("server error: {e}")))
}

struct ApiError(ConvertError);

impl From<ConvertError> for ApiError {
    fn from(err: ConvertError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = match self.0.kind() {
            ErrorKind::UnsupportedConverter => "Converter not found".to_owned(),
            _ => self.0.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn schema(
    State(state): State<AppState>,
    Path(converter): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let descriptor = state.orchestrator.registry().lookup_slug(&converter)?;
    Ok(Json(descriptor.schema_json()))
}

async fn convert(
    State(state): State<AppState>,
    Path(converter): Path<String>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut options = ConversionOptions::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        if name == "file" {
            let file_name = field.file_name().unwrap_or("upload").to_owned();
            let bytes = field.bytes().await.map_err(bad_multipart)?;
            file = Some((file_name, bytes.to_vec()));
        } else {
            let value = field.text().await.map_err(bad_multipart)?;
            apply_option(&mut options, &name, value.trim())?;
        }
    }

    let (file_name, bytes) = file.ok_or(ConvertError::InvalidOption {
        option: "file",
        reason: "multipart field 'file' is required".into(),
    })?;

    let conversion = state
        .orchestrator
        .convert_slug(
            &converter,
            ConversionRequest {
                file_name,
                bytes,
                options,
            },
        )
        .await?;

    let disposition = format!(
        "attachment; filename=\"{}\"",
        conversion.suggested_filename.replace('"', "")
    );
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, conversion.mime_type)
        .header(header::CONTENT_DISPOSITION, disposition)
        .header("x-conversion-method", conversion.metadata.method)
        .header(
            "x-fallback-attempts",
            HeaderValue::from(conversion.metadata.fallback_attempts),
        )
        .body(Body::from(conversion.data))
        .map_err(|e| ApiError(ConvertError::Internal(format!("response build: {e}"))))
}

fn bad_multipart(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError(ConvertError::InvalidOption {
        option: "body",
        reason: format!("malformed multipart body: {e}"),
    })
}

/// Apply one form field to the options. Unknown fields are ignored so
/// clients can send extra metadata without breaking.
fn apply_option(
    options: &mut ConversionOptions,
    name: &str,
    value: &str,
) -> Result<(), ConvertError> {
    fn parse<T: std::str::FromStr>(
        option: &'static str,
        value: &str,
    ) -> Result<T, ConvertError> {
        value.parse().map_err(|_| ConvertError::InvalidOption {
            option,
            reason: format!("could not parse '{value}'"),
        })
    }
    fn parse_bool(option: &'static str, value: &str) -> Result<bool, ConvertError> {
        match value {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(ConvertError::InvalidOption {
                option,
                reason: format!("expected a boolean, got '{other}'"),
            }),
        }
    }

    match name {
        "threshold" => options.threshold = parse("threshold", value)?,
        "colorMode" => options.color_mode = parse_bool("colorMode", value)?,
        "colorLevels" => options.color_levels = parse("colorLevels", value)?,
        "optimization" => options.optimization = parse("optimization", value)?,
        "turnPolicy" => options.turn_policy = parse("turnPolicy", value)?,
        "quality" => options.quality = parse("quality", value)?,
        "width" => options.width = Some(parse("width", value)?),
        "height" => options.height = Some(parse("height", value)?),
        "preserveAspectRatio" => {
            options.preserve_aspect_ratio = parse_bool("preserveAspectRatio", value)?;
        }
        "background" => options.background = Some(value.to_owned()),
        "page" => options.page = parse("page", value)?,
        "scale" => options.scale = parse("scale", value)?,
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Registry, RegistryConfig};
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_router() -> Router {
        let registry = Arc::new(Registry::builtin(RegistryConfig {
            remote_endpoint: None,
            ..Default::default()
        }));
        router(Orchestrator::new(registry))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn get_returns_parameter_schema() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/api/convert/png-to-svg")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["converter"], "png-to-svg");
        assert!(json["parameters"].is_array());
    }

    #[tokio::test]
    async fn unknown_converter_is_exact_404() {
        let response = test_router()
            .oneshot(
                Request::builder()
                    .uri("/api/convert/docx-to-svg")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = response.into_body().collect().await.expect("body").to_bytes();
        assert_eq!(&bytes[..], br#"{"error":"Converter not found"}"#);
    }

    #[tokio::test]
    async fn post_without_file_is_400() {
        let body = "--X\r\nContent-Disposition: form-data; name=\"threshold\"\r\n\r\n128\r\n--X--\r\n";
        let response = test_router()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/convert/png-to-svg")
                    .header("content-type", "multipart/form-data; boundary=X")
                    .body(Body::from(body))
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(
            json["error"].as_str().expect("message").contains("file"),
            "{json}"
        );
    }

    #[test]
    fn option_fields_parse_camel_case() {
        let mut options = ConversionOptions::default();
        apply_option(&mut options, "colorMode", "true").expect("colorMode");
        apply_option(&mut options, "turnPolicy", "majority").expect("turnPolicy");
        apply_option(&mut options, "width", "320").expect("width");
        apply_option(&mut options, "scale", "1.5").expect("scale");
        apply_option(&mut options, "ignoredExtra", "whatever").expect("ignored");
        assert!(options.color_mode);
        assert_eq!(options.width, Some(320));
        assert_eq!(options.scale, 1.5);

        let err = apply_option(&mut options, "threshold", "high").unwrap_err();
        assert!(matches!(err, ConvertError::InvalidOption { .. }));
    }
}
