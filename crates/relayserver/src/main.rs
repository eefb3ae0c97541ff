use actix_cors::Cors;
use actix_web::{get, post, web, App, HttpResponse, HttpServer, Responder};
use relaycore::{Payload, Workflow};
use relayruntime::{RelayRuntime, RuntimeConfig};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
struct AppState {
    runtime: RelayRuntime,
}

/// Request body for a run
#[derive(Debug, Deserialize)]
struct RunRequest {
    workflow: Workflow,
    #[serde(default)]
    input: Payload,
}

/// Error response
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Health check endpoint
#[get("/health")]
async fn health_check(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "relay",
        "core_processors": data.runtime.registry().len(),
    }))
}

/// List core processors with their config schemas
#[get("/api/nodes")]
async fn list_processors(data: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(data.runtime.registry().describe())
}

/// Check a workflow without running it
#[post("/api/workflows/validate")]
async fn validate_workflow(
    data: web::Data<AppState>,
    workflow: web::Json<Workflow>,
) -> impl Responder {
    let workflow = workflow.into_inner();

    match data.runtime.validate(&workflow) {
        Ok(report) => HttpResponse::Ok().json(serde_json::json!({
            "valid": report.is_valid(),
            "order": report.order,
            "nodes": report.nodes,
        })),
        Err(e) => {
            warn!("Workflow '{}' rejected: {}", workflow.name, e);
            HttpResponse::BadRequest().json(ErrorResponse {
                error: e.to_string(),
            })
        }
    }
}

/// Execute a workflow to completion and return its outcome
#[post("/api/runs")]
async fn run_workflow(data: web::Data<AppState>, req: web::Json<RunRequest>) -> impl Responder {
    let RunRequest { workflow, input } = req.into_inner();

    info!("Executing workflow: {} ({})", workflow.name, workflow.id);

    match data.runtime.execute(&workflow, input).await {
        Ok(outcome) => {
            info!(
                "Workflow {} finished as {}: {} succeeded, {} failed, {} skipped",
                workflow.id,
                outcome.status,
                outcome.succeeded(),
                outcome.failed(),
                outcome.skipped()
            );
            HttpResponse::Ok().json(outcome)
        }
        Err(e) => {
            error!("Workflow {} rejected: {}", workflow.id, e);
            HttpResponse::UnprocessableEntity().json(ErrorResponse {
                error: e.to_string(),
            })
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("🚀 Starting Relay Server");

    let config = RuntimeConfig::from_env()?;
    let registry = relaynodes::default_registry()?;
    info!(
        "Plugin host at {} (timeout {}ms, {} retries)",
        config.plugin_host.base_url,
        config.plugin_host.timeout.as_millis(),
        config.plugin_host.max_retries
    );

    let runtime = RelayRuntime::new(registry, config);

    info!("✅ Runtime initialized with {} core processors", runtime.registry().len());

    let app_state = web::Data::new(AppState { runtime });

    let bind_address =
        std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

    info!("🌐 Server starting on http://{}", bind_address);

    // Start HTTP server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(actix_web::middleware::Logger::default())
            .service(health_check)
            .service(list_processors)
            .service(validate_workflow)
            .service(run_workflow)
    })
    .bind(&bind_address)?
    .run()
    .await?;

    Ok(())
}
