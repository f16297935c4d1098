use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use monsync_config::{load_writer_config, WriterConfig};
use monsync_connimpl::RedisConnection;
use monsync_domain::repository::ObjectRepository;
use monsync_writer::{update_all_config_objects, Writer, WriterError};

// ── Dump ──────────────────────────────────────────────────────────────────────

pub async fn dump(config_path: &Path) -> Result<()> {
    let config = read_config(config_path)?;
    let connection = connect(&config).await?;
    let writer = Writer::new(&config, connection);
    let repository = Arc::new(ObjectRepository::new());

    let report = update_all_config_objects(&writer, repository).await;

    println!(
        "dumped {} type(s) in {:.2}s",
        report.per_type_counts.len(),
        report.duration.as_secs_f64()
    );
    for (typename, count) in &report.per_type_counts {
        println!("  {:<16} {}", typename, count);
    }
    if !report.exceptions.is_empty() {
        eprintln!("{} exception(s):", report.exceptions.len());
        for e in &report.exceptions {
            eprintln!("  ! {}", e);
        }
        return Err(WriterError::Internal(format!(
            "dump completed with {} exception(s)",
            report.exceptions.len()
        ))
        .into());
    }
    Ok(())
}

// ── Serve ─────────────────────────────────────────────────────────────────────

pub async fn serve(config_path: &Path, bind: String, port: u16) -> Result<()> {
    let config = read_config(config_path)?;
    let connection = connect(&config).await?;
    let writer = Writer::new(&config, connection);
    let repository = Arc::new(ObjectRepository::new());

    writer.attach(repository);

    let addr = format!("{bind}:{port}");
    println!(
        "monsync serving {} on http://{addr} (environment: {})",
        writer.env_id(),
        writer.environment(),
    );

    let app = monsync_api::build_app(writer);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}

// ── Status ────────────────────────────────────────────────────────────────────

pub async fn status(api_url: String) -> Result<()> {
    let url = format!("{}/status", api_url.trim_end_matches('/'));
    let body: serde_json::Value = reqwest::get(&url)
        .await
        .with_context(|| format!("failed to reach {url}"))?
        .json()
        .await
        .context("failed to parse status response")?;

    if let Some(env) = body.get("environment").and_then(|v| v.as_str()) {
        println!("Environment: {}", env);
    }
    if let Some(connected) = body.get("connected").and_then(|v| v.as_bool()) {
        println!("Connected:   {}", connected);
    }
    if let Some(in_flight) = body.get("in_flight").and_then(|v| v.as_u64()) {
        println!("In flight:   {}", in_flight);
    }
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn read_config(path: &Path) -> Result<WriterConfig> {
    load_writer_config(path)
        .with_context(|| format!("failed to load config from {}", path.display()))
}

async fn connect(config: &WriterConfig) -> Result<Arc<dyn monsync_conn::Connection>> {
    let connection = RedisConnection::connect(&config.redis_url)
        .await
        .with_context(|| format!("failed to connect to {}", config.redis_url))?;
    Ok(Arc::new(connection))
}
