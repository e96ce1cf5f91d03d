use gurt::config::Config;
use gurt::protocol::response::{Response, ResponseBuilder, StatusCode};
use gurt::server::{self, Router, handler_fn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let router = demo_routes(&cfg);

    tokio::select! {
        res = server::listener::run(&cfg, router) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    Ok(())
}

fn demo_routes(cfg: &Config) -> Router {
    let index_path = cfg.site.index_path.clone();

    Router::new()
        .get(
            "/",
            handler_fn(move |_req, _conn| {
                let index_path = index_path.clone();
                async move {
                    let body = match index_path {
                        Some(path) => tokio::fs::read(&path).await?,
                        None => b"Hello World".to_vec(),
                    };
                    Ok::<_, anyhow::Error>(Response::ok(body))
                }
            }),
        )
        .post(
            "/submit",
            handler_fn(|req, _conn| async move {
                tracing::info!(body = %req.body_text().trim(), "POST body");
                Ok(Response::ok("POST received"))
            }),
        )
        .patch(
            "/update",
            handler_fn(|req, _conn| async move {
                tracing::info!(body = %req.body_text().trim(), "PATCH body");
                Ok(Response::ok("PATCH received"))
            }),
        )
        .options(
            "/",
            handler_fn(|_req, _conn| async {
                Ok(ResponseBuilder::new(StatusCode::NoContent)
                    .header("allow", "GET, POST, PATCH, OPTIONS, HEAD")
                    .without_content_length()
                    .build())
            }),
        )
        .head(
            "/",
            handler_fn(|_req, _conn| async {
                Ok(ResponseBuilder::new(StatusCode::Ok)
                    .header("content-type", "text/plain")
                    .header("content-length", "11")
                    .build())
            }),
        )
}
