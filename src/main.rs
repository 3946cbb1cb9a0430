use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use faces_ajax::config::{AjaxConfig, CONFIG_ENV};
use faces_ajax::input::parse_input;
use faces_ajax::navigation::fetch_page;
use faces_ajax::{AjaxEngine, RequestOptions};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: faces-ajax <page> <source-id> [execute] [render]";

fn main() {
    let subscriber_result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
    if subscriber_result.is_err() {
        // tracing was already initialised; continue silently
    }

    let rt = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = rt.block_on(run(std::env::args().skip(1).collect())) {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

async fn run(args: Vec<String>) -> Result<()> {
    let [page, source, rest @ ..] = args.as_slice() else {
        bail!(USAGE);
    };
    if rest.len() > 2 {
        bail!(USAGE);
    }

    let config_path = std::env::var(CONFIG_ENV).ok().map(PathBuf::from);
    let config = AjaxConfig::load(config_path).context("failed to load ajax configuration")?;

    let location = parse_input(page).with_context(|| format!("invalid page location {page:?}"))?;
    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .build()
        .context("failed to build http client")?;
    let fetched = fetch_page(&location, &client)
        .await
        .context("failed to load page")?;
    tracing::info!(target: "navigation", url = %fetched.base_url, "page loaded");

    let mut options = RequestOptions::new(source.clone());
    if let Some(execute) = rest.first() {
        options = options.execute(execute.clone());
    }
    if let Some(render) = rest.get(1) {
        options = options.render(render.clone());
    }

    let mut engine = AjaxEngine::http(fetched.into_document(), config);
    engine.request(options).context("failed to issue request")?;

    let outcomes = engine.run_until_idle().await;
    for outcome in &outcomes {
        eprintln!("{}", serde_json::to_string_pretty(outcome)?);
    }
    println!("{}", engine.document().to_html());

    if outcomes.iter().any(|outcome| !outcome.is_success()) {
        bail!("request did not complete successfully");
    }
    Ok(())
}
