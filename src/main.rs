//! Waypoint CLI
//!
//! Loads a router from a TOML file and runs one operation against it.
//!
//! ```text
//! waypoint --config app.toml places
//! waypoint --config app.toml href contacts.detail --param id=42
//! waypoint --config app.toml match '/contacts/42?tab=notes'
//! waypoint --config app.toml go contacts.detail --param id=42
//! waypoint --config app.toml go-url /contacts/42
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde_json::{json, Map, Value};

use waypoint::config::{load_config, RouterConfig};
use waypoint::observability::logging::init_logging;
use waypoint::transition::PlaceRef;
use waypoint::{HrefOptions, Params, Router};

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(about = "Inspect and exercise a place router configuration", long_about = None)]
struct Cli {
    /// Router configuration (TOML). Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered places and their URL patterns
    Places,
    /// Format the URL of a place
    Href {
        place: String,
        /// Parameter as key=value; values that parse as JSON are typed
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// Find the place a URL maps to
    Match { url: String },
    /// Transition to a place and print the result
    Go {
        place: String,
        #[arg(short, long = "param", value_parser = parse_param)]
        params: Vec<(String, Value)>,
    },
    /// Transition to the place a URL maps to
    GoUrl { url: String },
}

fn parse_param(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => RouterConfig::default(),
    };
    init_logging(&config.observability.log_level);

    tracing::info!(
        config = ?cli.config,
        places = config.places.len(),
        "waypoint v{} starting",
        env!("CARGO_PKG_VERSION")
    );

    let router = Router::from_config(&config)?;

    let output = match cli.command {
        Commands::Places => {
            let places: Vec<Value> = router
                .registry()
                .places()
                .iter()
                .map(|place| {
                    json!({
                        "name": place.name(),
                        "url": place.url().map(|url| url.source().to_string()),
                        "abstract": place.is_abstract(),
                        "params": place.params().keys().collect::<Vec<_>>(),
                    })
                })
                .collect();
            Value::Array(places)
        }
        Commands::Href { place, params } => {
            let params: Params = params.into_iter().collect();
            json!({ "href": router.href(&place, &params, &HrefOptions::default()) })
        }
        Commands::Match { url } => match router.match_url(&url) {
            Some((place, params)) => json!({ "place": place.name(), "params": params }),
            None => Value::Null,
        },
        Commands::Go { place, params } => {
            let params: Params = params.into_iter().collect();
            let options = router.default_options();
            settled(&router, router.go_to(&place, params, options).await)
        }
        Commands::GoUrl { url } => settled(&router, router.go_to_url(&url).await),
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn settled(router: &Arc<Router>, result: Result<PlaceRef, waypoint::TransitionError>) -> Value {
    match result {
        Ok(active) => {
            let mut locals = Map::new();
            for place in active.place.lineage() {
                let Some(committed) = place.locals() else {
                    continue;
                };
                let values: Map<String, Value> = committed
                    .values
                    .iter()
                    .filter(|(key, _)| !key.starts_with('$'))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                locals.insert(place.name().to_string(), Value::Object(values));
            }
            json!({
                "place": active.name(),
                "params": active.params,
                "locals": locals,
                "location": router.location().current(),
            })
        }
        Err(error) => json!({ "error": error.to_string() }),
    }
}
