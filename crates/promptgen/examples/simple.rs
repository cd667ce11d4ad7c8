/// Typed generation against OpenAI: a plain-text answer and a schema-validated object.
///
/// Shows building a `Generator` from a template, attaching the logging hook, and
/// decoding a structured reply into a Rust struct.
///
/// Run: RUST_LOG=promptgen=debug cargo run --example simple
/// Requires: OPENAI_API_KEY in env.
use std::sync::Arc;
use std::time::Duration;

use promptgen::{CallContext, Generator, Json, LoggingHook};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Default)]
struct Country {
    name: String,
}

#[derive(Debug, Deserialize, Serialize, JsonSchema)]
struct Facts {
    capital: String,
    population: u64,
    #[schemars(length(min = 1, max = 5))]
    languages: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let ctx = CallContext::new();
    let japan = Country {
        name: "Japan".to_string(),
    };

    // No backend given: the default is built from OPENAI_API_KEY on first use.
    let summary = Generator::<Country, String>::new("Describe {{ name }} in one sentence.")?
        .with_hook(Arc::new(LoggingHook::new()))
        .with_timeout(Duration::from_secs(30));
    println!("Summary: {}", summary.run(&ctx, &japan).await?);

    let facts = Generator::<Country, Json<Facts>>::new("Give me key facts about {{ name }}.")?
        .with_timeout(Duration::from_secs(30));
    let facts = facts.run(&ctx, &japan).await?.into_inner();
    println!("Capital:    {}", facts.capital);
    println!("Population: {}", facts.population);
    println!("Languages:  {}", facts.languages.join(", "));

    Ok(())
}
