/// Streaming a generation token by token, with cancellation.
///
/// Uses the scripted `MockBackend` so it runs offline. Tokens are upper-cased by a hook
/// as they pass through, and a second stream is cancelled part way.
///
/// Run: cargo run --example streaming --features testing
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use promptgen::{CallContext, FnHook, Generator, MockBackend, StreamEvent};

#[derive(serde::Serialize, Default)]
struct Poem {
    subject: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let backend = Arc::new(
        MockBackend::new()
            .with_stream(["Ferris ", "scuttles ", "sideways, ", "borrowing ", "nothing."])
            .with_stream(["This ", "one ", "never ", "finishes ", "because ", "we ", "stop ", "it."])
            .with_token_delay(Duration::from_millis(80)),
    );
    let generator = Generator::<Poem, String>::new("Write a short poem about {{ subject }}.")?
        .with_backend(backend)
        .with_hook(Arc::new(FnHook::new().after(|token| Ok(token.to_uppercase()))));
    let input = Poem {
        subject: "Rust".to_string(),
    };

    println!("Streaming response:\n");
    let mut stream = generator.stream(&CallContext::new(), &input).await?;
    while let Some(event) = stream.next().await {
        match event {
            StreamEvent::Content(token) => {
                print!("{token}");
                std::io::stdout().flush()?;
            }
            StreamEvent::Error(err) => return Err(err.into()),
            StreamEvent::Done => println!("\n"),
        }
    }

    // Cancel the second stream after a few tokens.
    let ctx = CallContext::new();
    let mut stream = generator.stream(&ctx, &input).await?;
    for _ in 0..3 {
        if let Some(token) = stream.next_token().await {
            print!("{token}");
        }
    }
    ctx.cancel();
    match stream.finish().await {
        Ok(()) => println!("\nfinished"),
        Err(err) => println!("\nstopped: {err}"),
    }

    Ok(())
}
