//! Integration Tests: the request/response pipeline through the public API.
//!
//! A small in-file backend echoes back a canned reply per call so each test can check
//! what the backend saw and what the caller got.

use std::sync::{Arc, Mutex};

use promptgen::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Replies with `reply` and remembers the last prompt.
struct Canned {
    reply: String,
    seen: Mutex<Vec<String>>,
}

impl Canned {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.seen.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl Backend for Canned {
    fn name(&self) -> &str {
        "canned"
    }

    fn complete<'a>(
        &'a self,
        _ctx: &'a CallContext,
        prompt: &'a str,
    ) -> BoxFuture<'a, Result<String, Error>> {
        self.seen.lock().unwrap().push(prompt.to_string());
        let reply = self.reply.clone();
        Box::pin(async move { Ok(reply) })
    }

    fn stream<'a>(
        &'a self,
        _ctx: &'a CallContext,
        _prompt: &'a str,
    ) -> BoxFuture<'a, Result<BackendStream, Error>> {
        Box::pin(async { Err(Error::backend("streaming not scripted")) })
    }
}

#[derive(Serialize, Default)]
#[allow(non_snake_case)]
struct Greeting {
    Name: String,
    Message: String,
}

#[derive(Serialize, Default)]
struct Recipe {
    dish: String,
    ingredients: Vec<String>,
    servings: u32,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
struct Article {
    #[schemars(length(max = 100))]
    title: String,
    #[schemars(length(min = 1))]
    tags: Vec<String>,
}

#[tokio::test]
async fn test_greeting_prompt_reaches_backend() {
    let backend = Canned::new("Doing well.");
    let generator = Generator::<Greeting, String>::new("Hello {{ Name }}, {{ Message }}")
        .unwrap()
        .with_backend(backend.clone());
    let input = Greeting {
        Name: "Alice".into(),
        Message: "how are you?".into(),
    };

    assert_eq!(generator.render(&input).unwrap(), "Hello Alice, how are you?");
    assert_eq!(generator.run(&CallContext::new(), &input).await.unwrap(), "Doing well.");
    assert_eq!(backend.last_prompt(), generator.prompt(&input).unwrap());
}

#[tokio::test]
async fn test_template_loops_and_conditionals() {
    let backend = Canned::new("4");
    let generator = Generator::<Recipe, i64>::new(
        "How many minutes to cook {{ dish }}{% if servings > 1 %} for {{ servings }}{% endif %}?\n\
         {% for i in ingredients %}- {{ i }}\n{% endfor %}",
    )
    .unwrap()
    .with_backend(backend.clone());

    let minutes = generator
        .run(
            &CallContext::new(),
            &Recipe {
                dish: "pasta".into(),
                ingredients: vec!["spaghetti".into(), "salt".into()],
                servings: 2,
            },
        )
        .await
        .unwrap();
    assert_eq!(minutes, 4);
    let prompt = backend.last_prompt();
    assert!(prompt.starts_with("How many minutes to cook pasta for 2?\n"));
    assert!(prompt.contains("- spaghetti\n- salt\n"));
    assert!(prompt.contains("integer"));
}

#[tokio::test]
async fn test_structured_raw_json_without_fence() {
    let backend = Canned::new(r#"  {"title": "Borrowing explained", "tags": ["rust"]}  "#);
    let generator = Generator::<Greeting, Json<Article>>::new("Write about {{ Name }}")
        .unwrap()
        .with_backend(backend);
    let article = generator
        .run(&CallContext::new(), &Greeting::default())
        .await
        .unwrap();
    assert_eq!(article.title, "Borrowing explained");
    assert_eq!(article.tags, vec!["rust"]);
}

#[tokio::test]
async fn test_structured_schema_violation_names_field() {
    let backend = Canned::new(r#"```json
{"title": "ok", "tags": []}
```"#);
    let generator = Generator::<Greeting, Json<Article>>::new("Write about {{ Name }}")
        .unwrap()
        .with_backend(backend);
    let err = generator
        .run(&CallContext::new(), &Greeting::default())
        .await
        .unwrap_err();
    assert!(err.is_validation());
    assert!(err.message.starts_with("tags: "), "{}", err.message);
}

#[tokio::test]
async fn test_structured_malformed_json() {
    let backend = Canned::new("```json\n{\"title\": \"unterminated\n```");
    let generator = Generator::<Greeting, Json<Article>>::new("Write about {{ Name }}")
        .unwrap()
        .with_backend(backend);
    let err = generator
        .run(&CallContext::new(), &Greeting::default())
        .await
        .unwrap_err();
    assert!(err.is_invalid_response());
    assert_eq!(err.code, "invalid_json");
}

#[tokio::test]
async fn test_boolean_replies() {
    for (reply, expected) in [("Yes", Some(true)), ("f", Some(false)), ("42", None)] {
        let generator = Generator::<Greeting, bool>::new("Is {{ Name }} here?")
            .unwrap()
            .with_backend(Canned::new(reply));
        let result = generator.run(&CallContext::new(), &Greeting::default()).await;
        match expected {
            Some(value) => assert_eq!(result.unwrap(), value, "reply {reply}"),
            None => assert!(result.unwrap_err().is_invalid_response(), "reply {reply}"),
        }
    }
}

#[tokio::test]
async fn test_float_rejects_words() {
    let generator = Generator::<Greeting, f64>::new("Pi for {{ Name }}?")
        .unwrap()
        .with_backend(Canned::new("about three"));
    let err = generator
        .run(&CallContext::new(), &Greeting::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidResponse);
    assert_eq!(err.code, "invalid_format");
}

#[tokio::test]
async fn test_logging_hook_is_transparent() {
    let backend = Canned::new("unchanged");
    let generator = Generator::<Greeting, String>::new("{{ Name }}")
        .unwrap()
        .with_backend(backend.clone())
        .with_hook(Arc::new(LoggingHook::new().with_content()));
    let out = generator.run(&CallContext::new(), &Greeting::default()).await.unwrap();
    assert_eq!(out, "unchanged");
    assert!(backend.last_prompt().starts_with("\n\n"));
}

#[test]
fn test_unknown_template_field_fails_at_construction() {
    let err = Generator::<Recipe, String>::new("Cook {{ dish }} with {{ sauce }}").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Template);
}

#[test]
fn test_validate_response_against_schema() {
    let generator = Generator::<Greeting, Json<Article>>::new("{{ Name }}").unwrap();
    generator
        .validate_response(br#"{"title": "t", "tags": ["a"]}"#)
        .unwrap();

    let err = generator.validate_response(b"not json").unwrap_err();
    assert!(err.is_invalid_response());

    let long = "x".repeat(150);
    let err = generator
        .validate_response(format!(r#"{{"title": "{long}", "tags": ["a"]}}"#).as_bytes())
        .unwrap_err();
    assert!(err.is_validation());
    assert!(err.message.contains("title"));
}
