//! Stream a rubric from a running generation API and print progress.
//!
//! ```bash
//! export TEACHKIT_BASE_URL=http://localhost:8000/api/v1
//! RUST_LOG=teachkit_stream=debug cargo run --example stream_rubric
//! ```

use teachkit_stream::{ClientConfig, Error, GenerationClient, RubricRequest, SessionController};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientConfig::from_env()?;
    println!("Streaming rubric from {}", config.base_url);
    let client = GenerationClient::new(config)?;

    let request = RubricRequest {
        grade: "Lớp 10".to_string(),
        assessment_type: "Thuyết trình".to_string(),
        description: "Đánh giá kỹ năng thuyết trình nhóm".to_string(),
        ..RubricRequest::new("Thuyết trình nhóm", "Ngữ văn", 4)
    };

    let mut controller = SessionController::<RubricRequest>::new(client.clone());
    let mut snapshots = controller.subscribe();
    let handle = controller.begin(request)?;

    let printer = tokio::spawn(async move {
        while snapshots.changed().await.is_ok() {
            let snapshot = snapshots.borrow_and_update().clone();
            let progress = snapshot.view.as_ref().map_or(0, |view| view.progress);
            println!(
                "[{}] {}% {}",
                snapshot.status,
                progress,
                snapshot.progress_step.unwrap_or_default()
            );
            if snapshot.status.is_terminal() {
                break;
            }
        }
    });

    let outcome = match handle.await {
        Ok(result) => result?,
        Err(e) => return Err(Error::streaming(format!("session task failed: {e}"))),
    };
    printer.abort();

    println!("\nRubric: {} ({} criteria)", outcome.view.name, outcome.view.criteria.len());
    for row in &outcome.view.table {
        println!("  {:<12} {:>3}  {}", row.level, row.points, row.descriptions.join(" | "));
    }

    if let Some(token) = &outcome.artifact_token {
        let document = client.download("rubrics", token).await?;
        let file_name = if token.contains('.') {
            token.clone()
        } else {
            format!("{token}.docx")
        };
        std::fs::write(&file_name, &document).map_err(|e| Error::streaming(e.to_string()))?;
        println!("Saved {} bytes to {file_name}", document.len());
    }
    println!("Session id: {} (saved: {})", outcome.id, outcome.saved);

    Ok(())
}
