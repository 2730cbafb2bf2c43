use std::error::Error;

use tokenviz::{visualize, EngineConfig, GenerationConfig, ModelService};

fn main() -> Result<(), Box<dyn Error>> {
    let text = std::env::args()
        .skip(1)
        .collect::<Vec<_>>()
        .join(" ");
    let text = if text.trim().is_empty() {
        "The quick brown fox jumps over the lazy dog".to_string()
    } else {
        text
    };

    let service = ModelService::from_config(EngineConfig {
        mode: "stub".into(),
        embedding_dim: 64,
        ..Default::default()
    });

    let runtime = tokio::runtime::Runtime::new()?;
    let vis = runtime.block_on(visualize(&service, &text, &GenerationConfig::default()))?;

    println!("reply: {}", vis.generated_text);
    println!(
        "{} input + {} output tokens, projected from {} dimensions",
        vis.input_token_count, vis.output_token_count, vis.original_dim
    );
    for t in &vis.tokens {
        let side = if t.is_input { "in " } else { "out" };
        println!(
            "{side} {:>16?} [{:+.3}, {:+.3}, {:+.3}]",
            t.token, t.destination[0], t.destination[1], t.destination[2]
        );
    }

    Ok(())
}
