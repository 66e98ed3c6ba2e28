use std::error::Error;

use crate::api::rag::{RagAnswer, RagClient};

pub async fn run_ask(
    base_url: &str,
    manuscript_id: &str,
    question: &str,
) -> Result<(), Box<dyn Error>> {
    let answer = RagClient::new(base_url).query(manuscript_id, question).await?;
    print!("{}", render_answer(&answer));
    Ok(())
}

pub fn render_answer(answer: &RagAnswer) -> String {
    let mut out = format!("{}\n", answer.answer.trim_end());
    if let Some(confidence) = answer.confidence {
        out.push_str(&format!("\nConfidence: {:.0}%\n", confidence * 100.0));
    }
    if !answer.relevant_scenes.is_empty() {
        out.push_str("\nRelevant scenes:\n");
        for scene in &answer.relevant_scenes {
            out.push_str(&format!("  - {scene}\n"));
        }
    }
    out
}
