use std::error::Error;

use crate::api::analytics::{ArcDataClient, ArcResult};

pub async fn run_arc(
    base_url: &str,
    manuscript_id: &str,
    character: &str,
) -> Result<(), Box<dyn Error>> {
    let result = ArcDataClient::new(base_url)
        .fetch_arc(manuscript_id, character)
        .await;

    match &result {
        ArcResult::Error { message } => Err(format!("{}: {message}", result.label()).into()),
        _ => {
            print!("{}", render_arc(&result));
            Ok(())
        }
    }
}

pub fn render_arc(result: &ArcResult) -> String {
    let mut out = format!("Overall sentiment: {}\n", result.label());
    if result.points().is_empty() {
        return out;
    }

    out.push_str("step  sentiment  smoothed\n");
    for point in result.points() {
        out.push_str(&format!(
            "{:>4}  {:>+9.2}  {:>+8.2}\n",
            point.step, point.sentiment_score, point.smoothed_score
        ));
    }
    out
}
