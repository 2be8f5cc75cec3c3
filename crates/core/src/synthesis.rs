use crate::config::SynthesisConfig;
use crate::error::QueryError;
use crate::generation::{GenerationOptions, TextGenerator};
use crate::models::{Answer, ContextBundle};
use tracing::debug;

/// Fixed reply for questions with no grounding; the generative model is not
/// consulted, so it cannot fabricate an answer from nothing.
pub const INSUFFICIENT_INFORMATION: &str =
    "No information on this question was found in the ingested documents.";

/// Renders the grounded prompt from the fragment list. Citations and the
/// prompt are derived from the same bundle, so what the model saw and what
/// gets cited can never drift apart.
pub fn render_prompt(question: &str, bundle: &ContextBundle) -> String {
    let mut prompt = String::from(
        "You are an agricultural expert. Answer the question using ONLY the \
         context below.\n\nCONTEXT:\n",
    );

    for fragment in &bundle.fragments {
        let pages = fragment
            .page_numbers
            .iter()
            .map(|page| page.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        prompt.push_str(&format!(
            "[source: {}, pages: {}]\n{}\n\n---\n\n",
            fragment.source_file, pages, fragment.text
        ));
    }

    prompt.push_str(&format!(
        "QUESTION: {question}\n\n\
         INSTRUCTIONS:\n\
         - Answer only what was asked, in two or three sentences.\n\
         - Use concrete names, numbers and facts from the context.\n\
         - Do not repeat document titles, authors or publisher metadata.\n\
         - If the context has no exact answer, say the information was not found.\n\
         - Do not add information that is not in the context.\n\n\
         ANSWER (short and concrete):"
    ));

    prompt
}

/// Builds the grounded prompt, calls the generative model with the response
/// cap, and attaches citations for the fragments actually in the bundle.
pub async fn synthesize<T: TextGenerator + ?Sized>(
    generator: &T,
    question: &str,
    bundle: &ContextBundle,
    config: &SynthesisConfig,
) -> Result<Answer, QueryError> {
    if bundle.is_empty() {
        debug!("empty context bundle, returning fixed insufficient-information answer");
        return Ok(Answer {
            text: INSUFFICIENT_INFORMATION.to_string(),
            citations: Vec::new(),
            grounded: false,
        });
    }

    let prompt = render_prompt(question, bundle);
    let options = GenerationOptions {
        max_tokens: config.max_tokens,
        temperature: config.temperature,
        stop_sequences: config.stop_sequences.clone(),
    };

    let text = generator.generate(&prompt, &options).await?;

    Ok(Answer {
        text,
        citations: bundle.citations(),
        grounded: true,
    })
}
