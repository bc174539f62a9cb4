//! Instruction text sent to every provider.
//!
//! The visitor's message and context are embedded verbatim. Nothing here
//! guards against instructions smuggled inside them.

use chatgate_core::request::{Locale, RequestContext};

const PERSONA: &str =
    "You are a Swiss e-bike expert working at Godspeed, a premium e-bike retailer in Switzerland.";

const DOMAIN_KNOWLEDGE: &str = "Swiss E-Bike Knowledge:
- Pedelec (25 km/h) vs S-Pedelec (45 km/h) regulations
- Swiss insurance requirements for e-bikes
- Alpine terrain considerations for range and motor selection
- Bosch, Shimano, and Brose motor systems
- Swiss weather conditions and seasonal riding
- 0% financing options available
- 6 store locations: Zürich, Basel, Bern, Genève, Luzern, St. Gallen
- Test ride booking and professional service available";

const ANSWER_SHAPE: &str = "1. Helpful, expert advice
2. Swiss market specific information
3. Recommendation for test rides when relevant
4. Clear next steps for the customer";

const OUTPUT_CONSTRAINTS: &str = "Keep response under 200 words, friendly but professional tone.";

pub fn language_name(locale: Locale) -> &'static str {
    match locale {
        Locale::De => "German",
        Locale::Fr => "French",
        Locale::It => "Italian",
        Locale::En => "English",
    }
}

/// Builds the single instruction block. Same inputs, same string.
pub fn build_prompt(message: &str, context: Option<&RequestContext>, locale: Locale) -> String {
    let context_hint = context.map(context_block).unwrap_or_default();

    format!(
        "{PERSONA}\n\n{context_hint}\n{DOMAIN_KNOWLEDGE}\n\nRespond in {language} with:\n\
         {ANSWER_SHAPE}\n\nCustomer message: \"{message}\"\n\n{OUTPUT_CONSTRAINTS}",
        language = language_name(locale),
    )
}

fn context_block(context: &RequestContext) -> String {
    let page = context.current_page.as_deref().unwrap_or("unknown page");
    let actions = serde_json::to_string(&context.previous_actions)
        .unwrap_or_else(|_| "[]".to_string());
    format!("Context: Customer is on {page}\nPrevious actions: {actions}\n")
}
