//! Canned degraded-mode replies used when no provider could answer.

use crate::request::Locale;

/// Localized "assistant unavailable" message with contact channels.
pub fn text(locale: Locale) -> &'static str {
    match locale {
        Locale::De => {
            "Entschuldigung, unser AI-Assistent ist momentan nicht verfügbar. Bitte kontaktieren Sie uns direkt unter info@godspeed.ch oder +41 44 123 45 67 für persönliche Beratung."
        }
        Locale::Fr => {
            "Désolé, notre assistant IA n'est pas disponible pour le moment. Veuillez nous contacter directement à info@godspeed.ch ou +41 44 123 45 67 pour des conseils personnalisés."
        }
        Locale::It => {
            "Spiacenti, il nostro assistente AI non è al momento disponibile. Vi preghiamo di contattarci direttamente a info@godspeed.ch o +41 44 123 45 67 per una consulenza personalizzata."
        }
        Locale::En => {
            "Sorry, our AI assistant is currently unavailable. Please contact us directly at info@godspeed.ch or +41 44 123 45 67 for personal consultation."
        }
    }
}
