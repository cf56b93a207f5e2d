use crate::domain::{Listing, Profile};

/// Escape for Telegram MarkdownV2: backslash first, then every reserved
/// punctuation character.
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '=' | '|' | '{'
            | '}' | '.' | '!' | '-' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

pub fn profile_preview(profile: &Profile) -> String {
    [
        format!(
            "\\[{}\\] / \\#Город: {}, {}",
            escape(&profile.name),
            escape(&profile.city),
            escape(&profile.country)
        ),
        "\\[О себе\\]".to_string(),
        escape(&profile.intro),
        format!("Кiт: {}", escape(&profile.cat_name)),
    ]
    .join("\n")
}

pub fn listing_card(profile: &Profile, listing: &Listing) -> String {
    [
        format!("*{} ищет опекуна*", escape(&profile.name)),
        format!(
            "Город: \\#{}, {}",
            escape(&listing.city),
            escape(&listing.country)
        ),
        String::new(),
        format!("Кiт: {}", escape(&profile.cat_name)),
        String::new(),
        "🏡 *Жильё*".to_string(),
        escape(&listing.apartment_description),
        String::new(),
        "📅 *Даты*".to_string(),
        escape(&listing.dates),
        String::new(),
        "📝 *Условия \\(взаимный обмен или оплата\\)*".to_string(),
        escape(&listing.conditions),
        String::new(),
        "🌍 *Желаемые направления*".to_string(),
        escape(&listing.preferred_destinations),
    ]
    .join("\n")
}
