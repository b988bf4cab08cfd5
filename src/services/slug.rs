use slug::slugify;

pub const MAX_SLUG_LENGTH: usize = 200;

pub fn generate_slug(title: &str) -> String {
    let slug = slugify(title);
    if slug.len() > MAX_SLUG_LENGTH {
        slug[..MAX_SLUG_LENGTH].trim_end_matches('-').to_string()
    } else {
        slug
    }
}

/// Uses the supplied slug when present, otherwise derives one from the title.
pub fn slug_or_title(slug: Option<&str>, title: &str) -> String {
    slug.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| generate_slug(title))
}

pub fn validate_slug(slug: &str) -> bool {
    if slug.is_empty() || slug.len() > MAX_SLUG_LENGTH {
        return false;
    }
    slug.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
