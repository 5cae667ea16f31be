//! Text rendering utilities for human-friendly error messages.
//!
//! Provides helpers to format resolution chains, cycle sets, lifetime
//! captures, type names and "did you mean?" suggestions.

/// Renders a resolution chain as a readable string.
///
/// # Examples
/// ```
/// use portico_support::rendering::render_chain;
///
/// let chain = vec!["OrderService", "PaymentPort", "Ledger", "OrderService"];
/// let rendered = render_chain(&chain);
/// assert_eq!(rendered, "OrderService → PaymentPort → Ledger → OrderService");
/// ```
pub fn render_chain(chain: &[impl AsRef<str>]) -> String {
    chain
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(" → ")
}

/// Renders an unordered group of names, e.g. the members of a cycle.
///
/// ```
/// use portico_support::rendering::render_set;
///
/// assert_eq!(render_set(&["Database", "Cache"]), "{Database, Cache}");
/// assert_eq!(render_set(&[] as &[&str]), "{}");
/// ```
pub fn render_set(items: &[impl AsRef<str>]) -> String {
    let joined = items
        .iter()
        .map(|s| s.as_ref())
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{{joined}}}")
}

/// Renders a chain with lifetime annotations, top (consumer) to bottom.
///
/// ```text
/// [Singleton] ReportService
///             ↓
/// [Scoped]    RequestContext  (from: depends_on)
/// ```
pub fn render_chain_vertical(entries: &[ChainEntry]) -> String {
    let mut result = String::new();
    let max_label_len = entries
        .iter()
        .map(|e| e.lifetime.len())
        .max()
        .unwrap_or(0);

    for (i, entry) in entries.iter().enumerate() {
        if i > 0 {
            result.push_str(&" ".repeat(max_label_len + 3));
            result.push_str("↓\n");
        }

        result.push_str(&format!(
            "[{:<width$}] {}",
            entry.lifetime,
            entry.type_name,
            width = max_label_len,
        ));

        if let Some(ref source) = entry.source_name {
            result.push_str(&format!("  (from: {source})"));
        }

        result.push('\n');
    }

    result
}

/// An entry in a chain for vertical rendering.
#[derive(Debug, Clone)]
pub struct ChainEntry {
    /// The type name
    pub type_name: String,
    /// The lifetime label (e.g., "Singleton", "Scoped")
    pub lifetime: String,
    /// Optional: which implementation produces this entry
    pub source_name: Option<String>,
}

impl ChainEntry {
    pub fn new(type_name: impl Into<String>, lifetime: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            lifetime: lifetime.into(),
            source_name: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source_name = Some(source.into());
        self
    }
}

/// Shortens a fully qualified type name for display.
///
/// ```
/// use portico_support::rendering::shorten_type_name;
///
/// let short = shorten_type_name("shop::adapters::email::SmtpNotifier");
/// assert_eq!(short, "SmtpNotifier");
///
/// let short = shorten_type_name("alloc::sync::Arc<dyn shop::ports::Notifier>");
/// assert_eq!(short, "Arc<dyn Notifier>");
/// ```
pub fn shorten_type_name(full_name: &str) -> String {
    // "shop::ports::Notifier" → "Notifier", keep generic punctuation
    let mut result = String::with_capacity(full_name.len());
    let mut chars = full_name.chars().peekable();
    let mut current_segment = String::new();

    while let Some(ch) = chars.next() {
        match ch {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                current_segment.clear();
            }
            '<' | '>' | ',' | ' ' | '(' | ')' | '[' | ']' | ';' | '&' => {
                result.push_str(&current_segment);
                result.push(ch);
                current_segment.clear();
            }
            _ => {
                current_segment.push(ch);
            }
        }
    }

    result.push_str(&current_segment);
    result
}

/// Generates "did you mean?" suggestions from registered type names.
///
/// Compares the requested type name against available names and returns
/// the closest matches, best first.
pub fn suggest_similar(
    requested: &str,
    available: &[&str],
    max_suggestions: usize,
) -> Vec<String> {
    let requested_lower = requested.to_lowercase();
    let requested_short = shorten_type_name(requested).to_lowercase();

    let mut scored: Vec<(&str, usize)> = available
        .iter()
        .filter(|&&name| name != requested)
        .filter_map(|&name| {
            let name_lower = name.to_lowercase();
            let name_short = shorten_type_name(name).to_lowercase();

            if name_lower.contains(&requested_lower)
                || requested_lower.contains(&name_lower)
            {
                return Some((name, 100));
            }

            if name_short.contains(&requested_short)
                || requested_short.contains(&name_short)
            {
                return Some((name, 80));
            }

            let common = name_short
                .chars()
                .zip(requested_short.chars())
                .take_while(|(a, b)| a == b)
                .count();

            if common >= 3 {
                return Some((name, common * 10));
            }

            None
        })
        .collect();

    scored.sort_by(|a, b| b.1.cmp(&a.1));
    scored
        .into_iter()
        .take(max_suggestions)
        .map(|(name, _)| name.to_string())
        .collect()
}
