//! Message formatting (Telegram HTML).

use lendwatch_core::{LendingThresholds, Rate, RatesByToken};
use teloxide::utils::html::escape;

/// How prominently a lending rate is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
    /// At least twice the token threshold.
    HighAlert,
    /// At or above the threshold.
    Notable,
    Plain,
}

impl Emphasis {
    /// Classify a lending rate against its token threshold.
    ///
    /// Tokens without a threshold are always plain.
    pub fn classify(lending_rate: f64, threshold: Option<f64>) -> Self {
        match threshold {
            Some(t) if lending_rate >= 2.0 * t => Emphasis::HighAlert,
            Some(t) if lending_rate >= t => Emphasis::Notable,
            _ => Emphasis::Plain,
        }
    }

    fn render(self, lending_rate: f64) -> String {
        match self {
            Emphasis::HighAlert => format!("🔥{:.0}%", lending_rate),
            Emphasis::Notable => format!("<b>{:.0}%</b>", lending_rate),
            Emphasis::Plain => format!("{:.0}%", lending_rate),
        }
    }
}

/// Format one source row, e.g. `  • OKX: L: <b>35%</b> | B: 40%`.
pub fn format_rate_line(rate: &Rate, threshold: Option<f64>) -> String {
    let lending = Emphasis::classify(rate.lending_rate, threshold).render(rate.lending_rate);
    format!(
        "  • {}: L: {} | B: {:.0}%",
        escape(&rate.source),
        lending,
        rate.borrow_rate
    )
}

/// Header plus one line per source, sorted by source.
///
/// Returns `None` when the CEX preference hides every row.
pub fn format_token_section(
    token: &str,
    rates: &[Rate],
    threshold: Option<f64>,
    show_cex: bool,
) -> Option<String> {
    let mut visible: Vec<&Rate> = rates
        .iter()
        .filter(|r| show_cex || !r.category.is_cex())
        .collect();
    if visible.is_empty() {
        return None;
    }
    visible.sort_by(|a, b| a.source.cmp(&b.source));

    let mut section = format!("🪙 <b>{}</b>\n", escape(token));
    for rate in visible {
        section.push_str(&format_rate_line(rate, threshold));
        section.push('\n');
    }
    Some(section)
}

/// Render a full notification for one recipient.
///
/// Tokens are emitted in lexicographic order. Returns an empty string when
/// nothing is visible under the recipient's preference.
pub fn format_notification(
    rates_by_token: &RatesByToken,
    thresholds: &LendingThresholds,
    show_cex: bool,
) -> String {
    rates_by_token
        .iter()
        .filter_map(|(token, rates)| {
            format_token_section(token, rates, thresholds.get(token), show_cex)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
