//! Completion stats footer.

use console::style;

use parley_infra::llm::pricing::format_cost;
use parley_types::llm::TokenUsage;

/// Example: `  [12 in . 48 out . ~$0.003 . 1.4s]`
///
/// The cost segment is omitted when pricing is unknown.
pub fn render_stats_footer(usage: &TokenUsage, cost: Option<f64>, duration_secs: f64) -> String {
    let mut parts = vec![
        format!("{} in", usage.prompt_tokens),
        format!("{} out", usage.completion_tokens),
    ];
    if let Some(cost) = cost {
        parts.push(format_cost(cost));
    }
    parts.push(format!("{duration_secs:.1}s"));
    format!("  {}", style(format!("[{}]", parts.join(" . "))).dim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_footer_with_cost() {
        console::set_colors_enabled(false);
        let footer = render_stats_footer(&TokenUsage::new(12, 48), Some(0.0031), 1.44);
        assert_eq!(footer, "  [12 in . 48 out . ~$0.003 . 1.4s]");
    }

    #[test]
    fn test_footer_without_cost() {
        console::set_colors_enabled(false);
        let footer = render_stats_footer(&TokenUsage::new(3, 4), None, 0.2);
        assert_eq!(footer, "  [3 in . 4 out . 0.2s]");
    }
}
