//! Plain-text horizontal bar charts for chat code blocks.

pub const DEFAULT_LINE_LENGTH: usize = 79;
const BAR_GLYPH: char = '█';

/// Renders `title`, a `#` rule, then one row per `(label, value)` in input order.
///
/// Bars are scaled against the largest value; any non-zero value gets at
/// least one glyph so small counts stay visible.
pub fn render_bar_chart(title: &str, rows: &[(String, u64)], line_length: usize) -> Vec<String> {
    let mut lines = vec![title.to_string(), "#".repeat(line_length)];
    if rows.is_empty() {
        return lines;
    }

    let label_width = rows
        .iter()
        .map(|(label, _)| label.chars().count())
        .max()
        .unwrap_or(0);
    let value_width = rows
        .iter()
        .map(|(_, value)| value.to_string().len())
        .max()
        .unwrap_or(1);
    let bar_width = line_length
        .saturating_sub(label_width + value_width + 4)
        .max(1);
    let max_value = rows.iter().map(|(_, value)| *value).max().unwrap_or(0);

    for (label, value) in rows {
        let bar = BAR_GLYPH
            .to_string()
            .repeat(scaled_bar_length(*value, max_value, bar_width));
        lines.push(format!("{bar:<bar_width$}  {value:>value_width$}  {label}"));
    }
    lines
}

fn scaled_bar_length(value: u64, max_value: u64, bar_width: usize) -> usize {
    if value == 0 || max_value == 0 {
        return 0;
    }
    let width = bar_width as u128;
    let scaled = (u128::from(value) * width) / u128::from(max_value);
    usize::try_from(scaled).unwrap_or(bar_width).max(1)
}
