use std::fmt::Write as _;

/// Renders rows as left-aligned columns separated by two spaces.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|h| display_width(h).max(1))
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let separators = widths
        .iter()
        .map(|w| "-".repeat((*w).max(3)))
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separators, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let cell = value.replace(['\n', '\r', '\t'], " ");
            let padding = width.saturating_sub(display_width(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    value.chars().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_table_aligns_columns() {
        let headers = vec!["RecID".to_string(), "Surname".to_string()];
        let rows = vec![
            vec!["1".to_string(), "Smith".to_string()],
            vec!["10".to_string(), "O'Brien".to_string()],
        ];
        let rendered = render_table(&headers, &rows);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(
            lines,
            vec![
                "RecID  Surname",
                "-----  -------",
                "1      Smith",
                "10     O'Brien"
            ]
        );
    }

    #[test]
    fn render_table_flattens_control_characters() {
        let headers = vec!["Title".to_string()];
        let rows = vec![vec!["Dr\nProf".to_string()]];
        let rendered = render_table(&headers, &rows);
        assert_eq!(rendered.lines().nth(2), Some("Dr Prof"));
    }
}
