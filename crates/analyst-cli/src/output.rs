use serde::Serialize;

/// Widest a table cell may get before it is cut with an ellipsis.
pub const MAX_CELL_WIDTH: usize = 60;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{json}");
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let rows: Vec<Vec<String>> = rows
        .into_iter()
        .map(|row| row.iter().map(|c| fit_cell(c)).collect())
        .collect();
    print!("{}", render_table(headers, &rows));
}

fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    let header: Vec<&str> = headers.to_vec();
    push_row(&mut out, &header, &widths);
    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    push_row(&mut out, &sep, &widths);
    for row in rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .enumerate()
        .map(|(i, cell)| {
            let w = widths.get(i).copied().unwrap_or(0);
            format!("{:w$}", cell.as_ref())
        })
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

/// First line only, capped at [`MAX_CELL_WIDTH`] characters.
fn fit_cell(cell: &str) -> String {
    let first = cell.lines().next().unwrap_or("");
    if first.chars().count() <= MAX_CELL_WIDTH && first.len() == cell.len() {
        return first.to_string();
    }
    let kept: String = first.chars().take(MAX_CELL_WIDTH - 3).collect();
    format!("{kept}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_align_to_widest_cell() {
        let rows = vec![
            vec!["data_profiling".to_string(), "ok".to_string()],
            vec!["a".to_string(), "failed".to_string()],
        ];
        let table = render_table(&["TASK", "STATUS"], &rows);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "TASK            STATUS");
        assert_eq!(lines[1], "--------------  ------");
        assert_eq!(lines[2], "data_profiling  ok");
        assert_eq!(lines[3], "a               failed");
    }

    #[test]
    fn long_or_multiline_cells_are_cut() {
        assert_eq!(fit_cell("short"), "short");
        assert_eq!(fit_cell("line one\nline two"), "line one...");
        let long = "x".repeat(100);
        let cut = fit_cell(&long);
        assert_eq!(cut.chars().count(), MAX_CELL_WIDTH);
        assert!(cut.ends_with("..."));
    }
}
