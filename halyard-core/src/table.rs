// ABOUTME: Box-drawing table renderer for text-only brokers
// ABOUTME: Column widths follow the widest cell, measured in chars

/// Render `header` and `rows` as a UTF-8 box-drawing table.
///
/// Rows shorter than the header are padded with empty cells; extra cells
/// beyond the header width are ignored. The output ends with a newline.
pub fn utf8_table(header: &[String], rows: &[Vec<String>]) -> String {
    let cols = header.len();
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().take(cols).enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = String::new();
    out.push_str(&rule(&widths, '┌', '┬', '┐'));
    out.push_str(&line(&widths, header));
    out.push_str(&rule(&widths, '├', '┼', '┤'));
    for row in rows {
        out.push_str(&line(&widths, row));
    }
    out.push_str(&rule(&widths, '└', '┴', '┘'));
    out
}

fn rule(widths: &[usize], left: char, mid: char, right: char) -> String {
    let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
    format!("{left}{}{right}\n", segments.join(&mid.to_string()))
}

fn line(widths: &[usize], cells: &[String]) -> String {
    let padded: Vec<String> = widths
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            let fill = w - cell.chars().count();
            format!(" {cell}{} ", " ".repeat(fill))
        })
        .collect();
    format!("│{}│\n", padded.join("│"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn test_utf8_table_layout() {
        let table = utf8_table(&s(&["Key", "Value"]), &[s(&["interval", "10"])]);
        let expected = "\
┌──────────┬───────┐
│ Key      │ Value │
├──────────┼───────┤
│ interval │ 10    │
└──────────┴───────┘
";
        assert_eq!(table, expected);
    }

    #[test]
    fn test_utf8_table_pads_short_rows() {
        let table = utf8_table(&s(&["a", "b"]), &[s(&["x"])]);
        assert!(table.contains("│ x │   │"));
    }

    #[test]
    fn test_utf8_table_no_rows() {
        let table = utf8_table(&s(&["only"]), &[]);
        assert_eq!(table.lines().count(), 4);
    }

    #[test]
    fn test_utf8_table_counts_chars_not_bytes() {
        let table = utf8_table(&s(&["e"]), &[s(&["é"])]);
        assert!(table.contains("│ é │"));
    }
}
