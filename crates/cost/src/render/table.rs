//! Tab-stop column alignment.

use comfy_table::presets::NOTHING;

/// Rows of tab separated cells, aligned into columns on render.
///
/// Every cell but the last one on a row is padded to the width of its column
/// (widest cell plus one space). The last cell of a row is written as is, so
/// trailing markers never widen a column. All rows of a table align as one
/// block.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a row from a line whose cells are separated by `\t`.
    pub fn push_line(&mut self, line: &str) {
        self.rows
            .push(line.split('\t').map(str::to_string).collect());
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render every row, each terminated by a newline.
    #[must_use]
    pub fn render(&self) -> String {
        let mut table = comfy_table::Table::new();
        table.load_preset(NOTHING).force_no_tty();
        for row in &self.rows {
            table.add_row(row.clone());
        }
        for column in table.column_iter_mut() {
            column.set_padding((0, 1));
        }

        let mut out = String::new();
        for line in table.lines() {
            out.push_str(line.trim_end());
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_pad_to_widest_cell_plus_one() {
        let mut table = Table::new();
        table.push_line("infra_host:\t\t150%\thosts\t💸");
        table.push_line("logs:\t\t40%\tGB\t🥳");

        assert_eq!(
            table.render(),
            "infra_host:  150% hosts 💸\n\
             logs:        40%  GB    🥳\n"
        );
    }

    #[test]
    fn test_trailing_cell_is_not_aligned() {
        let mut table = Table::new();
        table.push_line("a:\t1");
        table.push_line("bb:\t22222222");

        assert_eq!(table.render(), "a:  1\nbb: 22222222\n");
    }

    #[test]
    fn test_width_counts_display_columns() {
        let mut table = Table::new();
        table.push_line("café:\tx");
        table.push_line("cafe:\ty");

        assert_eq!(table.render(), "café: x\ncafe: y\n");
    }

    #[test]
    fn test_line_without_tabs_passes_through() {
        let mut table = Table::new();
        table.push_line("just text");
        assert_eq!(table.render(), "just text\n");
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_empty_table_renders_nothing() {
        let table = Table::new();
        assert!(table.is_empty());
        assert_eq!(table.render(), "");
    }
}
