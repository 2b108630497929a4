//! Key-value views for one run: a title, aligned fields and bullet sections.

enum Row {
    Field(String, String),
    Item(String),
    Header(String),
}

/// Builder for the human rendering of a single record.
pub struct DetailView {
    title: String,
    rows: Vec<Row>,
}

impl DetailView {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            rows: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, key: &str, value: impl ToString) -> Self {
        self.rows.push(Row::Field(key.to_string(), value.to_string()));
        self
    }

    /// Like [`DetailView::field`], skipped when `value` is `None`.
    #[must_use]
    pub fn field_opt(self, key: &str, value: Option<impl ToString>) -> Self {
        match value {
            Some(value) => self.field(key, value),
            None => self,
        }
    }

    /// Start a headed block; later fields and items belong to it.
    #[must_use]
    pub fn section(mut self, header: &str) -> Self {
        self.rows.push(Row::Header(header.to_string()));
        self
    }

    #[must_use]
    pub fn item(mut self, text: impl ToString) -> Self {
        self.rows.push(Row::Item(text.to_string()));
        self
    }

    /// Field keys are padded to the longest key across all sections.
    pub fn render(&self) -> String {
        let width = self
            .rows
            .iter()
            .filter_map(|row| match row {
                Row::Field(key, _) => Some(key.chars().count() + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0);

        let mut out = self.title.clone();
        for row in &self.rows {
            out.push('\n');
            match row {
                Row::Field(key, value) => {
                    let label = format!("{key}:");
                    out.push_str(&format!("  {label:<width$}  {value}"));
                }
                Row::Item(text) => out.push_str(&format!("  \u{2022} {text}")),
                Row::Header(header) => {
                    out.push('\n');
                    out.push_str(header);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_view_render() {
        let rendered = DetailView::new("Batch batch-1")
            .field("status", "completed")
            .field_opt("resumed from", None::<&str>)
            .section("Results")
            .item("#1 completed")
            .render();

        assert!(rendered.starts_with("Batch batch-1"));
        assert!(rendered.contains("status:"));
        assert!(!rendered.contains("resumed from"));
        assert!(rendered.contains("\n\nResults\n"));
        assert!(rendered.contains("\u{2022} #1 completed"));
    }

    #[test]
    fn test_keys_align_to_longest() {
        let rendered = DetailView::new("Program")
            .field("risk", "low")
            .field("gate profile", "default")
            .render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[1].find("low"), lines[2].find("default"));
    }
}
