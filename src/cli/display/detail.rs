//! Detail view builder for key-value display of a single definition.

/// A builder for detail views (key-value display).
pub struct DetailView {
    title: String,
    sections: Vec<DetailSection>,
}

struct DetailSection {
    header: Option<String>,
    fields: Vec<(String, String)>,
    items: Vec<String>,
}

impl DetailView {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            sections: vec![DetailSection {
                header: None,
                fields: vec![],
                items: vec![],
            }],
        }
    }

    /// Add a key-value field to the current section.
    pub fn field(mut self, key: &str, value: &str) -> Self {
        if let Some(section) = self.sections.last_mut() {
            section.fields.push((key.to_string(), value.to_string()));
        }
        self
    }

    /// Add a field only if the value is Some.
    pub fn field_opt(self, key: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) => self.field(key, v),
            None => self,
        }
    }

    /// Start a new named section with a header.
    pub fn section(mut self, header: &str) -> Self {
        self.sections.push(DetailSection {
            header: Some(header.to_string()),
            fields: vec![],
            items: vec![],
        });
        self
    }

    /// Add a verbatim line to the current section.
    pub fn item(mut self, text: &str) -> Self {
        if let Some(section) = self.sections.last_mut() {
            section.items.push(text.to_string());
        }
        self
    }

    pub fn render(&self) -> String {
        let mut lines = vec![self.title.clone()];
        let key_width = self
            .sections
            .iter()
            .flat_map(|s| s.fields.iter())
            .map(|(k, _)| k.len())
            .max()
            .unwrap_or(12);

        for section in &self.sections {
            if let Some(header) = &section.header {
                lines.push(String::new());
                lines.push(format!("{header}:"));
            }
            for (key, value) in &section.fields {
                lines.push(format!("  {:<width$}  {value}", format!("{key}:"), width = key_width + 1));
            }
            for item in &section.items {
                lines.push(format!("  {item}"));
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_aligns_fields() {
        let view = DetailView::new("/plant/boiler")
            .field("Kind", "scheduled")
            .field_opt("Next fire", None)
            .field("Serial", "7")
            .section("Body")
            .item("{}");
        let rendered = view.render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "/plant/boiler");
        assert_eq!(lines[1], "  Kind:    scheduled");
        assert_eq!(lines[2], "  Serial:  7");
        assert!(!rendered.contains("Next fire"));
        assert_eq!(lines[4], "Body:");
        assert_eq!(lines[5], "  {}");
    }
}
