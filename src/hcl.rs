//! Minimal HCL writer
//!
//! Just enough of the HCL native syntax to declare resources, data sources,
//! outputs and settings blocks. Output is deterministic: attributes render in
//! insertion order, map entries by key, and consecutive single-line attributes
//! have their `=` aligned the way `terraform fmt` aligns them.

use std::collections::BTreeMap;

const INDENT: &str = "  ";
const BANNER: &str =
    "# =============================================================================";

// =============================================================================
// VALUES
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Number(u64),
    Bool(bool),
    /// A reference or function call, written verbatim.
    Expr(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn expr(e: impl Into<String>) -> Self {
        Value::Expr(e.into())
    }

    pub fn strings<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::Str(s.into())).collect())
    }

    pub fn string_map<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.clone(), Value::Str(v.clone())))
                .collect(),
        )
    }

    /// Non-empty maps are written one entry per line.
    pub fn is_multiline(&self) -> bool {
        match self {
            Value::Map(entries) => !entries.is_empty(),
            Value::List(items) => items.iter().any(Value::is_multiline),
            _ => false,
        }
    }

    /// Render at the given nesting depth (used for continuation lines).
    pub fn render(&self, depth: usize) -> String {
        match self {
            Value::Str(s) => quote(s),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Expr(e) => e.clone(),
            Value::List(items) => {
                let rendered: Vec<String> = items.iter().map(|v| v.render(depth)).collect();
                format!("[{}]", rendered.join(", "))
            }
            Value::Map(entries) if entries.is_empty() => "{}".to_string(),
            Value::Map(entries) => {
                let inner = INDENT.repeat(depth + 1);
                let keys: Vec<String> = entries.keys().map(|k| map_key(k)).collect();
                let width = keys.iter().map(|k| k.chars().count()).max().unwrap_or(0);

                let mut out = String::from("{\n");
                for (key, value) in keys.iter().zip(entries.values()) {
                    out.push_str(&format!(
                        "{inner}{key:<width$} = {}\n",
                        value.render(depth + 1)
                    ));
                }
                out.push_str(&INDENT.repeat(depth));
                out.push('}');
                out
            }
        }
    }
}

/// Quote and escape a string literal, including template sequences.
pub fn quote(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn map_key(key: &str) -> String {
    if is_identifier(key) {
        key.to_string()
    } else {
        quote(key)
    }
}

// =============================================================================
// BLOCKS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum BodyItem {
    Attribute(String, Value),
    Block(Block),
    Blank,
}

/// Ordered block contents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body {
    items: Vec<BodyItem>,
}

impl Body {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(&mut self, name: impl Into<String>, value: Value) -> &mut Self {
        self.items.push(BodyItem::Attribute(name.into(), value));
        self
    }

    /// Attribute written only when present.
    pub fn attr_opt(&mut self, name: impl Into<String>, value: Option<Value>) -> &mut Self {
        if let Some(value) = value {
            self.attr(name, value);
        }
        self
    }

    pub fn block(&mut self, block: Block) -> &mut Self {
        self.items.push(BodyItem::Block(block));
        self
    }

    /// Breaks `=` alignment, as an empty line does for `terraform fmt`.
    pub fn blank(&mut self) -> &mut Self {
        self.items.push(BodyItem::Blank);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn render_into(&self, depth: usize, out: &mut String) {
        let pad = INDENT.repeat(depth);
        let mut i = 0;
        while i < self.items.len() {
            match &self.items[i] {
                BodyItem::Attribute(_, value) if !value.is_multiline() => {
                    let start = i;
                    while i < self.items.len()
                        && matches!(&self.items[i], BodyItem::Attribute(_, v) if !v.is_multiline())
                    {
                        i += 1;
                    }
                    let group = &self.items[start..i];
                    let width = group
                        .iter()
                        .map(|item| match item {
                            BodyItem::Attribute(name, _) => name.chars().count(),
                            _ => 0,
                        })
                        .max()
                        .unwrap_or(0);
                    for item in group {
                        if let BodyItem::Attribute(name, value) = item {
                            out.push_str(&format!(
                                "{pad}{name:<width$} = {}\n",
                                value.render(depth)
                            ));
                        }
                    }
                    continue;
                }
                BodyItem::Attribute(name, value) => {
                    out.push_str(&format!("{pad}{name} = {}\n", value.render(depth)));
                }
                BodyItem::Block(block) => block.render_into(depth, out),
                BodyItem::Blank => out.push('\n'),
            }
            i += 1;
        }
    }
}

/// `<kind> "<label>"... { <body> }`
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub kind: String,
    pub labels: Vec<String>,
    pub body: Body,
}

impl Block {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            labels: Vec::new(),
            body: Body::new(),
        }
    }

    pub fn resource(resource_type: &str, name: &str) -> Self {
        Self::new("resource").label(resource_type).label(name)
    }

    pub fn data(data_type: &str, name: &str) -> Self {
        Self::new("data").label(data_type).label(name)
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_body(mut self, build: impl FnOnce(&mut Body)) -> Self {
        build(&mut self.body);
        self
    }

    fn render_into(&self, depth: usize, out: &mut String) {
        let pad = INDENT.repeat(depth);
        out.push_str(&pad);
        out.push_str(&self.kind);
        for label in &self.labels {
            out.push(' ');
            out.push_str(&quote(label));
        }
        if self.body.is_empty() {
            out.push_str(" {}\n");
            return;
        }
        out.push_str(" {\n");
        self.body.render_into(depth + 1, out);
        out.push_str(&pad);
        out.push_str("}\n");
    }

    pub fn to_hcl_string(&self) -> String {
        let mut out = String::new();
        self.render_into(0, &mut out);
        out
    }
}

// =============================================================================
// DOCUMENTS
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
enum DocItem {
    Section(String),
    Block(Block),
}

/// One `.tf` file: header comment lines, then sections and blocks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    header: Vec<String>,
    items: Vec<DocItem>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&mut self, line: impl Into<String>) -> &mut Self {
        self.header.push(line.into());
        self
    }

    /// A banner comment introducing the blocks that follow.
    pub fn section(&mut self, title: impl Into<String>) -> &mut Self {
        self.items.push(DocItem::Section(title.into()));
        self
    }

    pub fn block(&mut self, block: Block) -> &mut Self {
        self.items.push(DocItem::Block(block));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Rendered text, ending with exactly one newline.
    pub fn to_hcl_string(&self) -> String {
        let mut out = String::new();
        for line in &self.header {
            if line.is_empty() {
                out.push_str("#\n");
            } else {
                out.push_str(&format!("# {line}\n"));
            }
        }

        for item in &self.items {
            if !out.is_empty() {
                out.push('\n');
            }
            match item {
                DocItem::Section(title) => {
                    out.push_str(&format!("{BANNER}\n# {title}\n{BANNER}\n"));
                }
                DocItem::Block(block) => block.render_into(0, &mut out),
            }
        }

        if out.is_empty() {
            out.push('\n');
        }
        out
    }
}
