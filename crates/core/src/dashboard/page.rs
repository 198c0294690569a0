use crate::chart::Figure;
use serde::{Deserialize, Serialize};

/// One element of a rendered dashboard, in display order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Title { text: String },
    Subheader { text: String },
    Text { text: String },
    /// Bold label followed by a value.
    Field { label: String, value: String },
    Success { text: String },
    Warning { text: String },
    Error { text: String },
    TextInput {
        name: String,
        label: String,
        value: String,
    },
    Slider {
        name: String,
        label: String,
        min: u32,
        max: u32,
        value: u32,
    },
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Chart { figure: Figure },
    /// Static SVG document.
    Image { alt: String, svg: String },
}

/// Output of one dashboard pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub blocks: Vec<Block>,
}

impl Page {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a block and returns its position.
    pub fn push(&mut self, block: Block) -> usize {
        self.blocks.push(block);
        self.blocks.len() - 1
    }

    pub fn title(&mut self, text: impl Into<String>) -> usize {
        self.push(Block::Title { text: text.into() })
    }

    pub fn subheader(&mut self, text: impl Into<String>) -> usize {
        self.push(Block::Subheader { text: text.into() })
    }

    pub fn text(&mut self, text: impl Into<String>) -> usize {
        self.push(Block::Text { text: text.into() })
    }

    pub fn field(&mut self, label: impl Into<String>, value: impl Into<String>) -> usize {
        self.push(Block::Field {
            label: label.into(),
            value: value.into(),
        })
    }

    pub fn success(&mut self, text: impl Into<String>) -> usize {
        self.push(Block::Success { text: text.into() })
    }

    pub fn warning(&mut self, text: impl Into<String>) -> usize {
        self.push(Block::Warning { text: text.into() })
    }

    pub fn error(&mut self, text: impl Into<String>) -> usize {
        self.push(Block::Error { text: text.into() })
    }

    /// Rewrites the text block at `index` in place. Other block kinds are left untouched.
    pub fn set_text(&mut self, index: usize, text: impl Into<String>) {
        if let Some(Block::Text { text: current }) = self.blocks.get_mut(index) {
            *current = text.into();
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Error { text } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|b| match b {
            Block::Warning { text } => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn field_value(&self, label: &str) -> Option<&str> {
        self.blocks.iter().find_map(|b| match b {
            Block::Field { label: l, value } if l == label => Some(value.as_str()),
            _ => None,
        })
    }

    pub fn chart_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, Block::Chart { .. }))
            .count()
    }
}
